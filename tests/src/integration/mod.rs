//! Integration scenarios against a live socket.

pub mod support;

mod events;
mod lifecycle;
