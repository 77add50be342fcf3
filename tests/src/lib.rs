//! # Editor Bridge Test Suite
//!
//! Socket-level scenarios: a real bridge on an ephemeral port, with a
//! `tokio-tungstenite` client playing the editor.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── support.rs      # MockEditor + bridge fixtures
//!     ├── correlation.rs  # request/reply pairing, timeouts, editor errors
//!     ├── lifecycle.rs    # connect, disconnect, single-peer policy, stop, bind
//!     └── events.rs       # event fan-out, malformed frames
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p bridge-tests
//! cargo test -p bridge-tests integration::lifecycle
//! ```

pub mod integration;
