//! WebSocket side of the bridge.
//!
//! - `connection`: listener, single editor connection, outbound queue, pings
//! - `dispatcher`: inbound frame routing (replies vs events)
//! - `subscriptions`: event callback registry

pub mod connection;
pub mod dispatcher;
pub mod subscriptions;

pub use connection::{BridgeStatus, ConnectionManager, ConnectionStatus, PeerInfo, Submission};
pub use dispatcher::{Dispatched, Dispatcher};
pub use subscriptions::{EventSubscribers, EventSubscription, SubscriberError, SubscriptionId};
