//! The `client` module is the consumer side of the relay: the typed
//! subscription registry and the hub proxy that owns a connection's
//! lifecycle.

pub mod proxy;
pub mod subscriptions;

pub use proxy::{ConnectionState, HubProxy};
pub use subscriptions::SubscriptionRegistry;
