//! The `transport` module handles network communication between clients
//! and the hub over WebSockets.
//!
//! It defines the wire protocol frames, the [`Connection`] trait that the
//! client proxy is generic over, and the WebSocket server and client
//! implementations. The transport owns no routing logic: it translates
//! frames into router operations and back.

use std::sync::Arc;

use crate::utils::HubError;

pub mod frame;
pub mod websocket;

#[cfg(test)]
mod websocket_tests;

pub use frame::{ClientFrame, ServerFrame};
pub use websocket::{WsConnection, start_websocket_server};

/// Callback invoked for every inbound delivery: `(topic, content)`.
pub type DeliverHandler = Arc<dyn Fn(String, String) + Send + Sync>;

/// The persistent-connection boundary the client proxy builds on.
///
/// One implementation speaks WebSockets ([`WsConnection`]); tests provide
/// an in-memory fake. A connection is bidirectional and ordered: `invoke`
/// submits one remote operation and resolves once the write has completed,
/// and the handler registered with `on_deliver` observes every inbound
/// delivery until `dispose`.
pub trait Connection: Send + Sync {
    /// Performs the transport handshake.
    fn start(&self) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Submits one remote operation and awaits the write outcome.
    /// Cancellation is not handled here; the proxy races this future
    /// against its cancellation token.
    fn invoke(&self, frame: ClientFrame) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Registers the callback for inbound deliver frames. Replaces any
    /// previously registered handler.
    fn on_deliver(&self, handler: DeliverHandler);

    /// Releases the connection. In-flight inbound dispatch stops; queued
    /// outbound frames are flushed before the socket closes.
    fn dispose(&self) -> impl Future<Output = ()> + Send;
}
