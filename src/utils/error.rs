//! Error and outcome types shared across the crate.
//!
//! `HubError` is the single error enum: protocol misuse, transport
//! failures, closed connections and payload codec failures. Cancellation is
//! deliberately not an error; remote-call wrappers report it through
//! [`CallOutcome`], so callers branch on it instead of catching it.

use crate::client::ConnectionState;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The operation is not legal in the connection's current state, e.g.
    /// calling `connect` on a proxy that is already connected.
    #[error("{operation} is not valid while the connection is {state:?}")]
    InvalidOperation {
        operation: &'static str,
        state: ConnectionState,
    },

    #[error("websocket transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying connection is gone; the remote call never left the
    /// process.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result of one remote call issued through the client proxy.
///
/// Cancellation is a first-class branch: once the proxy's cancellation
/// token has fired, in-flight and future calls resolve to `Cancelled`
/// rather than an error.
#[derive(Debug)]
pub enum CallOutcome {
    /// The frame was handed to the transport and the write completed.
    Completed,
    /// The proxy was disconnected before the call finished.
    Cancelled,
    /// The transport reported a genuine failure.
    Failed(HubError),
}
