//! Client proxy: connection lifecycle plus typed publish/subscribe.
//!
//! `HubProxy` owns one connection, one subscription registry and one
//! cancellation token. Every remote call races the token, so once
//! `disconnect` has fired, in-flight and future calls resolve as
//! [`CallOutcome::Cancelled`]: logged and swallowed, never surfaced as a
//! failure, since disconnect intentionally aborts pending work.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::broker::Envelope;
use crate::client::subscriptions::SubscriptionRegistry;
use crate::transport::frame::ClientFrame;
use crate::transport::Connection;
use crate::utils::{CallOutcome, HubError};

/// Lifecycle of one proxy's connection.
///
/// `connect` is only legal from `Disconnected`; `disconnect` is legal from
/// every state and is the only way back to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Client-side proxy for the hub, generic over the transport connection.
pub struct HubProxy<C: Connection> {
    connection: C,
    subscriptions: Arc<SubscriptionRegistry>,
    state: Mutex<ConnectionState>,
    cancel: CancellationToken,
}

impl<C: Connection> HubProxy<C> {
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            state: Mutex::new(ConnectionState::Disconnected),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Connects to the hub and registers the inbound delivery handler.
    ///
    /// Only valid while disconnected; connections are not re-entrant, and a
    /// second `connect` fails without touching the established one. A
    /// failed handshake rolls the state back to `Disconnected` and
    /// re-raises the transport error.
    pub async fn connect(&self) -> Result<(), HubError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != ConnectionState::Disconnected {
                error!("connect rejected, connection already {:?}", *state);
                return Err(HubError::InvalidOperation {
                    operation: "connect",
                    state: *state,
                });
            }
            *state = ConnectionState::Connecting;
        }

        let subscriptions = self.subscriptions.clone();
        self.connection
            .on_deliver(Arc::new(move |topic: String, content: String| {
                subscriptions.dispatch(&topic, &content);
            }));

        match self.connection.start().await {
            Ok(()) => {
                *self.state.lock().unwrap() = ConnectionState::Connected;
                info!("connected to hub");
                Ok(())
            }
            Err(e) => {
                *self.state.lock().unwrap() = ConnectionState::Disconnected;
                error!("failed to connect to hub: {e}");
                Err(e)
            }
        }
    }

    /// Disconnects from the hub.
    ///
    /// Fires the cancellation token (a second call is a harmless no-op),
    /// marking every pending remote call as cancelled, then releases the
    /// connection. Valid from any state; disconnecting a proxy that never
    /// connected completes without error.
    pub async fn disconnect(&self) {
        info!("disconnecting from hub");
        self.cancel.cancel();

        *self.state.lock().unwrap() = ConnectionState::Disconnecting;
        self.connection.dispose().await;
        *self.state.lock().unwrap() = ConnectionState::Disconnected;
    }

    /// Sends `content` to every current subscriber of `topic`.
    pub async fn send<T: Serialize>(&self, topic: &str, content: &T) -> Result<(), HubError> {
        let envelope = Envelope::encode(topic, content)?;
        let outcome = self
            .call(ClientFrame::SendMessage {
                topic: envelope.topic,
                content: envelope.content,
            })
            .await;

        match outcome {
            CallOutcome::Completed => Ok(()),
            CallOutcome::Cancelled => {
                info!("send cancelled for topic '{topic}'");
                Ok(())
            }
            CallOutcome::Failed(e) => {
                error!("failed to send message on topic '{topic}': {e}");
                Err(e)
            }
        }
    }

    /// Subscribes to `topic`, dispatching each delivery to `handler` after
    /// decoding the content into `T`.
    ///
    /// The remote call is issued first, even when a handler is already
    /// installed, so broker-side membership is always attempted and the
    /// two sides do not silently diverge. A cancelled call leaves the
    /// local registry untouched.
    pub async fn subscribe<T, F>(&self, topic: &str, handler: F) -> Result<(), HubError>
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let outcome = self
            .call(ClientFrame::Subscribe {
                topic: topic.to_string(),
            })
            .await;

        match outcome {
            CallOutcome::Completed => {
                self.subscriptions.insert(topic, handler);
                Ok(())
            }
            CallOutcome::Cancelled => {
                info!("subscribe cancelled for topic '{topic}'");
                Ok(())
            }
            CallOutcome::Failed(e) => {
                error!("failed to subscribe to topic '{topic}': {e}");
                Err(e)
            }
        }
    }

    /// Unsubscribes from `topic`. The remote call is issued even when no
    /// local handler exists; a missing handler is not an error.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), HubError> {
        let outcome = self
            .call(ClientFrame::Unsubscribe {
                topic: topic.to_string(),
            })
            .await;

        match outcome {
            CallOutcome::Completed => {
                self.subscriptions.remove(topic);
                Ok(())
            }
            CallOutcome::Cancelled => {
                info!("unsubscribe cancelled for topic '{topic}'");
                Ok(())
            }
            CallOutcome::Failed(e) => {
                error!("failed to unsubscribe from topic '{topic}': {e}");
                Err(e)
            }
        }
    }

    /// Races one remote call against the proxy's cancellation token.
    async fn call(&self, frame: ClientFrame) -> CallOutcome {
        if self.cancel.is_cancelled() {
            return CallOutcome::Cancelled;
        }

        tokio::select! {
            _ = self.cancel.cancelled() => CallOutcome::Cancelled,
            result = self.connection.invoke(frame) => match result {
                Ok(()) => CallOutcome::Completed,
                Err(e) => CallOutcome::Failed(e),
            },
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }
}
