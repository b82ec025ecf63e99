//! WebSocket transport.
//!
//! Server side: a minimal accept loop that registers one [`Peer`] per
//! connection, translates inbound protocol frames into router operations,
//! and drains the peer's outbound channel onto the socket. Malformed frames
//! are answered with an `error` frame and logged; the connection stays up.
//! Peer cleanup runs exactly once per connection, whichever loop notices
//! the disconnect first.
//!
//! Client side: [`WsConnection`] implements [`Connection`] over a
//! tokio-tungstenite stream. Outbound frames pass through a writer task
//! that acknowledges each completed write, so `invoke` resolves when its
//! frame has actually been written to the socket.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::spawn;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, connect_async};
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::broker::{Envelope, Peer, Router};
use crate::transport::frame::{ClientFrame, ServerFrame};
use crate::transport::{Connection, DeliverHandler};
use crate::utils::HubError;

/// Accepts WebSocket connections and serves the hub protocol until the
/// listener fails. Each connection runs in its own task.
pub async fn start_websocket_server(addr: &str, router: Arc<Mutex<Router>>) -> Result<(), HubError> {
    let listener = TcpListener::bind(addr).await?;

    info!("hub listening on ws://{addr}");

    while let Ok((stream, _)) = listener.accept().await {
        let router = router.clone();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("websocket handshake failed: {e}");
                    return;
                }
            };
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();
            let peer = Peer::new(tx.clone());
            let peer_id = peer.id.clone();
            {
                let mut router = router.lock().unwrap();
                router.register_peer(peer);
            }
            debug!("{peer_id} connected");

            let cleanup_called = Arc::new(AtomicBool::new(false));

            // Removes the peer from the router and every topic group.
            // Both loops may race to call this; it must run exactly once.
            let do_cleanup = {
                let router = router.clone();
                let peer_id = peer_id.clone();
                let cleanup_called = cleanup_called.clone();

                move || {
                    if !cleanup_called.swap(true, Ordering::SeqCst) {
                        let mut router = router.lock().unwrap();
                        router.drop_peer(&peer_id);
                    }
                }
            };

            // Drain the peer's outbound channel onto the socket.
            {
                let peer_id = peer_id.clone();
                let do_cleanup = do_cleanup.clone();

                spawn(async move {
                    while let Some(frame) = rx.recv().await {
                        let text = match serde_json::to_string(&frame) {
                            Ok(json) => json,
                            Err(e) => {
                                error!("failed to serialize frame for {peer_id}: {e}");
                                continue;
                            }
                        };
                        if let Err(e) = ws_sender.send(WsMessage::text(text)).await {
                            warn!("failed to send frame to {peer_id}: {e}");
                            break;
                        }
                    }

                    do_cleanup();
                    debug!("send loop closed for {peer_id}");
                });
            }

            while let Some(Ok(msg)) = ws_receiver.next().await {
                if let WsMessage::Text(text) = msg {
                    match serde_json::from_str::<ClientFrame>(&text) {
                        Ok(ClientFrame::Subscribe { topic }) => {
                            let mut router = router.lock().unwrap();
                            router.subscribe(&topic, peer_id.clone());
                            debug!("{peer_id} subscribed to {topic}");
                        }
                        Ok(ClientFrame::Unsubscribe { topic }) => {
                            let mut router = router.lock().unwrap();
                            router.unsubscribe(&topic, &peer_id);
                            debug!("{peer_id} unsubscribed from {topic}");
                        }
                        Ok(ClientFrame::SendMessage { topic, content }) => {
                            let router = router.lock().unwrap();
                            router.route(Envelope::new(topic, content));
                        }
                        Err(err) => {
                            warn!(
                                "invalid frame from {peer_id}: {err} | {}",
                                &text.chars().take(100).collect::<String>()
                            );
                            let _ = tx.send(ServerFrame::Error {
                                message: "malformed frame".to_string(),
                            });
                        }
                    }
                }
            }

            do_cleanup();
            debug!("{peer_id} disconnected");
        });
    }

    Ok(())
}

/// One outbound frame plus the channel that reports its write outcome.
struct OutboundFrame {
    frame: ClientFrame,
    ack: oneshot::Sender<Result<(), HubError>>,
}

/// Tasks and channels of a started connection.
struct Active {
    outbound: UnboundedSender<OutboundFrame>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

/// Client-side WebSocket connection.
///
/// `invoke` hands the frame to the writer task and resolves once the write
/// has completed (or failed). The reader task feeds every `deliver` frame
/// into the handler registered with `on_deliver`.
pub struct WsConnection {
    url: String,
    inner: Mutex<Option<Active>>,
    deliver: Arc<Mutex<Option<DeliverHandler>>>,
}

impl WsConnection {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            inner: Mutex::new(None),
            deliver: Arc::new(Mutex::new(None)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connection for WsConnection {
    async fn start(&self) -> Result<(), HubError> {
        if self.inner.lock().unwrap().is_some() {
            // Already started; the proxy state machine prevents this.
            return Ok(());
        }

        let (ws_stream, _response) = connect_async(self.url.as_str()).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (outbound, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();

        let writer = spawn(async move {
            while let Some(out) = rx.recv().await {
                let result = match serde_json::to_string(&out.frame) {
                    Ok(json) => ws_sender
                        .send(WsMessage::text(json))
                        .await
                        .map_err(HubError::from),
                    Err(e) => Err(HubError::from(e)),
                };
                let failed = result.is_err();
                let _ = out.ack.send(result);
                if failed {
                    break;
                }
            }
            let _ = ws_sender.send(WsMessage::Close(None)).await;
        });

        let deliver = self.deliver.clone();
        let reader = spawn(async move {
            while let Some(Ok(msg)) = ws_receiver.next().await {
                if let WsMessage::Text(text) = msg {
                    match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(ServerFrame::Deliver { topic, content }) => {
                            let handler = deliver.lock().unwrap().clone();
                            match handler {
                                Some(handler) => handler(topic, content),
                                None => debug!("delivery for {topic} before any handler, dropped"),
                            }
                        }
                        Ok(ServerFrame::Error { message }) => {
                            warn!("hub reported an error: {message}");
                        }
                        Err(e) => {
                            warn!("unreadable frame from hub: {e}");
                        }
                    }
                }
            }
            debug!("read loop closed");
        });

        *self.inner.lock().unwrap() = Some(Active {
            outbound,
            writer,
            reader,
        });
        Ok(())
    }

    async fn invoke(&self, frame: ClientFrame) -> Result<(), HubError> {
        let outbound = match &*self.inner.lock().unwrap() {
            Some(active) => active.outbound.clone(),
            None => return Err(HubError::ConnectionClosed),
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        outbound
            .send(OutboundFrame {
                frame,
                ack: ack_tx,
            })
            .map_err(|_| HubError::ConnectionClosed)?;

        ack_rx.await.map_err(|_| HubError::ConnectionClosed)?
    }

    fn on_deliver(&self, handler: DeliverHandler) {
        *self.deliver.lock().unwrap() = Some(handler);
    }

    async fn dispose(&self) {
        let active = self.inner.lock().unwrap().take();
        if let Some(active) = active {
            // Dropping the sender ends the writer loop, which flushes what
            // is queued and sends a close frame. Inbound dispatch stops
            // immediately.
            drop(active.outbound);
            active.reader.abort();
            let _ = active.writer.await;
        }
    }
}
