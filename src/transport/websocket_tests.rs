use crate::broker::Router;
use crate::transport::frame::{ClientFrame, ServerFrame};
use crate::transport::websocket::start_websocket_server;
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn setup_server() -> (String, Arc<Mutex<Router>>) {
    let addr = format!(
        "127.0.0.1:{}",
        portpicker::pick_unused_port().expect("No free ports")
    );
    let router = Arc::new(Mutex::new(Router::new()));

    let server_addr = addr.clone();
    let server_router = router.clone();
    tokio::spawn(async move {
        let _ = start_websocket_server(&server_addr, server_router).await;
    });

    // Give the server a moment to start up
    tokio::time::sleep(Duration::from_millis(100)).await;

    (addr, router)
}

async fn connect_client(addr: &str) -> WsClient {
    let (ws_stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("WebSocket handshake failed");
    ws_stream
}

async fn send_frame(ws: &mut WsClient, frame: &ClientFrame) {
    ws.send(WsMessage::text(serde_json::to_string(frame).unwrap()))
        .await
        .expect("Failed to send frame");
}

async fn recv_frame(ws: &mut WsClient) -> ServerFrame {
    let msg = ws
        .next()
        .await
        .expect("Did not receive a frame")
        .expect("WebSocket read failed");
    let raw_data = msg.into_data();
    serde_json::from_slice(&raw_data).unwrap_or_else(|e| {
        panic!("Failed to deserialize ServerFrame from '{raw_data:?}': {e}");
    })
}

#[tokio::test]
async fn test_subscribe_registers_membership() {
    let (addr, router) = setup_server().await;
    let mut ws = connect_client(&addr).await;

    send_frame(
        &mut ws,
        &ClientFrame::Subscribe {
            topic: "orders".to_string(),
        },
    )
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let router = router.lock().unwrap();
    assert_eq!(router.peer_count(), 1);
    assert_eq!(router.members_of("orders").len(), 1);
}

#[tokio::test]
async fn test_unsubscribe_removes_membership() {
    let (addr, router) = setup_server().await;
    let mut ws = connect_client(&addr).await;

    send_frame(
        &mut ws,
        &ClientFrame::Subscribe {
            topic: "orders".to_string(),
        },
    )
    .await;
    send_frame(
        &mut ws,
        &ClientFrame::Unsubscribe {
            topic: "orders".to_string(),
        },
    )
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let router = router.lock().unwrap();
    assert_eq!(router.peer_count(), 1);
    assert!(router.members_of("orders").is_empty());
}

#[tokio::test]
async fn test_send_message_reaches_subscriber() {
    let (addr, _router) = setup_server().await;
    let mut subscriber = connect_client(&addr).await;
    let mut publisher = connect_client(&addr).await;

    send_frame(
        &mut subscriber,
        &ClientFrame::Subscribe {
            topic: "orders".to_string(),
        },
    )
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    send_frame(
        &mut publisher,
        &ClientFrame::SendMessage {
            topic: "orders".to_string(),
            content: "42".to_string(),
        },
    )
    .await;

    let frame = recv_frame(&mut subscriber).await;
    assert_eq!(
        frame,
        ServerFrame::Deliver {
            topic: "orders".to_string(),
            content: "42".to_string(),
        }
    );
}

#[tokio::test]
async fn test_publisher_without_subscribers_is_noop() {
    let (addr, router) = setup_server().await;
    let mut publisher = connect_client(&addr).await;

    send_frame(
        &mut publisher,
        &ClientFrame::SendMessage {
            topic: "nobody-listens".to_string(),
            content: "42".to_string(),
        },
    )
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The message is dropped and the connection stays registered.
    assert_eq!(router.lock().unwrap().peer_count(), 1);
}

#[tokio::test]
async fn test_malformed_frame_gets_error_reply() {
    let (addr, router) = setup_server().await;
    let mut ws = connect_client(&addr).await;

    ws.send(WsMessage::text("this is not a frame"))
        .await
        .expect("Failed to send garbage");

    let frame = recv_frame(&mut ws).await;
    match frame {
        ServerFrame::Error { message } => assert_eq!(message, "malformed frame"),
        other => panic!("Expected an error frame, got {other:?}"),
    }

    // The connection survives a malformed frame.
    assert_eq!(router.lock().unwrap().peer_count(), 1);
}

#[tokio::test]
async fn test_disconnect_cleans_up_peer() {
    let (addr, router) = setup_server().await;
    let mut ws = connect_client(&addr).await;

    send_frame(
        &mut ws,
        &ClientFrame::Subscribe {
            topic: "orders".to_string(),
        },
    )
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(router.lock().unwrap().peer_count(), 1);

    ws.close(None).await.expect("Failed to close WebSocket");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let router = router.lock().unwrap();
    assert_eq!(router.peer_count(), 0);
    assert!(router.members_of("orders").is_empty());
}
