//! End-to-end tests driving real hub proxies against a real WebSocket hub.

use crate::broker::Router;
use crate::client::HubProxy;
use crate::transport::websocket::{WsConnection, start_websocket_server};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn setup_hub() -> (String, Arc<Mutex<Router>>) {
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

    (format!("ws://{addr}"), router)
}

// Lets the hub process frames that were only acknowledged at the socket.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn integration_only_subscribers_of_the_topic_receive() {
    let (url, _router) = setup_hub().await;

    let client_a = HubProxy::new(WsConnection::new(&url));
    let client_b = HubProxy::new(WsConnection::new(&url));
    let publisher = HubProxy::new(WsConnection::new(&url));
    client_a.connect().await.expect("client A connect");
    client_b.connect().await.expect("client B connect");
    publisher.connect().await.expect("publisher connect");

    let (tx_a, mut rx_a) = mpsc::unbounded_channel::<u32>();
    client_a
        .subscribe("orders", move |value: u32| {
            let _ = tx_a.send(value);
        })
        .await
        .expect("client A subscribe");

    let (tx_b, mut rx_b) = mpsc::unbounded_channel::<u32>();
    client_b
        .subscribe("shipments", move |value: u32| {
            let _ = tx_b.send(value);
        })
        .await
        .expect("client B subscribe");
    settle().await;

    publisher.send("orders", &42u32).await.expect("send");

    let received = timeout(Duration::from_secs(2), rx_a.recv())
        .await
        .expect("client A timed out")
        .expect("client A channel closed");
    assert_eq!(received, 42);

    // Client B is subscribed to a different topic and receives nothing.
    settle().await;
    assert!(rx_b.try_recv().is_err());

    client_a.disconnect().await;
    client_b.disconnect().await;
    publisher.disconnect().await;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reading {
    sensor: String,
    value: f64,
}

#[tokio::test]
async fn integration_mismatched_shape_is_dropped_per_subscriber() {
    let (url, _router) = setup_hub().await;

    let typed = HubProxy::new(WsConnection::new(&url));
    let mistyped = HubProxy::new(WsConnection::new(&url));
    let publisher = HubProxy::new(WsConnection::new(&url));
    typed.connect().await.expect("typed connect");
    mistyped.connect().await.expect("mistyped connect");
    publisher.connect().await.expect("publisher connect");

    let (tx_ok, mut rx_ok) = mpsc::unbounded_channel::<Reading>();
    typed
        .subscribe("metrics", move |reading: Reading| {
            let _ = tx_ok.send(reading);
        })
        .await
        .expect("typed subscribe");

    // Same topic, but this subscriber expects a plain number.
    let (tx_bad, mut rx_bad) = mpsc::unbounded_channel::<u32>();
    mistyped
        .subscribe("metrics", move |value: u32| {
            let _ = tx_bad.send(value);
        })
        .await
        .expect("mistyped subscribe");
    settle().await;

    let reading = Reading {
        sensor: "temp".to_string(),
        value: 21.5,
    };
    publisher.send("metrics", &reading).await.expect("send");

    let received = timeout(Duration::from_secs(2), rx_ok.recv())
        .await
        .expect("typed subscriber timed out")
        .expect("typed channel closed");
    assert_eq!(received, reading);

    // The mismatched subscriber logs the decode failure and drops it.
    settle().await;
    assert!(rx_bad.try_recv().is_err());

    typed.disconnect().await;
    mistyped.disconnect().await;
    publisher.disconnect().await;
}

#[tokio::test]
async fn integration_unsubscribe_stops_delivery() {
    let (url, _router) = setup_hub().await;

    let client = HubProxy::new(WsConnection::new(&url));
    let publisher = HubProxy::new(WsConnection::new(&url));
    client.connect().await.expect("client connect");
    publisher.connect().await.expect("publisher connect");

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    client
        .subscribe("news", move |text: String| {
            let _ = tx.send(text);
        })
        .await
        .expect("subscribe");
    settle().await;

    publisher
        .send("news", &"first".to_string())
        .await
        .expect("send first");
    let first = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    assert_eq!(first, "first");

    client.unsubscribe("news").await.expect("unsubscribe");
    settle().await;

    publisher
        .send("news", &"second".to_string())
        .await
        .expect("send second");
    settle().await;
    assert!(rx.try_recv().is_err());

    client.disconnect().await;
    publisher.disconnect().await;
}

#[tokio::test]
async fn integration_disconnect_removes_peer_from_hub() {
    let (url, router) = setup_hub().await;

    let client = HubProxy::new(WsConnection::new(&url));
    client.connect().await.expect("connect");
    client
        .subscribe("orders", |_: u32| {})
        .await
        .expect("subscribe");
    settle().await;
    assert_eq!(router.lock().unwrap().peer_count(), 1);

    client.disconnect().await;
    settle().await;

    let router = router.lock().unwrap();
    assert_eq!(router.peer_count(), 0);
    assert!(router.members_of("orders").is_empty());
}
