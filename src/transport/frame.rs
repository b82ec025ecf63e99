use serde::{Deserialize, Serialize};

/// Frames sent by a client to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "subscribe")]
    Subscribe { topic: String },

    #[serde(rename = "unsubscribe")]
    Unsubscribe { topic: String },

    #[serde(rename = "send_message")]
    SendMessage { topic: String, content: String },
}

/// Frames sent by the hub to a client.
///
/// `Deliver` carries the published content alone as its payload; the
/// `topic` field is routing metadata naming the subscription the delivery
/// belongs to, so the receiving proxy can pick the right handler. It is not
/// a re-serialized envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "deliver")]
    Deliver { topic: String, content: String },

    #[serde(rename = "error")]
    Error { message: String },
}
