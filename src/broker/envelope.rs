use serde::{Deserialize, Serialize};

/// The wire-level unit of the relay: a topic name plus the serialized
/// payload a publisher chose to send.
///
/// The broker never inspects `content`; it is opaque cargo carried from the
/// publisher to every current subscriber of `topic`. Envelopes are built
/// immediately before a send and discarded after delivery; nothing is
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Topic name. Case-sensitive, matched exactly; no wildcards.
    pub topic: String,

    /// JSON-serialized payload content.
    pub content: String,
}

impl Envelope {
    pub fn new(topic: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            content: content.into(),
        }
    }

    /// Serializes an arbitrary payload value into an envelope for `topic`.
    pub fn encode<T: Serialize>(
        topic: impl Into<String>,
        content: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            topic: topic.into(),
            content: serde_json::to_string(content)?,
        })
    }
}
