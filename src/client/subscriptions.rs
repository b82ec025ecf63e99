//! Per-topic handler registry with type-aware dispatch.
//!
//! The registry stores one decode-and-invoke closure per topic: the
//! expected payload shape is captured at subscribe time, so dispatch never
//! inspects types at runtime. It hands the raw content to the closure,
//! which deserializes and calls the typed handler. At most one handler per
//! topic; re-subscribing atomically replaces the previous one.
//!
//! Dispatch runs on the inbound delivery path and has no caller to report
//! to: unknown topics are dropped silently (expected in the window between
//! a local unsubscribe and its acknowledgement), decode failures are
//! logged and dropped, and a panicking handler is contained here so it
//! cannot tear down the connection.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use tracing::{error, trace, warn};

type DecodeAndInvoke = Arc<dyn Fn(&str) -> Result<(), serde_json::Error> + Send + Sync>;

#[derive(Default)]
pub struct SubscriptionRegistry {
    handlers: Mutex<HashMap<String, DecodeAndInvoke>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Installs the handler for a topic, replacing any existing one. The
    /// stored closure deserializes the raw content into `T` before
    /// invoking `handler`.
    pub fn insert<T, F>(&self, topic: &str, handler: F)
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let decode_and_invoke: DecodeAndInvoke = Arc::new(move |raw: &str| {
            let content: T = serde_json::from_str(raw)?;
            handler(content);
            Ok(())
        });
        self.handlers
            .lock()
            .unwrap()
            .insert(topic.to_string(), decode_and_invoke);
    }

    /// Removes the handler for a topic. Returns whether one was present;
    /// removing an unknown topic is a no-op.
    pub fn remove(&self, topic: &str) -> bool {
        self.handlers.lock().unwrap().remove(topic).is_some()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.handlers.lock().unwrap().contains_key(topic)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.lock().unwrap().is_empty()
    }

    /// Dispatches one inbound delivery to the handler registered for its
    /// topic. The handler is cloned out of the lock first, so user code
    /// never runs under it.
    pub fn dispatch(&self, topic: &str, content: &str) {
        let handler = self.handlers.lock().unwrap().get(topic).cloned();
        let Some(handler) = handler else {
            trace!("no handler for topic '{topic}', message dropped");
            return;
        };

        match catch_unwind(AssertUnwindSafe(|| handler(content))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("failed to decode message on topic '{topic}', message dropped: {e}");
            }
            Err(_) => {
                error!("handler for topic '{topic}' panicked");
            }
        }
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let topics: Vec<String> = self.handlers.lock().unwrap().keys().cloned().collect();
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &topics)
            .finish()
    }
}
