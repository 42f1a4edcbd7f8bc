//! Fan-out of inbound messages to handlers.

use tracing::{debug, error, info, warn};

use crate::handlers::Handler;

/// Which handlers ran for one message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handlers that accepted and processed the message.
    pub handled: Vec<&'static str>,
    /// Handlers that accepted the message and failed.
    pub failed: Vec<&'static str>,
}

impl DispatchOutcome {
    /// Whether no handler accepted the topic.
    pub fn unrouted(&self) -> bool {
        self.handled.is_empty() && self.failed.is_empty()
    }
}

/// Routes each message to every handler that accepts its topic.
///
/// Matching handlers run one after another in registration order. A failing
/// handler is logged and does not stop the others.
#[derive(Default)]
pub struct MessageRouter {
    handlers: Vec<Handler>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler.
    pub fn register(&mut self, handler: impl Into<Handler>) -> &mut Self {
        let handler = handler.into();
        debug!("Registered {} handler", handler.name());
        self.handlers.push(handler);
        self
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub async fn dispatch(&self, topic: &str, payload: &[u8]) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for handler in self.handlers.iter().filter(|h| h.can_handle(topic)) {
            match handler.handle(topic, payload).await {
                Ok(()) => outcome.handled.push(handler.name()),
                Err(e) => {
                    if e.is_bad_message() {
                        warn!("{} rejected message on {}: {}", handler.name(), topic, e);
                    } else {
                        error!("{} failed on {}: {}", handler.name(), topic, e);
                    }
                    outcome.failed.push(handler.name());
                }
            }
        }

        if outcome.unrouted() {
            info!("No handler for topic {}, dropping message", topic);
        }

        outcome
    }
}
