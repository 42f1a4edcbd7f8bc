//! Outbound publishing back onto the broker.
//!
//! Handlers publish through [`Publisher`], which owns the connection flag
//! maintained by the broker loop. Messages published while disconnected are
//! dropped and counted, never queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Errors returned by [`Publisher::publish`].
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("not connected to broker")]
    NotConnected,
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport rejected publish: {0}")]
    Transport(String),
}

/// Something that can put a message on the broker.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), PublishError>;
}

#[async_trait]
impl Transport for AsyncClient {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), PublishError> {
        // try_publish never waits on a full request queue
        self.try_publish(topic, qos, retain, payload)
            .map_err(|e| PublishError::Transport(e.to_string()))
    }
}

/// Publish counters, exposed on the status endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PublisherStats {
    pub connected: bool,
    pub published: u64,
    pub dropped: u64,
}

/// Fire-and-forget publisher with at-least-once delivery and no retain.
#[derive(Default)]
pub struct Publisher {
    transport: RwLock<Option<Arc<dyn Transport>>>,
    connected: AtomicBool,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl Publisher {
    /// Create a publisher with no transport attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a publisher already attached and marked connected.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport: RwLock::new(Some(transport)),
            connected: AtomicBool::new(true),
            ..Default::default()
        }
    }

    /// Attach the transport used for subsequent publishes.
    pub async fn attach(&self, transport: Arc<dyn Transport>) {
        *self.transport.write().await = Some(transport);
    }

    /// Record broker connectivity. Called by the broker loop.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Whether the broker connection is currently up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Publish raw bytes.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        let transport = self.transport.read().await.clone();
        let transport = match transport {
            Some(t) if self.is_connected() => t,
            _ => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping publish to {}: not connected to broker", topic);
                return Err(PublishError::NotConnected);
            }
        };

        match transport
            .publish(topic, payload, QoS::AtLeastOnce, false)
            .await
        {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                debug!("Published to {}", topic);
                Ok(())
            }
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Serialize `payload` as JSON and publish it.
    pub async fn publish_json<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        payload: &T,
    ) -> Result<(), PublishError> {
        let bytes = serde_json::to_vec(payload)?;
        self.publish(topic, bytes).await
    }

    /// Current counters.
    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            connected: self.is_connected(),
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, Vec<u8>, QoS, bool)>>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn publish(
            &self,
            topic: &str,
            payload: Vec<u8>,
            qos: QoS,
            retain: bool,
        ) -> Result<(), PublishError> {
            self.sent
                .lock()
                .await
                .push((topic.to_string(), payload, qos, retain));
            Ok(())
        }
    }

    struct Rejecting;

    #[async_trait]
    impl Transport for Rejecting {
        async fn publish(&self, _: &str, _: Vec<u8>, _: QoS, _: bool) -> Result<(), PublishError> {
            Err(PublishError::Transport("queue full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_publish_uses_at_least_once_without_retain() {
        let recorder = Arc::new(Recorder::default());
        let publisher = Publisher::with_transport(recorder.clone());

        publisher
            .publish_json("devices/x/rfid/response", &serde_json::json!({"access": "granted"}))
            .await
            .unwrap();

        let sent = recorder.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "devices/x/rfid/response");
        assert_eq!(sent[0].2, QoS::AtLeastOnce);
        assert!(!sent[0].3);
        assert_eq!(publisher.stats().published, 1);
    }

    #[tokio::test]
    async fn test_publish_while_disconnected_is_dropped() {
        let recorder = Arc::new(Recorder::default());
        let publisher = Publisher::with_transport(recorder.clone());
        publisher.set_connected(false);

        let result = publisher.publish("t", b"x".to_vec()).await;
        assert!(matches!(result, Err(PublishError::NotConnected)));
        assert!(recorder.sent.lock().await.is_empty());
        assert_eq!(publisher.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_publish_without_transport_is_dropped() {
        let publisher = Publisher::new();
        publisher.set_connected(true);
        assert!(matches!(
            publisher.publish("t", vec![]).await,
            Err(PublishError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_attach_then_publish() {
        let publisher = Publisher::new();
        let recorder = Arc::new(Recorder::default());
        publisher.attach(recorder.clone()).await;
        publisher.set_connected(true);
        publisher.publish("t", vec![1]).await.unwrap();
        assert_eq!(recorder.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_counts_as_dropped() {
        let publisher = Publisher::with_transport(Arc::new(Rejecting));
        assert!(matches!(
            publisher.publish("t", vec![]).await,
            Err(PublishError::Transport(_))
        ));
        let stats = publisher.stats();
        assert_eq!(stats.published, 0);
        assert_eq!(stats.dropped, 1);
    }
}
