//! Per-topic message handlers.
//!
//! Each handler decides from the topic alone whether it wants a message,
//! then validates the payload and acts on it. Handlers report failures as
//! [`HandlerError`]; the router logs them and moves on.

mod gas_alert;
mod rfid;
mod sensor_data;
mod status;

use time::OffsetDateTime;
use uuid::Uuid;

use smarthome_types::{ParseError, SensorType, parse_timestamp};

use crate::publisher::PublishError;
use crate::topic::device_segment;

pub use gas_alert::GasAlertHandler;
pub use rfid::{RESPONSE_SUFFIX, RfidResponse, RfidValidationHandler};
pub use sensor_data::SensorDataHandler;
pub use status::StatusUpdateHandler;

/// Why a handler gave up on a message.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The payload could not be parsed or is missing a required field.
    #[error("invalid payload: {0}")]
    Payload(String),
    /// A range-checked value fell outside its range.
    #[error("{sensor_type} value {value} out of range")]
    OutOfRange { sensor_type: SensorType, value: f64 },
    /// No usable device UUID for the row being written.
    #[error("no valid device UUID for topic {0}")]
    DeviceUuid(String),
    #[error("storage error: {0}")]
    Storage(#[from] smarthome_store::Error),
    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
}

impl HandlerError {
    /// Whether the failure is the sender's fault rather than ours.
    pub fn is_bad_message(&self) -> bool {
        matches!(self, HandlerError::Payload(_) | HandlerError::OutOfRange { .. })
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        HandlerError::Payload(e.to_string())
    }
}

impl From<ParseError> for HandlerError {
    fn from(e: ParseError) -> Self {
        HandlerError::Payload(e.to_string())
    }
}

/// Maps topics to the UUID written as `device_id`.
///
/// A device segment that is itself a UUID is used as is. Otherwise the
/// configured bridge UUID applies, since firmware names like `esp32_main`
/// are not UUIDs.
#[derive(Debug, Clone, Default)]
pub struct DeviceIds {
    configured: Option<String>,
}

impl DeviceIds {
    pub fn new(configured: Option<String>) -> Self {
        Self { configured }
    }

    pub fn resolve(&self, topic: &str) -> Result<Uuid, HandlerError> {
        if let Some(id) = device_segment(topic).and_then(|s| Uuid::parse_str(s).ok()) {
            return Ok(id);
        }
        self.configured
            .as_deref()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or_else(|| HandlerError::DeviceUuid(topic.to_string()))
    }
}

/// Device-supplied timestamp, or the receive time when absent.
fn message_time(raw: Option<&str>) -> Result<OffsetDateTime, HandlerError> {
    match raw {
        Some(s) => Ok(parse_timestamp(s)?),
        None => Ok(OffsetDateTime::now_utc()),
    }
}

/// A registered handler.
pub enum Handler {
    SensorData(SensorDataHandler),
    GasAlert(GasAlertHandler),
    RfidValidation(RfidValidationHandler),
    StatusUpdate(StatusUpdateHandler),
}

impl Handler {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Handler::SensorData(_) => "sensor_data",
            Handler::GasAlert(_) => "gas_alert",
            Handler::RfidValidation(_) => "rfid_validation",
            Handler::StatusUpdate(_) => "status_update",
        }
    }

    pub fn can_handle(&self, topic: &str) -> bool {
        match self {
            Handler::SensorData(_) | Handler::GasAlert(_) => topic.ends_with("/data"),
            Handler::RfidValidation(_) => topic.contains("/rfid/check"),
            Handler::StatusUpdate(_) => topic.contains("/status/"),
        }
    }

    pub async fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), HandlerError> {
        match self {
            Handler::SensorData(h) => h.handle(topic, payload).await,
            Handler::GasAlert(h) => h.handle(topic, payload).await,
            Handler::RfidValidation(h) => h.handle(topic, payload).await,
            Handler::StatusUpdate(h) => h.handle(topic, payload).await,
        }
    }
}

impl From<SensorDataHandler> for Handler {
    fn from(h: SensorDataHandler) -> Self {
        Handler::SensorData(h)
    }
}

impl From<GasAlertHandler> for Handler {
    fn from(h: GasAlertHandler) -> Self {
        Handler::GasAlert(h)
    }
}

impl From<RfidValidationHandler> for Handler {
    fn from(h: RfidValidationHandler) -> Self {
        Handler::RfidValidation(h)
    }
}

impl From<StatusUpdateHandler> for Handler {
    fn from(h: StatusUpdateHandler) -> Self {
        Handler::StatusUpdate(h)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use rumqttc::QoS;
    use tokio::sync::Mutex;

    use crate::publisher::{PublishError, Transport};

    pub const DEVICE_UUID: &str = "6f1c2a58-3d4e-4b7a-9c10-2e5f8a9b0c1d";

    /// Transport that records every publish.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub sent: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl RecordingTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub async fn json(&self) -> Vec<(String, serde_json::Value)> {
            self.sent
                .lock()
                .await
                .iter()
                .map(|(t, p)| (t.clone(), serde_json::from_slice(p).unwrap()))
                .collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn publish(
            &self,
            topic: &str,
            payload: Vec<u8>,
            _qos: QoS,
            _retain: bool,
        ) -> Result<(), PublishError> {
            self.sent.lock().await.push((topic.to_string(), payload));
            Ok(())
        }
    }
}
