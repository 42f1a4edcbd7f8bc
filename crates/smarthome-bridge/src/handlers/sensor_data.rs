use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use smarthome_types::{SensorLog, SensorReading, SensorType};

use super::{DeviceIds, HandlerError, message_time};
use crate::cache::LatestReadingCache;
use crate::storage::Storage;

/// Wire shape of `devices/{id}/data` payloads.
#[derive(Debug, Deserialize)]
struct SensorMessage {
    sensor_type: Option<String>,
    value: Option<f64>,
    detected: Option<bool>,
    unit: Option<String>,
    timestamp: Option<String>,
}

/// Parse a sensor data payload into a reading.
///
/// Buffered types must carry a value. Event types (motion, gas) default
/// to 0 since the firmware sends only `detected` for them.
fn parse_reading(payload: &[u8]) -> Result<SensorReading, HandlerError> {
    let msg: SensorMessage = serde_json::from_slice(payload)?;

    let sensor_type: SensorType = match msg.sensor_type.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.parse()?,
        _ => return Err(HandlerError::Payload("missing sensor_type".to_string())),
    };

    let value = match (msg.value, sensor_type.is_buffered()) {
        (Some(v), _) => v,
        (None, false) => 0.0,
        (None, true) => {
            return Err(HandlerError::Payload(format!(
                "missing value for {}",
                sensor_type
            )));
        }
    };

    Ok(SensorReading {
        sensor_type,
        value,
        detected: msg.detected,
        unit: msg.unit,
        timestamp: message_time(msg.timestamp.as_deref())?,
    })
}

/// Buffers temperature and humidity, logs motion events.
///
/// Gas readings are accepted here and left to [`GasAlertHandler`](super::GasAlertHandler).
pub struct SensorDataHandler {
    cache: Arc<LatestReadingCache>,
    storage: Arc<dyn Storage>,
    devices: DeviceIds,
}

impl SensorDataHandler {
    pub fn new(
        cache: Arc<LatestReadingCache>,
        storage: Arc<dyn Storage>,
        devices: DeviceIds,
    ) -> Self {
        Self {
            cache,
            storage,
            devices,
        }
    }

    pub async fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), HandlerError> {
        let reading = parse_reading(payload)?;

        match reading.sensor_type {
            SensorType::Temperature | SensorType::Humidity => {
                if !reading.sensor_type.accepts(reading.value) {
                    return Err(HandlerError::OutOfRange {
                        sensor_type: reading.sensor_type,
                        value: reading.value,
                    });
                }
                debug!(
                    "Cached {} = {} from {}",
                    reading.sensor_type, reading.value, topic
                );
                self.cache.update(reading).await;
            }
            SensorType::Motion => {
                if !reading.is_detected() {
                    debug!("Motion cleared on {}", topic);
                    return Ok(());
                }
                let device_id = self.devices.resolve(topic)?;
                let log = SensorLog::motion_event(device_id, reading.timestamp);
                self.storage.insert_sensor_log(&log).await?;
                info!("Motion detected on {}", topic);
            }
            SensorType::Gas => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::DEVICE_UUID;
    use smarthome_store::{SensorLogQuery, Store};
    use tokio::sync::Mutex;

    struct Fixture {
        handler: SensorDataHandler,
        cache: Arc<LatestReadingCache>,
        store: Arc<Mutex<Store>>,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(LatestReadingCache::new());
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        let handler = SensorDataHandler::new(
            cache.clone(),
            store.clone(),
            DeviceIds::new(Some(DEVICE_UUID.to_string())),
        );
        Fixture {
            handler,
            cache,
            store,
        }
    }

    const TOPIC: &str = "devices/esp32_main/data";

    #[test]
    fn test_parse_reading_defaults_event_value() {
        let reading = parse_reading(
            br#"{"sensor_type":"gas","detected":true,"timestamp":"2025-01-15T10:30:00Z"}"#,
        )
        .unwrap();
        assert_eq!(reading.sensor_type, SensorType::Gas);
        assert_eq!(reading.value, 0.0);
        assert!(reading.is_detected());
    }

    #[test]
    fn test_parse_reading_rejects() {
        assert!(parse_reading(b"not json").is_err());
        assert!(parse_reading(br#"{"value": 1}"#).is_err());
        assert!(parse_reading(br#"{"sensor_type":"  ","value":1}"#).is_err());
        assert!(parse_reading(br#"{"sensor_type":"pressure","value":1}"#).is_err());
        assert!(parse_reading(br#"{"sensor_type":"temperature"}"#).is_err());
        assert!(
            parse_reading(br#"{"sensor_type":"temperature","value":20,"timestamp":"later"}"#)
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_temperature_in_range_is_cached() {
        let f = fixture();
        f.handler
            .handle(
                TOPIC,
                br#"{"sensor_type":"temperature","value":21.5,"unit":"C","timestamp":"2025-01-15T10:30:00Z"}"#,
            )
            .await
            .unwrap();

        let cached = f.cache.get(SensorType::Temperature).await.unwrap();
        assert_eq!(cached.value, 21.5);
        assert_eq!(cached.unit.as_deref(), Some("C"));
    }

    #[tokio::test]
    async fn test_out_of_range_leaves_cache_unchanged() {
        let f = fixture();
        f.handler
            .handle(TOPIC, br#"{"sensor_type":"humidity","value":40}"#)
            .await
            .unwrap();

        let result = f
            .handler
            .handle(TOPIC, br#"{"sensor_type":"humidity","value":100.5}"#)
            .await;
        assert!(matches!(result, Err(HandlerError::OutOfRange { .. })));

        let result = f
            .handler
            .handle(TOPIC, br#"{"sensor_type":"temperature","value":-25}"#)
            .await;
        assert!(matches!(result, Err(HandlerError::OutOfRange { .. })));

        assert_eq!(f.cache.get(SensorType::Humidity).await.unwrap().value, 40.0);
        assert!(f.cache.get(SensorType::Temperature).await.is_none());
    }

    #[tokio::test]
    async fn test_motion_detected_is_logged() {
        let f = fixture();
        f.handler
            .handle(
                TOPIC,
                br#"{"sensor_type":"motion","detected":true,"timestamp":"2025-01-15T10:30:00Z"}"#,
            )
            .await
            .unwrap();
        f.handler
            .handle(TOPIC, br#"{"sensor_type":"motion","detected":false}"#)
            .await
            .unwrap();

        let logs = f
            .store
            .lock()
            .await
            .query_sensor_logs(&SensorLogQuery::new())
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].sensor_type, SensorType::Motion);
        assert_eq!(logs[0].value, 1.0);
        assert_eq!(logs[0].device_id.to_string(), DEVICE_UUID);
        assert!(f.cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_motion_without_device_uuid_is_rejected() {
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        let handler = SensorDataHandler::new(
            Arc::new(LatestReadingCache::new()),
            store.clone(),
            DeviceIds::default(),
        );
        let result = handler
            .handle(TOPIC, br#"{"sensor_type":"motion","detected":true}"#)
            .await;
        assert!(matches!(result, Err(HandlerError::DeviceUuid(_))));
        assert_eq!(store.lock().await.count_sensor_logs(None).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_gas_is_not_buffered() {
        let f = fixture();
        f.handler
            .handle(TOPIC, br#"{"sensor_type":"gas","detected":true}"#)
            .await
            .unwrap();
        assert!(f.cache.is_empty().await);
        assert_eq!(f.store.lock().await.count_sensor_logs(None).unwrap(), 0);
    }
}
