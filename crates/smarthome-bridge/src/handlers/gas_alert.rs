use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use smarthome_types::{GasAlert, SensorType, parse_timestamp};

use super::{DeviceIds, HandlerError};
use crate::storage::Storage;

#[derive(Debug, Deserialize)]
struct GasMessage {
    sensor_type: Option<String>,
    value: Option<f64>,
    detected: Option<bool>,
    timestamp: Option<String>,
}

impl GasMessage {
    fn is_gas(&self) -> bool {
        self.sensor_type
            .as_deref()
            .and_then(|s| s.parse::<SensorType>().ok())
            == Some(SensorType::Gas)
    }
}

/// Opens a gas alert on `detected: true` and closes the latest open one on
/// `detected: false`.
///
/// A second detection while an alert is open opens another alert; clearing
/// then closes only the most recent. Alert times always come from the
/// device, so a gas message without a parseable `timestamp` is rejected.
pub struct GasAlertHandler {
    storage: Arc<dyn Storage>,
    devices: DeviceIds,
}

impl GasAlertHandler {
    pub fn new(storage: Arc<dyn Storage>, devices: DeviceIds) -> Self {
        Self { storage, devices }
    }

    pub async fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), HandlerError> {
        let msg: GasMessage = serde_json::from_slice(payload)?;
        // Everything else on the data topic belongs to the sensor handler
        if !msg.is_gas() {
            return Ok(());
        }

        let detected = msg
            .detected
            .ok_or_else(|| HandlerError::Payload("gas message without detected".to_string()))?;
        let timestamp = match msg.timestamp.as_deref() {
            Some(raw) => parse_timestamp(raw)?,
            None => {
                return Err(HandlerError::Payload(
                    "gas message without timestamp".to_string(),
                ));
            }
        };
        let device_id = self.devices.resolve(topic)?;

        if detected {
            let sensor_value = msg.value.unwrap_or(0.0) as i64;
            let alert = GasAlert::open(device_id, sensor_value, timestamp);
            self.storage.insert_gas_alert(&alert).await?;
            warn!("Gas detected on {}, opened alert {}", topic, alert.id);
            return Ok(());
        }

        match self.storage.latest_open_gas_alert(device_id).await? {
            Some(mut alert) => {
                alert.close(timestamp);
                self.storage.update_gas_alert(&alert).await?;
                info!(
                    "Gas cleared on {}, closed alert {} after {:?}",
                    topic,
                    alert.id,
                    alert.duration()
                );
            }
            None => warn!("Gas cleared on {} but no open alert found", topic),
        }

        Ok(())
    }
}
