use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};

use smarthome_types::{AccessResult, RfidScan, format_timestamp};

use super::{DeviceIds, HandlerError};
use crate::cards::CardLookupService;
use crate::publisher::Publisher;
use crate::storage::Storage;
use crate::topic::device_segment;

/// Topic suffix the device listens on for validation results.
pub const RESPONSE_SUFFIX: &str = "rfid/response";

#[derive(Debug, Deserialize)]
struct CheckRequest {
    card_id: Option<String>,
}

/// Payload published to `devices/{id}/rfid/response`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfidResponse {
    pub access: AccessResult,
    pub card_id: String,
    pub timestamp: String,
}

/// Validates presented cards and answers the device.
///
/// The response is published before the scan is logged, so a storage
/// failure never withholds an answer from the door.
pub struct RfidValidationHandler {
    cards: CardLookupService,
    publisher: Arc<Publisher>,
    storage: Arc<dyn Storage>,
    devices: DeviceIds,
}

impl RfidValidationHandler {
    pub fn new(
        cards: CardLookupService,
        publisher: Arc<Publisher>,
        storage: Arc<dyn Storage>,
        devices: DeviceIds,
    ) -> Self {
        Self {
            cards,
            publisher,
            storage,
            devices,
        }
    }

    pub async fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), HandlerError> {
        let device = device_segment(topic)
            .ok_or_else(|| HandlerError::Payload(format!("no device in topic {}", topic)))?;

        let request: CheckRequest = serde_json::from_slice(payload)?;
        let card_id = match request.card_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err(HandlerError::Payload("missing card_id".to_string())),
        };

        let granted = self.cards.is_valid(&card_id).await?;
        let access = AccessResult::from_valid(granted);
        let now = OffsetDateTime::now_utc();

        let response = RfidResponse {
            access,
            card_id: card_id.clone(),
            timestamp: format_timestamp(now),
        };
        let response_topic = format!("devices/{}/{}", device, RESPONSE_SUFFIX);
        if let Err(e) = self.publisher.publish_json(&response_topic, &response).await {
            warn!("Failed to publish RFID response to {}: {}", response_topic, e);
        }

        info!("Card {} {} on {}", card_id, access, device);

        let device_id = self.devices.resolve(topic)?;
        let authorised_card_id = if granted {
            self.cards.find_by_card_id(&card_id).await?.map(|c| c.id)
        } else {
            None
        };
        let scan = RfidScan::record(device_id, &card_id, access, authorised_card_id, now);
        self.storage.insert_rfid_scan(&scan).await?;

        Ok(())
    }
}
