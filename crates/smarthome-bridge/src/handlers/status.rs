use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use smarthome_types::{DeviceStatus, OutputState};

use super::{HandlerError, message_time};
use crate::status_board::DeviceStatusBoard;
use crate::topic::{device_segment, status_output};

#[derive(Debug, Deserialize)]
struct StatusMessage {
    state: String,
    timestamp: Option<String>,
}

/// Records door, window, fan and LED states on the status board.
pub struct StatusUpdateHandler {
    board: Arc<DeviceStatusBoard>,
}

impl StatusUpdateHandler {
    pub fn new(board: Arc<DeviceStatusBoard>) -> Self {
        Self { board }
    }

    pub async fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), HandlerError> {
        let (Some(device), Some(output)) = (device_segment(topic), status_output(topic)) else {
            return Err(HandlerError::Payload(format!(
                "unexpected status topic {}",
                topic
            )));
        };

        let msg: StatusMessage = serde_json::from_slice(payload)?;
        let state: OutputState = msg.state.parse()?;

        let status = DeviceStatus {
            device: device.to_string(),
            output: output.to_string(),
            state,
            updated_at: message_time(msg.timestamp.as_deref())?,
        };
        debug!("{} {} is {}", device, output, state);
        self.board.record(status).await;

        Ok(())
    }
}
