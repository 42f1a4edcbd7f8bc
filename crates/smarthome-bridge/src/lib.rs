//! MQTT telemetry bridge and HTTP REST API for ESP32 smart-home devices.
//!
//! This crate provides a service that:
//! - Subscribes to device topics on an MQTT broker
//! - Routes each message to every handler whose topic pattern matches
//! - Buffers temperature and humidity and flushes them on an interval
//! - Logs motion events, gas alert lifecycles and RFID scans immediately
//! - Answers RFID checks on `devices/{id}/rfid/response`
//! - Exposes a read-only REST API over the stored data
//!
//! # Topics
//!
//! - `devices/{id}/data` - sensor readings (temperature, humidity, motion, gas)
//! - `devices/{id}/rfid/check` - card validation requests
//! - `devices/{id}/status/{output}` - door, window, fan and LED states
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/status` - Broker, cache and device status
//! - `GET /api/sensors/motion?hours=1` - Recent motion events
//! - `GET /api/sensors/gas?hours=24` - Recent gas alerts
//! - `GET /api/sensor-logs?sensor_type=&limit=` - Sensor log rows
//! - `GET /api/rfid-scans?filter=all|success|failed` - RFID scans
//! - `GET /api/cards` - Authorised cards
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/smarthome/bridge.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [broker]
//! url = "mqtts://broker.example.com:8883"
//! username = "bridge"
//! password = "secret"
//! subscriptions = ["devices/+/data", "devices/+/rfid/check", "devices/+/status/#"]
//!
//! [bridge]
//! device_uuid = "6f1c2a58-3d4e-4b7a-9c10-2e5f8a9b0c1d"
//! flush_interval = 1800
//! ```

pub mod api;
pub mod bridge;
pub mod broker;
pub mod cache;
pub mod cards;
pub mod config;
pub mod flusher;
pub mod handlers;
pub mod publisher;
pub mod router;
pub mod state;
pub mod status_board;
pub mod storage;
pub mod topic;

pub use bridge::{Bridge, build_router};
pub use broker::{BrokerConnection, BrokerEvent, ConnectError};
pub use cache::LatestReadingCache;
pub use cards::CardLookupService;
pub use config::{BridgeConfig, BrokerConfig, Config, ConfigError, ServerConfig, StorageConfig};
pub use flusher::{FlushReport, PeriodicFlusher};
pub use handlers::{Handler, HandlerError};
pub use publisher::{PublishError, Publisher, PublisherStats, Transport};
pub use router::{DispatchOutcome, MessageRouter};
pub use state::AppState;
pub use status_board::DeviceStatusBoard;
pub use storage::Storage;
