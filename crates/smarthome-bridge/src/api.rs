//! Read-only REST endpoints over the bridge state and the store.
//!
//! # Lock Acquisition
//!
//! - **`state.store`** (Mutex): held only for the duration of one query.
//! - **`state.config`** (RwLock): read lock for `/api/status`.
//!
//! ## Error Handling
//!
//! Endpoints return structured JSON errors via [`AppError`]. Invalid query
//! parameters return 400, store errors return 500.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use smarthome_store::{GasAlertQuery, RfidScanQuery, SensorLogQuery, StoredRfidScan};
use smarthome_types::{
    AccessResult, AuthorisedCard, DeviceStatus, GasAlert, SensorLog, SensorReading, SensorType,
};

use crate::publisher::PublisherStats;
use crate::state::AppState;

/// Longest look-back window accepted by the windowed endpoints.
const MAX_HOURS: i64 = 24 * 365;
/// Row cap when a list endpoint is called without `limit`.
const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 10_000;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        .route("/api/sensors/motion", get(get_motion))
        .route("/api/sensors/gas", get(get_gas_alerts))
        .route("/api/sensor-logs", get(get_sensor_logs))
        .route("/api/rfid-scans", get(get_rfid_scans))
        .route("/api/cards", get(get_cards))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Bridge status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub bridge: BridgeStatus,
    pub broker: PublisherStats,
    /// Readings waiting for the next flush.
    pub cached_readings: Vec<SensorReading>,
    pub devices: Vec<DeviceStatus>,
}

#[derive(Debug, Serialize)]
pub struct BridgeStatus {
    pub running: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    pub uptime_seconds: Option<u64>,
    pub flush_interval_seconds: u64,
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let flush_interval_seconds = state.config.read().await.bridge.flush_interval;
    let started_at = state.bridge.started_at();
    let uptime_seconds = started_at.map(|s| {
        let now = OffsetDateTime::now_utc();
        (now - s).whole_seconds().max(0) as u64
    });

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        bridge: BridgeStatus {
            running: state.bridge.is_running(),
            started_at,
            uptime_seconds,
            flush_interval_seconds,
        },
        broker: state.publisher.stats(),
        cached_readings: state.cache.snapshot().await,
        devices: state.statuses.snapshot().await,
    })
}

/// Look-back window in hours.
#[derive(Debug, Deserialize, Default)]
pub struct WindowQuery {
    pub hours: Option<i64>,
}

impl WindowQuery {
    /// Start of the window, `default_hours` back when unset.
    fn since(&self, default_hours: i64) -> Result<OffsetDateTime, AppError> {
        let hours = self.hours.unwrap_or(default_hours);
        if !(1..=MAX_HOURS).contains(&hours) {
            return Err(AppError::BadRequest(format!(
                "hours must be between 1 and {}, got {}",
                MAX_HOURS, hours
            )));
        }
        Ok(OffsetDateTime::now_utc() - Duration::hours(hours))
    }
}

async fn get_motion(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WindowQuery>,
) -> Result<Json<Vec<SensorLog>>, AppError> {
    let query = SensorLogQuery::new()
        .sensor_type(SensorType::Motion)
        .since(params.since(1)?);

    let store = state.store.lock().await;
    Ok(Json(store.query_sensor_logs(&query)?))
}

async fn get_gas_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WindowQuery>,
) -> Result<Json<Vec<GasAlert>>, AppError> {
    let query = GasAlertQuery::new().since(params.since(24)?);

    let store = state.store.lock().await;
    Ok(Json(store.query_gas_alerts(&query)?))
}

#[derive(Debug, Deserialize, Default)]
pub struct SensorLogsQuery {
    pub sensor_type: Option<String>,
    pub limit: Option<u32>,
}

fn checked_limit(limit: Option<u32>) -> Result<u32, AppError> {
    match limit.unwrap_or(DEFAULT_LIMIT) {
        0 => Err(AppError::BadRequest("limit must be positive".to_string())),
        l if l > MAX_LIMIT => Err(AppError::BadRequest(format!(
            "limit must be at most {}",
            MAX_LIMIT
        ))),
        l => Ok(l),
    }
}

async fn get_sensor_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SensorLogsQuery>,
) -> Result<Json<Vec<SensorLog>>, AppError> {
    let mut query = SensorLogQuery::new().limit(checked_limit(params.limit)?);
    if let Some(name) = params.sensor_type.as_deref().filter(|s| !s.is_empty()) {
        let sensor_type: SensorType = name
            .parse()
            .map_err(|e: smarthome_types::ParseError| AppError::BadRequest(e.to_string()))?;
        query = query.sensor_type(sensor_type);
    }

    let store = state.store.lock().await;
    Ok(Json(store.query_sensor_logs(&query)?))
}

/// Scan filter by outcome.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanFilter {
    #[default]
    All,
    Success,
    Failed,
}

impl ScanFilter {
    fn access_result(self) -> Option<AccessResult> {
        match self {
            ScanFilter::All => None,
            ScanFilter::Success => Some(AccessResult::Granted),
            ScanFilter::Failed => Some(AccessResult::Denied),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RfidScansQuery {
    #[serde(default)]
    pub filter: ScanFilter,
    pub limit: Option<u32>,
}

async fn get_rfid_scans(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RfidScansQuery>,
) -> Result<Json<Vec<StoredRfidScan>>, AppError> {
    let mut query = RfidScanQuery::new().limit(checked_limit(params.limit)?);
    if let Some(result) = params.filter.access_result() {
        query = query.access_result(result);
    }

    let store = state.store.lock().await;
    Ok(Json(store.query_rfid_scans(&query)?))
}

async fn get_cards(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AuthorisedCard>>, AppError> {
    let store = state.store.lock().await;
    Ok(Json(store.list_authorised_cards()?))
}

/// API error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Store(smarthome_store::Error),
}

impl From<smarthome_store::Error> for AppError {
    fn from(e: smarthome_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Store(e) => {
                tracing::error!("Store error while serving request: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    use smarthome_store::Store;
    use smarthome_types::RfidScan;

    use crate::config::Config;

    const DEVICE: &str = "6f1c2a58-3d4e-4b7a-9c10-2e5f8a9b0c1d";

    fn create_test_state() -> Arc<AppState> {
        let store = Store::open_in_memory().unwrap();
        AppState::new(store, Config::default())
    }

    async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router()
            .with_state(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, json) = get_json(create_test_state(), "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let state = create_test_state();
        state
            .cache
            .update(SensorReading {
                sensor_type: SensorType::Temperature,
                value: 21.0,
                detected: None,
                unit: None,
                timestamp: OffsetDateTime::now_utc(),
            })
            .await;

        let (status, json) = get_json(state, "/api/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["bridge"]["running"], false);
        assert_eq!(json["bridge"]["flush_interval_seconds"], 1800);
        assert_eq!(json["broker"]["connected"], false);
        assert_eq!(json["cached_readings"][0]["sensor_type"], "temperature");
        assert!(json["devices"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_motion_window() {
        let state = create_test_state();
        let device = Uuid::parse_str(DEVICE).unwrap();
        {
            let store = state.store.lock().await;
            let now = OffsetDateTime::now_utc();
            store
                .insert_sensor_log(&SensorLog::motion_event(device, now))
                .unwrap();
            store
                .insert_sensor_log(&SensorLog::motion_event(device, now - Duration::hours(3)))
                .unwrap();
        }

        let (status, json) = get_json(state.clone(), "/api/sensors/motion").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 1);

        let (_, json) = get_json(state, "/api/sensors/motion?hours=4").await;
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_gas_alerts_endpoint() {
        let state = create_test_state();
        let device = Uuid::parse_str(DEVICE).unwrap();
        state
            .store
            .lock()
            .await
            .insert_gas_alert(&GasAlert::open(device, 1, OffsetDateTime::now_utc()))
            .unwrap();

        let (status, json) = get_json(state, "/api/sensors/gas").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert!(json[0]["alert_end"].is_null());
    }

    #[tokio::test]
    async fn test_invalid_hours_is_bad_request() {
        for uri in ["/api/sensors/motion?hours=0", "/api/sensors/gas?hours=-5"] {
            let (status, json) = get_json(create_test_state(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(json["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_sensor_logs_filter_and_validation() {
        let state = create_test_state();
        let device = Uuid::parse_str(DEVICE).unwrap();
        {
            let store = state.store.lock().await;
            let now = OffsetDateTime::now_utc();
            for (sensor_type, value) in [(SensorType::Temperature, 20.0), (SensorType::Humidity, 40.0)] {
                let reading = SensorReading {
                    sensor_type,
                    value,
                    detected: None,
                    unit: None,
                    timestamp: now,
                };
                store
                    .insert_sensor_log(&SensorLog::from_reading(device, &reading))
                    .unwrap();
            }
        }

        let (status, json) = get_json(state.clone(), "/api/sensor-logs?sensor_type=humidity").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["value"], 40.0);

        let (status, _) = get_json(state.clone(), "/api/sensor-logs?sensor_type=pressure").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(state, "/api/sensor-logs?limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rfid_scans_filter() {
        let state = create_test_state();
        let device = Uuid::parse_str(DEVICE).unwrap();
        {
            let store = state.store.lock().await;
            let mut card = AuthorisedCard::new("A1B2C3D4");
            card.username = Some("alice".to_string());
            store.insert_authorised_card(&card).unwrap();

            let now = OffsetDateTime::now_utc();
            store
                .insert_rfid_scan(&RfidScan::record(
                    device,
                    "A1B2C3D4",
                    AccessResult::Granted,
                    Some(card.id),
                    now,
                ))
                .unwrap();
            store
                .insert_rfid_scan(&RfidScan::record(
                    device,
                    "DEADBEEF",
                    AccessResult::Denied,
                    None,
                    now,
                ))
                .unwrap();
        }

        let (_, all) = get_json(state.clone(), "/api/rfid-scans").await;
        assert_eq!(all.as_array().unwrap().len(), 2);

        let (_, granted) = get_json(state.clone(), "/api/rfid-scans?filter=success").await;
        assert_eq!(granted.as_array().unwrap().len(), 1);
        assert_eq!(granted[0]["username"], "alice");

        let (_, denied) = get_json(state.clone(), "/api/rfid-scans?filter=failed").await;
        assert_eq!(denied[0]["card_id"], "DEADBEEF");
        assert!(denied[0]["username"].is_null());

        let (status, _) = get_json(state, "/api/rfid-scans?filter=maybe").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cards_endpoint() {
        let state = create_test_state();
        state
            .store
            .lock()
            .await
            .insert_authorised_card(&AuthorisedCard::new("CAFEBABE"))
            .unwrap();

        let (status, json) = get_json(state, "/api/cards").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["card_id"], "CAFEBABE");
        assert_eq!(json[0]["is_active"], true);
    }

    #[test]
    fn test_app_error_status_codes() {
        let bad = AppError::BadRequest("nope".to_string()).into_response();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let store = AppError::from(smarthome_store::Error::DuplicateCard("x".to_string()))
            .into_response();
        assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
