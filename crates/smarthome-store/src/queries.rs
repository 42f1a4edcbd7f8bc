//! Query builders for sensor logs, gas alerts and RFID scans.
//!
//! All builders follow the same fluent pattern: every filter is optional,
//! results default to newest first.
//!
//! # Example
//!
//! ```
//! use smarthome_store::{Store, SensorLogQuery, RfidScanQuery};
//! use smarthome_types::{AccessResult, SensorType};
//! use time::{OffsetDateTime, Duration};
//!
//! let store = Store::open_in_memory()?;
//! let hour_ago = OffsetDateTime::now_utc() - Duration::hours(1);
//!
//! let motion = SensorLogQuery::new()
//!     .sensor_type(SensorType::Motion)
//!     .since(hour_ago);
//! let logs = store.query_sensor_logs(&motion)?;
//!
//! let failed = RfidScanQuery::new().access_result(AccessResult::Denied).limit(20);
//! let scans = store.query_rfid_scans(&failed)?;
//! # Ok::<(), smarthome_store::Error>(())
//! ```

use time::OffsetDateTime;
use uuid::Uuid;

use smarthome_types::{AccessResult, SensorType};

type SqlParams = Vec<Box<dyn rusqlite::ToSql>>;

fn join_where(conditions: &[&str]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

fn push_paging(sql: &mut String, limit: Option<u32>, offset: Option<u32>) {
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = offset {
        // SQLite only accepts OFFSET after a LIMIT.
        if limit.is_none() {
            sql.push_str(" LIMIT -1");
        }
        sql.push_str(&format!(" OFFSET {}", offset));
    }
}

/// Fluent query builder for sensor logs.
///
/// Ordered by `timestamp` descending unless [`oldest_first`](Self::oldest_first)
/// is set.
#[derive(Debug, Default, Clone)]
pub struct SensorLogQuery {
    /// Filter by sensor type.
    pub sensor_type: Option<SensorType>,
    /// Filter by device ID.
    pub device_id: Option<Uuid>,
    /// Include only logs at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Include only logs at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by timestamp descending (newest first).
    pub newest_first: bool,
}

impl SensorLogQuery {
    /// Create a new query: no filters, no limit, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter by sensor type.
    pub fn sensor_type(mut self, sensor_type: SensorType) -> Self {
        self.sensor_type = Some(sensor_type);
        self
    }

    /// Filter by device ID.
    pub fn device(mut self, device_id: Uuid) -> Self {
        self.device_id = Some(device_id);
        self
    }

    /// Filter to logs at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to logs at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results oldest first.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, SqlParams) {
        let mut conditions = Vec::new();
        let mut params: SqlParams = Vec::new();

        if let Some(sensor_type) = self.sensor_type {
            conditions.push("sensor_type = ?");
            params.push(Box::new(sensor_type.as_str()));
        }

        if let Some(device_id) = self.device_id {
            conditions.push("device_id = ?");
            params.push(Box::new(device_id.to_string()));
        }

        if let Some(since) = self.since {
            conditions.push("timestamp >= ?");
            params.push(Box::new(since.unix_timestamp()));
        }

        if let Some(until) = self.until {
            conditions.push("timestamp <= ?");
            params.push(Box::new(until.unix_timestamp()));
        }

        (join_where(&conditions), params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, device_id, sensor_type, value, timestamp \
             FROM sensor_logs {} ORDER BY timestamp {}, rowid {}",
            where_clause, order, order
        );
        push_paging(&mut sql, self.limit, self.offset);
        sql
    }
}

/// Fluent query builder for gas alerts.
///
/// Ordered by `alert_start` descending.
#[derive(Debug, Default, Clone)]
pub struct GasAlertQuery {
    /// Filter by device ID.
    pub device_id: Option<Uuid>,
    /// Include only alerts started at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Only alerts that have not been closed.
    pub open_only: bool,
    /// Maximum number of results.
    pub limit: Option<u32>,
}

impl GasAlertQuery {
    /// Create a new query: all alerts, newest first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by device ID.
    pub fn device(mut self, device_id: Uuid) -> Self {
        self.device_id = Some(device_id);
        self
    }

    /// Filter to alerts started at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Only return alerts whose `alert_end` is still null.
    pub fn open_only(mut self) -> Self {
        self.open_only = true;
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn build_where(&self) -> (String, SqlParams) {
        let mut conditions = Vec::new();
        let mut params: SqlParams = Vec::new();

        if let Some(device_id) = self.device_id {
            conditions.push("device_id = ?");
            params.push(Box::new(device_id.to_string()));
        }

        if let Some(since) = self.since {
            conditions.push("alert_start >= ?");
            params.push(Box::new(since.unix_timestamp()));
        }

        if self.open_only {
            conditions.push("alert_end IS NULL");
        }

        (join_where(&conditions), params)
    }

    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();

        // rowid breaks ties between alerts opened within the same second
        let mut sql = format!(
            "SELECT id, device_id, sensor_value, alert_start, alert_end \
             FROM gas_alerts {} ORDER BY alert_start DESC, rowid DESC",
            where_clause
        );
        push_paging(&mut sql, self.limit, None);
        sql
    }
}

/// Fluent query builder for RFID scans.
///
/// Ordered by `timestamp` descending. Results carry the card holder's
/// username when the scan references an authorised card.
#[derive(Debug, Default, Clone)]
pub struct RfidScanQuery {
    /// Filter by access result.
    pub access_result: Option<AccessResult>,
    /// Include only scans at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
}

impl RfidScanQuery {
    /// Create a new query: all scans, newest first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by access result.
    pub fn access_result(mut self, result: AccessResult) -> Self {
        self.access_result = Some(result);
        self
    }

    /// Filter to scans at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn build_where(&self) -> (String, SqlParams) {
        let mut conditions = Vec::new();
        let mut params: SqlParams = Vec::new();

        if let Some(result) = self.access_result {
            conditions.push("s.access_result = ?");
            params.push(Box::new(result.as_str()));
        }

        if let Some(since) = self.since {
            conditions.push("s.timestamp >= ?");
            params.push(Box::new(since.unix_timestamp()));
        }

        (join_where(&conditions), params)
    }

    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();

        let mut sql = format!(
            "SELECT s.id, s.device_id, s.card_id, s.authorised_card_id, s.access_result, \
             s.timestamp, c.username \
             FROM rfid_scans s LEFT JOIN authorised_cards c ON c.id = s.authorised_card_id \
             {} ORDER BY s.timestamp DESC, s.rowid DESC",
            where_clause
        );
        push_paging(&mut sql, self.limit, None);
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    // ==================== SensorLogQuery Tests ====================

    #[test]
    fn test_sensor_log_query_new_defaults() {
        let query = SensorLogQuery::new();
        assert!(query.sensor_type.is_none());
        assert!(query.device_id.is_none());
        assert!(query.since.is_none());
        assert!(query.until.is_none());
        assert!(query.limit.is_none());
        assert!(query.newest_first);
    }

    #[test]
    fn test_sensor_log_query_build_where_empty() {
        let (clause, params) = SensorLogQuery::new().build_where();
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_sensor_log_query_build_where_all_filters() {
        let query = SensorLogQuery::new()
            .sensor_type(SensorType::Motion)
            .device(Uuid::nil())
            .since(datetime!(2025-01-01 00:00:00 UTC))
            .until(datetime!(2025-01-02 00:00:00 UTC));

        let (clause, params) = query.build_where();
        assert_eq!(
            clause,
            "WHERE sensor_type = ? AND device_id = ? AND timestamp >= ? AND timestamp <= ?"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_sensor_log_query_build_sql_order_and_limit() {
        let sql = SensorLogQuery::new().limit(10).build_sql();
        assert!(sql.contains("ORDER BY timestamp DESC"));
        assert!(sql.ends_with("LIMIT 10"));

        let sql = SensorLogQuery::new().oldest_first().build_sql();
        assert!(sql.contains("ORDER BY timestamp ASC"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn test_offset_without_limit_is_valid_sqlite() {
        let sql = SensorLogQuery::new().offset(5).build_sql();
        assert!(sql.ends_with("LIMIT -1 OFFSET 5"));
    }

    // ==================== GasAlertQuery Tests ====================

    #[test]
    fn test_gas_alert_query_open_only() {
        let query = GasAlertQuery::new().device(Uuid::nil()).open_only().limit(1);
        let (clause, params) = query.build_where();
        assert_eq!(clause, "WHERE device_id = ? AND alert_end IS NULL");
        assert_eq!(params.len(), 1);

        let sql = query.build_sql();
        assert!(sql.contains("ORDER BY alert_start DESC, rowid DESC"));
        assert!(sql.ends_with("LIMIT 1"));
    }

    // ==================== RfidScanQuery Tests ====================

    #[test]
    fn test_rfid_scan_query_filter() {
        let query = RfidScanQuery::new().access_result(AccessResult::Granted);
        let (clause, params) = query.build_where();
        assert_eq!(clause, "WHERE s.access_result = ?");
        assert_eq!(params.len(), 1);
        assert!(query.build_sql().contains("LEFT JOIN authorised_cards"));
    }
}
