//! Database schema and migrations.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if version < SCHEMA_VERSION {
        migrate(conn, version)?;
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
///
/// Timestamps are unix seconds, identifiers are hyphenated UUID strings.
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Periodic temperature/humidity values and motion events
        CREATE TABLE IF NOT EXISTS sensor_logs (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            sensor_type TEXT NOT NULL,
            value REAL NOT NULL,
            timestamp INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sensor_logs_type_time
            ON sensor_logs(sensor_type, timestamp);

        -- Gas alerts; alert_end is NULL while the alert is open
        CREATE TABLE IF NOT EXISTS gas_alerts (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            sensor_value INTEGER NOT NULL,
            alert_start INTEGER NOT NULL,
            alert_end INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_gas_alerts_device_start
            ON gas_alerts(device_id, alert_start);

        -- Reference data for RFID validation
        CREATE TABLE IF NOT EXISTS authorised_cards (
            id TEXT PRIMARY KEY,
            card_id TEXT NOT NULL UNIQUE,
            user_id TEXT,
            username TEXT,
            is_active INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- One row per validation request
        CREATE TABLE IF NOT EXISTS rfid_scans (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            card_id TEXT NOT NULL,
            authorised_card_id TEXT REFERENCES authorised_cards(id),
            access_result TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_rfid_scans_time
            ON rfid_scans(timestamp);
        "#,
    )?;

    Ok(())
}

/// Run migrations from old_version to current.
fn migrate(conn: &Connection, old_version: i32) -> Result<()> {
    // if old_version < 2 { migrate_to_v2(conn)?; }
    let _ = old_version;
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"sensor_logs".to_string()));
        assert!(tables.contains(&"gas_alerts".to_string()));
        assert!(tables.contains(&"authorised_cards".to_string()));
        assert!(tables.contains(&"rfid_scans".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
    }

    #[test]
    fn test_schema_version_tracking() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 0);

        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
