//! Main store implementation.

use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use smarthome_types::{AuthorisedCard, GasAlert, RfidScan, SensorLog, SensorType};

use crate::error::{Error, Result};
use crate::models::StoredRfidScan;
use crate::queries::{GasAlertQuery, RfidScanQuery, SensorLogQuery};
use crate::schema;

/// SQLite-based store for bridge data.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

// Column conversions. Malformed rows surface as conversion errors rather
// than panics.

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(s) => Uuid::parse_str(&s).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        }),
        None => Ok(None),
    }
}

fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let secs: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn opt_time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<OffsetDateTime>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(secs) => OffsetDateTime::from_unix_timestamp(secs).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e))
        }),
        None => Ok(None),
    }
}

fn parsed_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = smarthome_types::ParseError>,
{
    let s: String = row.get(idx)?;
    s.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_sensor_log(row: &Row<'_>) -> rusqlite::Result<SensorLog> {
    Ok(SensorLog {
        id: uuid_col(row, 0)?,
        device_id: uuid_col(row, 1)?,
        sensor_type: parsed_col(row, 2)?,
        value: row.get(3)?,
        timestamp: time_col(row, 4)?,
    })
}

fn map_gas_alert(row: &Row<'_>) -> rusqlite::Result<GasAlert> {
    Ok(GasAlert {
        id: uuid_col(row, 0)?,
        device_id: uuid_col(row, 1)?,
        sensor_value: row.get(2)?,
        alert_start: time_col(row, 3)?,
        alert_end: opt_time_col(row, 4)?,
    })
}

fn map_card(row: &Row<'_>) -> rusqlite::Result<AuthorisedCard> {
    Ok(AuthorisedCard {
        id: uuid_col(row, 0)?,
        card_id: row.get(1)?,
        user_id: opt_uuid_col(row, 2)?,
        username: row.get(3)?,
        is_active: row.get(4)?,
        created_at: time_col(row, 5)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

// Sensor log operations
impl Store {
    /// Insert a sensor log row.
    pub fn insert_sensor_log(&self, log: &SensorLog) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sensor_logs (id, device_id, sensor_type, value, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                log.id.to_string(),
                log.device_id.to_string(),
                log.sensor_type.as_str(),
                log.value,
                log.timestamp.unix_timestamp(),
            ],
        )?;

        debug!(
            "Inserted {} log {} for device {}",
            log.sensor_type, log.id, log.device_id
        );
        Ok(())
    }

    /// Query sensor logs with filters.
    pub fn query_sensor_logs(&self, query: &SensorLogQuery) -> Result<Vec<SensorLog>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params_ref.as_slice(), map_sensor_log)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(logs)
    }

    /// Count sensor logs, optionally of one type.
    pub fn count_sensor_logs(&self, sensor_type: Option<SensorType>) -> Result<u64> {
        let count: i64 = match sensor_type {
            Some(ty) => self.conn.query_row(
                "SELECT COUNT(*) FROM sensor_logs WHERE sensor_type = ?",
                [ty.as_str()],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM sensor_logs", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }
}

// Gas alert operations
impl Store {
    /// Insert a new gas alert.
    pub fn insert_gas_alert(&self, alert: &GasAlert) -> Result<()> {
        self.conn.execute(
            "INSERT INTO gas_alerts (id, device_id, sensor_value, alert_start, alert_end)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                alert.id.to_string(),
                alert.device_id.to_string(),
                alert.sensor_value,
                alert.alert_start.unix_timestamp(),
                alert.alert_end.map(|t| t.unix_timestamp()),
            ],
        )?;
        Ok(())
    }

    /// The most recently started alert for a device that has not been closed.
    pub fn latest_open_gas_alert(&self, device_id: Uuid) -> Result<Option<GasAlert>> {
        let query = GasAlertQuery::new().device(device_id).open_only().limit(1);
        let mut alerts = self.query_gas_alerts(&query)?;
        Ok(alerts.pop())
    }

    /// Persist changes to an existing alert.
    ///
    /// Returns [`Error::GasAlertNotFound`] if no row has this alert's id.
    pub fn update_gas_alert(&self, alert: &GasAlert) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE gas_alerts SET sensor_value = ?2, alert_start = ?3, alert_end = ?4
             WHERE id = ?1",
            rusqlite::params![
                alert.id.to_string(),
                alert.sensor_value,
                alert.alert_start.unix_timestamp(),
                alert.alert_end.map(|t| t.unix_timestamp()),
            ],
        )?;

        if changed == 0 {
            return Err(Error::GasAlertNotFound(alert.id));
        }
        Ok(())
    }

    /// Query gas alerts with filters.
    pub fn query_gas_alerts(&self, query: &GasAlertQuery) -> Result<Vec<GasAlert>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let alerts = stmt
            .query_map(params_ref.as_slice(), map_gas_alert)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(alerts)
    }

    /// Count alerts that are still open across all devices.
    pub fn count_open_gas_alerts(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM gas_alerts WHERE alert_end IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

// RFID operations
impl Store {
    /// Insert an RFID scan.
    pub fn insert_rfid_scan(&self, scan: &RfidScan) -> Result<()> {
        self.conn.execute(
            "INSERT INTO rfid_scans (id, device_id, card_id, authorised_card_id, access_result, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                scan.id.to_string(),
                scan.device_id.to_string(),
                scan.card_id,
                scan.authorised_card_id.map(|id| id.to_string()),
                scan.access_result.as_str(),
                scan.timestamp.unix_timestamp(),
            ],
        )?;
        Ok(())
    }

    /// Query RFID scans joined with the card holder's username.
    pub fn query_rfid_scans(&self, query: &RfidScanQuery) -> Result<Vec<StoredRfidScan>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let scans = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(StoredRfidScan {
                    scan: RfidScan {
                        id: uuid_col(row, 0)?,
                        device_id: uuid_col(row, 1)?,
                        card_id: row.get(2)?,
                        authorised_card_id: opt_uuid_col(row, 3)?,
                        access_result: parsed_col(row, 4)?,
                        timestamp: time_col(row, 5)?,
                    },
                    username: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(scans)
    }

    /// Count all logged RFID scans.
    pub fn count_rfid_scans(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM rfid_scans", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

// Authorised card operations
impl Store {
    /// Register a card. Fails with [`Error::DuplicateCard`] if the card id is taken.
    pub fn insert_authorised_card(&self, card: &AuthorisedCard) -> Result<()> {
        let result = self.conn.execute(
            "INSERT INTO authorised_cards (id, card_id, user_id, username, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                card.id.to_string(),
                card.card_id,
                card.user_id.map(|id| id.to_string()),
                card.username,
                card.is_active,
                card.created_at.unix_timestamp(),
            ],
        );

        match result {
            Ok(_) => {
                info!("Registered card {}", card.card_id);
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => Err(Error::DuplicateCard(card.card_id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a card by the raw identifier read from the reader.
    pub fn find_card_by_card_id(&self, card_id: &str) -> Result<Option<AuthorisedCard>> {
        let card = self
            .conn
            .query_row(
                "SELECT id, card_id, user_id, username, is_active, created_at
                 FROM authorised_cards WHERE card_id = ?",
                [card_id],
                map_card,
            )
            .optional()?;

        Ok(card)
    }

    /// List all registered cards, newest first.
    pub fn list_authorised_cards(&self) -> Result<Vec<AuthorisedCard>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, card_id, user_id, username, is_active, created_at
             FROM authorised_cards ORDER BY created_at DESC, rowid DESC",
        )?;

        let cards = stmt
            .query_map([], map_card)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(cards)
    }
}
