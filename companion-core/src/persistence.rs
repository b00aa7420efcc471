//! SQLite persistence for the conversation log and emotion snapshots.
//!
//! One database file holds both tables:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS exchanges (
//!     seq        INTEGER PRIMARY KEY AUTOINCREMENT,
//!     id         TEXT NOT NULL UNIQUE,
//!     speaker    TEXT NOT NULL,
//!     text       TEXT NOT NULL,
//!     emotion    TEXT NOT NULL,
//!     domain     TEXT NOT NULL,
//!     topic      TEXT NOT NULL,
//!     created_at TEXT NOT NULL,
//!     explicit   INTEGER NOT NULL DEFAULT 0
//! );
//! CREATE TABLE IF NOT EXISTS emotion_snapshots (
//!     day        TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! - `seq` preserves insertion order; rows are never updated.
//! - `explicit` marks companion rows whose topic came from a rule or model
//!   match. Databases created without it gain the column on open.
//! - Snapshots are upserted by ISO date, one row per calendar day.
//! - WAL mode for concurrent readers; optional CRC-32 on snapshot JSON.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::emotion::SnapshotStore;
use crate::error::{CompanionError, Result};
use crate::log::{AppendLog, LogFilter};
use crate::types::{Emotion, EmotionState, ExchangeRecord, RecordId, Speaker, Topic};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS exchanges (
        seq        INTEGER PRIMARY KEY AUTOINCREMENT,
        id         TEXT NOT NULL UNIQUE,
        speaker    TEXT NOT NULL,
        text       TEXT NOT NULL,
        emotion    TEXT NOT NULL,
        domain     TEXT NOT NULL,
        topic      TEXT NOT NULL,
        created_at TEXT NOT NULL,
        explicit   INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_exchanges_domain ON exchanges (domain, seq);
    CREATE TABLE IF NOT EXISTS emotion_snapshots (
        day        TEXT PRIMARY KEY,
        data       BLOB NOT NULL,
        updated_at TEXT NOT NULL,
        checksum   TEXT
    );
";

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// CRC-32 (ISO 3309 / ITU-T V.42), reflected polynomial.
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

/// Fixed-width UTC timestamp, so text order equals time order.
fn timestamp_text(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// SQLite-backed [`AppendLog`] and [`SnapshotStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Raw `exchanges` row before parsing.
type ExchangeRow = (String, String, String, String, String, String, bool);

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns [`CompanionError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;
        migrate(&conn)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Companion store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns [`CompanionError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Database file path (`:memory:` for in-memory stores).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Number of stored daily snapshots.
    ///
    /// # Errors
    /// Returns [`CompanionError::Database`] on SQLite failures.
    pub fn snapshot_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM emotion_snapshots", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Run SQLite's integrity check.
    ///
    /// # Errors
    /// Returns [`CompanionError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

/// Add columns missing from databases created by older builds.
fn migrate(conn: &Connection) -> Result<()> {
    let has_explicit = conn
        .prepare("SELECT 1 FROM pragma_table_info('exchanges') WHERE name = 'explicit'")?
        .exists([])?;
    if !has_explicit {
        conn.execute_batch("ALTER TABLE exchanges ADD COLUMN explicit INTEGER NOT NULL DEFAULT 0;")?;
        info!("Added explicit column to exchanges");
    }
    Ok(())
}

fn parse_row((id, speaker, text, emotion, topic, created_at, explicit): ExchangeRow) -> Result<ExchangeRecord> {
    let bad = |what: &str, value: &str| CompanionError::Serialization(format!("invalid {what} '{value}'"));
    Ok(ExchangeRecord {
        id: id.parse().map_err(|_| bad("record id", &id))?,
        speaker: Speaker::from_tag(&speaker).ok_or_else(|| bad("speaker", &speaker))?,
        text,
        emotion: Emotion::from_tag(&emotion),
        topic: topic.parse::<Topic>().map_err(|_| bad("topic", &topic))?,
        timestamp: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|_| bad("timestamp", &created_at))?
            .with_timezone(&Utc),
        explicit,
    })
}

impl AppendLog for SqliteStore {
    fn append(&self, record: &ExchangeRecord) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO exchanges (id, speaker, text, emotion, domain, topic, created_at, explicit)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id.to_string(),
                record.speaker.tag(),
                record.text,
                record.emotion.tag(),
                record.domain().id(),
                record.topic.to_string(),
                timestamp_text(record.timestamp),
                record.explicit,
            ],
        )?;
        debug!(record = %record.id, speaker = record.speaker.tag(), "Exchange appended");
        Ok(())
    }

    fn query(&self, filter: &LogFilter) -> Result<Vec<ExchangeRecord>> {
        let start = Instant::now();
        let limit = filter
            .limit
            .map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let rows: Vec<ExchangeRow> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached(
                "SELECT id, speaker, text, emotion, topic, created_at, explicit FROM exchanges
                 WHERE (?1 IS NULL OR domain = ?1)
                   AND (?2 IS NULL OR topic = ?2)
                   AND (?3 IS NULL OR speaker = ?3)
                   AND (?4 IS NULL OR created_at >= ?4)
                 ORDER BY seq DESC
                 LIMIT ?5",
            )?;
            let mapped = stmt.query_map(
                params![
                    filter.domain.map(|d| d.id()),
                    filter.topic.map(|t| t.to_string()),
                    filter.speaker.map(Speaker::tag),
                    filter.since.map(timestamp_text),
                    limit,
                ],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )?;
            mapped.collect::<std::result::Result<_, _>>()?
        };

        let mut records = rows.into_iter().map(parse_row).collect::<Result<Vec<_>>>()?;
        records.reverse();
        debug!(
            returned = records.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Exchanges queried"
        );
        Ok(records)
    }

    fn remove(&self, id: RecordId) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM exchanges WHERE id = ?1", params![id.to_string()])?;
        if deleted > 0 {
            info!(record = %id, "Exchange removed at user request");
        }
        Ok(deleted > 0)
    }

    fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM exchanges", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl SnapshotStore for SqliteStore {
    fn load(&self, date: NaiveDate) -> Result<Option<EmotionState>> {
        let day = date.to_string();
        let result: Option<(Vec<u8>, Option<String>)> = {
            let conn = self.conn.lock();
            let mut stmt =
                conn.prepare_cached("SELECT data, checksum FROM emotion_snapshots WHERE day = ?1")?;
            stmt.query_row(params![day], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?
        };

        let Some((data, stored_checksum)) = result else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(
                        day = %day,
                        expected = %expected,
                        actual = %actual,
                        "Snapshot checksum mismatch, possible corruption"
                    );
                }
            }
        }

        let state: EmotionState =
            serde_json::from_slice(&data).map_err(|e| CompanionError::Serialization(e.to_string()))?;
        Ok(Some(state))
    }

    fn save(&self, date: NaiveDate, state: &EmotionState) -> Result<()> {
        let json = serde_json::to_vec(state).map_err(|e| CompanionError::Serialization(e.to_string()))?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));

        self.conn.lock().execute(
            "INSERT INTO emotion_snapshots (day, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(day) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![date.to_string(), json, Utc::now().to_rfc3339(), checksum],
        )?;
        debug!(day = %date, level = state.growth_level, "Emotion snapshot saved");
        Ok(())
    }
}

/// Adds `.optional()` to `rusqlite::Result`, turning `QueryReturnedNoRows`
/// into `Ok(None)`.
trait OptionalExt<T> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
