//! SQLite-based session history and distraction log.
//!
//! Provides persistent storage for:
//! - Completed focus and break sessions (append-only)
//! - Distraction log entries (append-only, annotatable, deletable)
//! - Daily statistics for the stats sink

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, Result};
use crate::focus::{DistractionKind, DistractionLog, DistractionLogEntry};
use crate::ledger::{CompletedSession, SessionKind, SessionSink};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Stats {
    pub focus_sessions: u64,
    pub focus_minutes: u64,
    pub break_sessions: u64,
    pub break_minutes: u64,
    pub distractions: u64,
    pub distracted_ms: u64,
}

/// SQLite database for session and distraction storage.
///
/// The connection sits behind a mutex so one `Database` can serve as the
/// ledger's sink and the focus guard's log at the same time.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `<dir>/focuskeeper.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open_in(dir: &Path) -> Result<Self> {
        let path = dir.join("focuskeeper.db");
        let conn = Connection::open(&path).map_err(|source| DatabaseError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open the database in the default data directory.
    pub fn open() -> Result<Self> {
        Self::open_in(&super::data_dir()?)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) -> Result<()> {
        self.conn().execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id               TEXT PRIMARY KEY,
                kind             TEXT NOT NULL,
                task_id          TEXT,
                started_at       TEXT NOT NULL,
                ended_at         TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL,
                is_pomodoro      INTEGER NOT NULL DEFAULT 0,
                is_long_break    INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS distractions (
                id           TEXT PRIMARY KEY,
                timestamp    TEXT NOT NULL,
                end_time     TEXT NOT NULL,
                duration_ms  INTEGER NOT NULL,
                kind         TEXT NOT NULL,
                app_name     TEXT NOT NULL,
                window_title TEXT,
                url          TEXT,
                annotation   TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_ended_at ON sessions(ended_at);
            CREATE INDEX IF NOT EXISTS idx_distractions_timestamp ON distractions(timestamp);",
        )?;
        Ok(())
    }

    /// Most recent sessions first.
    pub fn list_sessions(&self, limit: usize) -> Result<Vec<CompletedSession>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, kind, task_id, started_at, ended_at, duration_minutes, is_pomodoro, is_long_break
             FROM sessions
             ORDER BY ended_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], session_from_row)?;
        let sessions = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    /// Totals for sessions ending and distractions starting on `day` (UTC).
    pub fn stats_for_day(&self, day: NaiveDate) -> Result<Stats> {
        let start = ts(day_start(day));
        let end = ts(day_start(day.succ_opt().unwrap_or(day)));

        let conn = self.conn();
        let mut stats = Stats::default();
        let mut stmt = conn.prepare(
            "SELECT kind, COUNT(*), COALESCE(SUM(duration_minutes), 0)
             FROM sessions
             WHERE ended_at >= ?1 AND ended_at < ?2
             GROUP BY kind",
        )?;
        let rows = stmt.query_map(params![start, end], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, u64>(2)?,
            ))
        })?;
        for row in rows {
            let (kind, count, minutes) = row?;
            match kind.as_str() {
                "focus" => {
                    stats.focus_sessions += count;
                    stats.focus_minutes += minutes;
                }
                "break" => {
                    stats.break_sessions += count;
                    stats.break_minutes += minutes;
                }
                _ => {}
            }
        }

        let (count, ms) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(duration_ms), 0)
             FROM distractions
             WHERE timestamp >= ?1 AND timestamp < ?2",
            params![start, end],
            |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?)),
        )?;
        stats.distractions = count;
        stats.distracted_ms = ms;

        Ok(stats)
    }

    pub fn stats_today(&self) -> Result<Stats> {
        self.stats_for_day(Utc::now().date_naive())
    }

    pub fn get_distraction(&self, id: &str) -> Result<Option<DistractionLogEntry>> {
        let conn = self.conn();
        let entry = conn
            .query_row(
                "SELECT id, timestamp, end_time, duration_ms, kind, app_name, window_title, url, annotation
                 FROM distractions WHERE id = ?1",
                params![id],
                distraction_from_row,
            )
            .optional()?;
        Ok(entry)
    }
}

impl SessionSink for Database {
    fn record_session(&self, record: &CompletedSession) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sessions (id, kind, task_id, started_at, ended_at, duration_minutes, is_pomodoro, is_long_break)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.kind.as_str(),
                record.task_id,
                ts(record.started_at),
                ts(record.ended_at),
                record.duration_minutes,
                record.is_pomodoro,
                record.is_long_break,
            ],
        )?;
        Ok(())
    }
}

impl DistractionLog for Database {
    fn append(&self, entry: &DistractionLogEntry) -> Result<()> {
        self.conn().execute(
            "INSERT INTO distractions (id, timestamp, end_time, duration_ms, kind, app_name, window_title, url, annotation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id,
                ts(entry.timestamp),
                ts(entry.end_time),
                entry.duration_ms,
                entry.kind.as_str(),
                entry.app_name,
                entry.window_title,
                entry.url,
                entry.annotation,
            ],
        )?;
        Ok(())
    }

    fn annotate(&self, id: &str, annotation: Option<String>) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE distractions SET annotation = ?2 WHERE id = ?1",
            params![id, annotation],
        )?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM distractions WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<DistractionLogEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, end_time, duration_ms, kind, app_name, window_title, url, annotation
             FROM distractions
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map([], distraction_from_row)?;
        let entries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

fn not_found(id: &str) -> crate::error::CoreError {
    DatabaseError::NotFound {
        table: "distractions",
        id: id.to_string(),
    }
    .into()
}

fn day_start(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::default()))
}

/// Fixed-width UTC timestamps so text comparison matches time order.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<CompletedSession> {
    let kind: String = row.get(1)?;
    Ok(CompletedSession {
        id: row.get(0)?,
        kind: if kind == "break" {
            SessionKind::Break
        } else {
            SessionKind::Focus
        },
        task_id: row.get(2)?,
        started_at: parse_ts(row, 3)?,
        ended_at: parse_ts(row, 4)?,
        duration_minutes: row.get(5)?,
        is_pomodoro: row.get(6)?,
        is_long_break: row.get(7)?,
    })
}

fn distraction_from_row(row: &Row<'_>) -> rusqlite::Result<DistractionLogEntry> {
    let kind: String = row.get(4)?;
    Ok(DistractionLogEntry {
        id: row.get(0)?,
        timestamp: parse_ts(row, 1)?,
        end_time: parse_ts(row, 2)?,
        duration_ms: row.get(3)?,
        kind: if kind == "blacklisted" {
            DistractionKind::Blacklisted
        } else {
            DistractionKind::Unfocused
        },
        app_name: row.get(5)?,
        window_title: row.get(6)?,
        url: row.get(7)?,
        annotation: row.get(8)?,
    })
}
