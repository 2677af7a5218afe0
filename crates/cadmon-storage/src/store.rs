use crate::error::{Result, StorageError};
use cadmon_common::types::{
    AlarmState, AlarmTransition, Bucket, CompositeTransition, Sample, Severity, Transition,
};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS buckets (
    series TEXT NOT NULL,
    start INTEGER NOT NULL,
    count INTEGER,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (series, start)
);

CREATE TABLE IF NOT EXISTS alarm_states (
    name TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    at_bucket INTEGER,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS transitions (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    from_state TEXT NOT NULL,
    to_state TEXT NOT NULL,
    at_bucket INTEGER NOT NULL,
    severity TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transitions_created ON transitions(created_at);
";

/// Last known state of one alarm, as loaded from persistence.
#[derive(Debug, Clone)]
pub struct AlarmStateRow {
    pub name: String,
    pub state: AlarmState,
    pub at_bucket: Option<DateTime<Utc>>,
}

/// Durable store for buckets, alarm states, and transition history.
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Opens (creating if needed) `cadmon.db` inside `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join("cadmon.db"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_bucket(
        &self,
        series: &str,
        start: DateTime<Utc>,
        count: Option<u64>,
    ) -> Result<()> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "INSERT OR REPLACE INTO buckets (series, start, count, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(rusqlite::params![
            series,
            start.timestamp_millis(),
            count.map(|c| c as i64),
            Utc::now().timestamp_millis(),
        ])?;
        Ok(())
    }

    /// The most recent `limit` buckets of a series, chronological order.
    pub fn load_recent_buckets(&self, series: &str, limit: usize) -> Result<Vec<Bucket>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT start, count FROM buckets WHERE series = ?1
             ORDER BY start DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![series, limit as i64], |row| {
            let start_ms: i64 = row.get(0)?;
            let count: Option<i64> = row.get(1)?;
            Ok((start_ms, count))
        })?;

        let mut buckets = Vec::new();
        for row in rows {
            let (start_ms, count) = row?;
            let start = DateTime::from_timestamp_millis(start_ms).unwrap_or_default();
            let sample = match count {
                Some(c) => Sample::Count(c.max(0) as u64),
                None => Sample::Missing,
            };
            buckets.push(Bucket { start, sample });
        }
        buckets.reverse();
        Ok(buckets)
    }

    pub fn upsert_alarm_state(
        &self,
        name: &str,
        state: AlarmState,
        at_bucket: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "INSERT OR REPLACE INTO alarm_states (name, state, at_bucket, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(rusqlite::params![
            name,
            state.to_string(),
            at_bucket.map(|t| t.timestamp_millis()),
            Utc::now().timestamp_millis(),
        ])?;
        Ok(())
    }

    pub fn load_alarm_states(&self) -> Result<Vec<AlarmStateRow>> {
        let conn = self.lock_conn();
        let mut stmt =
            conn.prepare_cached("SELECT name, state, at_bucket FROM alarm_states ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            let name: String = row.get(0)?;
            let state: String = row.get(1)?;
            let at_bucket: Option<i64> = row.get(2)?;
            Ok((name, state, at_bucket))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (name, state, at_bucket) = row?;
            let state: AlarmState =
                state
                    .parse()
                    .map_err(|_| StorageError::InvalidColumnValue {
                        column: "state",
                        value: state.clone(),
                    })?;
            out.push(AlarmStateRow {
                name,
                state,
                at_bucket: at_bucket.and_then(DateTime::from_timestamp_millis),
            });
        }
        Ok(out)
    }

    pub fn record_transition(&self, transition: &Transition) -> Result<()> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "INSERT OR REPLACE INTO transitions
             (id, kind, name, from_state, to_state, at_bucket, severity, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        stmt.execute(rusqlite::params![
            transition.id(),
            transition.kind(),
            transition.name(),
            transition.from_state().to_string(),
            transition.to_state().to_string(),
            transition.at_bucket().timestamp_millis(),
            transition.severity().to_string(),
            transition.message(),
            transition.created_at().timestamp_millis(),
        ])?;
        Ok(())
    }

    /// Transition history, newest first.
    pub fn list_transitions(&self, limit: usize, offset: usize) -> Result<Vec<Transition>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, kind, name, from_state, to_state, at_bucket, severity, message, created_at
             FROM transitions ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit as i64, offset as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, i64>(8)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, kind, name, from_state, to_state, at_ms, severity, message, created_ms) =
                row?;
            let from_state = parse_state(&from_state)?;
            let to_state = parse_state(&to_state)?;
            let severity: Severity =
                severity
                    .parse()
                    .map_err(|_| StorageError::InvalidColumnValue {
                        column: "severity",
                        value: severity.clone(),
                    })?;
            let at_bucket = DateTime::from_timestamp_millis(at_ms).unwrap_or_default();
            let created_at = DateTime::from_timestamp_millis(created_ms).unwrap_or_default();

            let transition = match kind.as_str() {
                "alarm" => Transition::Alarm(AlarmTransition {
                    id,
                    alarm_name: name,
                    from_state,
                    to_state,
                    at_bucket,
                    severity,
                    message,
                    created_at,
                }),
                "composite" => Transition::Composite(CompositeTransition {
                    id,
                    composite_name: name,
                    from_state,
                    to_state,
                    at_bucket,
                    severity,
                    message,
                    created_at,
                }),
                other => {
                    return Err(StorageError::InvalidColumnValue {
                        column: "kind",
                        value: other.to_string(),
                    });
                }
            };
            out.push(transition);
        }
        Ok(out)
    }

    /// Deletes buckets and transitions older than `retention_days`.
    /// Returns the number of rows removed.
    pub fn cleanup(&self, retention_days: u32) -> Result<u32> {
        let cutoff =
            (Utc::now() - chrono::Duration::days(retention_days as i64)).timestamp_millis();
        let conn = self.lock_conn();
        let buckets = conn.execute("DELETE FROM buckets WHERE start < ?1", [cutoff])?;
        let transitions =
            conn.execute("DELETE FROM transitions WHERE created_at < ?1", [cutoff])?;
        let removed = (buckets + transitions) as u32;
        if removed > 0 {
            tracing::info!(removed, retention_days, "cleaned up expired rows");
        }
        Ok(removed)
    }
}

fn parse_state(s: &str) -> Result<AlarmState> {
    s.parse().map_err(|_| StorageError::InvalidColumnValue {
        column: "state",
        value: s.to_string(),
    })
}
