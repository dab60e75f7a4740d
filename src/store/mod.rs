//! SQLite persistence for one monitoring session.
//!
//! Every operation opens its own connection and closes it when done, so no
//! transaction spans more than one call and an abrupt exit between ticks
//! leaves a consistent file.

mod schema;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row};
use tracing::warn;

use crate::error::StoreError;
use crate::model::{format_timestamp, parse_timestamp, ExtraMetrics, ProcessSample, SystemSample};

/// Extension of session store files.
pub const STORE_EXTENSION: &str = "db";

/// File name for a session started at `started_at`: `YYYYMMDD_HHMMSS.db`.
pub fn session_file_name(started_at: &NaiveDateTime) -> String {
    format!("{}.{}", started_at.format("%Y%m%d_%H%M%S"), STORE_EXTENSION)
}

/// `YYYYMMDD_HHMMSS_<n>.db`, used when a session already took the plain name.
fn numbered_session_file_name(started_at: &NaiveDateTime, n: u32) -> String {
    format!("{}_{}.{}", started_at.format("%Y%m%d_%H%M%S"), n, STORE_EXTENSION)
}

/// Session store files directly under `dir`, sorted by name (oldest first).
pub fn discover_stores(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut stores: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == STORE_EXTENSION))
        .collect();
    stores.sort();
    Ok(stores)
}

/// Optional predicates for [`MetricsStore::query_processes`], combined with AND.
#[derive(Clone, Debug, Default)]
pub struct ProcessQuery {
    pub pid: Option<u32>,
    pub name: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl ProcessQuery {
    pub fn pid(pid: u32) -> Self {
        Self { pid: Some(pid), ..Self::default() }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::default() }
    }

    pub fn between(mut self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        self.start = start;
        self.end = end;
        self
    }
}

#[derive(Clone, Debug)]
pub struct MetricsStore {
    path: PathBuf,
}

impl MetricsStore {
    /// Open or create a store at `path`, creating parent directories and the schema.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let store = Self { path };
        let conn = store.connect()?;
        conn.execute_batch(schema::PROCESSES_DDL)?;
        conn.execute_batch(schema::SYSTEM_INFO_DDL)?;
        Ok(store)
    }

    /// Create the store for a new session under `output_dir`.
    ///
    /// Never reuses an existing file: a session started in the same second
    /// as an earlier one gets a `_1`, `_2`, ... suffix.
    pub fn create_session(output_dir: &Path, started_at: &NaiveDateTime) -> Result<Self, StoreError> {
        fs::create_dir_all(output_dir).map_err(|source| StoreError::CreateDir {
            path: output_dir.to_path_buf(),
            source,
        })?;
        let mut n = 0;
        loop {
            let name = match n {
                0 => session_file_name(started_at),
                n => numbered_session_file_name(started_at, n),
            };
            let path = output_dir.join(name);
            // Claim the name atomically; SQLite accepts the empty file.
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Self::open(path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(source) => return Err(StoreError::CreateFile { path, source }),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without directory, used as the session label.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(schema::BUSY_TIMEOUT)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(conn)
    }

    // ── writes ───────────────────────────────────────────────────────────

    /// Insert or replace on `(timestamp, pid)`.
    pub fn insert_process_sample(&self, s: &ProcessSample) -> Result<(), StoreError> {
        let extra = serde_json::to_string(&s.extra_metrics)?;
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO processes \
             (timestamp, pid, name, command_line, user, cpu_percent, memory_mb, extra_metrics) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                format_timestamp(&s.timestamp),
                s.pid,
                s.name,
                s.command_line,
                s.user,
                s.cpu_percent,
                s.memory_mb,
                extra,
            ],
        )?;
        Ok(())
    }

    /// Insert or replace on `timestamp`.
    pub fn insert_system_sample(&self, s: &SystemSample) -> Result<(), StoreError> {
        let extra = serde_json::to_string(&s.extra_metrics)?;
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO system_info \
             (timestamp, cpu_percent, memory_total_mb, memory_used_mb, memory_percent, extra_metrics) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                format_timestamp(&s.timestamp),
                s.cpu_percent,
                s.memory_total_mb,
                s.memory_used_mb,
                s.memory_percent,
                extra,
            ],
        )?;
        Ok(())
    }

    // ── reads ────────────────────────────────────────────────────────────

    /// Process rows matching every given predicate, oldest first.
    pub fn query_processes(&self, q: &ProcessQuery) -> Result<Vec<ProcessSample>, StoreError> {
        let mut sql = String::from(
            "SELECT timestamp, pid, name, command_line, user, cpu_percent, memory_mb, extra_metrics \
             FROM processes WHERE 1=1",
        );
        let mut args: Vec<SqlValue> = Vec::new();
        if let Some(pid) = q.pid {
            sql.push_str(" AND pid = ?");
            args.push(SqlValue::Integer(i64::from(pid)));
        }
        if let Some(name) = &q.name {
            sql.push_str(" AND name = ?");
            args.push(SqlValue::Text(name.clone()));
        }
        push_range(&mut sql, &mut args, q.start, q.end);
        sql.push_str(" ORDER BY timestamp, pid");

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), raw_process_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?.into_sample()?);
        }
        Ok(result)
    }

    /// System rows in the optional range, oldest first.
    pub fn query_system(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<SystemSample>, StoreError> {
        let mut sql = String::from(
            "SELECT timestamp, cpu_percent, memory_total_mb, memory_used_mb, memory_percent, extra_metrics \
             FROM system_info WHERE 1=1",
        );
        let mut args: Vec<SqlValue> = Vec::new();
        push_range(&mut sql, &mut args, start, end);
        sql.push_str(" ORDER BY timestamp");

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (ts, cpu, total, used, percent, extra) = row?;
            result.push(SystemSample {
                timestamp: parse_stored(&ts)?,
                cpu_percent: cpu,
                memory_total_mb: total,
                memory_used_mb: used,
                memory_percent: percent,
                extra_metrics: decode_extra(extra.as_deref()),
            });
        }
        Ok(result)
    }

    /// Every process name ever recorded, sorted.
    pub fn distinct_process_names(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT DISTINCT name FROM processes ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Every pid recorded, optionally only those recorded under `name`. Sorted.
    pub fn distinct_pids(&self, name: Option<&str>) -> Result<Vec<u32>, StoreError> {
        let conn = self.connect()?;
        let pids = match name {
            Some(name) => {
                let mut stmt = conn
                    .prepare("SELECT DISTINCT pid FROM processes WHERE name = ?1 ORDER BY pid")?;
                stmt.query_map([name], |row| row.get::<_, u32>(0))?
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare("SELECT DISTINCT pid FROM processes ORDER BY pid")?;
                stmt.query_map([], |row| row.get::<_, u32>(0))?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(pids)
    }

    /// First and last process-row timestamps, `(None, None)` for an empty store.
    pub fn time_range(
        &self,
    ) -> Result<(Option<NaiveDateTime>, Option<NaiveDateTime>), StoreError> {
        let conn = self.connect()?;
        let (min, max): (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM processes",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let min = min.as_deref().map(parse_stored).transpose()?;
        let max = max.as_deref().map(parse_stored).transpose()?;
        Ok((min, max))
    }

    /// Name → pids hierarchy for a viewer tree.
    pub fn catalog(&self) -> Result<Vec<(String, Vec<u32>)>, StoreError> {
        self.distinct_process_names()?
            .into_iter()
            .map(|name| {
                let pids = self.distinct_pids(Some(&name))?;
                Ok((name, pids))
            })
            .collect()
    }
}

// ── row decoding ────────────────────────────────────────────────────────

struct RawProcessRow {
    timestamp: String,
    pid: u32,
    name: String,
    command_line: Option<String>,
    user: Option<String>,
    cpu_percent: Option<f64>,
    memory_mb: Option<f64>,
    extra_metrics: Option<String>,
}

fn raw_process_row(row: &Row<'_>) -> rusqlite::Result<RawProcessRow> {
    Ok(RawProcessRow {
        timestamp: row.get(0)?,
        pid: row.get(1)?,
        name: row.get(2)?,
        command_line: row.get(3)?,
        user: row.get(4)?,
        cpu_percent: row.get(5)?,
        memory_mb: row.get(6)?,
        extra_metrics: row.get(7)?,
    })
}

impl RawProcessRow {
    fn into_sample(self) -> Result<ProcessSample, StoreError> {
        Ok(ProcessSample {
            timestamp: parse_stored(&self.timestamp)?,
            pid: self.pid,
            name: self.name,
            command_line: self.command_line.unwrap_or_default(),
            user: self.user.unwrap_or_else(|| crate::model::UNKNOWN_USER.to_string()),
            cpu_percent: self.cpu_percent.unwrap_or(0.0),
            memory_mb: self.memory_mb.unwrap_or(0.0),
            extra_metrics: decode_extra(self.extra_metrics.as_deref()),
        })
    }
}

fn push_range(
    sql: &mut String,
    args: &mut Vec<SqlValue>,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) {
    if let Some(start) = start {
        sql.push_str(" AND timestamp >= ?");
        args.push(SqlValue::Text(format_timestamp(&start)));
    }
    if let Some(end) = end {
        sql.push_str(" AND timestamp <= ?");
        args.push(SqlValue::Text(format_timestamp(&end)));
    }
}

fn parse_stored(ts: &str) -> Result<NaiveDateTime, StoreError> {
    parse_timestamp(ts).ok_or_else(|| StoreError::InvalidTimestamp(ts.to_string()))
}

/// Decode a stored metrics blob. NULL, empty, malformed or non-object
/// content all read back as an empty mapping.
pub(crate) fn decode_extra(raw: Option<&str>) -> ExtraMetrics {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return ExtraMetrics::new();
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) => ExtraMetrics::new(),
        Err(e) => {
            warn!(error = %e, "malformed extra_metrics column, using empty mapping");
            ExtraMetrics::new()
        }
    }
}
