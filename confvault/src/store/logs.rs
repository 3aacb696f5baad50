//! Append-only job and connection logs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::error;
use rusqlite::{Connection, params};
use serde::Serialize;
use uuid::Uuid;

use crate::error::LogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Job,
    Connection,
}

impl LogKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LogKind::Job => "job",
            LogKind::Connection => "connection",
        }
    }
}

impl FromStr for LogKind {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "job" => Ok(LogKind::Job),
            "connection" => Ok(LogKind::Connection),
            other => Err(LogError::Malformed(format!("unknown log type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(LogError::Malformed(format!("unknown log level '{}'", other))),
        }
    }
}

/// One immutable log row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub job_id: String,
    pub device_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn job(job_id: &str, device_id: Option<&str>, level: LogLevel, message: &str) -> Self {
        Self::new(LogKind::Job, job_id, device_id, level, message)
    }

    pub fn connection(job_id: &str, device_id: &str, level: LogLevel, content: &str) -> Self {
        Self::new(LogKind::Connection, job_id, Some(device_id), level, content)
    }

    fn new(
        kind: LogKind,
        job_id: &str,
        device_id: Option<&str>,
        level: LogLevel,
        message: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: job_id.to_string(),
            device_id: device_id.map(str::to_string),
            kind,
            level,
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Destination for job and connection logs.
///
/// Implementors provide [`append`](LogWriter::append). Callers use the
/// `write_*` methods, which never fail: a rejected entry is reported on the
/// process log instead and the caller carries on.
#[async_trait]
pub trait LogWriter: Send + Sync {
    async fn append(&self, entry: LogEntry) -> Result<(), LogError>;

    async fn write_job_log(
        &self,
        job_id: &str,
        device_id: Option<&str>,
        level: LogLevel,
        message: &str,
    ) {
        let entry = LogEntry::job(job_id, device_id, level, message);
        if let Err(e) = self.append(entry).await {
            error!(
                "[{}] job {}: dropped job log ({}): {}: {}",
                e.kind(),
                job_id,
                level,
                message,
                e
            );
        }
    }

    async fn write_connection_log(
        &self,
        job_id: &str,
        device_id: &str,
        level: LogLevel,
        content: &str,
    ) {
        let entry = LogEntry::connection(job_id, device_id, level, content);
        if let Err(e) = self.append(entry).await {
            error!(
                "[{}] job {}: dropped connection log for device {}: {}",
                e.kind(),
                job_id,
                device_id,
                e
            );
        }
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS log_entries (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    id         TEXT NOT NULL UNIQUE,
    job_id     TEXT NOT NULL,
    device_id  TEXT,
    type       TEXT NOT NULL CHECK (type IN ('job', 'connection')),
    level      TEXT NOT NULL,
    message    TEXT NOT NULL,
    timestamp  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_log_entries_job ON log_entries (job_id, type);
";

/// SQLite log store. Every write opens its own connection and transaction.
#[derive(Debug, Clone)]
pub struct SqliteLogStore {
    path: PathBuf,
}

impl SqliteLogStore {
    /// Open the database, creating the schema if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let conn = connect(&path)?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries for a job in insertion order.
    pub async fn entries(&self, job_id: &str) -> Result<Vec<LogEntry>, LogError> {
        let path = self.path.clone();
        let job_id = job_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<LogEntry>, LogError> {
            let conn = connect(&path)?;
            let mut stmt = conn.prepare(
                "SELECT id, job_id, device_id, type, level, message, timestamp
                 FROM log_entries WHERE job_id = ?1 ORDER BY seq",
            )?;
            let rows = stmt.query_map(params![job_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?;

            let mut entries = Vec::new();
            for row in rows {
                let (id, job_id, device_id, kind, level, message, timestamp) = row?;
                entries.push(LogEntry {
                    id: Uuid::parse_str(&id).map_err(|e| LogError::Malformed(e.to_string()))?,
                    job_id,
                    device_id,
                    kind: kind.parse()?,
                    level: level.parse()?,
                    message,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .map_err(|e| LogError::Malformed(e.to_string()))?
                        .with_timezone(&Utc),
                });
            }
            Ok(entries)
        })
        .await
        .map_err(|e| LogError::Worker(e.to_string()))?
    }
}

#[async_trait]
impl LogWriter for SqliteLogStore {
    async fn append(&self, entry: LogEntry) -> Result<(), LogError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), LogError> {
            let mut conn = connect(&path)?;
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO log_entries (id, job_id, device_id, type, level, message, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.id.to_string(),
                    entry.job_id,
                    entry.device_id,
                    entry.kind.as_str(),
                    entry.level.as_str(),
                    entry.message,
                    entry.timestamp.to_rfc3339(),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| LogError::Worker(e.to_string()))?
    }
}

fn connect(path: &Path) -> Result<Connection, LogError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(10))?;
    Ok(conn)
}
