//! SQLite-backed run document store on a dedicated executor thread.
//!
//! Only SQL runs inside `call()`. JSON encoding and decoding happen on the
//! caller's side so the single database thread is never held up.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::source::SourceStore;
use crate::{migrations, StoreError, StoreResult};

/// Fixed-width UTC timestamps sort lexically in chronological order.
const SORT_KEY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> StoreError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => StoreError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => StoreError::Connection("Connection closed".to_string()),
        other => StoreError::Connection(other.to_string()),
    }
}

pub(crate) fn sort_key(ts: DateTime<Utc>) -> String {
    ts.format(SORT_KEY_FORMAT).to_string()
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// The run identifier of a document: `event_id`, falling back to `run_id`.
fn document_run_id(doc: &Map<String, Value>) -> StoreResult<String> {
    let id = ["event_id", "run_id"]
        .iter()
        .filter_map(|key| doc.get(*key))
        .find(|v| !v.is_null());

    match id {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(other) => Err(StoreError::InvalidData(format!(
            "run identifier must be a non-empty string, got {other}"
        ))),
        None => Err(StoreError::InvalidData(
            "document has no event_id or run_id".to_string(),
        )),
    }
}

/// When the run happened: `timestamp_utc`, then `started_at_utc`.
fn document_time(doc: &Map<String, Value>) -> Option<DateTime<Utc>> {
    ["timestamp_utc", "started_at_utc"]
        .iter()
        .filter_map(|key| doc.get(*key)?.as_str())
        .find_map(parse_time)
}

fn parse_documents(rows: Vec<String>) -> StoreResult<Vec<Value>> {
    rows.iter()
        .map(|raw| serde_json::from_str(raw).map_err(StoreError::from))
        .collect()
}

/// Run document store backed by a single SQLite file.
#[derive(Clone)]
pub struct RunDocumentStore {
    conn: Connection,
    path: Option<String>,
}

impl RunDocumentStore {
    /// Open (creating if needed) the store at `path` and run migrations.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening run document store");

        let conn = Connection::open(path)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        conn.call(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        let store = Self {
            conn,
            path: Some(path_str),
        };
        store.call(|conn| migrations::run_migrations(conn)).await?;
        Ok(store)
    }

    /// A throwaway store, used by tests and dry runs.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let store = Self { conn, path: None };
        store.call(|conn| migrations::run_migrations(conn)).await?;
        Ok(store)
    }

    /// Database file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    async fn call<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let outer = self.conn.call(move |conn| Ok(f(conn))).await;
        match outer {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Insert or replace a run document. Returns its run identifier.
    ///
    /// Documents without a parseable `timestamp_utc` or `started_at_utc` are
    /// ordered by the time they were saved.
    pub async fn save(&self, document: &Value) -> StoreResult<String> {
        let object = document
            .as_object()
            .ok_or_else(|| StoreError::InvalidData("document is not a JSON object".to_string()))?;
        let run_id = document_run_id(object)?;
        let recorded_at = sort_key(document_time(object).unwrap_or_else(Utc::now));
        let status = object
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string);
        let body = serde_json::to_string(document)?;

        let id = run_id.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO run_documents (run_id, recorded_at, status, document)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(run_id) DO UPDATE SET
                    recorded_at = excluded.recorded_at,
                    status = excluded.status,
                    document = excluded.document",
                rusqlite::params![id, recorded_at, status, body],
            )?;
            Ok(())
        })
        .await?;

        debug!(run_id = %run_id, "Run document saved");
        Ok(run_id)
    }

    pub async fn count(&self) -> StoreResult<u64> {
        self.call(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM run_documents", [], |row| row.get(0))?;
            Ok(n as u64)
        })
        .await
    }

    /// Up to `limit` documents with the given status, newest first.
    pub async fn fetch_by_status(&self, status: &str, limit: usize) -> StoreResult<Vec<Value>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let status = status.to_string();
        let rows = self
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT document FROM run_documents
                     WHERE status = ?1
                     ORDER BY recorded_at DESC, run_id DESC
                     LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![status, limit as i64], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(rows)
            })
            .await?;
        parse_documents(rows)
    }
}

#[async_trait]
impl SourceStore for RunDocumentStore {
    async fn fetch_recent(&self, limit: usize) -> StoreResult<Vec<Value>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let rows = self
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT document FROM run_documents
                     ORDER BY recorded_at DESC, run_id DESC
                     LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map([limit as i64], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(rows)
            })
            .await?;
        debug!(limit, fetched = rows.len(), "Fetched recent run documents");
        parse_documents(rows)
    }

    async fn fetch_by_id(&self, run_id: &str) -> StoreResult<Option<Value>> {
        let id = run_id.to_string();
        let row = self
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT document FROM run_documents WHERE run_id = ?1")?;
                let mut rows = stmt.query_map([id], |row| row.get::<_, String>(0))?;
                Ok(rows.next().transpose()?)
            })
            .await?;
        row.map(|raw| serde_json::from_str(&raw).map_err(StoreError::from))
            .transpose()
    }

    async fn fetch_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Value>> {
        if limit == 0 || start > end {
            return Ok(Vec::new());
        }
        let (start_key, end_key) = (sort_key(start), sort_key(end));
        let rows = self
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT document FROM run_documents
                     WHERE recorded_at >= ?1 AND recorded_at <= ?2
                     ORDER BY recorded_at ASC, run_id ASC
                     LIMIT ?3",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![start_key, end_key, limit as i64], |row| {
                        row.get(0)
                    })?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(rows)
            })
            .await?;
        debug!(%start, %end, fetched = rows.len(), "Fetched run documents in window");
        parse_documents(rows)
    }
}
