#![forbid(unsafe_code)]

mod apply;
mod audit;
mod documents;
mod error;
mod facts;
mod items;
mod jobs;
mod requests;

pub use error::StoreError;
pub use requests::*;

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tm_core::ids::ProjectId;
use tm_core::model::QaPair;

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join("taskmill.db");
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        install_schema(&conn)?;

        Ok(Self { conn, storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn project_init(&mut self, project: &ProjectId) -> Result<(), StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        ensure_project_tx(&tx, project.as_str(), now_ms)?;
        tx.commit()?;
        Ok(())
    }

    pub fn project_exists(&self, project: &ProjectId) -> Result<bool, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT 1 FROM projects WHERE project=?1",
                params![project.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some())
    }

    // Floor below which item ids must never be minted again, even after
    // explicit deletions removed the rows that carried them.
    pub fn item_seq_floor(&self, project: &ProjectId) -> Result<u64, StoreError> {
        let value: Option<i64> = self
            .conn
            .query_row(
                "SELECT value FROM counters WHERE project=?1 AND name='item_seq'",
                params![project.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or(0).max(0) as u64)
    }
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;

        CREATE TABLE IF NOT EXISTS projects (
          project TEXT PRIMARY KEY,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS counters (
          project TEXT NOT NULL,
          name TEXT NOT NULL,
          value INTEGER NOT NULL,
          PRIMARY KEY (project, name)
        );

        CREATE TABLE IF NOT EXISTS documents (
          project TEXT NOT NULL,
          version INTEGER NOT NULL,
          title TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          PRIMARY KEY (project, version)
        );

        CREATE TABLE IF NOT EXISTS chunks (
          project TEXT NOT NULL,
          doc_version INTEGER NOT NULL,
          ord INTEGER NOT NULL,
          chunk_id TEXT NOT NULL,
          title TEXT NOT NULL,
          content TEXT NOT NULL,
          PRIMARY KEY (project, doc_version, ord)
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_project_version
          ON chunks(project, doc_version, chunk_id);

        CREATE TABLE IF NOT EXISTS items (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          project TEXT NOT NULL,
          external_id TEXT NOT NULL,
          revision INTEGER NOT NULL,
          item_type TEXT NOT NULL,
          parent_id INTEGER,
          title TEXT NOT NULL,
          description TEXT NOT NULL,
          area TEXT NOT NULL,
          priority TEXT NOT NULL,
          status TEXT NOT NULL,
          acceptance_json TEXT NOT NULL,
          dependencies_json TEXT NOT NULL,
          risks_json TEXT NOT NULL,
          labels_json TEXT NOT NULL,
          questions_json TEXT NOT NULL,
          source_chunk_id TEXT,
          source_snippet TEXT,
          blocked_reason TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_items_project_external
          ON items(project, external_id);
        CREATE INDEX IF NOT EXISTS idx_items_project_parent
          ON items(project, parent_id);
        CREATE INDEX IF NOT EXISTS idx_items_project_chunk
          ON items(project, source_chunk_id);

        CREATE TABLE IF NOT EXISTS audit_log (
          seq INTEGER PRIMARY KEY AUTOINCREMENT,
          project TEXT NOT NULL,
          ts_ms INTEGER NOT NULL,
          action TEXT NOT NULL,
          external_id TEXT,
          detail TEXT NOT NULL,
          from_doc_version INTEGER,
          to_doc_version INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_audit_project_seq
          ON audit_log(project, seq);

        CREATE TABLE IF NOT EXISTS jobs (
          project TEXT NOT NULL,
          id TEXT NOT NULL,
          revision INTEGER NOT NULL,
          status TEXT NOT NULL,
          doc_version INTEGER,
          runner TEXT,
          claim_expires_at_ms INTEGER,
          summary TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          completed_at_ms INTEGER,
          PRIMARY KEY (project, id)
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_status_created
          ON jobs(status, created_at_ms);

        CREATE TABLE IF NOT EXISTS fact_ledgers (
          project TEXT PRIMARY KEY,
          content TEXT NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

fn ensure_project_tx(tx: &Transaction<'_>, project: &str, now_ms: i64) -> Result<(), StoreError> {
    tx.execute(
        "INSERT OR IGNORE INTO projects(project, created_at_ms) VALUES (?1, ?2)",
        params![project, now_ms],
    )?;
    Ok(())
}

fn next_counter_tx(tx: &Transaction<'_>, project: &str, name: &str) -> Result<i64, StoreError> {
    let current: i64 = tx
        .query_row(
            "SELECT value FROM counters WHERE project=?1 AND name=?2",
            params![project, name],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    let next = current + 1;
    tx.execute(
        r#"
        INSERT INTO counters(project, name, value) VALUES (?1, ?2, ?3)
        ON CONFLICT(project, name) DO UPDATE SET value=excluded.value
        "#,
        params![project, name, next],
    )?;
    Ok(next)
}

fn raise_counter_tx(
    tx: &Transaction<'_>,
    project: &str,
    name: &str,
    value: i64,
) -> Result<(), StoreError> {
    tx.execute(
        r#"
        INSERT INTO counters(project, name, value) VALUES (?1, ?2, ?3)
        ON CONFLICT(project, name) DO UPDATE SET value=MAX(value, excluded.value)
        "#,
        params![project, name, value],
    )?;
    Ok(())
}

fn insert_audit_tx(
    tx: &Transaction<'_>,
    project: &str,
    ts_ms: i64,
    action: &str,
    external_id: Option<&str>,
    detail: &str,
    from_doc_version: Option<i64>,
    to_doc_version: Option<i64>,
) -> Result<i64, StoreError> {
    tx.execute(
        r#"
        INSERT INTO audit_log(project, ts_ms, action, external_id, detail, from_doc_version, to_doc_version)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            project,
            ts_ms,
            action,
            external_id,
            detail,
            from_doc_version,
            to_doc_version
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn encode_string_list(values: &[String]) -> String {
    serde_json::Value::Array(
        values
            .iter()
            .map(|v| serde_json::Value::String(v.clone()))
            .collect(),
    )
    .to_string()
}

fn decode_string_list(raw: &str) -> Result<Vec<String>, StoreError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let serde_json::Value::Array(entries) = value else {
        return Err(StoreError::InvalidInput("stored list is not a JSON array"));
    };
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let serde_json::Value::String(text) = entry else {
            return Err(StoreError::InvalidInput("stored list entry is not a string"));
        };
        out.push(text);
    }
    Ok(out)
}

// QA pairs are structured in memory and flat JSON only at this boundary.
fn encode_qa_pairs(pairs: &[QaPair]) -> String {
    let entries: Vec<serde_json::Value> = pairs
        .iter()
        .map(|pair| {
            serde_json::json!({
                "question": pair.question,
                "answer": pair.answer,
            })
        })
        .collect();
    serde_json::Value::Array(entries).to_string()
}

fn decode_qa_pairs(raw: &str) -> Result<Vec<QaPair>, StoreError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let serde_json::Value::Array(entries) = value else {
        return Err(StoreError::InvalidInput("stored qa list is not a JSON array"));
    };
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let question = entry
            .get("question")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let answer = entry
            .get("answer")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if question.is_empty() {
            continue;
        }
        out.push(QaPair { question, answer });
    }
    Ok(out)
}
