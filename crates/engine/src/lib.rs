#![forbid(unsafe_code)]

pub mod chunks;
pub mod generator;
mod recalc;
mod reconcile;
pub mod support;

pub use chunks::ChunkInput;
pub use generator::{Generator, GeneratorError, GeneratorRequest};
pub use recalc::PropagationOutcome;
pub use reconcile::{ReconcileOutcome, dedup_and_enforce_titles};

use std::path::Path;
use tm_core::ids::ProjectId;
use tm_storage::{AuditRow, SqliteStore, StoreError};

#[derive(Debug)]
pub enum EngineError {
    Store(StoreError),
    InvalidInput(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "store: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

// Application-facing surface: owns the store and wires the pure
// reconciliation stages to persistence.
pub struct Engine {
    store: SqliteStore,
}

impl Engine {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, EngineError> {
        Ok(Self {
            store: SqliteStore::open(storage_dir)?,
        })
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SqliteStore {
        &mut self.store
    }

    pub fn project_init(&mut self, project: &ProjectId) -> Result<(), EngineError> {
        Ok(self.store.project_init(project)?)
    }

    // Audit entries with display-ready timestamps for the surrounding app.
    pub fn audit_trail(
        &self,
        project: &ProjectId,
        since_seq: i64,
        limit: usize,
    ) -> Result<Vec<AuditEntryView>, EngineError> {
        let rows = self.store.audit_list(project, since_seq, limit)?;
        Ok(rows.into_iter().map(AuditEntryView::from_row).collect())
    }
}

#[derive(Clone, Debug)]
pub struct AuditEntryView {
    pub seq: i64,
    pub at: String,
    pub action: String,
    pub external_id: Option<String>,
    pub detail: String,
    pub from_doc_version: Option<i64>,
    pub to_doc_version: Option<i64>,
}

impl AuditEntryView {
    fn from_row(row: AuditRow) -> Self {
        Self {
            seq: row.seq,
            at: support::time::ts_ms_to_rfc3339(row.ts_ms),
            action: row.action,
            external_id: row.external_id,
            detail: row.detail,
            from_doc_version: row.from_doc_version,
            to_doc_version: row.to_doc_version,
        }
    }
}
