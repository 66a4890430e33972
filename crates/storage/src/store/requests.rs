#![forbid(unsafe_code)]

use tm_core::model::{
    ActionBundle, ItemSnapshot, ItemStatus, ItemType, Priority, QaPair,
};

#[derive(Clone, Debug)]
pub struct ItemRow {
    pub id: i64,
    pub external_id: String,
    pub revision: i64,
    pub item_type: ItemType,
    pub parent_id: Option<i64>,
    pub parent_external_id: Option<String>,
    pub title: String,
    pub description: String,
    pub area: String,
    pub priority: Priority,
    pub status: ItemStatus,
    pub acceptance_criteria: Vec<String>,
    pub dependencies: Vec<String>,
    pub risks: Vec<String>,
    pub labels: Vec<String>,
    pub questions: Vec<QaPair>,
    pub source_chunk_id: Option<String>,
    pub source_snippet: Option<String>,
    pub blocked_reason: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl ItemRow {
    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            external_id: self.external_id.clone(),
            item_type: self.item_type,
            parent_external_id: self.parent_external_id.clone(),
            title: self.title.clone(),
            status: self.status,
            source_chunk_id: self.source_chunk_id.clone(),
        }
    }
}

// Field-presence patch: `None` leaves the stored value untouched;
// `blocked_reason` uses the inner Option to clear.
#[derive(Clone, Debug, Default)]
pub struct ItemEditRequest {
    pub external_id: String,
    pub expected_revision: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub area: Option<String>,
    pub priority: Option<Priority>,
    pub blocked_reason: Option<Option<String>>,
}

#[derive(Clone, Debug)]
pub struct ApplyRequest {
    pub bundle: ActionBundle,
    pub from_doc_version: Option<i64>,
    pub to_doc_version: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub obsoleted: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct DocumentRow {
    pub version: i64,
    pub title: String,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct AuditRow {
    pub seq: i64,
    pub ts_ms: i64,
    pub action: String,
    pub external_id: Option<String>,
    pub detail: String,
    pub from_doc_version: Option<i64>,
    pub to_doc_version: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct JobRow {
    pub id: String,
    pub revision: i64,
    pub status: String,
    pub doc_version: Option<i64>,
    pub runner: Option<String>,
    pub claim_expires_at_ms: Option<i64>,
    pub summary: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub completed_at_ms: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct ClaimedJob {
    pub project: String,
    pub job: JobRow,
}

#[derive(Clone, Debug)]
pub struct PropagationUpdate {
    pub external_id: String,
    pub description: String,
    pub questions: Vec<QaPair>,
}
