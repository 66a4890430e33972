#![forbid(unsafe_code)]

use super::items::item_row_tx;
use super::*;
use rusqlite::{OptionalExtension, params};
use std::collections::BTreeMap;
use tm_core::ids::external;
use tm_core::model::{DraftItem, ItemStatus};

impl SqliteStore {
    // Applies a reconciliation bundle as one transaction, in two explicit
    // passes: insert every create first, then resolve parent references
    // through the freshly recorded id map. Forward references inside the
    // batch resolve regardless of input ordering; any failure rolls the
    // whole batch back.
    pub fn apply_actions(
        &mut self,
        project: &ProjectId,
        request: ApplyRequest,
    ) -> Result<ApplyOutcome, StoreError> {
        let now_ms = now_ms();
        let from_version = request.from_doc_version;
        let to_version = request.to_doc_version;

        let tx = self.conn.transaction()?;
        ensure_project_tx(&tx, project.as_str(), now_ms)?;

        let mut outcome = ApplyOutcome::default();
        let mut inserted: BTreeMap<String, i64> = BTreeMap::new();
        let mut max_minted_seq: i64 = 0;

        // Pass 1: insert nodes.
        for create in &request.bundle.creates {
            let external_id = create
                .external_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or(StoreError::InvalidInput(
                    "create is missing an external id",
                ))?;

            let duplicate = tx
                .query_row(
                    "SELECT 1 FROM items WHERE project=?1 AND external_id=?2",
                    params![project.as_str(), external_id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .is_some();
            if duplicate || inserted.contains_key(external_id) {
                return Err(StoreError::DuplicateExternalId {
                    external_id: external_id.to_string(),
                });
            }

            let row_id = insert_item_tx(&tx, project.as_str(), external_id, create, now_ms)?;
            inserted.insert(external_id.to_string(), row_id);
            if let Some(seq) = external::parse_seq(external_id) {
                max_minted_seq = max_minted_seq.max(seq.min(i64::MAX as u64) as i64);
            }

            insert_audit_tx(
                &tx,
                project.as_str(),
                now_ms,
                "create",
                Some(external_id),
                &create.title,
                from_version,
                to_version,
            )?;
            outcome.created.push(external_id.to_string());
        }

        // Pass 2: resolve edges.
        for create in &request.bundle.creates {
            let Some(external_id) = create.external_id.as_deref() else {
                continue;
            };
            let Some(parent_external) = create
                .parent_external_id
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
            else {
                continue;
            };

            let parent_row_id = match inserted.get(parent_external) {
                Some(&row_id) => row_id,
                None => tx
                    .query_row(
                        "SELECT id FROM items WHERE project=?1 AND external_id=?2",
                        params![project.as_str(), parent_external],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()?
                    .ok_or_else(|| StoreError::UnresolvedParent {
                        external_id: external_id.to_string(),
                        parent_external_id: parent_external.to_string(),
                    })?,
            };

            tx.execute(
                "UPDATE items SET parent_id=?3 WHERE project=?1 AND external_id=?2",
                params![project.as_str(), external_id, parent_row_id],
            )?;
        }

        // Patches overwrite only the fields they carry.
        for patch in &request.bundle.updates {
            let Some(current) = item_row_tx(&tx, project.as_str(), &patch.external_id)? else {
                return Err(StoreError::UnknownId);
            };

            let title = patch.title.clone().unwrap_or(current.title);
            let description = patch.description.clone().unwrap_or(current.description);
            let area = patch.area.clone().unwrap_or(current.area);
            let priority = patch.priority.unwrap_or(current.priority);
            let source_chunk_id = patch
                .source_chunk_id
                .clone()
                .or(current.source_chunk_id);

            tx.execute(
                r#"
                UPDATE items
                SET revision=?3, title=?4, description=?5, area=?6, priority=?7, source_chunk_id=?8, updated_at_ms=?9
                WHERE project=?1 AND external_id=?2
                "#,
                params![
                    project.as_str(),
                    patch.external_id,
                    current.revision + 1,
                    title,
                    description,
                    area,
                    priority.as_str(),
                    source_chunk_id,
                    now_ms
                ],
            )?;

            insert_audit_tx(
                &tx,
                project.as_str(),
                now_ms,
                "update",
                Some(&patch.external_id),
                &patched_fields(patch),
                from_version,
                to_version,
            )?;
            outcome.updated.push(patch.external_id.clone());
        }

        // Obsoletion only flips status; rows are never deleted here.
        for external_id in &request.bundle.obsoletes {
            let changed = tx.execute(
                r#"
                UPDATE items
                SET revision=revision+1, status=?3, updated_at_ms=?4
                WHERE project=?1 AND external_id=?2
                "#,
                params![
                    project.as_str(),
                    external_id,
                    ItemStatus::Obsolete.as_str(),
                    now_ms
                ],
            )?;
            if changed != 1 {
                return Err(StoreError::UnknownId);
            }
            insert_audit_tx(
                &tx,
                project.as_str(),
                now_ms,
                "obsolete",
                Some(external_id),
                "marked obsolete",
                from_version,
                to_version,
            )?;
            outcome.obsoleted.push(external_id.clone());
        }

        for question in &request.bundle.questions {
            insert_audit_tx(
                &tx,
                project.as_str(),
                now_ms,
                "question",
                None,
                &format!("{} ({})", question.question, question.reason),
                from_version,
                to_version,
            )?;
        }

        // Deleted rows release nothing: the minted-id floor only rises.
        if max_minted_seq > 0 {
            raise_counter_tx(&tx, project.as_str(), "item_seq", max_minted_seq)?;
        }

        tx.commit()?;
        Ok(outcome)
    }
}

fn insert_item_tx(
    tx: &rusqlite::Transaction<'_>,
    project: &str,
    external_id: &str,
    create: &DraftItem,
    now_ms: i64,
) -> Result<i64, StoreError> {
    tx.execute(
        r#"
        INSERT INTO items(
          project, external_id, revision, item_type, parent_id, title, description,
          area, priority, status, acceptance_json, dependencies_json, risks_json,
          labels_json, questions_json, source_chunk_id, source_snippet, blocked_reason,
          created_at_ms, updated_at_ms
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
        "#,
        params![
            project,
            external_id,
            0i64,
            create.item_type.as_str(),
            Option::<i64>::None,
            create.title,
            create.description,
            create.area,
            create.priority.as_str(),
            ItemStatus::Todo.as_str(),
            encode_string_list(&create.acceptance_criteria),
            encode_string_list(&create.dependencies),
            encode_string_list(&create.risks),
            encode_string_list(&create.labels),
            encode_qa_pairs(&create.questions),
            create.source_chunk_id,
            create.source_snippet,
            Option::<String>::None,
            now_ms,
            now_ms,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn patched_fields(patch: &tm_core::model::ItemPatch) -> String {
    let mut fields = Vec::new();
    if patch.title.is_some() {
        fields.push("title");
    }
    if patch.description.is_some() {
        fields.push("description");
    }
    if patch.area.is_some() {
        fields.push("area");
    }
    if patch.priority.is_some() {
        fields.push("priority");
    }
    if patch.source_chunk_id.is_some() {
        fields.push("source_chunk_id");
    }
    if fields.is_empty() {
        "no fields".to_string()
    } else {
        fields.join(", ")
    }
}
