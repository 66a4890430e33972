#![forbid(unsafe_code)]

use super::*;
use rusqlite::{OptionalExtension, params};
use tm_core::model::{ItemSnapshot, ItemStatus, ItemType, Priority, QaPair};
use tm_core::qa;

const ITEM_SELECT: &str = r#"
    SELECT
      i.id,
      i.external_id,
      i.revision,
      i.item_type,
      i.parent_id,
      p.external_id,
      i.title,
      i.description,
      i.area,
      i.priority,
      i.status,
      i.acceptance_json,
      i.dependencies_json,
      i.risks_json,
      i.labels_json,
      i.questions_json,
      i.source_chunk_id,
      i.source_snippet,
      i.blocked_reason,
      i.created_at_ms,
      i.updated_at_ms
    FROM items i
    LEFT JOIN items p ON p.id = i.parent_id AND p.project = i.project
"#;

struct RawItem {
    id: i64,
    external_id: String,
    revision: i64,
    item_type: String,
    parent_id: Option<i64>,
    parent_external_id: Option<String>,
    title: String,
    description: String,
    area: String,
    priority: String,
    status: String,
    acceptance_json: String,
    dependencies_json: String,
    risks_json: String,
    labels_json: String,
    questions_json: String,
    source_chunk_id: Option<String>,
    source_snippet: Option<String>,
    blocked_reason: Option<String>,
    created_at_ms: i64,
    updated_at_ms: i64,
}

fn read_raw_item(row: &rusqlite::Row<'_>) -> Result<RawItem, rusqlite::Error> {
    Ok(RawItem {
        id: row.get(0)?,
        external_id: row.get(1)?,
        revision: row.get(2)?,
        item_type: row.get(3)?,
        parent_id: row.get(4)?,
        parent_external_id: row.get(5)?,
        title: row.get(6)?,
        description: row.get(7)?,
        area: row.get(8)?,
        priority: row.get(9)?,
        status: row.get(10)?,
        acceptance_json: row.get(11)?,
        dependencies_json: row.get(12)?,
        risks_json: row.get(13)?,
        labels_json: row.get(14)?,
        questions_json: row.get(15)?,
        source_chunk_id: row.get(16)?,
        source_snippet: row.get(17)?,
        blocked_reason: row.get(18)?,
        created_at_ms: row.get(19)?,
        updated_at_ms: row.get(20)?,
    })
}

impl RawItem {
    fn into_row(self) -> Result<ItemRow, StoreError> {
        Ok(ItemRow {
            id: self.id,
            external_id: self.external_id,
            revision: self.revision,
            item_type: ItemType::parse(&self.item_type)
                .ok_or(StoreError::InvalidInput("invalid item type in row"))?,
            parent_id: self.parent_id,
            parent_external_id: self.parent_external_id,
            title: self.title,
            description: self.description,
            area: self.area,
            priority: Priority::parse(&self.priority)
                .ok_or(StoreError::InvalidInput("invalid priority in row"))?,
            status: ItemStatus::parse(&self.status)
                .ok_or(StoreError::InvalidInput("invalid status in row"))?,
            acceptance_criteria: decode_string_list(&self.acceptance_json)?,
            dependencies: decode_string_list(&self.dependencies_json)?,
            risks: decode_string_list(&self.risks_json)?,
            labels: decode_string_list(&self.labels_json)?,
            questions: decode_qa_pairs(&self.questions_json)?,
            source_chunk_id: self.source_chunk_id,
            source_snippet: self.source_snippet,
            blocked_reason: self.blocked_reason,
            created_at_ms: self.created_at_ms,
            updated_at_ms: self.updated_at_ms,
        })
    }
}

pub(super) fn item_row_tx(
    tx: &rusqlite::Transaction<'_>,
    project: &str,
    external_id: &str,
) -> Result<Option<ItemRow>, StoreError> {
    let sql = format!("{ITEM_SELECT} WHERE i.project=?1 AND i.external_id=?2");
    let raw = tx
        .query_row(&sql, params![project, external_id], read_raw_item)
        .optional()?;
    match raw {
        Some(raw) => Ok(Some(raw.into_row()?)),
        None => Ok(None),
    }
}

impl SqliteStore {
    pub fn item_get(
        &self,
        project: &ProjectId,
        external_id: &str,
    ) -> Result<Option<ItemRow>, StoreError> {
        let sql = format!("{ITEM_SELECT} WHERE i.project=?1 AND i.external_id=?2");
        let raw = self
            .conn
            .query_row(&sql, params![project.as_str(), external_id], read_raw_item)
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(raw.into_row()?)),
            None => Ok(None),
        }
    }

    pub fn items_list(&self, project: &ProjectId) -> Result<Vec<ItemRow>, StoreError> {
        let sql = format!("{ITEM_SELECT} WHERE i.project=?1 ORDER BY i.id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![project.as_str()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_raw_item(row)?.into_row()?);
        }
        Ok(out)
    }

    pub fn items_snapshot(&self, project: &ProjectId) -> Result<Vec<ItemSnapshot>, StoreError> {
        Ok(self
            .items_list(project)?
            .iter()
            .map(ItemRow::snapshot)
            .collect())
    }

    pub fn item_edit(
        &mut self,
        project: &ProjectId,
        request: ItemEditRequest,
    ) -> Result<ItemRow, StoreError> {
        if request.title.is_none()
            && request.description.is_none()
            && request.area.is_none()
            && request.priority.is_none()
            && request.blocked_reason.is_none()
        {
            return Err(StoreError::InvalidInput("no fields to edit"));
        }

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let Some(current) = item_row_tx(&tx, project.as_str(), &request.external_id)? else {
            return Err(StoreError::UnknownId);
        };
        if let Some(expected) = request.expected_revision
            && expected != current.revision
        {
            return Err(StoreError::RevisionMismatch {
                expected,
                actual: current.revision,
            });
        }

        let new_revision = current.revision + 1;
        let title = request.title.unwrap_or(current.title);
        let description = request.description.unwrap_or(current.description);
        let area = request.area.unwrap_or(current.area);
        let priority = request.priority.unwrap_or(current.priority);
        let blocked_reason = request.blocked_reason.unwrap_or(current.blocked_reason);

        tx.execute(
            r#"
            UPDATE items
            SET revision=?3, title=?4, description=?5, area=?6, priority=?7, blocked_reason=?8, updated_at_ms=?9
            WHERE project=?1 AND external_id=?2
            "#,
            params![
                project.as_str(),
                request.external_id,
                new_revision,
                title,
                description,
                area,
                priority.as_str(),
                blocked_reason,
                now_ms
            ],
        )?;

        insert_audit_tx(
            &tx,
            project.as_str(),
            now_ms,
            "edit",
            Some(&request.external_id),
            "fields edited",
            None,
            None,
        )?;

        let row = item_row_tx(&tx, project.as_str(), &request.external_id)?
            .ok_or(StoreError::UnknownId)?;
        tx.commit()?;
        Ok(row)
    }

    pub fn item_set_status(
        &mut self,
        project: &ProjectId,
        external_id: &str,
        status: ItemStatus,
        expected_revision: Option<i64>,
    ) -> Result<ItemRow, StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let Some(current) = item_row_tx(&tx, project.as_str(), external_id)? else {
            return Err(StoreError::UnknownId);
        };
        if let Some(expected) = expected_revision
            && expected != current.revision
        {
            return Err(StoreError::RevisionMismatch {
                expected,
                actual: current.revision,
            });
        }

        tx.execute(
            r#"
            UPDATE items
            SET revision=?3, status=?4, updated_at_ms=?5
            WHERE project=?1 AND external_id=?2
            "#,
            params![
                project.as_str(),
                external_id,
                current.revision + 1,
                status.as_str(),
                now_ms
            ],
        )?;

        insert_audit_tx(
            &tx,
            project.as_str(),
            now_ms,
            "status",
            Some(external_id),
            status.as_str(),
            None,
            None,
        )?;

        let row =
            item_row_tx(&tx, project.as_str(), external_id)?.ok_or(StoreError::UnknownId)?;
        tx.commit()?;
        Ok(row)
    }

    // User-supplied answers merge into the stored clarification set; a
    // confirmed answer is never lost to a later empty one.
    pub fn item_answer_questions(
        &mut self,
        project: &ProjectId,
        external_id: &str,
        incoming: &[QaPair],
    ) -> Result<ItemRow, StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let Some(current) = item_row_tx(&tx, project.as_str(), external_id)? else {
            return Err(StoreError::UnknownId);
        };

        let merged = qa::merge_qa(&current.questions, incoming);
        tx.execute(
            r#"
            UPDATE items
            SET revision=?3, questions_json=?4, updated_at_ms=?5
            WHERE project=?1 AND external_id=?2
            "#,
            params![
                project.as_str(),
                external_id,
                current.revision + 1,
                encode_qa_pairs(&merged),
                now_ms
            ],
        )?;

        insert_audit_tx(
            &tx,
            project.as_str(),
            now_ms,
            "answer",
            Some(external_id),
            "clarification answers merged",
            None,
            None,
        )?;

        let row =
            item_row_tx(&tx, project.as_str(), external_id)?.ok_or(StoreError::UnknownId)?;
        tx.commit()?;
        Ok(row)
    }

    // Explicit user deletion is the only operation that removes a row.
    // Direct children are re-attached to the grandparent, never orphaned.
    pub fn item_delete(
        &mut self,
        project: &ProjectId,
        external_id: &str,
    ) -> Result<usize, StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let Some(current) = item_row_tx(&tx, project.as_str(), external_id)? else {
            return Err(StoreError::UnknownId);
        };

        let reparented = tx.execute(
            "UPDATE items SET parent_id=?3, updated_at_ms=?4 WHERE project=?1 AND parent_id=?2",
            params![project.as_str(), current.id, current.parent_id, now_ms],
        )?;

        tx.execute(
            "DELETE FROM items WHERE project=?1 AND id=?2",
            params![project.as_str(), current.id],
        )?;

        insert_audit_tx(
            &tx,
            project.as_str(),
            now_ms,
            "delete",
            Some(external_id),
            &format!("deleted; {reparented} children re-attached"),
            None,
            None,
        )?;

        tx.commit()?;
        Ok(reparented)
    }
}
