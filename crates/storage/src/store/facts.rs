#![forbid(unsafe_code)]

use super::*;
use rusqlite::{OptionalExtension, params};

impl SqliteStore {
    pub fn ledger_get(&self, project: &ProjectId) -> Result<String, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT content FROM fact_ledgers WHERE project=?1",
                params![project.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .unwrap_or_default())
    }

    // Merges incoming fact lines into the stored ledger (newest value per
    // question, bounded length) and returns the rendered result.
    pub fn ledger_merge(
        &mut self,
        project: &ProjectId,
        incoming: &str,
    ) -> Result<String, StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        ensure_project_tx(&tx, project.as_str(), now_ms)?;

        let current: String = tx
            .query_row(
                "SELECT content FROM fact_ledgers WHERE project=?1",
                params![project.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or_default();

        let merged = tm_core::facts::merge_ledger(&current, incoming);
        let rendered = merged.render();

        tx.execute(
            r#"
            INSERT INTO fact_ledgers(project, content, updated_at_ms)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(project) DO UPDATE SET content=excluded.content, updated_at_ms=excluded.updated_at_ms
            "#,
            params![project.as_str(), rendered, now_ms],
        )?;

        insert_audit_tx(
            &tx,
            project.as_str(),
            now_ms,
            "ledger",
            None,
            &format!("{} confirmed facts", merged.entries().len()),
            None,
            None,
        )?;

        tx.commit()?;
        Ok(rendered)
    }

    // Persists a fact-propagation pass as one atomic unit: either every
    // touched item carries its filled answers, or none does.
    pub fn apply_propagation(
        &mut self,
        project: &ProjectId,
        updates: &[PropagationUpdate],
        filled: usize,
    ) -> Result<usize, StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        for update in updates {
            let changed = tx.execute(
                r#"
                UPDATE items
                SET revision=revision+1, description=?3, questions_json=?4, updated_at_ms=?5
                WHERE project=?1 AND external_id=?2
                "#,
                params![
                    project.as_str(),
                    update.external_id,
                    update.description,
                    encode_qa_pairs(&update.questions),
                    now_ms
                ],
            )?;
            if changed != 1 {
                return Err(StoreError::UnknownId);
            }
        }

        if !updates.is_empty() {
            insert_audit_tx(
                &tx,
                project.as_str(),
                now_ms,
                "recalculate",
                None,
                &format!("{filled} answers filled across {} items", updates.len()),
                None,
                None,
            )?;
        }

        tx.commit()?;
        Ok(updates.len())
    }
}
