#![forbid(unsafe_code)]

use super::*;
use rusqlite::params;

const MAX_AUDIT_LIST_LIMIT: usize = 500;

impl SqliteStore {
    pub fn audit_list(
        &self,
        project: &ProjectId,
        since_seq: i64,
        limit: usize,
    ) -> Result<Vec<AuditRow>, StoreError> {
        let limit = limit.clamp(1, MAX_AUDIT_LIST_LIMIT);
        let mut stmt = self.conn.prepare(
            r#"
            SELECT seq, ts_ms, action, external_id, detail, from_doc_version, to_doc_version
            FROM audit_log
            WHERE project=?1 AND seq > ?2
            ORDER BY seq ASC
            LIMIT ?3
            "#,
        )?;
        let mut rows = stmt.query(params![project.as_str(), since_seq, limit as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(AuditRow {
                seq: row.get(0)?,
                ts_ms: row.get(1)?,
                action: row.get(2)?,
                external_id: row.get(3)?,
                detail: row.get(4)?,
                from_doc_version: row.get(5)?,
                to_doc_version: row.get(6)?,
            });
        }
        Ok(out)
    }
}
