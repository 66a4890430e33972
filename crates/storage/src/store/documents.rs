#![forbid(unsafe_code)]

use super::*;
use rusqlite::{OptionalExtension, params};
use tm_core::model::Chunk;

impl SqliteStore {
    // Persists a new document version with its ordered chunks. Versions are
    // sequential per project; chunks are immutable once written.
    pub fn document_create(
        &mut self,
        project: &ProjectId,
        title: &str,
        chunks: &[Chunk],
    ) -> Result<i64, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::InvalidInput("document title must not be empty"));
        }

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        ensure_project_tx(&tx, project.as_str(), now_ms)?;

        let version = next_counter_tx(&tx, project.as_str(), "doc_version")?;
        tx.execute(
            "INSERT INTO documents(project, version, title, created_at_ms) VALUES (?1, ?2, ?3, ?4)",
            params![project.as_str(), version, title, now_ms],
        )?;

        for (ord, chunk) in chunks.iter().enumerate() {
            if chunk.id.trim().is_empty() {
                return Err(StoreError::InvalidInput("chunk id must not be empty"));
            }
            tx.execute(
                r#"
                INSERT INTO chunks(project, doc_version, ord, chunk_id, title, content)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    project.as_str(),
                    version,
                    ord as i64,
                    chunk.id,
                    chunk.title,
                    chunk.content
                ],
            )?;
        }

        insert_audit_tx(
            &tx,
            project.as_str(),
            now_ms,
            "document",
            None,
            &format!("version {version}: {title} ({} chunks)", chunks.len()),
            None,
            Some(version),
        )?;

        tx.commit()?;
        Ok(version)
    }

    pub fn document_latest_version(
        &self,
        project: &ProjectId,
    ) -> Result<Option<i64>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT MAX(version) FROM documents WHERE project=?1",
                params![project.as_str()],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten())
    }

    pub fn document_previous_version(
        &self,
        project: &ProjectId,
        version: i64,
    ) -> Result<Option<i64>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT MAX(version) FROM documents WHERE project=?1 AND version < ?2",
                params![project.as_str(), version],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten())
    }

    pub fn documents_list(&self, project: &ProjectId) -> Result<Vec<DocumentRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT version, title, created_at_ms
            FROM documents
            WHERE project=?1
            ORDER BY version ASC
            "#,
        )?;
        let mut rows = stmt.query(params![project.as_str()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(DocumentRow {
                version: row.get(0)?,
                title: row.get(1)?,
                created_at_ms: row.get(2)?,
            });
        }
        Ok(out)
    }

    pub fn chunks_for_version(
        &self,
        project: &ProjectId,
        version: i64,
    ) -> Result<Vec<Chunk>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT chunk_id, title, content
            FROM chunks
            WHERE project=?1 AND doc_version=?2
            ORDER BY ord ASC
            "#,
        )?;
        let mut rows = stmt.query(params![project.as_str(), version])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(Chunk {
                id: row.get(0)?,
                title: row.get(1)?,
                content: row.get(2)?,
            });
        }
        Ok(out)
    }
}
