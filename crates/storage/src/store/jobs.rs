#![forbid(unsafe_code)]

use super::*;
use rusqlite::{OptionalExtension, params};

pub const JOB_STATUS_QUEUED: &str = "queued";
pub const JOB_STATUS_RUNNING: &str = "running";
pub const JOB_STATUS_DONE: &str = "done";
pub const JOB_STATUS_FAILED: &str = "failed";

const MIN_JOB_CLAIM_TTL_MS: u64 = 1_000;
const MAX_JOB_CLAIM_TTL_MS: u64 = 300_000; // 5 minutes
const MAX_JOB_SUMMARY_LEN: usize = 4_000;

fn normalize_runner_id(raw: &str) -> Result<String, StoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidInput("runner_id must not be empty"));
    }
    if trimmed.len() > 128 {
        return Err(StoreError::InvalidInput("runner_id is too long"));
    }
    Ok(trimmed.to_string())
}

fn normalize_summary(raw: Option<String>) -> Option<String> {
    let raw = raw?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_JOB_SUMMARY_LEN).collect())
}

fn read_job_row(row: &rusqlite::Row<'_>, id: String) -> Result<JobRow, rusqlite::Error> {
    Ok(JobRow {
        id,
        revision: row.get(0)?,
        status: row.get(1)?,
        doc_version: row.get(2)?,
        runner: row.get(3)?,
        claim_expires_at_ms: row.get(4)?,
        summary: row.get(5)?,
        created_at_ms: row.get(6)?,
        updated_at_ms: row.get(7)?,
        completed_at_ms: row.get(8)?,
    })
}

const JOB_SELECT: &str = r#"
    SELECT revision, status, doc_version, runner, claim_expires_at_ms, summary,
           created_at_ms, updated_at_ms, completed_at_ms
    FROM jobs
"#;

impl SqliteStore {
    pub fn job_enqueue(
        &mut self,
        project: &ProjectId,
        doc_version: Option<i64>,
    ) -> Result<JobRow, StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        ensure_project_tx(&tx, project.as_str(), now_ms)?;

        let seq = next_counter_tx(&tx, project.as_str(), "job_seq")?;
        let id = format!("G-{seq:03}");

        tx.execute(
            r#"
            INSERT INTO jobs(
              project, id, revision, status, doc_version, runner, claim_expires_at_ms,
              summary, created_at_ms, updated_at_ms, completed_at_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                project.as_str(),
                id,
                0i64,
                JOB_STATUS_QUEUED,
                doc_version,
                Option::<String>::None,
                Option::<i64>::None,
                Option::<String>::None,
                now_ms,
                now_ms,
                Option::<i64>::None,
            ],
        )?;

        let job = JobRow {
            id: id.clone(),
            revision: 0,
            status: JOB_STATUS_QUEUED.to_string(),
            doc_version,
            runner: None,
            claim_expires_at_ms: None,
            summary: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            completed_at_ms: None,
        };

        tx.commit()?;
        Ok(job)
    }

    // Claims the oldest queued job. The transition is a conditional update
    // guarded on status and revision, so two concurrent pollers can never
    // both win the same job; the loser just sees None and polls again.
    pub fn job_claim_next(
        &mut self,
        runner_id: &str,
        lease_ttl_ms: u64,
    ) -> Result<Option<ClaimedJob>, StoreError> {
        let runner_id = normalize_runner_id(runner_id)?;
        let ttl_ms = lease_ttl_ms.clamp(MIN_JOB_CLAIM_TTL_MS, MAX_JOB_CLAIM_TTL_MS);
        let now_ms = now_ms();
        let claim_expires_at_ms = now_ms.saturating_add(ttl_ms.min(i64::MAX as u64) as i64);

        let tx = self.conn.transaction()?;

        let candidate: Option<(String, String, i64)> = tx
            .query_row(
                r#"
                SELECT project, id, revision
                FROM jobs
                WHERE status=?1
                ORDER BY created_at_ms ASC, project ASC, id ASC
                LIMIT 1
                "#,
                params![JOB_STATUS_QUEUED],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((project, id, revision)) = candidate else {
            return Ok(None);
        };

        let changed = tx.execute(
            r#"
            UPDATE jobs
            SET revision=?4, status=?5, runner=?6, claim_expires_at_ms=?7, updated_at_ms=?8
            WHERE project=?1 AND id=?2 AND revision=?3 AND status=?9
            "#,
            params![
                project,
                id,
                revision,
                revision + 1,
                JOB_STATUS_RUNNING,
                runner_id,
                claim_expires_at_ms,
                now_ms,
                JOB_STATUS_QUEUED
            ],
        )?;
        if changed != 1 {
            return Ok(None);
        }

        let sql = format!("{JOB_SELECT} WHERE project=?1 AND id=?2");
        let job = tx.query_row(&sql, params![project, id], |row| {
            read_job_row(row, id.clone())
        })?;

        tx.commit()?;
        Ok(Some(ClaimedJob { project, job }))
    }

    // Jobs stuck in running past their lease go back to queued: execution is
    // at-least-once, which the idempotent merge stages make safe to re-run.
    pub fn job_requeue_stale(&mut self) -> Result<usize, StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        let reset = tx.execute(
            r#"
            UPDATE jobs
            SET revision=revision+1, status=?1, runner=NULL, claim_expires_at_ms=NULL, updated_at_ms=?2
            WHERE status=?3 AND claim_expires_at_ms IS NOT NULL AND claim_expires_at_ms <= ?2
            "#,
            params![JOB_STATUS_QUEUED, now_ms, JOB_STATUS_RUNNING],
        )?;
        tx.commit()?;
        Ok(reset)
    }

    pub fn job_complete(
        &mut self,
        project: &ProjectId,
        job_id: &str,
        runner_id: &str,
        claim_revision: i64,
        summary: Option<String>,
    ) -> Result<JobRow, StoreError> {
        self.finish_job(
            project,
            job_id,
            runner_id,
            claim_revision,
            JOB_STATUS_DONE,
            summary,
        )
    }

    pub fn job_fail(
        &mut self,
        project: &ProjectId,
        job_id: &str,
        runner_id: &str,
        claim_revision: i64,
        reason: Option<String>,
    ) -> Result<JobRow, StoreError> {
        self.finish_job(
            project,
            job_id,
            runner_id,
            claim_revision,
            JOB_STATUS_FAILED,
            reason,
        )
    }

    fn finish_job(
        &mut self,
        project: &ProjectId,
        job_id: &str,
        runner_id: &str,
        claim_revision: i64,
        status: &str,
        summary: Option<String>,
    ) -> Result<JobRow, StoreError> {
        let runner_id = normalize_runner_id(runner_id)?;
        if claim_revision < 0 {
            return Err(StoreError::InvalidInput("claim_revision must be >= 0"));
        }
        let summary = normalize_summary(summary);
        let now_ms = now_ms();

        let tx = self.conn.transaction()?;

        let current: Option<(i64, String, Option<String>)> = tx
            .query_row(
                "SELECT revision, status, runner FROM jobs WHERE project=?1 AND id=?2",
                params![project.as_str(), job_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((revision, current_status, runner)) = current else {
            return Err(StoreError::UnknownId);
        };
        if current_status != JOB_STATUS_RUNNING {
            return Err(StoreError::JobNotRunning {
                job_id: job_id.to_string(),
                status: current_status,
            });
        }
        if runner.as_deref() != Some(runner_id.as_str()) || revision != claim_revision {
            return Err(StoreError::JobClaimMismatch {
                job_id: job_id.to_string(),
                expected_runner: runner,
                actual_runner: runner_id,
                expected_revision: revision,
                actual_revision: claim_revision,
            });
        }

        tx.execute(
            r#"
            UPDATE jobs
            SET revision=?3, status=?4, summary=?5, claim_expires_at_ms=NULL,
                updated_at_ms=?6, completed_at_ms=?6
            WHERE project=?1 AND id=?2 AND status=?7 AND revision=?8 AND runner=?9
            "#,
            params![
                project.as_str(),
                job_id,
                revision + 1,
                status,
                summary,
                now_ms,
                JOB_STATUS_RUNNING,
                claim_revision,
                runner_id,
            ],
        )?;

        let sql = format!("{JOB_SELECT} WHERE project=?1 AND id=?2");
        let job = tx.query_row(&sql, params![project.as_str(), job_id], |row| {
            read_job_row(row, job_id.to_string())
        })?;

        tx.commit()?;
        Ok(job)
    }

    pub fn job_get(
        &self,
        project: &ProjectId,
        job_id: &str,
    ) -> Result<Option<JobRow>, StoreError> {
        let sql = format!("{JOB_SELECT} WHERE project=?1 AND id=?2");
        Ok(self
            .conn
            .query_row(&sql, params![project.as_str(), job_id], |row| {
                read_job_row(row, job_id.to_string())
            })
            .optional()?)
    }

    pub fn jobs_list(&self, project: &ProjectId) -> Result<Vec<JobRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT revision, status, doc_version, runner, claim_expires_at_ms, summary,
                   created_at_ms, updated_at_ms, completed_at_ms, id
            FROM jobs
            WHERE project=?1
            ORDER BY created_at_ms ASC, id ASC
            "#,
        )?;
        let mut rows = stmt.query(params![project.as_str()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(9)?;
            out.push(read_job_row(row, id)?);
        }
        Ok(out)
    }
}
