#![forbid(unsafe_code)]

use crate::chunks::{ChunkInput, build_chunks};
use crate::generator::{Generator, resolve_proposal};
use crate::{Engine, EngineError};
use tm_core::ids::ProjectId;
use tm_core::model::{ActionBundle, ChangeEvent, Chunk, ClientQuestion, DraftItem, ItemSnapshot};
use tm_core::normalize::{NormalizeContext, normalize};
use tm_core::{dedup, diff, plan, titles};
use tm_storage::{ApplyOutcome, ApplyRequest, JobRow};

#[derive(Clone, Debug)]
pub struct ReconcileOutcome {
    pub doc_version: i64,
    pub events: Vec<ChangeEvent>,
    pub outcome: ApplyOutcome,
    pub questions: Vec<ClientQuestion>,
}

impl Engine {
    // Persists a new document version and reconciles the backlog against it
    // in one pass: diff -> plan -> normalize -> dedup -> titles -> apply.
    // The very first version has no predecessor, so every chunk arrives as
    // an added event and the run degenerates to initial generation.
    pub fn ingest_document(
        &mut self,
        project: &ProjectId,
        title: &str,
        sections: &[ChunkInput],
        generator: Option<&dyn Generator>,
    ) -> Result<ReconcileOutcome, EngineError> {
        let chunks = build_chunks(sections);
        let version = self.store.document_create(project, title, &chunks)?;
        self.reconcile_version(project, version, generator)
    }

    // Persists a new version and queues reconciliation for a background
    // worker instead of running it inline.
    pub fn enqueue_generation(
        &mut self,
        project: &ProjectId,
        title: &str,
        sections: &[ChunkInput],
    ) -> Result<(i64, JobRow), EngineError> {
        let chunks = build_chunks(sections);
        let version = self.store.document_create(project, title, &chunks)?;
        let job = self.store.job_enqueue(project, Some(version))?;
        Ok((version, job))
    }

    // Reconciles a persisted document version against its predecessor.
    // Separate from ingest so queued generation jobs can re-run it safely:
    // the stages are idempotent over the same inputs.
    pub fn reconcile_version(
        &mut self,
        project: &ProjectId,
        version: i64,
        generator: Option<&dyn Generator>,
    ) -> Result<ReconcileOutcome, EngineError> {
        let new_chunks = self.store.chunks_for_version(project, version)?;
        let prior_version = self.store.document_previous_version(project, version)?;
        let old_chunks = match prior_version {
            Some(prior) => self.store.chunks_for_version(project, prior)?,
            None => Vec::new(),
        };

        let events = diff::diff_chunks(&old_chunks, &new_chunks);
        let snapshot = self.store.items_snapshot(project)?;

        // The generator only ever sees chunks the differ reported as new
        // material; its proposal is keyed back by source chunk id.
        let added_chunks: Vec<Chunk> = {
            let added_ids: std::collections::BTreeSet<&str> = events
                .iter()
                .filter(|e| e.kind == tm_core::model::ChangeKind::Added)
                .flat_map(|e| e.new_chunk_ids.iter().map(String::as_str))
                .collect();
            new_chunks
                .iter()
                .filter(|c| added_ids.contains(c.id.as_str()))
                .cloned()
                .collect()
        };
        let proposal = if added_chunks.is_empty() {
            Vec::new()
        } else {
            resolve_proposal(generator, &added_chunks)
        };

        let bundle = plan::plan_reconciliation(&events, &snapshot, &new_chunks, &proposal);
        let questions = bundle.questions.clone();

        let creates = self.canonicalize(project, bundle.creates, &new_chunks, &snapshot)?;
        let outcome = self.store.apply_actions(
            project,
            ApplyRequest {
                bundle: ActionBundle {
                    creates,
                    updates: bundle.updates,
                    obsoletes: bundle.obsoletes,
                    questions: bundle.questions,
                },
                from_doc_version: prior_version,
                to_doc_version: Some(version),
            },
        )?;

        Ok(ReconcileOutcome {
            doc_version: version,
            events,
            outcome,
            questions,
        })
    }

    // Raw candidates -> canonical batch: repair hierarchy, collapse
    // duplicates, enforce sibling title uniqueness.
    fn canonicalize(
        &mut self,
        project: &ProjectId,
        creates: Vec<DraftItem>,
        chunks: &[Chunk],
        snapshot: &[ItemSnapshot],
    ) -> Result<Vec<DraftItem>, EngineError> {
        if creates.is_empty() {
            return Ok(creates);
        }
        let mut ctx = NormalizeContext::new(snapshot);
        ctx.reserve_through(self.store.item_seq_floor(project)?);
        let normalized = normalize(creates, chunks, snapshot, &mut ctx);
        let deduped = dedup::dedup_items(normalized);
        Ok(titles::enforce_unique_titles(deduped, snapshot))
    }
}

// Library composition of the dedup + title stages for callers holding an
// already-normalized batch.
pub fn dedup_and_enforce_titles(
    items: Vec<DraftItem>,
    existing: &[ItemSnapshot],
) -> Vec<DraftItem> {
    titles::enforce_unique_titles(dedup::dedup_items(items), existing)
}
