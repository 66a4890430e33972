#![forbid(unsafe_code)]


use crate::model::{
    ActionBundle, ChangeEvent, ChangeKind, Chunk, ClientQuestion, DraftItem, ItemPatch,
    ItemSnapshot, ItemStatus, ItemType, Priority,
};
use crate::normalize::story_default_questions;
use std::collections::{BTreeMap, BTreeSet};

const SNIPPET_MAX_CHARS: usize = 240;

pub fn story_default_acceptance_criteria() -> Vec<String> {
    vec!["Cubre el requisito descrito en la sección de origen".to_string()]
}

// Turns change events plus the current snapshot into an action bundle.
// Ambiguous mappings are never guessed: they become client questions.
// `proposal` carries externally generated candidates; when empty (or when it
// covers none of an added chunk's content) the deterministic local defaults
// take over, so generator failure upstream is invisible here.
pub fn plan_reconciliation(
    events: &[ChangeEvent],
    snapshot: &[ItemSnapshot],
    new_chunks: &[Chunk],
    proposal: &[DraftItem],
) -> ActionBundle {
    let chunk_by_id: BTreeMap<&str, &Chunk> =
        new_chunks.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut bundle = ActionBundle::default();
    let mut patched: BTreeSet<String> = BTreeSet::new();
    let mut obsoleted: BTreeSet<String> = BTreeSet::new();

    for event in events {
        match event.kind {
            ChangeKind::Added => {
                for chunk_id in &event.new_chunk_ids {
                    let proposed: Vec<&DraftItem> = proposal
                        .iter()
                        .filter(|p| p.source_chunk_id.as_deref() == Some(chunk_id.as_str()))
                        .collect();
                    if proposed.is_empty() {
                        if let Some(chunk) = chunk_by_id.get(chunk_id.as_str()) {
                            bundle.creates.push(default_create(chunk));
                        }
                    } else {
                        bundle.creates.extend(proposed.into_iter().cloned());
                    }
                }
            }
            ChangeKind::Modified => {
                let matches = traced_items(snapshot, event);
                if matches.is_empty() {
                    bundle.questions.push(ClientQuestion {
                        question: format!(
                            "¿Qué elementos del backlog corresponden a la sección modificada ({})?",
                            event.summary
                        ),
                        priority: Priority::Medium,
                        reason: "no items trace to the modified chunk".to_string(),
                    });
                    continue;
                }
                let new_chunk = event
                    .new_chunk_ids
                    .first()
                    .and_then(|id| chunk_by_id.get(id.as_str()));
                for item in matches {
                    if !patched.insert(item.external_id.clone()) {
                        continue;
                    }
                    let mut patch = ItemPatch::for_item(&item.external_id);
                    if let Some(chunk) = new_chunk {
                        // Amend the description from the rewritten source and
                        // re-point traceability at the surviving chunk.
                        patch.description = Some(chunk.content.clone());
                        patch.source_chunk_id = Some(chunk.id.clone());
                    }
                    bundle.updates.push(patch);
                }
            }
            ChangeKind::Removed => {
                let matches = traced_items(snapshot, event);
                if matches.is_empty() {
                    bundle.questions.push(ClientQuestion {
                        question: format!(
                            "¿Qué elementos del backlog deben marcarse obsoletos por la sección eliminada ({})?",
                            event.summary
                        ),
                        priority: Priority::High,
                        reason: "no items trace to the removed chunk".to_string(),
                    });
                    continue;
                }
                for item in matches {
                    if obsoleted.insert(item.external_id.clone()) {
                        bundle.obsoletes.push(item.external_id.clone());
                    }
                }
            }
        }
    }

    bundle
}

// Items whose traceability points at any chunk touched by the event.
// Already-obsolete rows are left alone.
fn traced_items<'a>(snapshot: &'a [ItemSnapshot], event: &ChangeEvent) -> Vec<&'a ItemSnapshot> {
    let touched: BTreeSet<&str> = event
        .old_chunk_ids
        .iter()
        .chain(event.new_chunk_ids.iter())
        .map(String::as_str)
        .collect();
    snapshot
        .iter()
        .filter(|item| item.status != ItemStatus::Obsolete)
        .filter(|item| {
            item.source_chunk_id
                .as_deref()
                .is_some_and(|id| touched.contains(id))
        })
        .collect()
}

// Local heuristic create for an added chunk: a high-priority story carrying
// the chunk text, generic acceptance criteria, and the generic prompt set.
fn default_create(chunk: &Chunk) -> DraftItem {
    let title = if chunk.title.trim().is_empty() {
        chunk
            .content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("Untitled")
            .to_string()
    } else {
        chunk.title.trim().to_string()
    };
    let mut item = DraftItem::new(ItemType::Story, title);
    item.priority = Priority::High;
    item.description = chunk.content.clone();
    item.acceptance_criteria = story_default_acceptance_criteria();
    item.questions = story_default_questions();
    item.source_chunk_id = Some(chunk.id.clone());
    item.source_snippet = Some(chunk.content.chars().take(SNIPPET_MAX_CHARS).collect());
    item
}
