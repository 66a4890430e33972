#![forbid(unsafe_code)]


use crate::ids::external;
use crate::model::{Chunk, DraftItem, ItemSnapshot, ItemStatus, ItemType, QaPair};
use std::collections::{BTreeMap, BTreeSet};

const SNIPPET_MAX_CHARS: usize = 240;
const PLACEHOLDER_EPIC_TITLES: &[&str] = &["", "general", "default", "misc", "untitled", "epic"];

pub fn story_default_questions() -> Vec<QaPair> {
    vec![
        QaPair::unanswered("¿Qué criterios de aceptación confirman esta historia?"),
        QaPair::unanswered("¿Qué roles de usuario están afectados?"),
    ]
}

pub fn task_default_questions() -> Vec<QaPair> {
    vec![QaPair::unanswered(
        "¿Existen restricciones técnicas o dependencias para esta tarea?",
    )]
}

// Multi-valued area inputs keep only their first token; empty degrades to
// "other".
pub fn normalize_area(raw: &str) -> String {
    let first = raw
        .split([',', ';', '|', '/'])
        .next()
        .unwrap_or("")
        .split_whitespace()
        .next()
        .unwrap_or("");
    if first.is_empty() {
        "other".to_string()
    } else {
        first.to_lowercase()
    }
}

// Call-scoped normalization state. Explicitly passed through so concurrent
// runs for different projects cannot share caches.
pub struct NormalizeContext {
    used_ids: BTreeSet<String>,
    next_seq: u64,
    fallback_story_by_epic: BTreeMap<String, String>,
}

impl NormalizeContext {
    pub fn new(existing: &[ItemSnapshot]) -> Self {
        let mut ctx = Self {
            used_ids: BTreeSet::new(),
            next_seq: 1,
            fallback_story_by_epic: BTreeMap::new(),
        };
        for snapshot in existing {
            ctx.claim(&snapshot.external_id);
        }
        ctx
    }

    // Pool membership covers the existing store plus every id declared in
    // the batch; minting is sequential past the highest one seen.
    pub fn claim(&mut self, id: &str) {
        self.used_ids.insert(id.to_string());
        if let Some(seq) = external::parse_seq(id) {
            self.next_seq = self.next_seq.max(seq + 1);
        }
    }

    // Raises the mint cursor past an externally persisted floor, so ids
    // released by deleted rows are never handed out again.
    pub fn reserve_through(&mut self, seq: u64) {
        self.next_seq = self.next_seq.max(seq + 1);
    }

    pub fn mint(&mut self) -> String {
        loop {
            let candidate = external::format(self.next_seq);
            self.next_seq += 1;
            if self.used_ids.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

// Repairs or creates parent links so every item ends with a valid ancestor
// chain: Task -> Story -> Epic. Total over arbitrary input; unresolved
// references degrade to synthesized ancestors instead of failing.
pub fn normalize(
    drafts: Vec<DraftItem>,
    chunks: &[Chunk],
    existing: &[ItemSnapshot],
    ctx: &mut NormalizeContext,
) -> Vec<DraftItem> {
    let mut items = drafts;

    for item in &items {
        if let Some(id) = &item.external_id {
            ctx.claim(id);
        }
    }
    for item in &mut items {
        if item
            .external_id
            .as_deref()
            .map(str::trim)
            .is_none_or(str::is_empty)
        {
            item.external_id = Some(ctx.mint());
        }
    }

    let chunk_by_id: BTreeMap<&str, &Chunk> =
        chunks.iter().map(|c| (c.id.as_str(), c)).collect();

    // At least one Epic must exist: reuse an existing one as the default, or
    // synthesize one from the first chunk.
    let mut synthesized: Vec<DraftItem> = Vec::new();
    let has_batch_epic = items.iter().any(|i| i.item_type == ItemType::Epic);
    let existing_default_epic = existing
        .iter()
        .find(|s| s.item_type == ItemType::Epic && s.status != ItemStatus::Obsolete)
        .map(|s| s.external_id.clone());

    if !has_batch_epic && existing_default_epic.is_none() {
        let mut epic = match chunks.first() {
            Some(chunk) => {
                let mut epic = DraftItem::new(ItemType::Epic, epic_title_from_chunk(chunk));
                epic.description = chunk.content.clone();
                epic.source_chunk_id = Some(chunk.id.clone());
                epic
            }
            None => DraftItem::new(ItemType::Epic, "General"),
        };
        epic.external_id = Some(ctx.mint());
        synthesized.push(epic);
    }

    // Placeholder-titled epics pick up a real title from chunk content when
    // any is available.
    for item in &mut items {
        if item.item_type != ItemType::Epic {
            continue;
        }
        if !PLACEHOLDER_EPIC_TITLES.contains(&item.title.trim().to_lowercase().as_str()) {
            continue;
        }
        let chunk = item
            .source_chunk_id
            .as_deref()
            .and_then(|id| chunk_by_id.get(id).copied())
            .or_else(|| chunks.first());
        if let Some(chunk) = chunk {
            item.title = epic_title_from_chunk(chunk);
        }
    }

    // Epics are roots; a declared parent on one is inconsistent input.
    for item in &mut items {
        if item.item_type == ItemType::Epic {
            item.parent_external_id = None;
        }
    }

    let existing_by_id: BTreeMap<&str, &ItemSnapshot> = existing
        .iter()
        .map(|s| (s.external_id.as_str(), s))
        .collect();
    let batch_types: BTreeMap<String, ItemType> = items
        .iter()
        .chain(synthesized.iter())
        .filter_map(|i| i.external_id.clone().map(|id| (id, i.item_type)))
        .collect();

    let type_of = |id: &str| -> Option<ItemType> {
        batch_types.get(id).copied().or_else(|| {
            existing_by_id
                .get(id)
                .filter(|s| s.status != ItemStatus::Obsolete)
                .map(|s| s.item_type)
        })
    };

    // Chunk -> Epic, batch epics first, then synthesized, then existing.
    let mut epic_by_chunk: BTreeMap<String, String> = BTreeMap::new();
    for item in items.iter().chain(synthesized.iter()) {
        if item.item_type == ItemType::Epic
            && let (Some(chunk_id), Some(id)) = (&item.source_chunk_id, &item.external_id)
        {
            epic_by_chunk
                .entry(chunk_id.clone())
                .or_insert_with(|| id.clone());
        }
    }
    for snapshot in existing {
        if snapshot.item_type == ItemType::Epic
            && snapshot.status != ItemStatus::Obsolete
            && let Some(chunk_id) = &snapshot.source_chunk_id
        {
            epic_by_chunk
                .entry(chunk_id.clone())
                .or_insert_with(|| snapshot.external_id.clone());
        }
    }

    let default_epic_id = items
        .iter()
        .chain(synthesized.iter())
        .find(|i| i.item_type == ItemType::Epic)
        .and_then(|i| i.external_id.clone())
        .or(existing_default_epic)
        .unwrap_or_default();

    // Stories resolve before tasks so task attachment can see their final
    // parents. Resolution order: explicit Epic parent, chunk-derived Epic,
    // default Epic.
    let mut stories_in_order: Vec<(String, String)> = Vec::new();
    for item in &mut items {
        if item.item_type != ItemType::Story {
            continue;
        }
        let explicit = item
            .parent_external_id
            .as_deref()
            .filter(|id| type_of(id) == Some(ItemType::Epic))
            .map(str::to_string);
        let resolved = explicit
            .or_else(|| {
                item.source_chunk_id
                    .as_deref()
                    .and_then(|chunk_id| epic_by_chunk.get(chunk_id).cloned())
            })
            .unwrap_or_else(|| default_epic_id.clone());
        item.parent_external_id = Some(resolved.clone());
        if let Some(id) = &item.external_id {
            stories_in_order.push((id.clone(), resolved));
        }
    }
    for snapshot in existing {
        if snapshot.item_type == ItemType::Story
            && snapshot.status != ItemStatus::Obsolete
            && let Some(parent) = &snapshot.parent_external_id
        {
            stories_in_order.push((snapshot.external_id.clone(), parent.clone()));
        }
    }

    let epic_titles: BTreeMap<String, String> = items
        .iter()
        .chain(synthesized.iter())
        .filter(|i| i.item_type == ItemType::Epic)
        .filter_map(|i| i.external_id.clone().map(|id| (id, i.title.clone())))
        .chain(
            existing
                .iter()
                .filter(|s| s.item_type == ItemType::Epic)
                .map(|s| (s.external_id.clone(), s.title.clone())),
        )
        .collect();

    // Tasks must never attach directly to an Epic: an Epic parent degrades
    // to exactly one cached fallback Story under that Epic.
    for item in &mut items {
        if item.item_type != ItemType::Task {
            continue;
        }
        let explicit_type = item.parent_external_id.as_deref().and_then(type_of);
        let resolved = match (item.parent_external_id.as_deref(), explicit_type) {
            (Some(parent), Some(ItemType::Story)) => parent.to_string(),
            (Some(parent), Some(ItemType::Epic)) => fallback_story_id(
                parent,
                &epic_titles,
                ctx,
                &mut synthesized,
                &mut stories_in_order,
            ),
            _ => {
                let epic_id = item
                    .source_chunk_id
                    .as_deref()
                    .and_then(|chunk_id| epic_by_chunk.get(chunk_id).cloned())
                    .unwrap_or_else(|| default_epic_id.clone());
                match stories_in_order
                    .iter()
                    .find(|(_, epic)| *epic == epic_id)
                    .map(|(story, _)| story.clone())
                {
                    Some(story) => story,
                    None => fallback_story_id(
                        &epic_id,
                        &epic_titles,
                        ctx,
                        &mut synthesized,
                        &mut stories_in_order,
                    ),
                }
            }
        };
        item.parent_external_id = Some(resolved);
    }

    items.extend(synthesized);

    for item in &mut items {
        apply_field_defaults(item, &chunk_by_id);
    }

    items
}

fn fallback_story_id(
    epic_id: &str,
    epic_titles: &BTreeMap<String, String>,
    ctx: &mut NormalizeContext,
    synthesized: &mut Vec<DraftItem>,
    stories_in_order: &mut Vec<(String, String)>,
) -> String {
    if let Some(existing) = ctx.fallback_story_by_epic.get(epic_id) {
        return existing.clone();
    }
    let epic_title = epic_titles
        .get(epic_id)
        .map(String::as_str)
        .unwrap_or("General");
    let mut story = DraftItem::new(ItemType::Story, format!("{epic_title} stories"));
    story.parent_external_id = Some(epic_id.to_string());
    story.external_id = Some(ctx.mint());
    let id = story.external_id.clone().unwrap_or_default();
    ctx.fallback_story_by_epic
        .insert(epic_id.to_string(), id.clone());
    stories_in_order.push((id.clone(), epic_id.to_string()));
    synthesized.push(story);
    id
}

fn apply_field_defaults(item: &mut DraftItem, chunk_by_id: &BTreeMap<&str, &Chunk>) {
    item.title = item.title.trim().to_string();
    if item.title.is_empty() {
        item.title = "Untitled".to_string();
    }
    item.area = normalize_area(&item.area);

    if item.questions.is_empty() {
        item.questions = match item.item_type {
            ItemType::Story => story_default_questions(),
            ItemType::Task => task_default_questions(),
            ItemType::Epic => Vec::new(),
        };
    }

    if item.source_snippet.as_deref().map(str::trim).is_none_or(str::is_empty)
        && let Some(chunk) = item
            .source_chunk_id
            .as_deref()
            .and_then(|id| chunk_by_id.get(id))
    {
        item.source_snippet = Some(truncate_chars(&chunk.content, SNIPPET_MAX_CHARS));
    }
}

fn epic_title_from_chunk(chunk: &Chunk) -> String {
    let title = chunk.title.trim();
    if !title.is_empty() {
        return title.to_string();
    }
    chunk
        .content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| truncate_chars(line, 80))
        .unwrap_or_else(|| "General".to_string())
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
