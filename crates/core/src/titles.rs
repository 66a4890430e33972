#![forbid(unsafe_code)]

#[cfg(test)]
mod tests;

use crate::dedup::normalized_title;
use crate::model::{DraftItem, ItemSnapshot, ItemStatus, ItemType};
use std::collections::{BTreeMap, BTreeSet};

// Bounded disambiguation: one candidate per suffix source, then the
// external-id terminal fallback. Never loops unbounded.
pub const MAX_TITLE_ATTEMPTS: usize = 4;

const SUFFIX_SEPARATOR: &str = " · ";

// Guarantees sibling title uniqueness after dedup: items sharing
// (type, parent) with an already-claimed normalized title get a suffix
// derived from the parent title, source chunk, area, or external id.
pub fn enforce_unique_titles(
    items: Vec<DraftItem>,
    existing: &[ItemSnapshot],
) -> Vec<DraftItem> {
    let mut items = items;

    let batch_ids: BTreeSet<&str> = items
        .iter()
        .filter_map(|i| i.external_id.as_deref())
        .collect();

    // Sibling titles already persisted count as claimed, minus rows this
    // batch is about to rewrite and retired items.
    let mut claimed: BTreeMap<(u8, String), BTreeSet<String>> = BTreeMap::new();
    for snapshot in existing {
        if snapshot.status == ItemStatus::Obsolete {
            continue;
        }
        if batch_ids.contains(snapshot.external_id.as_str()) {
            continue;
        }
        claimed
            .entry(sibling_key(snapshot.item_type, snapshot.parent_external_id.as_deref()))
            .or_default()
            .insert(normalized_title(&snapshot.title));
    }

    let parent_titles: BTreeMap<String, String> = items
        .iter()
        .filter_map(|i| i.external_id.clone().map(|id| (id, i.title.clone())))
        .chain(
            existing
                .iter()
                .map(|s| (s.external_id.clone(), s.title.clone())),
        )
        .collect();

    for index in 0..items.len() {
        let key = sibling_key(items[index].item_type, items[index].parent_external_id.as_deref());
        let siblings = claimed.entry(key).or_default();

        let base_norm = normalized_title(&items[index].title);
        if siblings.insert(base_norm) {
            continue;
        }

        let base_title = items[index].title.clone();
        let mut resolved = None;
        for attempt in 0..MAX_TITLE_ATTEMPTS {
            let Some(suffix) = suffix_candidate(&items[index], attempt, &parent_titles) else {
                continue;
            };
            let candidate = format!("{base_title}{SUFFIX_SEPARATOR}{suffix}");
            if siblings.insert(normalized_title(&candidate)) {
                resolved = Some(candidate);
                break;
            }
        }

        let title = resolved.unwrap_or_else(|| {
            // Terminal fallback: the external id is unique within the pool
            // by construction, so this always terminates the retry chain.
            let id = items[index].external_id.as_deref().unwrap_or("T-000");
            let candidate = format!("{base_title}{SUFFIX_SEPARATOR}{id}");
            siblings.insert(normalized_title(&candidate));
            candidate
        });
        items[index].title = title;
    }

    items
}

fn sibling_key(item_type: ItemType, parent: Option<&str>) -> (u8, String) {
    let rank = match item_type {
        ItemType::Epic => 0,
        ItemType::Story => 1,
        ItemType::Task => 2,
    };
    (rank, parent.unwrap_or("root").to_string())
}

// Suffix sources, in priority order: parent title, source chunk identity,
// area, external id.
fn suffix_candidate(
    item: &DraftItem,
    attempt: usize,
    parent_titles: &BTreeMap<String, String>,
) -> Option<String> {
    match attempt {
        0 => item
            .parent_external_id
            .as_deref()
            .and_then(|id| parent_titles.get(id))
            .map(|title| normalized_title(title))
            .filter(|t| !t.is_empty()),
        1 => item
            .source_chunk_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string),
        2 => {
            let area = item.area.trim();
            if area.is_empty() {
                None
            } else {
                Some(area.to_uppercase())
            }
        }
        _ => item.external_id.clone(),
    }
}
