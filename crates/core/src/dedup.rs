#![forbid(unsafe_code)]

#[cfg(test)]
mod tests;

use crate::model::{DraftItem, ItemType};
use crate::qa;
use std::collections::{BTreeMap, BTreeSet};

pub const AREA_SUFFIX_SEPARATOR: &str = " · ";

// Collision key: type + owning parent + normalized title. Items without a
// parent group under a shared root bucket.
fn group_key(item: &DraftItem) -> (u8, String, String) {
    let parent = item
        .parent_external_id
        .clone()
        .unwrap_or_else(|| "root".to_string());
    (type_rank(item.item_type), parent, normalized_title(&item.title))
}

fn type_rank(item_type: ItemType) -> u8 {
    match item_type {
        ItemType::Epic => 0,
        ItemType::Story => 1,
        ItemType::Task => 2,
    }
}

pub fn normalized_title(title: &str) -> String {
    strip_type_prefix(title.trim()).trim().to_lowercase()
}

// Generators sometimes emit titles like "Story: Login"; the tier is already
// carried by the item type, so the prefix does not count for identity.
fn strip_type_prefix(title: &str) -> &str {
    for prefix in ["epic", "story", "task", "historia", "tarea"] {
        let Some(head) = title.get(..prefix.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(prefix) {
            continue;
        }
        let rest = title[prefix.len()..].trim_start();
        if let Some(stripped) = rest.strip_prefix(':').or_else(|| rest.strip_prefix('-')) {
            return stripped.trim();
        }
    }
    title
}

// Collapses or disambiguates items colliding on (type, parent, title).
// Idempotent: a second pass over its own output is the identity.
pub fn dedup_items(items: Vec<DraftItem>) -> Vec<DraftItem> {
    let mut order: Vec<(u8, String, String)> = Vec::new();
    let mut groups: BTreeMap<(u8, String, String), Vec<DraftItem>> = BTreeMap::new();
    for item in items {
        let key = group_key(&item);
        let entry = groups.entry(key.clone()).or_default();
        if entry.is_empty() {
            order.push(key);
        }
        entry.push(item);
    }

    let mut out: Vec<DraftItem> = Vec::new();
    // Ids of merged-away members, remapped so child parent links survive.
    let mut alias: BTreeMap<String, String> = BTreeMap::new();

    for key in order {
        let members = groups.remove(&key).unwrap_or_default();
        if members.len() == 1 {
            out.extend(members);
            continue;
        }

        let mut area_order: Vec<String> = Vec::new();
        let mut by_area: BTreeMap<String, Vec<DraftItem>> = BTreeMap::new();
        for member in members {
            let area = member.area.clone();
            let entry = by_area.entry(area.clone()).or_default();
            if entry.is_empty() {
                area_order.push(area);
            }
            entry.push(member);
        }

        let split_by_area = area_order.len() > 1;
        for area in area_order {
            let subgroup = by_area.remove(&area).unwrap_or_default();
            let mut merged = merge_group(subgroup, &mut alias);
            if split_by_area {
                merged.title =
                    format!("{}{}{}", merged.title, AREA_SUFFIX_SEPARATOR, area.to_uppercase());
            }
            out.push(merged);
        }
    }

    if !alias.is_empty() {
        for item in &mut out {
            if let Some(parent) = &item.parent_external_id
                && let Some(survivor) = alias.get(parent)
            {
                item.parent_external_id = Some(survivor.clone());
            }
        }
    }

    out
}

// Same-area duplicates become one record: longest description, escalated
// priority, set-unioned list fields, merged questions, first non-empty
// source references.
fn merge_group(members: Vec<DraftItem>, alias: &mut BTreeMap<String, String>) -> DraftItem {
    let mut members = members.into_iter();
    let mut merged = match members.next() {
        Some(first) => first,
        None => return DraftItem::new(ItemType::Task, "Untitled"),
    };

    for member in members {
        if let (Some(survivor), Some(dropped)) = (&merged.external_id, &member.external_id)
            && survivor != dropped
        {
            alias.insert(dropped.clone(), survivor.clone());
        }

        if member.description.trim().len() > merged.description.trim().len() {
            merged.description = member.description;
        }
        merged.priority = merged.priority.max(member.priority);
        union_into(&mut merged.acceptance_criteria, member.acceptance_criteria);
        union_into(&mut merged.dependencies, member.dependencies);
        union_into(&mut merged.labels, member.labels);
        union_into(&mut merged.risks, member.risks);
        merged.questions = qa::merge_qa(&merged.questions, &member.questions);
        if merged.source_chunk_id.as_deref().map(str::trim).is_none_or(str::is_empty) {
            merged.source_chunk_id = member.source_chunk_id;
        }
        if merged.source_snippet.as_deref().map(str::trim).is_none_or(str::is_empty) {
            merged.source_snippet = member.source_snippet;
        }
    }

    merged
}

// Set-semantics union preserving first-seen order.
fn union_into(target: &mut Vec<String>, incoming: Vec<String>) {
    let mut seen: BTreeSet<String> = target.iter().cloned().collect();
    for value in incoming {
        if seen.insert(value.clone()) {
            target.push(value);
        }
    }
}
