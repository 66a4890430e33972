use super::*;
use crate::model::{Priority, QaPair};

fn story(id: &str, parent: &str, title: &str, area: &str) -> DraftItem {
    let mut item = DraftItem::new(ItemType::Story, title);
    item.external_id = Some(id.to_string());
    item.parent_external_id = Some(parent.to_string());
    item.area = area.to_string();
    item
}

#[test]
fn normalized_title_strips_type_prefixes() {
    assert_eq!(normalized_title("Story: Login"), "login");
    assert_eq!(normalized_title("TASK - Cleanup"), "cleanup");
    assert_eq!(normalized_title("  Login  "), "login");
    assert_eq!(normalized_title("Historia: Pago"), "pago");
    assert_eq!(normalized_title("Storyboard"), "storyboard");
}

#[test]
fn singleton_groups_pass_through() {
    let items = vec![
        story("T-001", "T-010", "Login", "frontend"),
        story("T-002", "T-010", "Logout", "frontend"),
    ];
    let out = dedup_items(items.clone());
    assert_eq!(out, items);
}

#[test]
fn different_areas_split_with_suffix() {
    let items = vec![
        story("T-001", "T-010", "Login", "frontend"),
        story("T-002", "T-010", "Login", "backend"),
    ];
    let out = dedup_items(items);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].title, "Login · FRONTEND");
    assert_eq!(out[1].title, "Login · BACKEND");
}

#[test]
fn same_area_duplicates_merge_into_one() {
    let mut a = story("T-001", "T-010", "Login", "frontend");
    a.description = "short".to_string();
    a.priority = Priority::Low;
    a.acceptance_criteria = vec!["ac1".to_string()];
    a.labels = vec!["auth".to_string()];
    a.questions = vec![QaPair::new("mfa?", "")];
    let mut b = story("T-002", "T-010", "Story: Login", "frontend");
    b.description = "a much longer description".to_string();
    b.priority = Priority::High;
    b.acceptance_criteria = vec!["ac1".to_string(), "ac2".to_string()];
    b.labels = vec!["login".to_string()];
    b.questions = vec![QaPair::new("mfa?", "sí"), QaPair::new("sso?", "")];
    b.source_chunk_id = Some("c:auth".to_string());

    let out = dedup_items(vec![a, b]);
    assert_eq!(out.len(), 1);
    let merged = &out[0];
    assert_eq!(merged.external_id.as_deref(), Some("T-001"));
    assert_eq!(merged.description, "a much longer description");
    assert_eq!(merged.priority, Priority::High);
    assert_eq!(
        merged.acceptance_criteria,
        vec!["ac1".to_string(), "ac2".to_string()]
    );
    assert_eq!(merged.labels, vec!["auth".to_string(), "login".to_string()]);
    assert_eq!(
        merged.questions,
        vec![QaPair::new("mfa?", "sí"), QaPair::new("sso?", "")]
    );
    assert_eq!(merged.source_chunk_id.as_deref(), Some("c:auth"));
}

#[test]
fn children_of_merged_items_are_reparented() {
    let a = story("T-001", "T-010", "Login", "frontend");
    let b = story("T-002", "T-010", "Login", "frontend");
    let mut child = DraftItem::new(ItemType::Task, "Captcha");
    child.external_id = Some("T-003".to_string());
    child.parent_external_id = Some("T-002".to_string());

    let out = dedup_items(vec![a, b, child]);
    let task = out.iter().find(|i| i.item_type == ItemType::Task).unwrap();
    assert_eq!(task.parent_external_id.as_deref(), Some("T-001"));
}

#[test]
fn same_title_under_different_parents_does_not_merge() {
    let items = vec![
        story("T-001", "T-010", "Login", "frontend"),
        story("T-002", "T-011", "Login", "frontend"),
    ];
    let out = dedup_items(items.clone());
    assert_eq!(out, items);
}

#[test]
fn dedup_is_idempotent() {
    let items = vec![
        story("T-001", "T-010", "Login", "frontend"),
        story("T-002", "T-010", "Login", "backend"),
        story("T-003", "T-010", "login", "backend"),
        story("T-004", "T-010", "Logout", "frontend"),
    ];
    let once = dedup_items(items);
    let twice = dedup_items(once.clone());
    assert_eq!(once, twice);
}
