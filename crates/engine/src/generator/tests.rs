use super::*;
use serde_json::json;

fn chunk(id: &str, title: &str, content: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        title: title.to_string(),
        content: content.to_string(),
    }
}

#[test]
fn coerce_accepts_wrapped_and_bare_arrays() {
    let wrapped = json!({ "items": [{ "type": "story", "title": "Login" }] });
    assert_eq!(coerce_items_payload(&wrapped).len(), 1);

    let bare = json!([{ "type": "story", "title": "Login" }]);
    assert_eq!(coerce_items_payload(&bare).len(), 1);

    assert!(coerce_items_payload(&json!("garbage")).is_empty());
    assert!(coerce_items_payload(&json!({ "items": "garbage" })).is_empty());
}

#[test]
fn coerce_applies_defaults_and_skips_malformed_entries() {
    let payload = json!({ "items": [
        { "type": "story", "title": "Login", "area": ["frontend", "backend"],
          "priority": "high", "questions": ["¿MFA?"] },
        { "type": "alien", "title": "Coerced to task" },
        { "type": "story" },
        "not an object",
        { "title": "  " }
    ]});
    let items = coerce_items_payload(&payload);
    assert_eq!(items.len(), 2);

    assert_eq!(items[0].item_type, ItemType::Story);
    assert_eq!(items[0].area, "frontend");
    assert_eq!(items[0].priority, Priority::High);
    assert_eq!(items[0].questions, vec![QaPair::unanswered("¿MFA?")]);

    assert_eq!(items[1].item_type, ItemType::Task, "unknown type defaults to task");
    assert_eq!(items[1].priority, Priority::Medium);
}

#[test]
fn coerce_reads_structured_questions_and_aliases() {
    let payload = json!({ "items": [{
        "type": "task",
        "title": "Setup",
        "parent_external_id": "T-002",
        "source_chunk_id": "c:auth",
        "questions": [{ "question": "¿Qué SLA?", "answer": "4 horas" }]
    }]});
    let items = coerce_items_payload(&payload);
    assert_eq!(items[0].parent_external_id.as_deref(), Some("T-002"));
    assert_eq!(items[0].source_chunk_id.as_deref(), Some("c:auth"));
    assert_eq!(items[0].questions, vec![QaPair::new("¿Qué SLA?", "4 horas")]);
}

#[test]
fn heuristic_builds_epic_story_and_bullet_tasks_per_chunk() {
    let chunks = vec![chunk(
        "c:auth",
        "Auth",
        "- Login con MFA\n- Recuperar password\nno bullet\n1. Registro",
    )];
    let items = heuristic_items(&chunks);

    let epics: Vec<_> = items.iter().filter(|i| i.item_type == ItemType::Epic).collect();
    let stories: Vec<_> = items.iter().filter(|i| i.item_type == ItemType::Story).collect();
    let tasks: Vec<_> = items.iter().filter(|i| i.item_type == ItemType::Task).collect();

    assert_eq!(epics.len(), 1);
    assert_eq!(stories.len(), 1);
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[0].title, "Login con MFA");
    assert_eq!(tasks[2].title, "Registro");
    for item in &items {
        assert_eq!(item.source_chunk_id.as_deref(), Some("c:auth"));
    }
}

struct FailingGenerator;

impl Generator for FailingGenerator {
    fn generate(&self, _request: &GeneratorRequest) -> Result<serde_json::Value, GeneratorError> {
        Err(GeneratorError::Timeout)
    }
}

struct GarbageGenerator;

impl Generator for GarbageGenerator {
    fn generate(&self, _request: &GeneratorRequest) -> Result<serde_json::Value, GeneratorError> {
        Ok(json!({ "unexpected": true }))
    }
}

#[test]
fn proposal_falls_back_to_heuristic_on_any_generator_trouble() {
    let chunks = vec![chunk("c:auth", "Auth", "- Login con MFA")];
    let expected = heuristic_items(&chunks);

    assert_eq!(resolve_proposal(None, &chunks), expected);
    assert_eq!(resolve_proposal(Some(&FailingGenerator), &chunks), expected);
    assert_eq!(resolve_proposal(Some(&GarbageGenerator), &chunks), expected);
}
