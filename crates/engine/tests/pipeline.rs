#![forbid(unsafe_code)]

use std::path::PathBuf;
use tm_core::ids::ProjectId;
use tm_core::model::{ChangeKind, ItemStatus, ItemType};
use tm_engine::{ChunkInput, Engine, Generator, GeneratorError, GeneratorRequest};

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("tm_engine_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn section(title: &str, content: &str) -> ChunkInput {
    ChunkInput::new(title, content)
}

#[test]
fn initial_ingest_builds_a_full_hierarchy() {
    let dir = temp_dir("initial_ingest");
    let mut engine = Engine::open(&dir).expect("open engine");
    let project = ProjectId::try_new("proj").expect("project id");

    let outcome = engine
        .ingest_document(
            &project,
            "Requisitos v1",
            &[section("Auth", "- Login con MFA\n- Recuperar password")],
            None,
        )
        .expect("ingest");

    assert_eq!(outcome.doc_version, 1);
    assert!(!outcome.outcome.created.is_empty());
    assert!(outcome.questions.is_empty());

    let items = engine.store().items_list(&project).expect("items");
    let epics: Vec<_> = items.iter().filter(|i| i.item_type == ItemType::Epic).collect();
    let stories: Vec<_> = items.iter().filter(|i| i.item_type == ItemType::Story).collect();
    let tasks: Vec<_> = items.iter().filter(|i| i.item_type == ItemType::Task).collect();
    assert_eq!(epics.len(), 1);
    assert!(!stories.is_empty());
    assert_eq!(tasks.len(), 2);

    // Every task chains Task -> Story -> Epic.
    let story_ids: Vec<&str> = stories.iter().map(|s| s.external_id.as_str()).collect();
    for task in &tasks {
        let parent = task.parent_external_id.as_deref().expect("task parent");
        assert!(story_ids.contains(&parent));
    }
    for story in &stories {
        assert_eq!(
            story.parent_external_id.as_deref(),
            Some(epics[0].external_id.as_str())
        );
    }
}

#[test]
fn identical_document_version_changes_nothing() {
    let dir = temp_dir("identical_version");
    let mut engine = Engine::open(&dir).expect("open engine");
    let project = ProjectId::try_new("proj").expect("project id");
    let sections = vec![section("Auth", "- Login con MFA")];

    engine
        .ingest_document(&project, "Requisitos v1", &sections, None)
        .expect("ingest v1");
    let before = engine.store().items_list(&project).expect("items").len();

    let outcome = engine
        .ingest_document(&project, "Requisitos v2", &sections, None)
        .expect("ingest v2");

    assert!(outcome.events.is_empty(), "identical chunks diff to nothing");
    assert!(outcome.outcome.created.is_empty());
    assert!(outcome.outcome.updated.is_empty());
    assert!(outcome.outcome.obsoleted.is_empty());
    assert_eq!(engine.store().items_list(&project).expect("items").len(), before);
}

#[test]
fn modified_then_removed_sections_keep_traceability() {
    let dir = temp_dir("modify_remove");
    let mut engine = Engine::open(&dir).expect("open engine");
    let project = ProjectId::try_new("proj").expect("project id");

    engine
        .ingest_document(
            &project,
            "v1",
            &[
                section("Auth", "- Login con MFA"),
                section("Billing", "- Facturación mensual"),
            ],
            None,
        )
        .expect("ingest v1");

    // v2 rewrites Auth; items traced to the old chunk get their description
    // amended and their trace re-pointed at the new chunk.
    let outcome = engine
        .ingest_document(
            &project,
            "v2",
            &[
                section("Auth", "- Login con MFA\n- Recuperar password"),
                section("Billing", "- Facturación mensual"),
            ],
            None,
        )
        .expect("ingest v2");
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].kind, ChangeKind::Modified);
    assert!(!outcome.outcome.updated.is_empty());
    assert!(outcome.outcome.created.is_empty());

    for id in &outcome.outcome.updated {
        let row = engine
            .store()
            .item_get(&project, id)
            .expect("get")
            .expect("exists");
        assert_eq!(row.description, "- Login con MFA\n- Recuperar password");
    }

    // v3 drops Auth entirely; the re-pointed items are found and retired,
    // never deleted.
    let before = engine.store().items_list(&project).expect("items").len();
    let outcome = engine
        .ingest_document(
            &project,
            "v3",
            &[section("Billing", "- Facturación mensual")],
            None,
        )
        .expect("ingest v3");
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].kind, ChangeKind::Removed);
    assert!(!outcome.outcome.obsoleted.is_empty());
    assert!(outcome.questions.is_empty());

    let items = engine.store().items_list(&project).expect("items");
    assert_eq!(items.len(), before, "obsoletion keeps every row");
    for id in &outcome.outcome.obsoleted {
        let row = items.iter().find(|i| &i.external_id == id).expect("row kept");
        assert_eq!(row.status, ItemStatus::Obsolete);
    }
}

#[test]
fn removed_section_nobody_traces_becomes_a_question() {
    let dir = temp_dir("removed_question");
    let mut engine = Engine::open(&dir).expect("open engine");
    let project = ProjectId::try_new("proj").expect("project id");

    engine
        .ingest_document(&project, "v1", &[section("Auth", "- Login")], None)
        .expect("ingest v1");
    // Break traceability on purpose: wipe every item's source chunk.
    let items = engine.store().items_list(&project).expect("items");
    for item in &items {
        engine
            .store_mut()
            .item_delete(&project, &item.external_id)
            .expect("delete");
    }

    let outcome = engine
        .ingest_document(&project, "v2", &[], None)
        .expect("ingest v2");

    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].kind, ChangeKind::Removed);
    assert!(outcome.outcome.obsoleted.is_empty());
    assert!(
        outcome
            .questions
            .iter()
            .any(|q| q.reason == "no items trace to the removed chunk"),
        "escalates instead of guessing: {:?}",
        outcome.questions
    );
}

#[test]
fn queued_generation_reconciles_when_a_worker_claims_it() {
    let dir = temp_dir("queued_generation");
    let mut engine = Engine::open(&dir).expect("open engine");
    let project = ProjectId::try_new("proj").expect("project id");

    let (version, job) = engine
        .enqueue_generation(&project, "v1", &[section("Auth", "- Login con MFA")])
        .expect("enqueue");
    assert_eq!(job.status, "queued");
    assert!(engine.store().items_list(&project).expect("items").is_empty());

    // Worker side: claim, reconcile the queued version, complete.
    let claimed = engine
        .store_mut()
        .job_claim_next("worker-1", 60_000)
        .expect("claim")
        .expect("job available");
    assert_eq!(claimed.job.doc_version, Some(version));

    let outcome = engine
        .reconcile_version(&project, version, None)
        .expect("reconcile");
    assert!(!outcome.outcome.created.is_empty());

    let done = engine
        .store_mut()
        .job_complete(
            &project,
            &claimed.job.id,
            "worker-1",
            claimed.job.revision,
            Some("done".to_string()),
        )
        .expect("complete");
    assert_eq!(done.status, "done");
    assert!(!engine.store().items_list(&project).expect("items").is_empty());
}

// Parses the chunk ids out of the prompt and proposes two same-titled
// stories in different areas, plus their epic.
struct AreaSplitGenerator;

impl Generator for AreaSplitGenerator {
    fn generate(&self, request: &GeneratorRequest) -> Result<serde_json::Value, GeneratorError> {
        let chunk_id = request
            .user_prompt
            .split("[chunk ")
            .nth(1)
            .and_then(|rest| rest.split(']').next())
            .ok_or_else(|| GeneratorError::Malformed("no chunk id in prompt".to_string()))?;
        Ok(serde_json::json!({ "items": [
            { "type": "epic", "title": "Auth", "sourceChunkId": chunk_id },
            { "type": "story", "title": "Login", "area": "frontend", "sourceChunkId": chunk_id },
            { "type": "story", "title": "Login", "area": "backend", "sourceChunkId": chunk_id },
        ]}))
    }
}

#[test]
fn generator_proposal_flows_through_dedup_and_title_enforcement() {
    let dir = temp_dir("generator_proposal");
    let mut engine = Engine::open(&dir).expect("open engine");
    let project = ProjectId::try_new("proj").expect("project id");

    engine
        .ingest_document(
            &project,
            "v1",
            &[section("Auth", "- Login con MFA")],
            Some(&AreaSplitGenerator),
        )
        .expect("ingest");

    let items = engine.store().items_list(&project).expect("items");
    let mut story_titles: Vec<&str> = items
        .iter()
        .filter(|i| i.item_type == ItemType::Story)
        .map(|i| i.title.as_str())
        .collect();
    story_titles.sort();
    assert_eq!(story_titles, vec!["Login · BACKEND", "Login · FRONTEND"]);
}
