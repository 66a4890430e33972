#![forbid(unsafe_code)]

use std::path::PathBuf;
use tm_core::ids::ProjectId;
use tm_core::model::QaPair;
use tm_engine::{ChunkInput, Engine, PropagationOutcome};

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

#[test]
fn confirmed_facts_backfill_matching_questions_exactly_once() {
    let dir = temp_dir("backfill");
    let mut engine = Engine::open(&dir).expect("open engine");
    let project = ProjectId::try_new("proj").expect("project id");

    engine
        .ingest_document(
            &project,
            "v1",
            &[ChunkInput::new("Soporte", "- Atender incidencias")],
            None,
        )
        .expect("ingest");

    // Two items pick up the same open question; one already has an answer.
    let items = engine.store().items_list(&project).expect("items");
    let first = items[0].external_id.clone();
    let second = items[1].external_id.clone();
    engine
        .store_mut()
        .item_answer_questions(&project, &first, &[QaPair::unanswered("¿Qué SLA?")])
        .expect("attach question");
    engine
        .store_mut()
        .item_answer_questions(&project, &second, &[QaPair::new("¿qué sla?", "8 horas")])
        .expect("attach answered question");

    engine
        .ledger_append(&project, "¿Qué SLA? : 4 horas")
        .expect("ledger append");

    let outcome = engine.recalculate(&project).expect("recalculate");
    assert_eq!(outcome.filled, 1, "only the unanswered copy is filled");
    assert_eq!(outcome.descriptions_updated, 1);

    let row = engine
        .store()
        .item_get(&project, &first)
        .expect("get")
        .expect("exists");
    let question = row
        .questions
        .iter()
        .find(|q| q.key() == "¿qué sla?")
        .expect("question present");
    assert_eq!(question.answer, "4 horas");
    assert!(row.description.contains("Confirmado: ¿Qué SLA?: 4 horas"));

    let row = engine
        .store()
        .item_get(&project, &second)
        .expect("get")
        .expect("exists");
    let question = row
        .questions
        .iter()
        .find(|q| q.key() == "¿qué sla?")
        .expect("question present");
    assert_eq!(question.answer, "8 horas", "existing answers are kept");

    // Idempotent: a second pass changes nothing.
    let again = engine.recalculate(&project).expect("recalculate again");
    assert_eq!(again, PropagationOutcome::default());
    let row = engine
        .store()
        .item_get(&project, &first)
        .expect("get")
        .expect("exists");
    assert_eq!(row.description.matches("Confirmado:").count(), 1);
}

#[test]
fn ledger_merges_keep_newest_answer_and_bound_growth() {
    let dir = temp_dir("ledger_merge");
    let mut engine = Engine::open(&dir).expect("open engine");
    let project = ProjectId::try_new("proj").expect("project id");

    engine
        .ledger_append(&project, "¿Qué SLA?: 8 horas")
        .expect("append");
    let rendered = engine
        .ledger_append(&project, "¿qué sla?: 4 horas\n¿Quién aprueba?: PM")
        .expect("append again");

    assert!(rendered.starts_with("## Confirmed facts"));
    assert!(rendered.contains("4 horas"));
    assert!(!rendered.contains("8 horas"), "newest value wins");
    assert!(rendered.contains("¿Quién aprueba?: PM"));

    let stored = engine.ledger_get(&project).expect("get");
    assert_eq!(stored, rendered);
}

#[test]
fn empty_ledger_recalculate_is_a_no_op() {
    let dir = temp_dir("empty_ledger");
    let mut engine = Engine::open(&dir).expect("open engine");
    let project = ProjectId::try_new("proj").expect("project id");

    engine
        .ingest_document(&project, "v1", &[ChunkInput::new("Auth", "- Login")], None)
        .expect("ingest");
    let outcome = engine.recalculate(&project).expect("recalculate");
    assert_eq!(outcome, PropagationOutcome::default());
}
