#![forbid(unsafe_code)]

use std::path::PathBuf;
use tm_core::ids::ProjectId;
use tm_core::model::{
    ActionBundle, ClientQuestion, DraftItem, ItemPatch, ItemStatus, ItemType, Priority,
};
use tm_storage::{ApplyRequest, SqliteStore, StoreError};

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("tm_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn draft(id: &str, item_type: ItemType, parent: Option<&str>, title: &str) -> DraftItem {
    let mut item = DraftItem::new(item_type, title);
    item.external_id = Some(id.to_string());
    item.parent_external_id = parent.map(str::to_string);
    item
}

fn apply(store: &mut SqliteStore, project: &ProjectId, bundle: ActionBundle) -> tm_storage::ApplyOutcome {
    store
        .apply_actions(
            project,
            ApplyRequest {
                bundle,
                from_doc_version: None,
                to_doc_version: Some(1),
            },
        )
        .expect("apply actions")
}

#[test]
fn forward_references_resolve_regardless_of_input_order() {
    let dir = temp_dir("forward_refs");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let project = ProjectId::try_new("proj").expect("project id");

    // Child rows come before their parents in the batch on purpose.
    let bundle = ActionBundle {
        creates: vec![
            draft("T-003", ItemType::Task, Some("T-002"), "Task"),
            draft("T-002", ItemType::Story, Some("T-001"), "Story"),
            draft("T-001", ItemType::Epic, None, "Epic"),
        ],
        ..ActionBundle::default()
    };
    let outcome = apply(&mut store, &project, bundle);
    assert_eq!(outcome.created.len(), 3);

    let task = store
        .item_get(&project, "T-003")
        .expect("get task")
        .expect("task exists");
    assert_eq!(task.parent_external_id.as_deref(), Some("T-002"));
    let story = store
        .item_get(&project, "T-002")
        .expect("get story")
        .expect("story exists");
    assert_eq!(story.parent_external_id.as_deref(), Some("T-001"));
}

#[test]
fn unresolved_parent_rolls_back_the_whole_batch() {
    let dir = temp_dir("rollback");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let project = ProjectId::try_new("proj").expect("project id");

    let bundle = ActionBundle {
        creates: vec![
            draft("T-001", ItemType::Epic, None, "Epic"),
            draft("T-002", ItemType::Story, Some("T-404"), "Story"),
        ],
        ..ActionBundle::default()
    };
    let err = store
        .apply_actions(
            &project,
            ApplyRequest {
                bundle,
                from_doc_version: None,
                to_doc_version: None,
            },
        )
        .expect_err("dangling parent must fail");
    match err {
        StoreError::UnresolvedParent {
            external_id,
            parent_external_id,
        } => {
            assert_eq!(external_id, "T-002");
            assert_eq!(parent_external_id, "T-404");
        }
        other => panic!("expected UnresolvedParent, got {other:?}"),
    }

    // Pass 1 inserted T-001, but the transaction must leave no trace.
    assert!(
        store.item_get(&project, "T-001").expect("get").is_none(),
        "partially applied batch leaked"
    );
}

#[test]
fn patches_touch_only_present_fields() {
    let dir = temp_dir("patch_fields");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let project = ProjectId::try_new("proj").expect("project id");

    let mut epic = draft("T-001", ItemType::Epic, None, "Epic");
    epic.description = "original".to_string();
    epic.area = "auth".to_string();
    epic.priority = Priority::Low;
    apply(
        &mut store,
        &project,
        ActionBundle {
            creates: vec![epic],
            ..ActionBundle::default()
        },
    );

    let mut patch = ItemPatch::for_item("T-001");
    patch.description = Some("amended".to_string());
    let outcome = apply(
        &mut store,
        &project,
        ActionBundle {
            updates: vec![patch],
            ..ActionBundle::default()
        },
    );
    assert_eq!(outcome.updated, vec!["T-001".to_string()]);

    let row = store
        .item_get(&project, "T-001")
        .expect("get")
        .expect("exists");
    assert_eq!(row.description, "amended");
    assert_eq!(row.title, "Epic");
    assert_eq!(row.area, "auth");
    assert_eq!(row.priority, Priority::Low);
    assert_eq!(row.revision, 1);
}

#[test]
fn obsolete_flips_status_and_never_deletes() {
    let dir = temp_dir("obsolete_soft");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let project = ProjectId::try_new("proj").expect("project id");

    apply(
        &mut store,
        &project,
        ActionBundle {
            creates: vec![draft("T-001", ItemType::Epic, None, "Epic")],
            ..ActionBundle::default()
        },
    );
    let outcome = apply(
        &mut store,
        &project,
        ActionBundle {
            obsoletes: vec!["T-001".to_string()],
            ..ActionBundle::default()
        },
    );
    assert_eq!(outcome.obsoleted, vec!["T-001".to_string()]);

    let row = store
        .item_get(&project, "T-001")
        .expect("get")
        .expect("row still present");
    assert_eq!(row.status, ItemStatus::Obsolete);
}

#[test]
fn duplicate_external_id_is_rejected() {
    let dir = temp_dir("dup_external");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let project = ProjectId::try_new("proj").expect("project id");

    apply(
        &mut store,
        &project,
        ActionBundle {
            creates: vec![draft("T-001", ItemType::Epic, None, "Epic")],
            ..ActionBundle::default()
        },
    );
    let err = store
        .apply_actions(
            &project,
            ApplyRequest {
                bundle: ActionBundle {
                    creates: vec![draft("T-001", ItemType::Epic, None, "Again")],
                    ..ActionBundle::default()
                },
                from_doc_version: None,
                to_doc_version: None,
            },
        )
        .expect_err("duplicate id must fail");
    assert!(matches!(err, StoreError::DuplicateExternalId { .. }));
}

#[test]
fn every_action_is_audited_with_document_versions() {
    let dir = temp_dir("audit_trail");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let project = ProjectId::try_new("proj").expect("project id");

    apply(
        &mut store,
        &project,
        ActionBundle {
            creates: vec![draft("T-001", ItemType::Epic, None, "Epic")],
            updates: Vec::new(),
            obsoletes: Vec::new(),
            questions: vec![ClientQuestion {
                question: "¿Qué pasa con la sección eliminada?".to_string(),
                priority: Priority::High,
                reason: "no items trace to the removed chunk".to_string(),
            }],
        },
    );

    let entries = store.audit_list(&project, 0, 50).expect("audit list");
    let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    assert!(actions.contains(&"create"));
    assert!(actions.contains(&"question"));
    for entry in &entries {
        assert_eq!(entry.to_doc_version, Some(1));
    }
}

#[test]
fn minted_id_floor_survives_explicit_deletion() {
    let dir = temp_dir("id_floor");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let project = ProjectId::try_new("proj").expect("project id");

    apply(
        &mut store,
        &project,
        ActionBundle {
            creates: vec![draft("T-007", ItemType::Epic, None, "Epic")],
            ..ActionBundle::default()
        },
    );
    store.item_delete(&project, "T-007").expect("delete");

    // The row is gone, but the floor still forbids re-minting T-007.
    assert_eq!(store.item_seq_floor(&project).expect("floor"), 7);
    assert!(store.item_get(&project, "T-007").expect("get").is_none());
}
