//! End-to-end tests over real temporary vaults: files on disk, the SQLite
//! index, the watcher, and the query machinery working together.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use notegraph::events::VaultEvent;
use notegraph::query::{Filter, PropertyOperator, QueryEngine, QueryRequest, QueryResultType};
use notegraph::search::{EmbeddingProvider, HybridSearch, MatchType};
use notegraph::vault::{Vault, VaultOptions};
use notegraph::{Error, Result};

fn open_unwatched(root: &Path) -> Vault {
    Vault::open(
        root,
        VaultOptions {
            watch: false,
            ..VaultOptions::default()
        },
    )
    .unwrap()
}

#[test]
fn test_reopen_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.md"), "# A\nalpha\n").unwrap();
    fs::write(dir.path().join("b.md"), "# B\nbeta\n").unwrap();

    let first = open_unwatched(dir.path());
    let mut notes = first.storage().list_notes().unwrap();
    notes.sort_by(|a, b| a.path.cmp(&b.path));
    let ids: Vec<i64> = notes.iter().map(|n| n.id).collect();
    drop(first);

    // Unchanged files: the second scan skips everything, ids survive.
    let second = open_unwatched(dir.path());
    let mut notes = second.storage().list_notes().unwrap();
    notes.sort_by(|a, b| a.path.cmp(&b.path));
    assert_eq!(notes.iter().map(|n| n.id).collect::<Vec<_>>(), ids);
    assert_eq!(second.storage().note_count().unwrap(), 2);
}

#[test]
fn test_toggle_todo_round_trip_touches_one_line() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open_unwatched(dir.path());

    let content = "# Plan\n- [ ] buy seeds\n- [ ] plant seeds\nnot a task\n";
    let id = vault.save_note("plan.md", content).unwrap();

    let todos = vault.storage().todos_for(id).unwrap();
    assert_eq!(todos.len(), 2);
    let first = todos.iter().find(|t| t.description == "buy seeds").unwrap();

    let toggled = vault.toggle_todo(first.id).unwrap().unwrap();
    assert!(toggled.completed);
    assert_eq!(
        vault.read_note_content("plan.md").unwrap(),
        "# Plan\n- [x] buy seeds\n- [ ] plant seeds\nnot a task\n"
    );

    // And back again, restoring the file byte for byte.
    let back = vault.toggle_todo(toggled.id).unwrap().unwrap();
    assert!(!back.completed);
    assert_eq!(vault.read_note_content("plan.md").unwrap(), content);
}

#[test]
fn test_toggle_completed_task_with_bracket_literal() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open_unwatched(dir.path());

    let content = "# Plan\n- [x] fix the [ ] checkbox rendering\n";
    let id = vault.save_note("plan.md", content).unwrap();
    let todo = vault.storage().todos_for(id).unwrap().remove(0);
    assert!(todo.completed);

    let toggled = vault.toggle_todo(todo.id).unwrap().unwrap();
    assert!(!toggled.completed);
    assert_eq!(
        vault.read_note_content("plan.md").unwrap(),
        "# Plan\n- [ ] fix the [ ] checkbox rendering\n"
    );
}

#[test]
fn test_delete_cascades_but_schedule_blocks_survive() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open_unwatched(dir.path());

    let id = vault
        .save_note("meeting.md", "# Meeting\n- [ ] send agenda\n#work\n")
        .unwrap();
    let block = vault
        .storage()
        .create_schedule_block(
            Some(id),
            chrono::NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
            "09:00",
            "10:00",
            "standup",
            None,
            None,
        )
        .unwrap();

    assert_eq!(vault.delete_note("meeting.md").unwrap(), Some(id));

    assert!(vault.storage().get_note(id).unwrap().is_none());
    assert!(vault.storage().todos_for(id).unwrap().is_empty());
    let survivor = vault.storage().get_schedule_block(block.id).unwrap().unwrap();
    assert_eq!(survivor.note_id, None);
    assert_eq!(survivor.label, "standup");
}

#[test]
fn test_watcher_coalesces_rapid_writes() {
    let dir = tempfile::tempdir().unwrap();
    let vault = Vault::open(
        dir.path(),
        VaultOptions {
            debounce: Duration::from_millis(200),
            watch: true,
            ..VaultOptions::default()
        },
    )
    .unwrap();
    let mut events = vault.subscribe();

    // A burst of external writes inside one debounce window.
    let path = dir.path().join("burst.md");
    for i in 0..5 {
        fs::write(&path, format!("# Burst\nrevision {i}\n")).unwrap();
        std::thread::sleep(Duration::from_millis(20));
    }

    // Wait until the note lands in the index with the final content.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(note) = vault.storage().get_note_by_path("burst.md").unwrap() {
            let todos_done = vault
                .storage()
                .fts_content(note.id)
                .unwrap()
                .is_some_and(|c| c.contains("revision 4"));
            if todos_done {
                break;
            }
        }
        assert!(Instant::now() < deadline, "watcher never indexed the file");
        std::thread::sleep(Duration::from_millis(50));
    }
    // Let any stragglers flush before counting.
    std::thread::sleep(Duration::from_millis(400));

    let mut updates = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, VaultEvent::NotesUpdated { .. }) {
            updates += 1;
        }
    }
    assert_eq!(updates, 1, "burst of writes must coalesce into one job");
}

#[test]
fn test_task_query_by_priority() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open_unwatched(dir.path());

    vault
        .save_note(
            "work.md",
            "# Work\n- [ ] file taxes due:2026-09-01 priority:high\n- [ ] water plants priority:low\n- [x] old chore priority:high\n",
        )
        .unwrap();

    let request = QueryRequest {
        filters: vec![Filter {
            key: "priority".to_string(),
            operator: PropertyOperator::Equals,
            value: Some("high".to_string()),
        }],
        result_type: QueryResultType::Tasks,
        ..QueryRequest::default()
    };

    let results = QueryEngine::new(vault.storage()).run(&request).unwrap();
    assert_eq!(results.total_count, 1, "completed tasks are excluded by default");

    let with_completed = QueryRequest {
        include_completed: true,
        ..request
    };
    let results = QueryEngine::new(vault.storage())
        .run(&with_completed)
        .unwrap();
    assert_eq!(results.total_count, 2);
}

#[test]
fn test_folder_property_inheritance_is_queryable() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("projects/site")).unwrap();
    let vault = open_unwatched(dir.path());

    let inner = vault.save_note("projects/site/todo.md", "# Todo\n").unwrap();
    let outer = vault.save_note("readme.md", "# Readme\n").unwrap();
    vault
        .storage()
        .set_folder_property("projects", "status", "active", "text")
        .unwrap();

    let request = QueryRequest {
        filters: vec![Filter {
            key: "status".to_string(),
            operator: PropertyOperator::Equals,
            value: Some("active".to_string()),
        }],
        ..QueryRequest::default()
    };
    let results = QueryEngine::new(vault.storage()).run(&request).unwrap();
    assert_eq!(results.total_count, 1);

    let effective = vault
        .storage()
        .effective_properties(inner, "projects/site/todo.md")
        .unwrap();
    assert!(effective.iter().any(|p| p.key == "status" && p.inherited));
    assert!(vault
        .storage()
        .effective_properties(outer, "readme.md")
        .unwrap()
        .is_empty());
}

struct WordOverlap;

impl EmbeddingProvider for WordOverlap {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // One axis per vocabulary word; enough to make related notes close.
        let vocab = ["garden", "soil", "compost", "invoice", "ledger", "tax"];
        Ok(vocab
            .iter()
            .map(|w| text.to_lowercase().matches(w).count() as f32)
            .collect())
    }

    fn dimension(&self) -> usize {
        6
    }
}

#[test]
fn test_hybrid_search_fuses_lexical_and_semantic() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open_unwatched(dir.path());

    vault
        .save_note("garden.md", "# Garden\nTurning compost into the soil.\n")
        .unwrap();
    vault
        .save_note("beds.md", "# Beds\nNew soil for the raised beds.\n")
        .unwrap();
    vault
        .save_note("taxes.md", "# Taxes\nInvoice ledger for the tax year.\n")
        .unwrap();

    let provider = WordOverlap;
    let search = HybridSearch::new(vault.storage(), Some(&provider));
    let results = search.search("compost soil", 10).unwrap();

    assert!(!results.is_empty());
    // garden.md matches both lexically and semantically and must lead.
    assert_eq!(results[0].note.path, "garden.md");
    assert_eq!(results[0].match_type, MatchType::Both);
    assert!(!results.iter().any(|r| r.note.path == "taxes.md"));
}

#[test]
fn test_rebuild_index_preserves_habits_and_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open_unwatched(dir.path());

    vault.save_note("a.md", "# A\n").unwrap();
    let habit = vault
        .storage()
        .create_habit("run", notegraph::storage::habits::HabitType::Boolean, None, None, None)
        .unwrap();
    let date = chrono::NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();
    vault
        .storage()
        .log_habit_entry(habit.id, date, None, "true", None)
        .unwrap();
    let block = vault
        .storage()
        .create_schedule_block(None, date, "08:00", "09:00", "gym", None, None)
        .unwrap();

    let indexed = vault.rebuild_index().unwrap();
    assert_eq!(indexed, 1);

    assert!(vault.storage().get_habit(habit.id).unwrap().is_some());
    assert_eq!(
        vault
            .storage()
            .habit_entries_for_range(habit.id, date, date)
            .unwrap()
            .len(),
        1
    );
    assert!(vault.storage().get_schedule_block(block.id).unwrap().is_some());
}

#[test]
fn test_invalid_schedule_interval_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let vault = open_unwatched(dir.path());
    let date = chrono::NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();

    let result = vault
        .storage()
        .create_schedule_block(None, date, "10:00", "09:00", "backwards", None, None);
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}
