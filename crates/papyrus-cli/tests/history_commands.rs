//! Integration tests for `papyrus history`.

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;

/// 2020-01-01T00:00:00Z, always in the "Older" group.
const OLD_MILLIS: i64 = 1_577_836_800_000;

fn history_path(home: &TempDir) -> PathBuf {
    home.path()
        .join("storage")
        .join("papyrus_query_history.json")
}

fn entry(id: i64, query: &str, answer: &str, favorite: bool) -> Value {
    json!({
        "id": id,
        "query": query,
        "answer": answer,
        "sources": [],
        "timestamp": id,
        "settings": {
            "top_k": 5,
            "bm25_weight": 0.4,
            "vector_weight": 0.6,
            "prompt_template": "default"
        },
        "response_time": 1.25,
        "favorite": favorite
    })
}

fn write_history(home: &TempDir, entries: &[Value]) {
    let path = history_path(home);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, serde_json::to_string(entries).unwrap()).unwrap();
}

fn read_history(home: &TempDir) -> Vec<Value> {
    let raw = fs::read_to_string(history_path(home)).unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[test]
fn test_history_list_empty() {
    let home = TempDir::new().unwrap();

    cargo_bin_cmd!("papyrus")
        .env("PAPYRUS_HOME", home.path())
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No search history yet"));
}

#[test]
fn test_history_list_groups_in_display_order() {
    let home = TempDir::new().unwrap();
    let now = now_millis();
    write_history(
        &home,
        &[
            entry(now, "fresh question", "fresh answer", false),
            entry(OLD_MILLIS + 1, "starred question", "kept answer", true),
            entry(OLD_MILLIS, "ancient question", "old answer", false),
        ],
    );

    let output = cargo_bin_cmd!("papyrus")
        .env("PAPYRUS_HOME", home.path())
        .args(["history", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let favorites = stdout.find("Favorites").unwrap();
    let today = stdout.find("Today").unwrap();
    let older = stdout.find("Older").unwrap();
    assert!(favorites < today && today < older);
    assert!(!stdout.contains("Yesterday"));

    assert!(stdout.find("starred question").unwrap() < today);
    assert!(stdout.find("fresh question").unwrap() > today);
    assert!(stdout.find("ancient question").unwrap() > older);
}

#[test]
fn test_history_list_search_is_case_insensitive() {
    let home = TempDir::new().unwrap();
    write_history(
        &home,
        &[
            entry(OLD_MILLIS + 2, "Tell me about Foo", "answer", false),
            entry(OLD_MILLIS + 1, "unrelated", "nothing", false),
        ],
    );

    cargo_bin_cmd!("papyrus")
        .env("PAPYRUS_HOME", home.path())
        .args(["history", "list", "--search", "foo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tell me about Foo"))
        .stdout(predicate::str::contains("unrelated").not());

    cargo_bin_cmd!("papyrus")
        .env("PAPYRUS_HOME", home.path())
        .args(["history", "list", "--search", "zzz"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No history entries match."));
}

#[test]
fn test_history_show_prints_entry() {
    let home = TempDir::new().unwrap();
    write_history(
        &home,
        &[entry(OLD_MILLIS, "What is BM25?", "A ranking function.", false)],
    );

    cargo_bin_cmd!("papyrus")
        .env("PAPYRUS_HOME", home.path())
        .args(["history", "show", &OLD_MILLIS.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains("What is BM25?"))
        .stdout(predicate::str::contains("A ranking function."))
        .stdout(predicate::str::contains("top_k=5 bm25=0.40 vector=0.60 template=default"));
}

#[test]
fn test_history_show_unknown_id_fails() {
    let home = TempDir::new().unwrap();

    cargo_bin_cmd!("papyrus")
        .env("PAPYRUS_HOME", home.path())
        .args(["history", "show", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No history entry with id 42"));
}

#[test]
fn test_history_favorite_toggles_and_persists() {
    let home = TempDir::new().unwrap();
    write_history(&home, &[entry(OLD_MILLIS, "q", "a", false)]);
    let id = OLD_MILLIS.to_string();

    cargo_bin_cmd!("papyrus")
        .env("PAPYRUS_HOME", home.path())
        .args(["history", "favorite", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added"));
    assert_eq!(read_history(&home)[0]["favorite"], json!(true));

    cargo_bin_cmd!("papyrus")
        .env("PAPYRUS_HOME", home.path())
        .args(["history", "favorite", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));
    assert_eq!(read_history(&home)[0]["favorite"], json!(false));
}

#[test]
fn test_history_favorite_unknown_id_leaves_log_unchanged() {
    let home = TempDir::new().unwrap();
    write_history(&home, &[entry(OLD_MILLIS, "q", "a", false)]);
    let before = fs::read_to_string(history_path(&home)).unwrap();

    cargo_bin_cmd!("papyrus")
        .env("PAPYRUS_HOME", home.path())
        .args(["history", "favorite", "7"])
        .assert()
        .failure();

    assert_eq!(fs::read_to_string(history_path(&home)).unwrap(), before);
}

#[test]
fn test_history_delete_removes_entry() {
    let home = TempDir::new().unwrap();
    write_history(
        &home,
        &[
            entry(OLD_MILLIS + 1, "keep", "a", false),
            entry(OLD_MILLIS, "drop", "a", false),
        ],
    );

    cargo_bin_cmd!("papyrus")
        .env("PAPYRUS_HOME", home.path())
        .args(["history", "delete", &OLD_MILLIS.to_string()])
        .assert()
        .success();

    let remaining = read_history(&home);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["query"], json!("keep"));
}

#[test]
fn test_history_clear_removes_file() {
    let home = TempDir::new().unwrap();
    write_history(&home, &[entry(OLD_MILLIS, "q", "a", false)]);

    cargo_bin_cmd!("papyrus")
        .env("PAPYRUS_HOME", home.path())
        .args(["history", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 1 history entries"));

    assert!(!history_path(&home).exists());
}
