use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("papyrus")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_history_help_shows_subcommands() {
    cargo_bin_cmd!("papyrus")
        .args(["history", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("favorite"))
        .stdout(predicate::str::contains("delete"))
        .stdout(predicate::str::contains("clear"));
}

#[test]
fn test_ask_help_shows_query_flags() {
    cargo_bin_cmd!("papyrus")
        .args(["ask", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--top-k"))
        .stdout(predicate::str::contains("--bm25-weight"))
        .stdout(predicate::str::contains("--template"));
}

#[test]
fn test_ask_rejects_out_of_range_top_k() {
    cargo_bin_cmd!("papyrus")
        .args(["ask", "question", "--top-k", "21"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("21"));
}

#[test]
fn test_ask_rejects_unknown_template() {
    cargo_bin_cmd!("papyrus")
        .args(["ask", "question", "--template", "poetry"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("poetry"));
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("papyrus")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1"));
}
