//! Binary-level tests for commands that need no network.

use assert_cmd::Command;
use predicates::prelude::*;

fn deepsearch() -> Command {
    let mut cmd = Command::cargo_bin("deepsearch").unwrap_or_else(|_| unreachable!());
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_commands() {
    deepsearch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("classify"))
        .stdout(predicate::str::contains("repl"))
        .stdout(predicate::str::contains("init-prompts"));
}

#[test]
fn classify_json_reports_simple_tier() {
    deepsearch()
        .args(["classify", "what is quantum computing", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tier\": \"simple\""))
        .stdout(predicate::str::contains("\"name\": \"direct\""));
}

#[test]
fn classify_text_reports_multi_hop() {
    deepsearch()
        .args(["classify", "How does Rust compare to Go for building web servers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tier: multi_hop"))
        .stdout(predicate::str::contains("Strategy: parallel_deep"));
}

#[test]
fn ask_without_search_key_fails_before_searching() {
    deepsearch()
        .args(["ask", "what is rust", "--no-llm"])
        .env_remove("TAVILY_API_KEY")
        .assert()
        .failure()
        .stderr(predicate::str::contains("search"));
}

#[test]
fn init_prompts_writes_templates() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    deepsearch()
        .args(["init-prompts", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 2 prompt template(s)"));
    assert!(dir.path().join("reasoning.md").exists());
    assert!(dir.path().join("answer.md").exists());
}
