//! CLI integration tests for foreigneye
//!
//! Each test gets its own config directory and database file.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Command isolated from the caller's config, secrets and `.env`
#[allow(deprecated)]
fn foreigneye_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("foreigneye").unwrap();
    cmd.current_dir(home.path())
        .env("FOREIGNEYE_CONFIG_DIR", home.path().join("config"))
        .env_remove("FOREIGNEYE_API_KEY")
        .env_remove("OPENROUTER_API_KEY")
        .env_remove("GNEWS_API_KEY")
        .env_remove("NEO4J_PASSWORD")
        .env("RUST_LOG", "error");
    cmd
}

/// Fresh workspace with the database inside the temp dir and a seeded user
fn workspace() -> TempDir {
    let home = TempDir::new().unwrap();
    let db_path = home.path().join("foreigneye.db");

    foreigneye_cmd(&home)
        .args(["config", "set", "database.path", db_path.to_str().unwrap()])
        .assert()
        .success();
    foreigneye_cmd(&home).arg("seed-user").assert().success();
    home
}

#[test]
fn test_config_path_respects_override() {
    let home = TempDir::new().unwrap();
    foreigneye_cmd(&home)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_set_and_get_roundtrip() {
    let home = TempDir::new().unwrap();
    foreigneye_cmd(&home)
        .args(["config", "set", "worker.concurrency", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set worker.concurrency = 4"));

    foreigneye_cmd(&home)
        .args(["config", "get", "worker.concurrency"])
        .assert()
        .success()
        .stdout(predicate::str::diff("4\n"));
}

#[test]
fn test_config_refuses_secrets() {
    let home = TempDir::new().unwrap();
    foreigneye_cmd(&home)
        .args(["config", "set", "llm.api_key", "sk-123"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("environment variable"));
}

#[test]
fn test_config_rejects_bad_backend() {
    let home = TempDir::new().unwrap();
    foreigneye_cmd(&home)
        .args(["config", "set", "graph.backend", "postgres"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid graph backend"));
}

#[test]
fn test_seed_user_is_idempotent() {
    let home = workspace();
    foreigneye_cmd(&home)
        .arg("seed-user")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_empty_collections_and_map() {
    let home = workspace();
    foreigneye_cmd(&home)
        .args(["collections", "--user", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No collected concepts."));

    foreigneye_cmd(&home)
        .args(["--format", "json", "map", "--user", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"nodes\": []"));
}

#[test]
fn test_collect_unknown_concept_fails() {
    let home = workspace();
    foreigneye_cmd(&home)
        .args(["collect", "--user", "1", "--concept", "Quantum Annealing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_search_with_no_matches() {
    let home = workspace();
    foreigneye_cmd(&home)
        .args(["search", "GPU", "CUDA"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No matching articles."));
}

#[test]
fn test_relatives_for_unknown_article() {
    let home = workspace();
    foreigneye_cmd(&home)
        .args(["relatives", "--article", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Article '42' not found"));
}

#[test]
fn test_enqueue_shows_in_jobs() {
    let home = workspace();
    foreigneye_cmd(&home)
        .args(["enqueue", "sync", "--user", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sync_user_graph(user_id=1)"));

    foreigneye_cmd(&home)
        .arg("jobs")
        .assert()
        .success()
        .stdout(predicate::str::contains("pending 1"))
        .stdout(predicate::str::contains("sync_user_graph"));
}

#[test]
fn test_sync_with_no_collections() {
    let home = workspace();
    foreigneye_cmd(&home)
        .args(["sync", "--user", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 concepts, 0 relations"));
}

#[test]
fn test_ingest_from_file_needs_llm_key() {
    let home = workspace();
    let feed = home.path().join("feed.json");
    std::fs::write(
        &feed,
        r#"[{"title": "Chips", "url": "https://example.com/chips", "text": "A GPU story."}]"#,
    )
    .unwrap();

    foreigneye_cmd(&home)
        .args(["ingest", "--from-file", feed.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No API key"));
}

#[test]
fn test_doctor_reports_missing_key() {
    let home = workspace();
    foreigneye_cmd(&home)
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("LLM API key: Not configured"))
        .stdout(predicate::str::contains("Graph view: memory"));
}
