use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn chry_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("chry");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/chry.sqlite"

[retrieval]
min_similarity = 0.5
limit = 10

[sync]
max_commits = 10

[server]
bind = "127.0.0.1:7341"
"#,
        root.display()
    );

    let config_path = config_dir.join("chry.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_chry(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = chry_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run chry binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn add_project(config_path: &Path, url: &str) -> String {
    let (stdout, stderr, success) = run_chry(config_path, &["project", "add", "widgets", url]);
    assert!(success, "project add failed: stdout={}, stderr={}", stdout, stderr);
    stdout.trim().to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_chry(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/chry.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_chry(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_chry(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_project_add_prints_id() {
    let (_tmp, config_path) = setup_test_env();
    run_chry(&config_path, &["init"]);

    let id = add_project(&config_path, "https://github.com/acme/widgets");
    assert_eq!(id.len(), 36, "expected a UUID, got {:?}", id);
}

#[test]
fn test_sync_unknown_project_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_chry(&config_path, &["init"]);

    let (_, stderr, success) = run_chry(&config_path, &["sync", "missing-project"]);
    assert!(!success);
    assert!(
        stderr.contains("Project with ID missing-project not found"),
        "stderr: {}",
        stderr
    );
}

#[test]
fn test_sync_malformed_url_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_chry(&config_path, &["init"]);
    let id = add_project(&config_path, "not-a-url");

    let (_, stderr, success) = run_chry(&config_path, &["sync", &id]);
    assert!(!success);
    assert!(stderr.contains("Invalid GitHub URL"), "stderr: {}", stderr);
}

#[test]
fn test_ask_requires_embedding_provider() {
    let (_tmp, config_path) = setup_test_env();
    run_chry(&config_path, &["init"]);
    let id = add_project(&config_path, "https://github.com/acme/widgets");

    let (_, stderr, success) = run_chry(&config_path, &["ask", &id, "What does this do?"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_config_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(
        &bad,
        format!(
            "[db]\npath = \"{}/x.sqlite\"\n\n[retrieval]\nlimit = 0\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let (_, stderr, success) = run_chry(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("retrieval.limit"), "stderr: {}", stderr);
}
