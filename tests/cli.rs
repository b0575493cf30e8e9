use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn neurorag_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_neurorag"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(
        data_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates.",
    )
    .unwrap();
    fs::write(
        data_dir.join("beta.md"),
        "# Beta Document\n\nThis document discusses Python and machine learning.\n\nDeep learning frameworks like PyTorch are covered.",
    )
    .unwrap();
    fs::write(
        data_dir.join("gamma.txt"),
        "Gamma plain text file.\n\nContains notes about deployment and infrastructure.\n\nKubernetes and Docker are mentioned here.",
    )
    .unwrap();
    fs::write(data_dir.join("diagram.svg"), "<svg/>").unwrap();

    let config_content = format!(
        r#"[data]
dir = "{root}/data"

[index]
path = "{root}/vectorstore/db_index"

[chunking]
chunk_size = 120
chunk_overlap = 20

[embedding]
provider = "hash"
dims = 128

[log]
dir = "{root}/logs"
"#,
        root = root.display()
    );

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("neurorag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_neurorag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = neurorag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to run neurorag at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_build_reports_summary() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_neurorag(&config, &["build", "--progress", "off"]);
    assert!(success, "build failed: {}", stderr);
    assert!(stdout.contains("documents: 3"));
    assert!(stdout.contains("skipped files: 1"));
    assert!(stdout.contains("diagram.svg"));
    assert!(stdout.contains("model: hash-v1 (128 dims)"));
    assert!(stdout.trim_end().ends_with("ok"));
}

#[test]
fn test_build_json_progress_goes_to_stderr() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_neurorag(&config, &["build", "--progress", "json"]);
    assert!(success, "build failed: {}", stderr);
    assert!(stderr.contains(r#""phase":"embedding""#));
    assert!(!stdout.contains(r#""event""#));
}

#[test]
fn test_search_requires_trust() {
    let (_tmp, config) = setup_test_env();
    run_neurorag(&config, &["build", "--progress", "off"]);

    let (_, stderr, success) = run_neurorag(&config, &["search", "cargo crates"]);
    assert!(!success);
    assert!(stderr.contains("--trust-index"));
}

#[test]
fn test_search_finds_relevant_file() {
    let (_tmp, config) = setup_test_env();
    run_neurorag(&config, &["build", "--progress", "off"]);

    let (stdout, stderr, success) = run_neurorag(
        &config,
        &["search", "Kubernetes Docker deployment", "-k", "1", "--trust-index"],
    );
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.starts_with("1. ["));
    assert!(stdout.contains("Page N/A from gamma.txt"));
    assert!(!stdout.contains("2. ["));
}

#[test]
fn test_search_is_deterministic() {
    let (_tmp, config) = setup_test_env();
    run_neurorag(&config, &["build", "--progress", "off"]);

    let args = ["search", "machine learning", "--trust-index"];
    let (first, _, ok1) = run_neurorag(&config, &args);
    let (second, _, ok2) = run_neurorag(&config, &args);
    assert!(ok1 && ok2);
    assert_eq!(first, second);
}

#[test]
fn test_inspect_prints_metadata() {
    let (_tmp, config) = setup_test_env();
    run_neurorag(&config, &["build", "--progress", "off"]);

    let (stdout, stderr, success) = run_neurorag(&config, &["inspect", "--trust-index"]);
    assert!(success, "inspect failed: {}", stderr);
    assert!(stdout.contains("model: hash-v1"));
    assert!(stdout.contains("dims: 128"));
    assert!(stdout.contains("metric: cosine"));
    assert!(stdout.contains("matches configuration"));
}

#[test]
fn test_search_before_build_fails_cleanly() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_neurorag(&config, &["search", "anything", "--trust-index"]);
    assert!(!success);
    assert!(stderr.contains("neurorag build"));
}

#[test]
fn test_empty_data_dir_build_fails() {
    let (tmp, config) = setup_test_env();
    let empty = tmp.path().join("empty");
    fs::create_dir_all(&empty).unwrap();

    let (_, stderr, success) = run_neurorag(
        &config,
        &["build", "--data", empty.to_str().unwrap(), "--progress", "off"],
    );
    assert!(!success);
    assert!(stderr.contains("zero chunks"));
}

#[test]
fn test_invalid_chunking_config_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap();

    let (_, stderr, success) = run_neurorag(&bad, &["build"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"));
}
