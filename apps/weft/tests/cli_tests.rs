//! CLI commands run against a temporary project.

use clap::Parser;
use std::path::Path;
use tempfile::tempdir;
use weft::cli::{Cli, execute};
use weft_core::{Store, WeftError};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir");
    }
    std::fs::write(path, content).expect("write");
}

fn run(config: &Path, args: &[&str]) -> Result<(), WeftError> {
    let config = config.to_string_lossy();
    let mut argv = vec!["weft", "--config", config.as_ref(), "--json"];
    argv.extend_from_slice(args);
    execute(Cli::try_parse_from(argv).expect("arguments"))
}

fn project() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().expect("tempdir");
    let config = dir.path().join("weft.toml");
    std::fs::write(&config, "[store]\nlock_timeout_ms = 200\n").expect("config");
    write(dir.path(), "docs/a.md", "# Alpha\n\nSee [[Beta]].\n");
    write(dir.path(), "docs/b.md", "# Beta\n\nSee [[Alpha]].\n");
    (dir, config)
}

#[test]
fn ingest_then_query_commands() {
    let (dir, config) = project();

    run(&config, &["ingest"]).expect("ingest");
    let store_path = dir.path().join(".weft/resonance.redb");
    assert!(store_path.exists());

    run(&config, &["stats"]).expect("stats");
    run(&config, &["pillars", "-n", "3"]).expect("pillars");
    run(&config, &["candidates"]).expect("candidates");
    run(&config, &["communities"]).expect("communities");
    run(&config, &["checkpoint"]).expect("checkpoint");

    let store = Store::open_read_only(&store_path, std::time::Duration::from_millis(200))
        .expect("open");
    assert_eq!(store.stats().expect("stats").edges, 2);
}

#[test]
fn search_without_embed_service_is_a_config_error() {
    let (_dir, config) = project();
    run(&config, &["ingest"]).expect("ingest");
    assert!(matches!(
        run(&config, &["search", "alpha"]),
        Err(WeftError::InvalidConfig(_))
    ));
}

#[test]
fn read_commands_need_an_existing_store() {
    let (dir, config) = project();
    assert!(run(&config, &["stats"]).is_err());
    assert!(!dir.path().join(".weft/resonance.redb").exists());
}

#[test]
fn squash_and_prune() {
    let (dir, config) = project();
    run(&config, &["ingest"]).expect("ingest");
    write(
        dir.path(),
        "sidecars/docs/a.md.ember.json",
        r#"{"graphData": {"entities": [{"name": "Thing", "type": "concept"}], "relationships": []}}"#,
    );

    let sidecars = dir.path().join("sidecars");
    run(&config, &["squash", sidecars.to_string_lossy().as_ref()]).expect("squash");
    run(&config, &["prune", "docs-b"]).expect("prune");

    let store = Store::open_read_only(
        dir.path().join(".weft/resonance.redb"),
        std::time::Duration::from_millis(200),
    )
    .expect("open");
    assert!(store.get_node("docs-a-md-thing").expect("get").is_some());
    assert!(store.get_node("docs-b").expect("get").is_none());
}
