//! Discovery and loading of `phlow.toml`.

use std::fs;

use phlow::config::{CodegenOptions, CONFIG_FILE};
use phlow::diagnostics::CompileError;
use tempfile::TempDir;

fn write_config(dir: &std::path::Path, body: &str) {
    fs::write(dir.join(CONFIG_FILE), body).unwrap();
}

#[test]
fn test_discovery_finds_config_in_start_dir() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), "[codegen]\nparallel = false\n");
    let opts = CodegenOptions::discover(tmp.path()).unwrap();
    assert!(!opts.parallel);
}

#[test]
fn test_discovery_walks_up_to_an_ancestor() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), "[codegen]\nmax_switch_table_span = 16\n");
    let nested = tmp.path().join("src").join("deep");
    fs::create_dir_all(&nested).unwrap();
    let opts = CodegenOptions::discover(&nested).unwrap();
    assert_eq!(opts.max_switch_table_span, 16);
}

#[test]
fn test_discovery_stops_at_repository_root() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), "[codegen]\nparallel = false\n");
    let repo = tmp.path().join("repo");
    fs::create_dir_all(repo.join(".git")).unwrap();
    let inner = repo.join("pkg");
    fs::create_dir_all(&inner).unwrap();
    let opts = CodegenOptions::discover(&inner).unwrap();
    assert_eq!(opts, CodegenOptions::default());
}

#[test]
fn test_config_at_repository_root_is_used() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join(".git")).unwrap();
    write_config(tmp.path(), "[codegen]\ninteger_switch_tables = false\n");
    let opts = CodegenOptions::discover(tmp.path()).unwrap();
    assert!(!opts.integer_switch_tables);
}

#[test]
fn test_unknown_key_is_rejected() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), "[codegen]\nparalel = true\n");
    let err = CodegenOptions::discover(tmp.path()).unwrap_err();
    match err {
        CompileError::Config { msg, path } => {
            assert!(msg.contains("paralel"), "{msg}");
            assert_eq!(path, tmp.path().join(CONFIG_FILE));
        }
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn test_unknown_table_is_rejected() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), "[emit]\nparallel = true\n");
    let err = CodegenOptions::discover(tmp.path()).unwrap_err();
    assert!(matches!(err, CompileError::Config { .. }), "{err:?}");
}

#[test]
fn test_load_of_missing_file() {
    let tmp = TempDir::new().unwrap();
    let err = CodegenOptions::load(&tmp.path().join(CONFIG_FILE)).unwrap_err();
    assert!(err.to_string().starts_with("Config error: cannot read phlow.toml"), "{err}");
}

#[test]
fn test_malformed_toml() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), "[codegen\n");
    let err = CodegenOptions::discover(tmp.path()).unwrap_err();
    assert!(matches!(err, CompileError::Config { .. }), "{err:?}");
}
