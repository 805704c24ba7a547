//! End-to-end runs of the `phlowc` binary on serialized bound modules.

#[path = "../common/mod.rs"]
mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;

use phlow::bound::builder::{ModuleBuilder, RoutineBuilder};
use phlow::span::Span;
use tempfile::TempDir;

use common::phlowc;

/// Serializes a module holding `main` built by `body` into `dir/module.json`. Every
/// statement gets a distinct source span, as a binder would assign.
fn write_module(dir: &Path, body: impl FnOnce(&mut RoutineBuilder, usize)) -> PathBuf {
    let mut rb = RoutineBuilder::function("main");
    let b = rb.block();
    body(&mut rb, b);
    let mut builder = ModuleBuilder::new();
    builder.routine(rb.build());
    let mut module = builder.finish();
    let mut offset = 0;
    for block in module.routines.iter_mut().flat_map(|r| r.cfg.blocks.iter_mut()) {
        for stmt in &mut block.statements {
            stmt.span = Span::new(offset + 1, offset + 8);
            offset += 10;
        }
    }
    let path = dir.join("module.json");
    fs::write(&path, module.to_json().unwrap()).unwrap();
    path
}

fn hello(rb: &mut RoutineBuilder, b: usize) {
    rb.echo(b, rb.str("hi"));
    rb.ret(b, None);
}

fn phlowc_in(dir: &Path, args: &[&str]) -> Output {
    phlowc().current_dir(dir).env_remove("PHLOW_LOG").args(args).output().unwrap()
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

// ============================================================================
// 1. emit and types
// ============================================================================

#[test]
fn test_emit_prints_listing() {
    let tmp = TempDir::new().unwrap();
    let module = write_module(tmp.path(), hello);
    let out = phlowc_in(tmp.path(), &["emit", module.to_str().unwrap()]);
    assert!(out.status.success(), "{}", stderr(&out));
    let listing = stdout(&out);
    assert!(listing.contains(".routine main()"), "{listing}");
    assert!(listing.contains("ldstr \"hi\""), "{listing}");
    assert!(listing.contains(".line 1..8"), "{listing}");
}

#[test]
fn test_emit_to_file() {
    let tmp = TempDir::new().unwrap();
    let module = write_module(tmp.path(), hello);
    let target = tmp.path().join("out.il");
    let out = phlowc_in(tmp.path(), &["emit", module.to_str().unwrap(), "-o", target.to_str().unwrap()]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).is_empty());
    assert!(fs::read_to_string(&target).unwrap().contains(".routine main()"));
}

#[test]
fn test_types_lists_locals() {
    let tmp = TempDir::new().unwrap();
    let module = write_module(tmp.path(), |rb, b| {
        let x = rb.var("x");
        let init = rb.assign(x, rb.int(1));
        rb.expr(b, init);
        rb.ret(b, None);
    });
    let out = phlowc_in(tmp.path(), &["types", module.to_str().unwrap()]);
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.starts_with("main\n"), "{text}");
    assert!(text.contains("  $x : "), "{text}");
}

// ============================================================================
// 2. run
// ============================================================================

#[test]
fn test_run_prints_output() {
    let tmp = TempDir::new().unwrap();
    let module = write_module(tmp.path(), hello);
    let out = phlowc_in(tmp.path(), &["run", module.to_str().unwrap()]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "hi");
}

#[test]
fn test_run_exit_status_follows_program() {
    let tmp = TempDir::new().unwrap();
    let module = write_module(tmp.path(), |rb, b| {
        rb.echo(b, rb.str("bye"));
        rb.exit(b, Some(rb.int(3)));
    });
    let out = phlowc_in(tmp.path(), &["run", module.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(3));
    assert_eq!(stdout(&out), "bye");
}

#[test]
fn test_run_reports_uncaught_exception() {
    let tmp = TempDir::new().unwrap();
    let module = write_module(tmp.path(), |rb, b| {
        let ex = rb.new_object("Exception", vec![rb.str("boom")]);
        rb.throw(b, ex);
    });
    let out = phlowc_in(tmp.path(), &["run", module.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(255));
    assert!(stderr(&out).contains("Uncaught Exception: boom"), "{}", stderr(&out));
}

#[test]
fn test_run_unknown_entry() {
    let tmp = TempDir::new().unwrap();
    let module = write_module(tmp.path(), hello);
    let out = phlowc_in(tmp.path(), &["run", module.to_str().unwrap(), "--entry", "start"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("entry routine `start` is not defined"), "{}", stderr(&out));
}

// ============================================================================
// 3. Failures
// ============================================================================

#[test]
fn test_malformed_module_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("module.json");
    fs::write(&path, "{\"routines\": 7}").unwrap();
    let out = phlowc_in(tmp.path(), &["emit", path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("invalid bound module"), "{}", stderr(&out));
}

#[test]
fn test_discovered_config_applies() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("phlow.toml"), "[codegen]\nemit_sequence_points = false\n").unwrap();
    let module = write_module(tmp.path(), hello);
    let out = phlowc_in(tmp.path(), &["emit", module.to_str().unwrap()]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(!stdout(&out).contains(".line"), "{}", stdout(&out));
}

#[test]
fn test_bad_explicit_config() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("custom.toml");
    fs::write(&config, "[codegen]\nunknown_knob = 1\n").unwrap();
    let module = write_module(tmp.path(), hello);
    let out = phlowc_in(tmp.path(), &["--config", config.to_str().unwrap(), "emit", module.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("error[config]"), "{}", stderr(&out));
}
