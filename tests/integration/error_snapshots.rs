//! The user-facing text of compile errors.

use phlow::bound::builder::{ModuleBuilder, RoutineBuilder};
use phlow::bound::{BlockKind, BoundModule};
use phlow::codegen::generate_module;
use phlow::config::CodegenOptions;
use phlow::diagnostics::CompileError;
use phlow::il::Repr;
use phlow::runtime::HelperLibrary;

fn generate(routines: Vec<RoutineBuilder>, helpers: &HelperLibrary) -> CompileError {
    let mut module = ModuleBuilder::new();
    for rb in routines {
        module.routine(rb.build());
    }
    match generate_module(module.finish(), helpers, &CodegenOptions::default()) {
        Ok(image) => panic!("code generation should have failed:\n{image}"),
        Err(err) => err,
    }
}

#[test]
fn test_nested_yield_names_the_routine() {
    let mut rb = RoutineBuilder::function("broken").generator();
    let b = rb.block();
    let y = rb.yield_value(rb.int(1));
    rb.echo(b, y);
    rb.ret(b, None);
    let err = generate(vec![rb], &HelperLibrary::standard());
    insta::assert_snapshot!(err.to_string(), @"Unsupported construct: broken: yield nested inside an expression");
}

#[test]
fn test_return_from_finally() {
    let mut rb = RoutineBuilder::function("f");
    let owner = rb.block();
    let body = rb.block();
    let finally = rb.block_of(BlockKind::Finally);
    let next = rb.block();
    rb.try_catch(owner, body, vec![], Some(finally), next);
    rb.goto(body, next);
    rb.ret(finally, None);
    rb.ret(next, None);
    let err = generate(vec![rb], &HelperLibrary::standard());
    insta::assert_snapshot!(err.to_string(), @"Unsupported construct: f: return from a finally block");
}

#[test]
fn test_missing_helper() {
    let mut helpers = HelperLibrary::standard();
    assert!(helpers.remove("echo", &[Repr::String]));
    let mut rb = RoutineBuilder::function("hello");
    let b = rb.block();
    rb.echo(b, rb.str("hi"));
    rb.ret(b, None);
    let err = generate(vec![rb], &helpers);
    insta::assert_snapshot!(err.to_string(), @"Missing runtime helper `echo(string)`");
}

#[test]
fn test_dangling_edge_is_an_invariant_violation() {
    let mut rb = RoutineBuilder::function("main");
    let b = rb.block();
    rb.goto(b, 5);
    let err = generate(vec![rb], &HelperLibrary::standard());
    insta::assert_snapshot!(err.to_string(), @"Invariant violation: main: block #0 has a simple edge to missing block #5");
}

#[test]
fn test_malformed_module_json() {
    let err = BoundModule::from_json("{").unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"Input error: invalid bound module: EOF while parsing an object at line 1 column 1");
}

#[test]
fn test_config_value_out_of_range() {
    let err = CodegenOptions::parse("[codegen]\nmax_switch_table_span = 0\n", std::path::Path::new("phlow.toml")).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"Config error: codegen.max_switch_table_span must be at least 1");
}
