// Category 3: Error Handling
// try/catch/finally regions, class filters, rethrow paths and exit propagation.

use phlow::bound::builder::RoutineBuilder;
use phlow::bound::BlockKind;
use phlow::runtime::Fault;
use phlow::symbols::ClassSymbol;

use super::common::{uncaught_class, TestProgram};

/// `try { throw new <thrown>("boom"); } catch (<caught> $e) { echo "caught:" . msg } finally { echo "|finally"; } echo "|after";`
fn try_program(thrown: &str, caught: &[&str], with_finally: bool) -> RoutineBuilder {
    let mut rb = RoutineBuilder::function("main");
    let owner = rb.block();
    let body = rb.block();
    let catch = rb.catch_block(caught, Some("e"));
    let finally = with_finally.then(|| rb.block_of(BlockKind::Finally));
    let next = rb.block();
    rb.try_catch(owner, body, vec![catch], finally, next);

    let ex = rb.new_object(thrown, vec![rb.str("boom")]);
    rb.throw(body, ex);

    rb.echo(catch, rb.str("caught:"));
    let e = rb.var("e");
    let msg = rb.method_call(e, "getMessage", vec![]);
    rb.echo(catch, msg);
    rb.goto(catch, next);

    if let Some(finally) = finally {
        rb.echo(finally, rb.str("|finally"));
        rb.goto(finally, next);
    }
    rb.echo(next, rb.str("|after"));
    rb.ret(next, None);
    rb
}

// ============================================================================
// 1. Catch filters
// ============================================================================

#[test]
fn test_catch_exact_class() {
    let out = TestProgram::new().routine(try_program("Exception", &["Exception"], false)).output();
    assert_eq!(out, "caught:boom|after");
}

#[test]
fn test_catch_by_ancestor() {
    let out = TestProgram::new().routine(try_program("TypeError", &["Throwable"], false)).output();
    assert_eq!(out, "caught:boom|after");
}

#[test]
fn test_catch_user_subclass() {
    let out = TestProgram::new()
        .class(ClassSymbol::new("AppException").extends("Exception"))
        .routine(try_program("AppException", &["Exception"], true))
        .output();
    assert_eq!(out, "caught:boom|finally|after");
}

#[test]
fn test_catch_list_matches_any_listed_class() {
    let out = TestProgram::new().routine(try_program("TypeError", &["LogicException", "TypeError"], false)).output();
    assert_eq!(out, "caught:boom|after");
}

#[test]
fn test_unmatched_exception_runs_finally_and_escapes() {
    let outcome = TestProgram::new().routine(try_program("Error", &["Exception"], true)).run();
    assert_eq!(outcome.output, "|finally");
    assert_eq!(uncaught_class(&outcome), "Error");
    assert_eq!(outcome.exit_status(), 255);
}

// ============================================================================
// 2. Finally
// ============================================================================

#[test]
fn test_finally_runs_on_normal_completion() {
    let mut rb = RoutineBuilder::function("main");
    let owner = rb.block();
    let body = rb.block();
    let finally = rb.block_of(BlockKind::Finally);
    let next = rb.block();
    rb.try_catch(owner, body, vec![], Some(finally), next);
    rb.echo(body, rb.str("body"));
    rb.goto(body, next);
    rb.echo(finally, rb.str("|finally"));
    rb.goto(finally, next);
    rb.echo(next, rb.str("|after"));
    rb.ret(next, None);
    assert_eq!(TestProgram::new().routine(rb).output(), "body|finally|after");
}

#[test]
fn test_return_inside_try_runs_finally_first() {
    let mut rb = RoutineBuilder::function("f");
    let owner = rb.block();
    let body = rb.block();
    let finally = rb.block_of(BlockKind::Finally);
    let next = rb.block();
    rb.try_catch(owner, body, vec![], Some(finally), next);
    rb.ret(body, Some(rb.str("value")));
    rb.echo(finally, rb.str("finally:"));
    rb.goto(finally, next);
    rb.ret(next, None);

    let out = TestProgram::new()
        .routine(rb)
        .main(|rb, b| {
            let call = rb.call("f", vec![]);
            rb.echo(b, call);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "finally:value");
}

#[test]
fn test_exception_thrown_in_catch_runs_finally() {
    let mut rb = RoutineBuilder::function("main");
    let owner = rb.block();
    let body = rb.block();
    let catch = rb.catch_block(&["Exception"], None);
    let finally = rb.block_of(BlockKind::Finally);
    let next = rb.block();
    rb.try_catch(owner, body, vec![catch], Some(finally), next);
    let first = rb.new_object("Exception", vec![rb.str("first")]);
    rb.throw(body, first);
    let second = rb.new_object("RuntimeException", vec![rb.str("second")]);
    rb.throw(catch, second);
    rb.echo(finally, rb.str("finally"));
    rb.goto(finally, next);
    rb.ret(next, None);

    let outcome = TestProgram::new()
        .class(ClassSymbol::new("RuntimeException").extends("Exception"))
        .routine(rb)
        .run();
    assert_eq!(outcome.output, "finally");
    assert_eq!(uncaught_class(&outcome), "RuntimeException");
}

// ============================================================================
// 3. Exit through handlers
// ============================================================================

#[test]
fn test_exit_is_not_caught_by_user_handlers() {
    let mut rb = RoutineBuilder::function("main");
    let owner = rb.block();
    let body = rb.block();
    let catch = rb.catch_block(&["Throwable"], None);
    let finally = rb.block_of(BlockKind::Finally);
    let next = rb.block();
    rb.try_catch(owner, body, vec![catch], Some(finally), next);
    rb.exit(body, Some(rb.int(4)));
    rb.echo(catch, rb.str("caught"));
    rb.goto(catch, next);
    rb.echo(finally, rb.str("finally"));
    rb.goto(finally, next);
    rb.echo(next, rb.str("|after"));
    rb.ret(next, None);

    let outcome = TestProgram::new().routine(rb).run();
    assert_eq!(outcome.output, "finally");
    assert!(matches!(outcome.result, Err(Fault::Exit(4))));
}

#[test]
fn test_exception_from_callee_is_caught() {
    let mut thrower = RoutineBuilder::function("thrower");
    let b = thrower.block();
    let ex = thrower.new_object("Exception", vec![thrower.str("deep")]);
    thrower.throw(b, ex);

    let out = TestProgram::new()
        .routine(thrower)
        .routine({
            let mut rb = RoutineBuilder::function("main");
            let owner = rb.block();
            let body = rb.block();
            let catch = rb.catch_block(&["Exception"], Some("e"));
            let next = rb.block();
            rb.try_catch(owner, body, vec![catch], None, next);
            let call = rb.call("thrower", vec![]);
            rb.expr(body, call);
            rb.goto(body, next);
            let e = rb.var("e");
            let msg = rb.method_call(e, "getMessage", vec![]);
            rb.echo(catch, msg);
            rb.goto(catch, next);
            rb.ret(next, None);
            rb
        })
        .output();
    assert_eq!(out, "deep");
}
