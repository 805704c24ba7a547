// Category 2: Control Flow
// Branches, loops, switch strategies and exit.

use phlow::bound::builder::RoutineBuilder;
use phlow::bound::{BinaryOp, BlockKind, IncDecKind};
use phlow::config::CodegenOptions;
use phlow::runtime::{Fault, PhpValue};

use super::common::TestProgram;

/// `for ($i = 0; $i < $n; $i++) echo $i;` followed by `echo "."`.
fn counting_loop(n: i64) -> RoutineBuilder {
    let mut rb = RoutineBuilder::function("main");
    let init = rb.block();
    let cond = rb.block();
    let body = rb.block();
    let done = rb.block();
    let i = rb.var("i");
    let start = rb.assign(i.clone(), rb.int(0));
    rb.expr(init, start);
    rb.goto(init, cond);
    let test = rb.bin(BinaryOp::Lt, i.clone(), rb.int(n));
    rb.branch(cond, test, body, done);
    rb.echo(body, i.clone());
    let step = rb.inc_dec(IncDecKind::PostInc, i);
    rb.expr(body, step);
    rb.goto(body, cond);
    rb.echo(done, rb.str("."));
    rb.ret(done, None);
    rb
}

// ============================================================================
// 1. Branches and loops
// ============================================================================

#[test]
fn test_if_else() {
    for (n, expected) in [(1, "small"), (10, "large")] {
        let mut rb = RoutineBuilder::function("main");
        let b = rb.block();
        let then = rb.block();
        let other = rb.block();
        let cond = rb.bin(BinaryOp::Lt, rb.int(n), rb.int(5));
        rb.branch(b, cond, then, other);
        rb.echo(then, rb.str("small"));
        rb.ret(then, None);
        rb.echo(other, rb.str("large"));
        rb.ret(other, None);
        assert_eq!(TestProgram::new().routine(rb).output(), expected);
    }
}

#[test]
fn test_counting_loop() {
    assert_eq!(TestProgram::new().routine(counting_loop(4)).output(), "0123.");
    assert_eq!(TestProgram::new().routine(counting_loop(0)).output(), ".");
}

#[test]
fn test_loop_condition_placement_does_not_change_behaviour() {
    let plain = CodegenOptions { invert_loop_conditions: false, ..CodegenOptions::default() };
    let a = TestProgram::new().routine(counting_loop(3)).output();
    let b = TestProgram::new().options(plain).routine(counting_loop(3)).output();
    assert_eq!(a, b);
}

#[test]
fn test_return_value_reaches_caller() {
    let mut rb = RoutineBuilder::function("answer");
    let b = rb.block();
    let v = rb.bin(BinaryOp::Mul, rb.int(6), rb.int(7));
    rb.ret(b, Some(v));
    let outcome = TestProgram::new().routine(rb).run_with("answer", vec![]);
    assert!(matches!(outcome.result, Ok(PhpValue::Long(42))));
}

// ============================================================================
// 2. Switch
// ============================================================================

/// `switch ($x) { case 1: echo "one"; break; case 2: echo "two"; case 3: echo "three"; break; default: echo "other"; }`
fn switch_on(subject: impl FnOnce(&mut RoutineBuilder) -> phlow::bound::BoundExpr) -> RoutineBuilder {
    let mut rb = RoutineBuilder::function("main");
    let b = rb.block();
    let one = rb.block();
    let two = rb.block();
    let three = rb.block();
    let other = rb.block();
    let done = rb.block();
    let subject = subject(&mut rb);
    let cases = vec![
        (Some(rb.int(1)), one),
        (Some(rb.int(2)), two),
        (Some(rb.int(3)), three),
        (None, other),
    ];
    rb.switch(b, subject, cases, done);
    rb.echo(one, rb.str("one"));
    rb.goto(one, done);
    rb.echo(two, rb.str("two"));
    rb.goto(two, three);
    rb.echo(three, rb.str("three"));
    rb.goto(three, done);
    rb.echo(other, rb.str("other"));
    rb.goto(other, done);
    rb.ret(done, None);
    rb
}

#[test]
fn test_integer_switch_with_fall_through() {
    let out = TestProgram::new().routine(switch_on(|rb| rb.int(2))).output();
    assert_eq!(out, "twothree");
}

#[test]
fn test_switch_default() {
    let out = TestProgram::new().routine(switch_on(|rb| rb.int(9))).output();
    assert_eq!(out, "other");
}

#[test]
fn test_switch_uses_loose_equality_for_any_subject() {
    let out = TestProgram::new().routine(switch_on(|rb| rb.str("1"))).output();
    assert_eq!(out, "one");
    let out = TestProgram::new().routine(switch_on(|rb| rb.float(3.0))).output();
    assert_eq!(out, "three");
}

#[test]
fn test_switch_strategies_agree() {
    let no_tables = CodegenOptions { integer_switch_tables: false, ..CodegenOptions::default() };
    for subject in [1, 2, 3, 4] {
        let table = TestProgram::new().routine(switch_on(|rb| rb.int(subject))).output();
        let chain = TestProgram::new().options(no_tables.clone()).routine(switch_on(|rb| rb.int(subject))).output();
        assert_eq!(table, chain, "subject {subject}");
    }
}

/// `try { switch ($x) { case 1: echo "one"; break; case 2: echo "two"; break; } } finally { echo "|finally"; }`
/// with every way out of the switch going straight to the block after the try.
fn switch_in_try(subject: i64) -> RoutineBuilder {
    let mut rb = RoutineBuilder::function("main");
    let owner = rb.block();
    let head = rb.block();
    let one = rb.block();
    let two = rb.block();
    let finally = rb.block_of(BlockKind::Finally);
    let next = rb.block();
    rb.try_catch(owner, head, vec![], Some(finally), next);
    let cases = vec![(Some(rb.int(1)), one), (Some(rb.int(2)), two)];
    rb.switch(head, rb.int(subject), cases, next);
    rb.echo(one, rb.str("one"));
    rb.goto(one, next);
    rb.echo(two, rb.str("two"));
    rb.goto(two, next);
    rb.echo(finally, rb.str("|finally"));
    rb.goto(finally, next);
    rb.echo(next, rb.str("|after"));
    rb.ret(next, None);
    rb
}

#[test]
fn test_switch_leaving_a_try_runs_finally() {
    let no_tables = CodegenOptions { integer_switch_tables: false, ..CodegenOptions::default() };
    for (subject, expected) in [(1, "one|finally|after"), (2, "two|finally|after"), (9, "|finally|after")] {
        let table = TestProgram::new().routine(switch_in_try(subject)).output();
        assert_eq!(table, expected, "subject {subject}");
        let chain = TestProgram::new().options(no_tables.clone()).routine(switch_in_try(subject)).output();
        assert_eq!(chain, expected, "subject {subject}");
    }
}

// ============================================================================
// 3. Exit
// ============================================================================

#[test]
fn test_exit_status() {
    let outcome = TestProgram::new()
        .main(|rb, b| {
            rb.echo(b, rb.str("bye"));
            rb.exit(b, Some(rb.int(3)));
        })
        .run();
    assert_eq!(outcome.output, "bye");
    assert!(matches!(outcome.result, Err(Fault::Exit(3))));
    assert_eq!(outcome.exit_status(), 3);
}

#[test]
fn test_exit_with_message_prints_it() {
    let outcome = TestProgram::new()
        .main(|rb, b| {
            rb.exit(b, Some(rb.str("fatal")));
        })
        .run();
    assert_eq!(outcome.output, "fatal");
    assert_eq!(outcome.exit_status(), 0);
}
