// Category 4: Generators
// Resumable routines: iteration, keys, send/throw, return values and protected regions.

use phlow::bound::builder::RoutineBuilder;
use phlow::bound::{BinaryOp, BlockKind};
use phlow::diagnostics::CompileError;

use super::common::{uncaught_message, TestProgram};

/// `foreach (gen() as $k => $v) echo "$k=$v;";` then `echo $g->getReturn();`.
fn iterate(producer: &str, with_keys: bool, show_return: bool) -> RoutineBuilder {
    let mut rb = RoutineBuilder::function("main");
    let start = rb.block();
    let _move_next = rb.block();
    let body = rb.block();
    let next = rb.block();
    let g = rb.var("g");
    let v = rb.var("v");
    let make = rb.call(producer, vec![]);
    let assign = rb.assign(g.clone(), make);
    rb.expr(start, assign);
    let key = with_keys.then(|| rb.var("k"));
    rb.foreach(start, g.clone(), v.clone(), key.clone(), false, next);
    if let Some(k) = key {
        rb.echo(body, k);
        rb.echo(body, rb.str("="));
    }
    rb.echo(body, v);
    rb.echo(body, rb.str(";"));
    rb.goto(body, start + 1);
    if show_return {
        let ret = rb.method_call(g, "getReturn", vec![]);
        rb.echo(next, ret);
    }
    rb.ret(next, None);
    rb
}

fn yields(name: &str, values: &[i64]) -> RoutineBuilder {
    let mut rb = RoutineBuilder::function(name).generator();
    let b = rb.block();
    for v in values {
        let y = rb.yield_value(rb.int(*v));
        rb.expr(b, y);
    }
    rb.ret(b, None);
    rb
}

// ============================================================================
// 1. Iteration
// ============================================================================

#[test]
fn test_foreach_over_generator() {
    let out = TestProgram::new().routine(yields("gen", &[1, 2, 3])).routine(iterate("gen", false, false)).output();
    assert_eq!(out, "1;2;3;");
}

#[test]
fn test_empty_generator_runs_no_iterations() {
    let out = TestProgram::new().routine(yields("gen", &[])).routine(iterate("gen", false, false)).output();
    assert_eq!(out, "");
}

#[test]
fn test_body_does_not_run_until_first_use() {
    let mut producer = RoutineBuilder::function("gen").generator();
    let b = producer.block();
    producer.echo(b, producer.str("started;"));
    let y = producer.yield_value(producer.int(1));
    producer.expr(b, y);
    producer.ret(b, None);

    let out = TestProgram::new()
        .routine(producer)
        .main(|rb, b| {
            let g = rb.var("g");
            let make = rb.call("gen", vec![]);
            let assign = rb.assign(g.clone(), make);
            rb.expr(b, assign);
            rb.echo(b, rb.str("created;"));
            let current = rb.method_call(g, "current", vec![]);
            rb.echo(b, current);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "created;started;1");
}

#[test]
fn test_auto_keys() {
    let out = TestProgram::new().routine(yields("gen", &[7, 8])).routine(iterate("gen", true, false)).output();
    assert_eq!(out, "0=7;1=8;");
}

#[test]
fn test_explicit_keys_advance_auto_keys() {
    let mut producer = RoutineBuilder::function("gen").generator();
    let b = producer.block();
    let y = producer.yield_pair(producer.str("a"), producer.str("x"));
    producer.expr(b, y);
    let y = producer.yield_pair(producer.int(5), producer.str("y"));
    producer.expr(b, y);
    let y = producer.yield_value(producer.str("z"));
    producer.expr(b, y);
    producer.ret(b, None);
    let out = TestProgram::new().routine(producer).routine(iterate("gen", true, false)).output();
    assert_eq!(out, "a=x;5=y;6=z;");
}

// ============================================================================
// 2. Return values
// ============================================================================

#[test]
fn test_get_return_after_completion() {
    let mut producer = RoutineBuilder::function("gen").generator();
    let b = producer.block();
    let y = producer.yield_value(producer.int(1));
    producer.expr(b, y);
    producer.ret(b, Some(producer.str("done")));
    let out = TestProgram::new().routine(producer).routine(iterate("gen", false, true)).output();
    assert_eq!(out, "1;done");
}

#[test]
fn test_get_return_before_completion_throws() {
    let outcome = TestProgram::new()
        .routine(yields("gen", &[1]))
        .main(|rb, b| {
            let g = rb.var("g");
            let make = rb.call("gen", vec![]);
            let assign = rb.assign(g.clone(), make);
            rb.expr(b, assign);
            let ret = rb.method_call(g, "getReturn", vec![]);
            rb.echo(b, ret);
            rb.ret(b, None);
        })
        .run();
    assert_eq!(uncaught_message(&outcome), "Cannot get return value of a generator that hasn't returned");
}

// ============================================================================
// 3. send() and throw()
// ============================================================================

#[test]
fn test_send_binds_the_yield_result() {
    let mut producer = RoutineBuilder::function("gen").generator();
    let b = producer.block();
    let x = producer.var("x");
    let y = producer.yield_value(producer.int(1));
    let bind = producer.assign(x.clone(), y);
    producer.expr(b, bind);
    producer.echo(b, producer.str("got:"));
    producer.echo(b, x);
    let z = producer.var("z");
    let y = producer.yield_value(producer.int(2));
    let bind = producer.assign(z.clone(), y);
    producer.expr(b, bind);
    producer.echo(b, producer.str("|got:"));
    producer.echo(b, z);
    producer.ret(b, None);

    let out = TestProgram::new()
        .routine(producer)
        .main(|rb, b| {
            let g = rb.var("g");
            let make = rb.call("gen", vec![]);
            let assign = rb.assign(g.clone(), make);
            rb.expr(b, assign);
            let current = rb.method_call(g.clone(), "current", vec![]);
            rb.echo(b, current);
            rb.echo(b, rb.str("|"));
            let sent = rb.method_call(g.clone(), "send", vec![rb.str("a")]);
            rb.echo(b, sent);
            rb.echo(b, rb.str("|"));
            let last = rb.method_call(g, "send", vec![rb.str("b")]);
            rb.expr(b, last);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "1|got:a2||got:b");
}

#[test]
fn test_throw_is_raised_at_the_suspended_yield() {
    let mut producer = RoutineBuilder::function("gen").generator();
    let owner = producer.block();
    let body = producer.block();
    let catch = producer.catch_block(&["Exception"], Some("e"));
    let next = producer.block();
    producer.try_catch(owner, body, vec![catch], None, next);
    let y = producer.yield_value(producer.int(1));
    producer.expr(body, y);
    producer.goto(body, next);
    producer.echo(catch, producer.str("caught:"));
    let e = producer.var("e");
    let msg = producer.method_call(e, "getMessage", vec![]);
    producer.echo(catch, msg);
    producer.echo(catch, producer.str("|"));
    producer.goto(catch, next);
    let y = producer.yield_value(producer.int(2));
    producer.expr(next, y);
    producer.ret(next, None);

    let out = TestProgram::new()
        .routine(producer)
        .main(|rb, b| {
            let g = rb.var("g");
            let make = rb.call("gen", vec![]);
            let assign = rb.assign(g.clone(), make);
            rb.expr(b, assign);
            let current = rb.method_call(g.clone(), "current", vec![]);
            rb.echo(b, current);
            rb.echo(b, rb.str("|"));
            let ex = rb.new_object("Exception", vec![rb.str("x")]);
            let thrown = rb.method_call(g, "throw", vec![ex]);
            rb.echo(b, thrown);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "1|caught:x|2");
}

// ============================================================================
// 4. Protected regions
// ============================================================================

#[test]
fn test_finally_runs_once_when_the_body_completes() {
    let mut producer = RoutineBuilder::function("gen").generator();
    let owner = producer.block();
    let body = producer.block();
    let finally = producer.block_of(BlockKind::Finally);
    let next = producer.block();
    producer.try_catch(owner, body, vec![], Some(finally), next);
    let y = producer.yield_value(producer.int(1));
    producer.expr(body, y);
    let y = producer.yield_value(producer.int(2));
    producer.expr(body, y);
    producer.goto(body, next);
    producer.echo(finally, producer.str("F;"));
    producer.goto(finally, next);
    producer.ret(next, None);

    let out = TestProgram::new().routine(producer).routine(iterate("gen", false, false)).output();
    assert_eq!(out, "1;2;F;");
}

#[test]
fn test_yield_in_finally_is_rejected() {
    let mut producer = RoutineBuilder::function("gen").generator();
    let owner = producer.block();
    let body = producer.block();
    let finally = producer.block_of(BlockKind::Finally);
    let next = producer.block();
    producer.try_catch(owner, body, vec![], Some(finally), next);
    producer.goto(body, next);
    let y = producer.yield_value(producer.int(1));
    producer.expr(finally, y);
    producer.goto(finally, next);
    producer.ret(next, None);

    let err = TestProgram::new().routine(producer).emit_err();
    assert!(matches!(err, CompileError::Unsupported { .. }), "{err}");
}

#[test]
fn test_yield_inside_an_expression_is_rejected() {
    let mut producer = RoutineBuilder::function("gen").generator();
    let b = producer.block();
    let y = producer.yield_value(producer.int(1));
    producer.echo(b, y);
    producer.ret(b, None);

    let err = TestProgram::new().routine(producer).emit_err();
    assert!(matches!(err, CompileError::Unsupported { .. }), "{err}");
}

// ============================================================================
// 5. Enumerator disposal
// ============================================================================

/// `foreach (gen() as $v) { echo "$v;"; <exit> }` where the body may leave the loop
/// early once `$v == 2`.
fn leave_at_two(exit: fn(&mut RoutineBuilder, usize, usize)) -> RoutineBuilder {
    let mut rb = RoutineBuilder::function("main");
    let start = rb.block();
    let _move_next = rb.block();
    let body = rb.block();
    let next = rb.block();
    let v = rb.var("v");
    let make = rb.call("gen", vec![]);
    rb.foreach(start, make, v.clone(), None, false, next);
    rb.echo(body, v);
    rb.echo(body, rb.str(";"));
    exit(&mut rb, body, next);
    rb.echo(next, rb.str("after"));
    rb.ret(next, None);
    rb
}

#[test]
fn test_exhausted_loop_disposes_once() {
    let outcome = TestProgram::new().routine(yields("gen", &[1, 2, 3])).routine(iterate("gen", false, false)).run();
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.output, "1;2;3;");
    assert_eq!(outcome.disposals, 1);
}

#[test]
fn test_break_disposes_once() {
    let program = leave_at_two(|rb, body, next| {
        let v = rb.var("v");
        let hit = rb.bin(BinaryOp::Eq, v, rb.int(2));
        rb.branch(body, hit, next, body - 1);
    });
    let outcome = TestProgram::new().routine(yields("gen", &[1, 2, 3])).routine(program).run();
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.output, "1;2;after");
    assert_eq!(outcome.disposals, 1);
}

#[test]
fn test_throw_out_of_the_loop_disposes_once() {
    let program = leave_at_two(|rb, body, _next| {
        let ex = rb.new_object("Exception", vec![rb.str("stop")]);
        rb.throw(body, ex);
    });
    let outcome = TestProgram::new().routine(yields("gen", &[1, 2, 3])).routine(program).run();
    assert_eq!(uncaught_message(&outcome), "stop");
    assert_eq!(outcome.output, "1;");
    assert_eq!(outcome.disposals, 1);
}
