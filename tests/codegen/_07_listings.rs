// Category 7: Listings
// The textual form of generated bodies: headers, typed locals, operator selection and regions.

use phlow::bound::builder::RoutineBuilder;
use phlow::bound::{BinaryOp, BlockKind};
use phlow::config::CodegenOptions;
use phlow::symbols::ClassSymbol;
use phlow::types::TypeRefMask;

use super::common::TestProgram;

/// Instruction lines of `routine` in `listing`, trimmed.
fn body_of<'a>(listing: &'a str, routine: &str) -> Vec<&'a str> {
    let header = format!(".routine {routine}(");
    listing
        .lines()
        .skip_while(|l| !l.starts_with(&header))
        .skip(1)
        .take_while(|l| !l.starts_with(".routine"))
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect()
}

/// `function f($a, $b) { return $a <op> $b; }` with both parameters typed by `mask`.
fn binary_routine(op: BinaryOp, mask: fn(&RoutineBuilder) -> TypeRefMask) -> RoutineBuilder {
    let rb = RoutineBuilder::function("f");
    let m = mask(&rb);
    let mut rb = rb.param("a", m).param("b", m);
    let b = rb.block();
    let (a, c) = (rb.var("a"), rb.var("b"));
    let v = rb.bin(op, a, c);
    rb.ret(b, Some(v));
    rb
}

// ============================================================================
// 1. Headers and locals
// ============================================================================

#[test]
fn test_headers_show_parameters_and_modifiers() {
    let mut tick = RoutineBuilder::method("Counter", "make").static_method();
    let b = tick.block();
    tick.ret(b, None);
    let mut producer = RoutineBuilder::function("numbers").generator();
    let b = producer.block();
    let y = producer.yield_value(producer.int(1));
    producer.expr(b, y);
    producer.ret(b, None);
    let mut swap = RoutineBuilder::function("swap").param_ref("x").param("y", TypeRefMask::ANY);
    let b = swap.block();
    swap.ret(b, None);

    let listing = TestProgram::new()
        .class(ClassSymbol::new("Counter"))
        .routine(tick)
        .routine(producer)
        .routine(swap)
        .emit()
        .to_string();
    assert!(listing.contains(".routine Counter::make() static\n"), "{listing}");
    assert!(listing.contains(".routine numbers() generator\n"), "{listing}");
    assert!(listing.contains(".routine swap(&$x, $y)\n"), "{listing}");
}

#[test]
fn test_locals_carry_their_representation() {
    let listing = TestProgram::new().routine(binary_routine(BinaryOp::Add, RoutineBuilder::double_mask)).emit().to_string();
    let body = body_of(&listing, "f");
    assert_eq!(body.first(), Some(&".locals ([0] double $a, [1] double $b)"), "{listing}");
}

#[test]
fn test_untyped_locals_are_generic_values() {
    let listing = TestProgram::new().routine(binary_routine(BinaryOp::Add, |_| TypeRefMask::ANY)).emit().to_string();
    assert!(listing.contains("[0] value $a"), "{listing}");
}

// ============================================================================
// 2. Operator selection
// ============================================================================

#[test]
fn test_double_arithmetic_is_native() {
    let listing = TestProgram::new().routine(binary_routine(BinaryOp::Mul, RoutineBuilder::double_mask)).emit().to_string();
    let body = body_of(&listing, "f");
    assert!(body.contains(&"mul"), "{listing}");
    assert!(!body.iter().any(|l| l.starts_with("call mul(")), "{listing}");
}

#[test]
fn test_long_addition_goes_through_the_overflow_checked_helper() {
    let listing = TestProgram::new().routine(binary_routine(BinaryOp::Add, RoutineBuilder::long_mask)).emit().to_string();
    let body = body_of(&listing, "f");
    assert!(body.iter().any(|l| l.starts_with("call add(long, long)")), "{listing}");
    assert!(!body.contains(&"add"), "{listing}");
}

#[test]
fn test_untyped_addition_uses_the_generic_helper() {
    let listing = TestProgram::new().routine(binary_routine(BinaryOp::Add, |_| TypeRefMask::ANY)).emit().to_string();
    assert!(listing.contains("call add(value, value)"), "{listing}");
}

#[test]
fn test_long_comparison_is_native() {
    let listing = TestProgram::new().routine(binary_routine(BinaryOp::Lt, RoutineBuilder::long_mask)).emit().to_string();
    let body = body_of(&listing, "f");
    assert!(body.contains(&"clt"), "{listing}");
}

// ============================================================================
// 3. Regions and call sites
// ============================================================================

#[test]
fn test_try_catch_finally_listing() {
    let mut rb = RoutineBuilder::function("main");
    let owner = rb.block();
    let body = rb.block();
    let catch = rb.catch_block(&["Exception"], None);
    let finally = rb.block_of(BlockKind::Finally);
    let next = rb.block();
    rb.try_catch(owner, body, vec![catch], Some(finally), next);
    rb.echo(body, rb.str("body"));
    rb.goto(body, next);
    rb.goto(catch, next);
    rb.goto(finally, next);
    rb.ret(next, None);

    let listing = TestProgram::new().routine(rb).emit().to_string();
    let lines = body_of(&listing, "main");
    let position = |needle: &str| lines.iter().position(|l| *l == needle);
    let order = [
        position(".try {"),
        position("} catch (<exit>) {"),
        position("rethrow"),
        position("} catch (Exception) {"),
        position("} finally {"),
        position("endfinally"),
    ];
    assert!(order.iter().all(Option::is_some), "{listing}");
    assert!(order.windows(2).all(|w| w[0] < w[1]), "{listing}");
    assert_eq!(lines.iter().filter(|l| **l == ".try {").count(), 2, "{listing}");
}

#[test]
fn test_dynamic_call_uses_a_cached_site() {
    let image = TestProgram::new()
        .main(|rb, b| {
            let f = rb.var("f");
            let init = rb.assign(f.clone(), rb.str("strlen"));
            rb.expr(b, init);
            let call = rb.call_expr(f, vec![rb.str("abc")]);
            rb.expr(b, call);
            rb.ret(b, None);
        })
        .emit();
    assert_eq!(image.call_sites(), 1);
    let listing = image.to_string();
    let body = body_of(&listing, "main");
    assert!(body.contains(&"ldsite 0"), "{listing}");
    assert!(body.contains(&"stsite 0"), "{listing}");
    // The name expression travels as a leading operand.
    assert!(body.contains(&"invoke/2"), "{listing}");
}

#[test]
fn test_resolved_function_is_called_directly() {
    let mut helper = RoutineBuilder::function("helper");
    let b = helper.block();
    helper.ret(b, None);
    let image = TestProgram::new()
        .routine(helper)
        .main(|rb, b| {
            let call = rb.call("helper", vec![]);
            rb.expr(b, call);
            rb.ret(b, None);
        })
        .emit();
    assert_eq!(image.call_sites(), 0);
    assert!(body_of(&image.to_string(), "main").contains(&"call.routine helper/0"));
}

#[test]
fn test_jump_table_option_controls_switch_lowering() {
    let build = || {
        let mut rb = RoutineBuilder::function("main").param("x", TypeRefMask::ANY);
        let b = rb.block();
        let one = rb.block();
        let two = rb.block();
        let done = rb.block();
        let x = rb.var("x");
        let cases = vec![(Some(rb.int(1)), one), (Some(rb.int(2)), two)];
        rb.switch(b, x, cases, done);
        rb.goto(one, done);
        rb.goto(two, done);
        rb.ret(done, None);
        rb
    };
    let has_switch = |opts: CodegenOptions| {
        let listing = TestProgram::new().options(opts).routine(build()).emit().to_string();
        body_of(&listing, "main").iter().any(|l| l.starts_with("switch ("))
    };
    assert!(has_switch(CodegenOptions::default()));
    assert!(!has_switch(CodegenOptions { integer_switch_tables: false, ..CodegenOptions::default() }));
}
