// Category 5: Calls
// Direct and dynamic calls, parameters, methods, constructors and static members.

use phlow::bound::builder::RoutineBuilder;
use phlow::bound::{BinaryOp, ConstValue, IncDecKind};
use phlow::symbols::ClassSymbol;
use phlow::types::TypeRefMask;

use super::common::{uncaught_class, uncaught_message, TestProgram};

/// `function greet($name, $greeting = "Hello") { return "$greeting, $name"; }`
fn greet() -> RoutineBuilder {
    let mut rb = RoutineBuilder::function("greet")
        .param("name", TypeRefMask::ANY)
        .param_default("greeting", TypeRefMask::ANY, ConstValue::String("Hello".into()));
    let b = rb.block();
    let greeting = rb.var("greeting");
    let name = rb.var("name");
    let head = rb.bin(BinaryOp::Concat, greeting, rb.str(", "));
    let text = rb.bin(BinaryOp::Concat, head, name);
    rb.ret(b, Some(text));
    rb
}

/// `class Point { public $x = 0; public $y = 0; function __construct($x, $y) {...} function sum() {...} }`
fn point_class() -> ClassSymbol {
    ClassSymbol::new("Point")
        .field("x", Some(ConstValue::Long(0)))
        .field("y", Some(ConstValue::Long(0)))
}

fn point_constructor() -> RoutineBuilder {
    let mut rb = RoutineBuilder::method("Point", "__construct")
        .param("x", TypeRefMask::ANY)
        .param("y", TypeRefMask::ANY);
    let b = rb.block();
    for name in ["x", "y"] {
        let value = rb.var(name);
        let field = rb.field(rb.this(), name);
        let store = rb.assign(field, value);
        rb.expr(b, store);
    }
    rb.ret(b, None);
    rb
}

fn point_sum() -> RoutineBuilder {
    let mut rb = RoutineBuilder::method("Point", "sum");
    let b = rb.block();
    let x = rb.field(rb.this(), "x");
    let y = rb.field(rb.this(), "y");
    let sum = rb.bin(BinaryOp::Add, x, y);
    rb.ret(b, Some(sum));
    rb
}

// ============================================================================
// 1. Functions and parameters
// ============================================================================

#[test]
fn test_default_parameter_fills_missing_argument() {
    let out = TestProgram::new()
        .routine(greet())
        .main(|rb, b| {
            let short = rb.call("greet", vec![rb.str("Ann")]);
            rb.echo(b, short);
            rb.echo(b, rb.str("|"));
            let full = rb.call("greet", vec![rb.str("Bo"), rb.str("Hi")]);
            rb.echo(b, full);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "Hello, Ann|Hi, Bo");
}

#[test]
fn test_missing_required_argument() {
    let outcome = TestProgram::new()
        .routine(greet())
        .main(|rb, b| {
            let call = rb.call("greet", vec![]);
            rb.echo(b, call);
            rb.ret(b, None);
        })
        .run();
    assert_eq!(uncaught_class(&outcome), "ArgumentCountError");
    assert_eq!(
        uncaught_message(&outcome),
        "Too few arguments to function greet(), 0 passed and at least 1 expected"
    );
}

#[test]
fn test_by_reference_parameter_updates_caller() {
    let mut inc = RoutineBuilder::function("inc").param_ref("n");
    let b = inc.block();
    let n = inc.var("n");
    let bump = inc.inc_dec(IncDecKind::PreInc, n);
    inc.expr(b, bump);
    inc.ret(b, None);

    let out = TestProgram::new()
        .routine(inc)
        .main(|rb, b| {
            let a = rb.var("a");
            let init = rb.assign(a.clone(), rb.int(1));
            rb.expr(b, init);
            for _ in 0..2 {
                let call = rb.call("inc", vec![a.clone()]);
                rb.expr(b, call);
            }
            rb.echo(b, a);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "3");
}

#[test]
fn test_by_value_parameter_is_a_copy() {
    let mut clobber = RoutineBuilder::function("clobber").param("n", TypeRefMask::ANY);
    let b = clobber.block();
    let n = clobber.var("n");
    let store = clobber.assign(n, clobber.int(99));
    clobber.expr(b, store);
    clobber.ret(b, None);

    let out = TestProgram::new()
        .routine(clobber)
        .main(|rb, b| {
            let a = rb.var("a");
            let init = rb.assign(a.clone(), rb.int(1));
            rb.expr(b, init);
            let call = rb.call("clobber", vec![a.clone()]);
            rb.expr(b, call);
            rb.echo(b, a);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "1");
}

#[test]
fn test_recursion() {
    // function fact($n) { return $n <= 1 ? 1 : $n * fact($n - 1); }
    let mut fact = RoutineBuilder::function("fact").param("n", TypeRefMask::ANY);
    let b = fact.block();
    let n = fact.var("n");
    let base = fact.bin(BinaryOp::Le, n.clone(), fact.int(1));
    let less = fact.bin(BinaryOp::Sub, n.clone(), fact.int(1));
    let inner = fact.call("fact", vec![less]);
    let product = fact.bin(BinaryOp::Mul, n, inner);
    let result = fact.ternary(base, fact.int(1), product);
    fact.ret(b, Some(result));

    let out = TestProgram::new()
        .routine(fact)
        .main(|rb, b| {
            let call = rb.call("fact", vec![rb.int(10)]);
            rb.echo(b, call);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "3628800");
}

// ============================================================================
// 2. Dynamic call sites
// ============================================================================

#[test]
fn test_dynamic_function_name_binds_its_site_once() {
    let mut double = RoutineBuilder::function("double").param("n", TypeRefMask::ANY);
    let b = double.block();
    let n = double.var("n");
    let twice = double.bin(BinaryOp::Mul, n, double.int(2));
    double.ret(b, Some(twice));

    let outcome = TestProgram::new()
        .routine(double)
        .main(|rb, entry| {
            // for ($i = 1; $i <= 3; $i++) echo $f($i);
            let cond = rb.block();
            let body = rb.block();
            let done = rb.block();
            let f = rb.var("f");
            let i = rb.var("i");
            let init = rb.assign(f.clone(), rb.str("double"));
            rb.expr(entry, init);
            let start = rb.assign(i.clone(), rb.int(1));
            rb.expr(entry, start);
            rb.goto(entry, cond);
            let test = rb.bin(BinaryOp::Le, i.clone(), rb.int(3));
            rb.branch(cond, test, body, done);
            let call = rb.call_expr(f, vec![i.clone()]);
            rb.echo(body, call);
            let step = rb.inc_dec(IncDecKind::PostInc, i);
            rb.expr(body, step);
            rb.goto(body, cond);
            rb.ret(done, None);
        })
        .run();
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.output, "246");
    assert_eq!(outcome.binds, 1);
}

#[test]
fn test_unknown_function_fails_at_run_time() {
    let outcome = TestProgram::new()
        .main(|rb, b| {
            let call = rb.call("nowhere", vec![]);
            rb.expr(b, call);
            rb.ret(b, None);
        })
        .run();
    assert_eq!(uncaught_message(&outcome), "Call to undefined function nowhere()");
}

// ============================================================================
// 3. Objects
// ============================================================================

#[test]
fn test_constructor_and_method() {
    let out = TestProgram::new()
        .class(point_class())
        .routine(point_constructor())
        .routine(point_sum())
        .main(|rb, b| {
            let p = rb.var("p");
            let make = rb.new_object("Point", vec![rb.int(3), rb.int(4)]);
            let assign = rb.assign(p.clone(), make);
            rb.expr(b, assign);
            let sum = rb.method_call(p.clone(), "sum", vec![]);
            rb.echo(b, sum);
            rb.echo(b, rb.str("|"));
            let x = rb.field(p, "x");
            rb.echo(b, x);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "7|3");
}

#[test]
fn test_field_defaults_without_constructor() {
    let out = TestProgram::new()
        .class(point_class())
        .routine(point_sum())
        .main(|rb, b| {
            let make = rb.new_object("Point", vec![]);
            let sum = rb.method_call(make, "sum", vec![]);
            rb.echo(b, sum);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "0");
}

#[test]
fn test_dynamic_method_name() {
    let out = TestProgram::new()
        .class(point_class())
        .routine(point_constructor())
        .routine(point_sum())
        .main(|rb, b| {
            let p = rb.new_object("Point", vec![rb.int(1), rb.int(2)]);
            let m = rb.var("m");
            let init = rb.assign(m.clone(), rb.str("sum"));
            rb.expr(b, init);
            let call = rb.method_call_dyn(p, m, vec![]);
            rb.echo(b, call);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "3");
}

#[test]
fn test_inherited_method_through_unknown_receiver() {
    let mut describe = RoutineBuilder::method("Shape", "describe");
    let b = describe.block();
    describe.ret(b, Some(describe.str("shape")));

    // The receiver comes back from a call, so its class is unknown at compile time.
    let mut make = RoutineBuilder::function("make");
    let b = make.block();
    let sq = make.new_object("Square", vec![]);
    make.ret(b, Some(sq));

    let out = TestProgram::new()
        .class(ClassSymbol::new("Shape"))
        .class(ClassSymbol::new("Square").extends("Shape"))
        .routine(describe)
        .routine(make)
        .main(|rb, b| {
            let make = rb.call("make", vec![]);
            let call = rb.method_call(make, "describe", vec![]);
            rb.echo(b, call);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "shape");
}

#[test]
fn test_static_method_call() {
    let mut twice = RoutineBuilder::method("MathUtil", "twice").static_method().param("n", TypeRefMask::ANY);
    let b = twice.block();
    let n = twice.var("n");
    let v = twice.bin(BinaryOp::Mul, n, twice.int(2));
    twice.ret(b, Some(v));

    let out = TestProgram::new()
        .class(ClassSymbol::new("MathUtil"))
        .routine(twice)
        .main(|rb, b| {
            let call = rb.static_call("MathUtil", "twice", vec![rb.int(21)]);
            rb.echo(b, call);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "42");
}

#[test]
fn test_instantiating_an_unknown_class() {
    let outcome = TestProgram::new()
        .main(|rb, b| {
            let make = rb.new_object("Missing", vec![]);
            rb.expr(b, make);
            rb.ret(b, None);
        })
        .run();
    assert_eq!(uncaught_class(&outcome), "Error");
    assert_eq!(uncaught_message(&outcome), "Class \"Missing\" not found");
}

#[test]
fn test_instance_of() {
    let out = TestProgram::new()
        .class(ClassSymbol::new("Shape"))
        .class(ClassSymbol::new("Square").extends("Shape"))
        .main(|rb, b| {
            let sq = rb.new_object("Square", vec![]);
            let is_shape = rb.instance_of(sq, "Shape");
            let flag = rb.ternary(is_shape, rb.str("y"), rb.str("n"));
            rb.echo(b, flag);
            let n = rb.int(1);
            let is_int_shape = rb.instance_of(n, "Shape");
            let flag = rb.ternary(is_int_shape, rb.str("y"), rb.str("n"));
            rb.echo(b, flag);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "yn");
}
