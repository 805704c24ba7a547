// Category 1: Operators
// Specialised and boxed lowerings of arithmetic, comparison, bitwise and string operators.

use phlow::bound::{BinaryOp, UnaryOp};

use super::common::{uncaught_class, uncaught_message, TestProgram};

// ============================================================================
// 1. Arithmetic
// ============================================================================

#[test]
fn test_integer_arithmetic() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let mul = rb.bin(BinaryOp::Mul, rb.int(3), rb.int(4));
            let sum = rb.bin(BinaryOp::Add, rb.int(2), mul);
            rb.echo(b, sum);
            let diff = rb.bin(BinaryOp::Sub, rb.int(-5), rb.int(3));
            rb.echo(b, rb.str("|"));
            rb.echo(b, diff);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "14|-8");
}

#[test]
fn test_overflow_promotes_to_float() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let sum = rb.bin(BinaryOp::Add, rb.int(i64::MAX), rb.int(1));
            rb.echo(b, sum);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "9.2233720368548E+18");
}

#[test]
fn test_division_yields_int_only_when_exact() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let exact = rb.bin(BinaryOp::Div, rb.int(6), rb.int(3));
            rb.echo(b, exact);
            rb.echo(b, rb.str(" "));
            let inexact = rb.bin(BinaryOp::Div, rb.int(7), rb.int(2));
            rb.echo(b, inexact);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "2 3.5");
}

#[test]
fn test_division_by_zero_throws() {
    let outcome = TestProgram::new()
        .main(|rb, b| {
            let x = rb.var("x");
            let zero = rb.assign(x.clone(), rb.int(0));
            rb.expr(b, zero);
            let div = rb.bin(BinaryOp::Div, rb.int(1), x);
            rb.echo(b, div);
            rb.ret(b, None);
        })
        .run();
    assert_eq!(uncaught_class(&outcome), "DivisionByZeroError");
    assert_eq!(uncaught_message(&outcome), "Division by zero");
}

#[test]
fn test_modulo_by_zero_throws() {
    let outcome = TestProgram::new()
        .main(|rb, b| {
            let m = rb.bin(BinaryOp::Mod, rb.int(5), rb.int(0));
            rb.echo(b, m);
            rb.ret(b, None);
        })
        .run();
    assert_eq!(uncaught_message(&outcome), "Modulo by zero");
}

#[test]
fn test_float_sum_prints_with_fourteen_digits() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let sum = rb.bin(BinaryOp::Add, rb.float(0.1), rb.float(0.2));
            let text = rb.bin(BinaryOp::Concat, rb.str("x"), sum);
            rb.echo(b, text);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "x0.3");
}

// ============================================================================
// 2. Numeric strings
// ============================================================================

#[test]
fn test_numeric_string_operand() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let sum = rb.bin(BinaryOp::Add, rb.str("5"), rb.int(3));
            rb.echo(b, sum);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "8");
}

#[test]
fn test_leading_numeric_string_warns() {
    let outcome = TestProgram::new()
        .main(|rb, b| {
            let sum = rb.bin(BinaryOp::Add, rb.str("5 apples"), rb.int(1));
            rb.echo(b, sum);
            rb.ret(b, None);
        })
        .run();
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.output, "6");
    assert_eq!(outcome.warnings, vec!["A non-numeric value encountered".to_string()]);
}

#[test]
fn test_non_numeric_string_throws_type_error() {
    let outcome = TestProgram::new()
        .main(|rb, b| {
            let sum = rb.bin(BinaryOp::Mul, rb.str("abc"), rb.int(1));
            rb.echo(b, sum);
            rb.ret(b, None);
        })
        .run();
    assert_eq!(uncaught_class(&outcome), "TypeError");
}

// ============================================================================
// 3. Comparison
// ============================================================================

/// Echoes `y` or `n` for each condition.
fn echo_flags(conditions: impl Fn(&mut phlow::bound::builder::RoutineBuilder) -> Vec<phlow::bound::BoundExpr>) -> String {
    TestProgram::new()
        .main(|rb, b| {
            for cond in conditions(rb) {
                let flag = rb.ternary(cond, rb.str("y"), rb.str("n"));
                rb.echo(b, flag);
            }
            rb.ret(b, None);
        })
        .output()
}

#[test]
fn test_loose_equality() {
    let out = echo_flags(|rb| {
        vec![
            rb.bin(BinaryOp::Eq, rb.int(1), rb.str("01")),
            rb.bin(BinaryOp::Eq, rb.int(0), rb.str("a")),
            rb.bin(BinaryOp::Eq, rb.null(), rb.bool(false)),
            rb.bin(BinaryOp::NotEq, rb.int(1), rb.float(1.0)),
        ]
    });
    assert_eq!(out, "ynyn");
}

#[test]
fn test_strict_identity() {
    let out = echo_flags(|rb| {
        vec![
            rb.bin(BinaryOp::Identical, rb.int(1), rb.float(1.0)),
            rb.bin(BinaryOp::Identical, rb.str("a"), rb.str("a")),
            rb.bin(BinaryOp::NotIdentical, rb.null(), rb.bool(false)),
        ]
    });
    assert_eq!(out, "nyy");
}

#[test]
fn test_nan_is_never_ordered() {
    let out = echo_flags(|rb| {
        [BinaryOp::Lt, BinaryOp::Gt, BinaryOp::Le, BinaryOp::Ge]
            .into_iter()
            .map(|op| rb.bin(op, rb.float(f64::NAN), rb.float(1.0)))
            .collect()
    });
    assert_eq!(out, "nnnn");
}

#[test]
fn test_relational_mixed_operands() {
    let out = echo_flags(|rb| {
        vec![
            rb.bin(BinaryOp::Lt, rb.int(1), rb.float(1.5)),
            rb.bin(BinaryOp::Ge, rb.int(2), rb.int(2)),
            rb.bin(BinaryOp::Gt, rb.str("10"), rb.str("9")),
            rb.bin(BinaryOp::Le, rb.str("abc"), rb.str("abd")),
        ]
    });
    assert_eq!(out, "yyyy");
}

#[test]
fn test_spaceship() {
    let out = TestProgram::new()
        .main(|rb, b| {
            for (l, r) in [(1, 2), (2, 2), (3, 2)] {
                let cmp = rb.bin(BinaryOp::Spaceship, rb.int(l), rb.int(r));
                rb.echo(b, cmp);
            }
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "-101");
}

// ============================================================================
// 4. Bitwise and unary
// ============================================================================

#[test]
fn test_bitwise_operators() {
    let out = TestProgram::new()
        .main(|rb, b| {
            for op in [BinaryOp::BitAnd, BinaryOp::BitOr, BinaryOp::BitXor] {
                let v = rb.bin(op, rb.int(6), rb.int(3));
                rb.echo(b, v);
            }
            let shl = rb.bin(BinaryOp::Shl, rb.int(1), rb.int(3));
            rb.echo(b, shl);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "2758");
}

#[test]
fn test_negative_shift_throws() {
    let outcome = TestProgram::new()
        .main(|rb, b| {
            let shl = rb.bin(BinaryOp::Shl, rb.int(1), rb.int(-1));
            rb.echo(b, shl);
            rb.ret(b, None);
        })
        .run();
    assert_eq!(uncaught_class(&outcome), "ArithmeticError");
    assert_eq!(uncaught_message(&outcome), "Bit shift by negative number");
}

#[test]
fn test_unary_operators() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let neg = rb.unary(UnaryOp::Neg, rb.int(5));
            rb.echo(b, neg);
            let not = rb.unary(UnaryOp::Not, rb.bool(false));
            rb.echo(b, not);
            let bnot = rb.unary(UnaryOp::BitNot, rb.int(0));
            rb.echo(b, bnot);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "-51-1");
}

#[test]
fn test_logical_operators_short_circuit() {
    let outcome = TestProgram::new()
        .main(|rb, b| {
            // `false && 1 / 0` never evaluates the division.
            let div = rb.bin(BinaryOp::Div, rb.int(1), rb.int(0));
            let and = rb.bin(BinaryOp::And, rb.bool(false), div);
            let flag = rb.ternary(and, rb.str("y"), rb.str("n"));
            rb.echo(b, flag);
            let div = rb.bin(BinaryOp::Div, rb.int(1), rb.int(0));
            let or = rb.bin(BinaryOp::Or, rb.bool(true), div);
            let flag = rb.ternary(or, rb.str("y"), rb.str("n"));
            rb.echo(b, flag);
            rb.ret(b, None);
        })
        .run();
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.output, "ny");
}
