//! Specialised lowerings must agree with the generic helpers: the same operator over
//! typed parameters (long, double, number or string) and over untyped ones yields the
//! same value.

#[path = "../common/mod.rs"]
mod common;

use phlow::bound::builder::RoutineBuilder;
use phlow::bound::BinaryOp;
use phlow::runtime::convert::to_string_quiet;
use phlow::runtime::PhpValue;
use phlow::types::TypeRefMask;
use proptest::prelude::*;

use common::TestProgram;

/// Static type a parameter is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Long,
    Double,
    /// Long or double.
    Number,
    String,
}

fn mask_of(rb: &RoutineBuilder, kind: Kind) -> TypeRefMask {
    match kind {
        Kind::Long => rb.long_mask(),
        Kind::Double => rb.double_mask(),
        Kind::Number => rb.number_mask(),
        Kind::String => rb.string_mask(),
    }
}

/// `function f($a, $b) { return $a <op> $b; }`, typed per `kinds` or left untyped.
fn binary(op: BinaryOp, kinds: Option<(Kind, Kind)>) -> RoutineBuilder {
    let rb = RoutineBuilder::function("f");
    let (ma, mb) = match kinds {
        Some((ka, kb)) => (mask_of(&rb, ka), mask_of(&rb, kb)),
        None => (TypeRefMask::ANY, TypeRefMask::ANY),
    };
    let mut rb = rb.param("a", ma).param("b", mb);
    let b = rb.block();
    let (l, r) = (rb.var("a"), rb.var("b"));
    let v = rb.bin(op, l, r);
    rb.ret(b, Some(v));
    rb
}

/// Type and printed form of what `f(a, b)` returned, or the fault it raised.
fn evaluate(op: BinaryOp, kinds: Option<(Kind, Kind)>, a: &PhpValue, b: &PhpValue) -> String {
    let outcome = TestProgram::new()
        .routine(binary(op, kinds))
        .run_with("f", vec![a.clone(), b.clone()]);
    match outcome.result {
        Ok(v) => format!("{}:{}", v.type_name(), to_string_quiet(&v)),
        Err(fault) => format!("fault:{fault}"),
    }
}

fn agree(op: BinaryOp, (ka, a): &(Kind, PhpValue), (kb, b): &(Kind, PhpValue)) -> (String, String) {
    (evaluate(op, Some((*ka, *kb)), a, b), evaluate(op, None, a, b))
}

fn operator() -> impl Strategy<Value = BinaryOp> {
    prop_oneof![
        Just(BinaryOp::Add),
        Just(BinaryOp::Sub),
        Just(BinaryOp::Mul),
        Just(BinaryOp::Div),
        Just(BinaryOp::Mod),
        Just(BinaryOp::BitAnd),
        Just(BinaryOp::BitXor),
        Just(BinaryOp::Lt),
        Just(BinaryOp::Ge),
        Just(BinaryOp::Eq),
        Just(BinaryOp::Identical),
        Just(BinaryOp::Spaceship),
    ]
}

/// Operators whose string forms are numeric or comparisons; bitwise operators over two
/// strings work bytewise and are covered elsewhere.
fn string_operator() -> impl Strategy<Value = BinaryOp> {
    prop_oneof![
        Just(BinaryOp::Add),
        Just(BinaryOp::Sub),
        Just(BinaryOp::Mul),
        Just(BinaryOp::Div),
        Just(BinaryOp::Lt),
        Just(BinaryOp::Ge),
        Just(BinaryOp::Eq),
        Just(BinaryOp::Identical),
        Just(BinaryOp::Spaceship),
    ]
}

/// Mostly small operands, with the extremes mixed in to exercise overflow.
fn long_operand() -> impl Strategy<Value = i64> {
    prop_oneof![
        4 => -1000i64..1000,
        1 => any::<i64>(),
        1 => prop_oneof![Just(i64::MAX), Just(i64::MIN), Just(0), Just(-1)],
    ]
}

/// Ordinary doubles plus signed zeros, NaN and the infinities.
fn double_operand() -> impl Strategy<Value = f64> {
    prop_oneof![
        2 => -1.0e6f64..1.0e6,
        3 => prop_oneof![
            Just(0.0),
            Just(-0.0),
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
            Just(1.5),
            Just(-2.0),
        ],
    ]
}

/// Empty, non-numeric, numeric and leading-numeric strings.
fn string_operand() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(""),
        Just("abc"),
        Just("0"),
        Just("12"),
        Just("-3"),
        Just("2.5"),
        Just("1e3"),
        Just(" 7"),
        Just("12abc"),
        Just("0x1A"),
    ]
    .prop_map(str::to_string)
}

fn numeric_operand() -> impl Strategy<Value = (Kind, PhpValue)> {
    prop_oneof![
        long_operand().prop_map(|l| (Kind::Long, PhpValue::Long(l))),
        double_operand().prop_map(|d| (Kind::Double, PhpValue::Double(d))),
        prop_oneof![long_operand().prop_map(PhpValue::Long), double_operand().prop_map(PhpValue::Double)]
            .prop_map(|v| (Kind::Number, v)),
    ]
}

fn any_operand() -> impl Strategy<Value = (Kind, PhpValue)> {
    prop_oneof![
        2 => numeric_operand(),
        1 => string_operand().prop_map(|s| (Kind::String, PhpValue::string(s))),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn test_typed_and_untyped_longs_agree(op in operator(), a in long_operand(), b in long_operand()) {
        let (a, b) = ((Kind::Long, PhpValue::Long(a)), (Kind::Long, PhpValue::Long(b)));
        let (typed, untyped) = agree(op, &a, &b);
        prop_assert_eq!(typed, untyped, "{:?} {:?} {:?}", op, a, b);
    }

    #[test]
    fn test_typed_and_untyped_numbers_agree(op in operator(), a in numeric_operand(), b in numeric_operand()) {
        let (typed, untyped) = agree(op, &a, &b);
        prop_assert_eq!(typed, untyped, "{:?} {:?} {:?}", op, a, b);
    }

    #[test]
    fn test_typed_and_untyped_strings_agree(op in string_operator(), a in any_operand(), b in any_operand()) {
        let (typed, untyped) = agree(op, &a, &b);
        prop_assert_eq!(typed, untyped, "{:?} {:?} {:?}", op, a, b);
    }

    #[test]
    fn test_addition_matches_checked_arithmetic(a in long_operand(), b in long_operand()) {
        let result = evaluate(BinaryOp::Add, Some((Kind::Long, Kind::Long)), &PhpValue::Long(a), &PhpValue::Long(b));
        match a.checked_add(b) {
            Some(sum) => prop_assert_eq!(result, format!("int:{sum}")),
            None => prop_assert!(result.starts_with("float:"), "{}", result),
        }
    }
}

#[test]
fn test_signed_zero_and_nan_compare_alike() {
    let doubles = Some((Kind::Double, Kind::Double));
    let cases = [
        (BinaryOp::Eq, 0.0, -0.0, "bool:1"),
        (BinaryOp::Identical, 0.0, -0.0, "bool:1"),
        (BinaryOp::Eq, f64::NAN, f64::NAN, "bool:"),
        (BinaryOp::Lt, f64::NAN, 1.0, "bool:"),
        (BinaryOp::Ge, f64::NAN, 1.0, "bool:"),
    ];
    for (op, a, b, expected) in cases {
        let (a, b) = (PhpValue::Double(a), PhpValue::Double(b));
        assert_eq!(evaluate(op, doubles, &a, &b), expected, "{op:?} {a:?} {b:?}");
        assert_eq!(evaluate(op, None, &a, &b), expected, "{op:?} {a:?} {b:?}");
    }
}
