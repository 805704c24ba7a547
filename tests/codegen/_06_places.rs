// Category 6: Places
// Arrays, references, destructuring, isset/empty/unset, coalesce and casts.

use phlow::bound::builder::RoutineBuilder;
use phlow::bound::{ArrayItemInit, BinaryOp, CastKind, ConstValue};
use phlow::symbols::ClassSymbol;

use super::common::TestProgram;

fn flag(rb: &RoutineBuilder, cond: phlow::bound::BoundExpr) -> phlow::bound::BoundExpr {
    rb.ternary(cond, rb.str("y"), rb.str("n"))
}

// ============================================================================
// 1. Arrays
// ============================================================================

#[test]
fn test_list_literal_and_append() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let a = rb.var("a");
            let lit = rb.array(vec![rb.int(1), rb.int(2), rb.int(3)]);
            let init = rb.assign(a.clone(), lit);
            rb.expr(b, init);
            let push = rb.assign(rb.append(a.clone()), rb.int(4));
            rb.expr(b, push);
            for i in [0, 3] {
                let item = rb.item(a.clone(), rb.int(i));
                rb.echo(b, item);
            }
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "14");
}

#[test]
fn test_keyed_literal() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let m = rb.var("m");
            let lit = rb.array_kv(vec![(rb.str("x"), rb.int(1)), (rb.str("y"), rb.int(2))]);
            let init = rb.assign(m.clone(), lit);
            rb.expr(b, init);
            let y = rb.item(m, rb.str("y"));
            rb.echo(b, y);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "2");
}

#[test]
fn test_nested_write_creates_inner_arrays() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let g = rb.var("g");
            let outer = rb.item(g.clone(), rb.str("a"));
            let inner = rb.item(outer, rb.str("b"));
            let store = rb.assign(inner, rb.int(5));
            rb.expr(b, store);
            let outer = rb.item(g, rb.str("a"));
            let read = rb.item(outer, rb.str("b"));
            rb.echo(b, read);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "5");
}

#[test]
fn test_arrays_are_copied_on_assignment() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let a = rb.var("a");
            let c = rb.var("c");
            let lit = rb.array(vec![rb.int(1)]);
            let init = rb.assign(a.clone(), lit);
            rb.expr(b, init);
            let copy = rb.assign(c.clone(), a.clone());
            rb.expr(b, copy);
            let write = rb.assign(rb.item(c.clone(), rb.int(0)), rb.int(5));
            rb.expr(b, write);
            let original = rb.item(a, rb.int(0));
            rb.echo(b, original);
            let copied = rb.item(c, rb.int(0));
            rb.echo(b, copied);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "15");
}

#[test]
fn test_array_items_with_mixed_keys() {
    // [5 => "a", "b", "k" => "c", "d"]: implicit keys continue after the largest int key.
    let out = TestProgram::new()
        .main(|rb, b| {
            let a = rb.var("a");
            let items = vec![
                ArrayItemInit { key: Some(rb.int(5)), value: rb.str("a"), by_ref: false },
                ArrayItemInit { key: None, value: rb.str("b"), by_ref: false },
                ArrayItemInit { key: Some(rb.str("k")), value: rb.str("c"), by_ref: false },
                ArrayItemInit { key: None, value: rb.str("d"), by_ref: false },
            ];
            let lit = rb.array_items(items);
            let init = rb.assign(a.clone(), lit);
            rb.expr(b, init);
            for key in [6, 7] {
                let item = rb.item(a.clone(), rb.int(key));
                rb.echo(b, item);
            }
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "bd");
}

// ============================================================================
// 2. foreach over arrays
// ============================================================================

/// `foreach ($a as $k => $v) { ... }` over `[10, 20, 30]`, by value or by reference.
fn foreach_program(by_ref: bool) -> RoutineBuilder {
    let mut rb = RoutineBuilder::function("main");
    let start = rb.block();
    let _move_next = rb.block();
    let body = rb.block();
    let next = rb.block();
    let a = rb.var("a");
    let v = rb.var("v");
    let k = rb.var("k");
    let lit = rb.array(vec![rb.int(10), rb.int(20), rb.int(30)]);
    let init = rb.assign(a.clone(), lit);
    rb.expr(start, init);
    rb.foreach(start, a.clone(), v.clone(), Some(k.clone()), by_ref, next);
    if by_ref {
        let scaled = rb.bin(BinaryOp::Add, v.clone(), k);
        let store = rb.assign(v, scaled);
        rb.expr(body, store);
    } else {
        rb.echo(body, k);
        rb.echo(body, rb.str(":"));
        rb.echo(body, v);
        rb.echo(body, rb.str(";"));
    }
    rb.goto(body, start + 1);
    if by_ref {
        for i in 0..3 {
            let item = rb.item(a.clone(), rb.int(i));
            rb.echo(next, item);
            rb.echo(next, rb.str(";"));
        }
    }
    rb.ret(next, None);
    rb
}

#[test]
fn test_foreach_with_keys() {
    let out = TestProgram::new().routine(foreach_program(false)).output();
    assert_eq!(out, "0:10;1:20;2:30;");
}

#[test]
fn test_foreach_by_reference_writes_back() {
    let out = TestProgram::new().routine(foreach_program(true)).output();
    assert_eq!(out, "10;21;32;");
}

#[test]
fn test_foreach_by_reference_over_untyped_object() {
    let pair = ClassSymbol::new("Pair").field("a", Some(ConstValue::Long(1))).field("b", Some(ConstValue::Long(2)));
    let out = TestProgram::new()
        .class(pair)
        .main(|rb, start| {
            let _move_next = rb.block();
            let body = rb.block();
            let next = rb.block();
            let o = rb.var("o");
            let v = rb.var("v");
            let init = rb.assign(o.clone(), rb.new_object("Pair", vec![]));
            rb.expr(start, init);
            rb.foreach(start, o, v.clone(), None, true, next);
            rb.echo(body, v);
            rb.goto(body, start + 1);
            rb.echo(next, rb.str("."));
            rb.ret(next, None);
        })
        .output();
    assert_eq!(out, "12.");
}

// ============================================================================
// 3. References and destructuring
// ============================================================================

#[test]
fn test_reference_assignment_aliases_both_names() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let a = rb.var("a");
            let r = rb.var("r");
            let init = rb.assign(a.clone(), rb.int(1));
            rb.expr(b, init);
            let bind = rb.assign_ref(r.clone(), a.clone());
            rb.expr(b, bind);
            let store = rb.assign(r, rb.int(7));
            rb.expr(b, store);
            rb.echo(b, a);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "7");
}

#[test]
fn test_list_destructuring() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let x = rb.var("x");
            let y = rb.var("y");
            let pattern = rb.list(vec![(None, Some(x.clone())), (None, Some(y.clone()))]);
            let source = rb.array(vec![rb.int(1), rb.int(2)]);
            let destructure = rb.assign(pattern, source);
            rb.expr(b, destructure);
            rb.echo(b, y);
            rb.echo(b, x);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "21");
}

#[test]
fn test_keyed_destructuring_with_skipped_slot() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let second = rb.var("second");
            let q = rb.var("q");
            let positional = rb.list(vec![(None, None), (None, Some(second.clone()))]);
            let source = rb.array(vec![rb.int(5), rb.int(6)]);
            let destructure = rb.assign(positional, source);
            rb.expr(b, destructure);
            let keyed = rb.list(vec![(Some(rb.str("b")), Some(q.clone()))]);
            let source = rb.array_kv(vec![(rb.str("a"), rb.int(1)), (rb.str("b"), rb.int(2))]);
            let destructure = rb.assign(keyed, source);
            rb.expr(b, destructure);
            rb.echo(b, second);
            rb.echo(b, q);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "62");
}

// ============================================================================
// 4. isset, empty, unset and coalesce
// ============================================================================

#[test]
fn test_isset_and_unset() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let m = rb.var("m");
            let lit = rb.array_kv(vec![(rb.str("x"), rb.int(1)), (rb.str("n"), rb.null())]);
            let init = rb.assign(m.clone(), lit);
            rb.expr(b, init);
            for key in ["x", "n", "missing"] {
                let item = rb.item(m.clone(), rb.str(key));
                let set = rb.isset(vec![item]);
                let f = flag(rb, set);
                rb.echo(b, f);
            }
            let gone = rb.item(m.clone(), rb.str("x"));
            rb.unset(b, vec![gone]);
            let item = rb.item(m, rb.str("x"));
            let set = rb.isset(vec![item]);
            let f = flag(rb, set);
            rb.echo(b, f);
            let undef = rb.var("undef");
            let set = rb.isset(vec![undef]);
            let f = flag(rb, set);
            rb.echo(b, f);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "ynnnn");
}

#[test]
fn test_empty() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let values = vec![rb.str("0"), rb.str("a"), rb.array(vec![]), rb.int(0), rb.float(0.5)];
            for (i, value) in values.into_iter().enumerate() {
                let v = rb.var(&format!("v{i}"));
                let init = rb.assign(v.clone(), value);
                rb.expr(b, init);
                let is_empty = rb.empty(v);
                let f = flag(rb, is_empty);
                rb.echo(b, f);
            }
            let undef = rb.var("undef");
            let is_empty = rb.empty(undef);
            let f = flag(rb, is_empty);
            rb.echo(b, f);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "ynyyny");
}

#[test]
fn test_coalesce() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let m = rb.var("m");
            let lit = rb.array_kv(vec![(rb.str("x"), rb.int(1))]);
            let init = rb.assign(m.clone(), lit);
            rb.expr(b, init);
            let present = rb.item(m.clone(), rb.str("x"));
            let v = rb.coalesce(present, rb.str("d"));
            rb.echo(b, v);
            let missing = rb.item(m, rb.str("zz"));
            let v = rb.coalesce(missing, rb.str("d"));
            rb.echo(b, v);
            let undef = rb.var("undef");
            let v = rb.coalesce(undef, rb.str("u"));
            rb.echo(b, v);
            rb.ret(b, None);
        })
        .run();
    assert!(out.result.is_ok(), "{:?}", out.result);
    assert_eq!(out.output, "1du");
    assert!(out.warnings.is_empty(), "{:?}", out.warnings);
}

// ============================================================================
// 5. Casts
// ============================================================================

#[test]
fn test_scalar_casts() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let s = rb.var("s");
            let init = rb.assign(s.clone(), rb.str("12abc"));
            rb.expr(b, init);
            let long = rb.cast(CastKind::Long, s);
            rb.echo(b, long);
            rb.echo(b, rb.str("|"));
            let trunc = rb.cast(CastKind::Long, rb.float(3.9));
            rb.echo(b, trunc);
            rb.echo(b, rb.str("|"));
            let text = rb.cast(CastKind::String, rb.float(1.0));
            rb.echo(b, text);
            rb.echo(b, rb.str("|"));
            let zero = rb.cast(CastKind::Bool, rb.str("0"));
            let f = flag(rb, zero);
            rb.echo(b, f);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "12|3|1|n");
}

#[test]
fn test_array_cast_wraps_scalars() {
    let out = TestProgram::new()
        .main(|rb, b| {
            let a = rb.var("a");
            let wrapped = rb.cast(CastKind::Array, rb.int(5));
            let init = rb.assign(a.clone(), wrapped);
            rb.expr(b, init);
            let first = rb.item(a, rb.int(0));
            rb.echo(b, first);
            rb.ret(b, None);
        })
        .output();
    assert_eq!(out, "5");
}
