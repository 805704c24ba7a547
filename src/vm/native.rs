//! Native stack instructions over unboxed slots.

use std::rc::Rc;

use crate::il::Instr;
use crate::runtime::convert::double_to_long;
use crate::runtime::{Fault, Slot};

fn operands(instr: &Instr, a: &Slot, b: &Slot) -> Fault {
    Fault::internal(format!("`{instr}` over {} and {}", a.kind(), b.kind()))
}

fn operand(instr: &Instr, a: &Slot) -> Fault {
    Fault::internal(format!("`{instr}` over {}", a.kind()))
}

/// Widens a mixed `int32`/`long` pair so both sides share one representation.
fn widen(a: Slot, b: Slot) -> (Slot, Slot) {
    match (a, b) {
        (Slot::Int32(x), Slot::Long(y)) => (Slot::Long(x as i64), Slot::Long(y)),
        (Slot::Long(x), Slot::Int32(y)) => (Slot::Long(x), Slot::Long(y as i64)),
        pair => pair,
    }
}

/// `add`, `sub` and `mul`. Integer overflow wraps.
pub(super) fn arith(instr: &Instr, a: Slot, b: Slot) -> Result<Slot, Fault> {
    let op = |x: i64, y: i64| match instr {
        Instr::Add => x.wrapping_add(y),
        Instr::Sub => x.wrapping_sub(y),
        _ => x.wrapping_mul(y),
    };
    let fop = |x: f64, y: f64| match instr {
        Instr::Add => x + y,
        Instr::Sub => x - y,
        _ => x * y,
    };
    match widen(a, b) {
        (Slot::Int32(x), Slot::Int32(y)) => Ok(Slot::Int32(op(x as i64, y as i64) as i32)),
        (Slot::Long(x), Slot::Long(y)) => Ok(Slot::Long(op(x, y))),
        (Slot::Double(x), Slot::Double(y)) => Ok(Slot::Double(fop(x, y))),
        (a, b) => Err(operands(instr, &a, &b)),
    }
}

pub(super) fn neg(instr: &Instr, a: Slot) -> Result<Slot, Fault> {
    match a {
        Slot::Int32(x) => Ok(Slot::Int32(x.wrapping_neg())),
        Slot::Long(x) => Ok(Slot::Long(x.wrapping_neg())),
        Slot::Double(x) => Ok(Slot::Double(-x)),
        a => Err(operand(instr, &a)),
    }
}

/// `and`, `or` and `xor`: logical on booleans, bitwise on integers.
pub(super) fn bitwise(instr: &Instr, a: Slot, b: Slot) -> Result<Slot, Fault> {
    let op = |x: i64, y: i64| match instr {
        Instr::And => x & y,
        Instr::Or => x | y,
        _ => x ^ y,
    };
    match widen(a, b) {
        (Slot::Bool(x), Slot::Bool(y)) => Ok(Slot::Bool(op(x as i64, y as i64) != 0)),
        (Slot::Int32(x), Slot::Int32(y)) => Ok(Slot::Int32(op(x as i64, y as i64) as i32)),
        (Slot::Long(x), Slot::Long(y)) => Ok(Slot::Long(op(x, y))),
        (a, b) => Err(operands(instr, &a, &b)),
    }
}

pub(super) fn not(instr: &Instr, a: Slot) -> Result<Slot, Fault> {
    match a {
        Slot::Bool(b) => Ok(Slot::Bool(!b)),
        Slot::Int32(x) => Ok(Slot::Int32(!x)),
        Slot::Long(x) => Ok(Slot::Long(!x)),
        a => Err(operand(instr, &a)),
    }
}

/// `ceq`: numeric equality, or identity for references.
pub(super) fn ceq(instr: &Instr, a: Slot, b: Slot) -> Result<Slot, Fault> {
    let eq = match widen(a, b) {
        (Slot::Bool(x), Slot::Bool(y)) => x == y,
        (Slot::Int32(x), Slot::Int32(y)) => x == y,
        (Slot::Long(x), Slot::Long(y)) => x == y,
        (Slot::Double(x), Slot::Double(y)) => x == y,
        (Slot::Null, Slot::Null) => true,
        (Slot::Object(x), Slot::Object(y)) => Rc::ptr_eq(&x, &y),
        (Slot::Null, other) | (other, Slot::Null) if is_reference(&other) => false,
        (a, b) => return Err(operands(instr, &a, &b)),
    };
    Ok(Slot::Bool(eq))
}

fn is_reference(slot: &Slot) -> bool {
    matches!(
        slot,
        Slot::Array(_) | Slot::Alias(_) | Slot::Object(_) | Slot::Enumerator(_) | Slot::Delegate(_) | Slot::TypeHandle(_)
    )
}

/// `clt`, `cgt` and their unordered forms, which are true when either side is NaN.
pub(super) fn compare(instr: &Instr, a: Slot, b: Slot) -> Result<Slot, Fault> {
    let less = matches!(instr, Instr::Clt | Instr::CltUn);
    let unordered = matches!(instr, Instr::CltUn | Instr::CgtUn);
    let result = match widen(a, b) {
        (Slot::Int32(x), Slot::Int32(y)) => if less { x < y } else { x > y },
        (Slot::Long(x), Slot::Long(y)) => if less { x < y } else { x > y },
        (Slot::Double(x), Slot::Double(y)) => {
            if x.is_nan() || y.is_nan() {
                unordered
            } else if less {
                x < y
            } else {
                x > y
            }
        }
        (a, b) => return Err(operands(instr, &a, &b)),
    };
    Ok(Slot::Bool(result))
}

pub(super) fn convert(instr: &Instr, a: Slot) -> Result<Slot, Fault> {
    let as_long = |a: &Slot| match a {
        Slot::Bool(b) => Some(*b as i64),
        Slot::Int32(x) => Some(*x as i64),
        Slot::Long(x) => Some(*x),
        Slot::Double(d) => Some(double_to_long(*d)),
        _ => None,
    };
    let converted = match instr {
        Instr::ConvI4 => as_long(&a).map(|l| Slot::Int32(l as i32)),
        Instr::ConvI8 => as_long(&a).map(Slot::Long),
        Instr::ConvR8 => match &a {
            Slot::Double(d) => Some(Slot::Double(*d)),
            other => as_long(other).map(|l| Slot::Double(l as f64)),
        },
        _ => match &a {
            Slot::Int32(x) => Some(Slot::Bool(*x != 0)),
            Slot::Long(x) => Some(Slot::Bool(*x != 0)),
            Slot::Double(d) => Some(Slot::Bool(*d != 0.0)),
            Slot::Bool(b) => Some(Slot::Bool(*b)),
            _ => None,
        },
    };
    converted.ok_or_else(|| operand(instr, &a))
}
