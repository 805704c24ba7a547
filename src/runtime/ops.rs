//! Operator semantics over the boxed value family. Every specialised lowering the code
//! generator picks must agree with these functions.

use std::cmp::Ordering;

use super::array::PhpArray;
use super::convert::{self, parse_numeric, NumericKind};
use super::host::RuntimeHost;
use super::value::{PhpNumber, PhpString, PhpValue};
use super::Fault;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
            ArithOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BitOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BitOp::And => "&",
            BitOp::Or => "|",
            BitOp::Xor => "^",
            BitOp::Shl => "<<",
            BitOp::Shr => ">>",
        }
    }
}

pub const NON_NUMERIC_MESSAGE: &str = "Unsupported operand type: non-numeric string";

/// Numeric value of a string operand: numeric strings convert silently, leading-numeric
/// ones warn, anything else throws.
pub fn str_to_number_arith(host: &mut dyn RuntimeHost, s: &str) -> Result<PhpNumber, Fault> {
    match parse_numeric(s) {
        Some((n, NumericKind::Whole)) => Ok(n),
        Some((n, NumericKind::Leading)) => {
            host.warn("A non-numeric value encountered");
            Ok(n)
        }
        None => Err(Fault::type_error(NON_NUMERIC_MESSAGE)),
    }
}

fn unsupported_operands(symbol: &str, a: &PhpValue, b: &PhpValue) -> Fault {
    Fault::type_error(format!("Unsupported operand types: {} {symbol} {}", a.type_name(), b.type_name()))
}

/// Arithmetic operand conversion. Arrays and objects are rejected by the caller.
fn arith_operand(host: &mut dyn RuntimeHost, v: &PhpValue) -> Result<PhpNumber, Fault> {
    match v {
        PhpValue::String(s) => str_to_number_arith(host, s),
        PhpValue::MutableString(s) => str_to_number_arith(host, s.as_str()),
        PhpValue::Alias(alias) => arith_operand(host, &alias.get()),
        other => Ok(convert::to_number_cast(other)),
    }
}

fn is_compound(v: &PhpValue) -> bool {
    matches!(v, PhpValue::Array(_) | PhpValue::Object(_))
}

pub fn add_long(a: i64, b: i64) -> PhpNumber {
    match a.checked_add(b) {
        Some(r) => PhpNumber::Long(r),
        None => PhpNumber::Double(a as f64 + b as f64),
    }
}

pub fn sub_long(a: i64, b: i64) -> PhpNumber {
    match a.checked_sub(b) {
        Some(r) => PhpNumber::Long(r),
        None => PhpNumber::Double(a as f64 - b as f64),
    }
}

pub fn mul_long(a: i64, b: i64) -> PhpNumber {
    match a.checked_mul(b) {
        Some(r) => PhpNumber::Long(r),
        None => PhpNumber::Double(a as f64 * b as f64),
    }
}

pub fn div_number(a: PhpNumber, b: PhpNumber) -> Result<PhpNumber, Fault> {
    if b.is_zero() {
        return Err(Fault::division_by_zero("Division by zero"));
    }
    Ok(match (a, b) {
        (PhpNumber::Long(x), PhpNumber::Long(y)) => {
            if x == i64::MIN && y == -1 {
                PhpNumber::Double(x as f64 / y as f64)
            } else if x % y == 0 {
                PhpNumber::Long(x / y)
            } else {
                PhpNumber::Double(x as f64 / y as f64)
            }
        }
        (x, y) => PhpNumber::Double(x.to_double() / y.to_double()),
    })
}

pub fn mod_long(a: i64, b: i64) -> Result<i64, Fault> {
    if b == 0 {
        return Err(Fault::division_by_zero("Modulo by zero"));
    }
    if b == -1 {
        return Ok(0);
    }
    Ok(a % b)
}

pub fn pow_number(a: PhpNumber, b: PhpNumber) -> PhpNumber {
    match (a, b) {
        (PhpNumber::Long(base), PhpNumber::Long(exp)) if exp >= 0 => {
            let mut result: i64 = 1;
            let mut factor = base;
            let mut e = exp;
            loop {
                if e & 1 == 1 {
                    match result.checked_mul(factor) {
                        Some(r) => result = r,
                        None => return PhpNumber::Double((base as f64).powf(exp as f64)),
                    }
                }
                e >>= 1;
                if e == 0 {
                    break;
                }
                match factor.checked_mul(factor) {
                    Some(f) => factor = f,
                    None => return PhpNumber::Double((base as f64).powf(exp as f64)),
                }
            }
            PhpNumber::Long(result)
        }
        (x, y) => PhpNumber::Double(x.to_double().powf(y.to_double())),
    }
}

/// Arithmetic on two numbers.
pub fn arith_number(op: ArithOp, a: PhpNumber, b: PhpNumber) -> Result<PhpNumber, Fault> {
    use PhpNumber::{Double, Long};
    Ok(match op {
        ArithOp::Add => match (a, b) {
            (Long(x), Long(y)) => add_long(x, y),
            (x, y) => Double(x.to_double() + y.to_double()),
        },
        ArithOp::Sub => match (a, b) {
            (Long(x), Long(y)) => sub_long(x, y),
            (x, y) => Double(x.to_double() - y.to_double()),
        },
        ArithOp::Mul => match (a, b) {
            (Long(x), Long(y)) => mul_long(x, y),
            (x, y) => Double(x.to_double() * y.to_double()),
        },
        ArithOp::Div => div_number(a, b)?,
        ArithOp::Mod => Long(mod_long(a.to_long(), b.to_long())?),
        ArithOp::Pow => pow_number(a, b),
    })
}

/// Arithmetic on two boxed values, including array union for `+`.
pub fn arith(host: &mut dyn RuntimeHost, op: ArithOp, a: &PhpValue, b: &PhpValue) -> Result<PhpValue, Fault> {
    let a = a.clone().dereferenced();
    let b = b.clone().dereferenced();
    if is_compound(&a) || is_compound(&b) {
        return match (op, &a, &b) {
            (ArithOp::Add, PhpValue::Array(x), PhpValue::Array(y)) => Ok(PhpValue::Array(x.union(y))),
            _ => Err(unsupported_operands(op.symbol(), &a, &b)),
        };
    }
    let x = arith_operand(host, &a)?;
    let y = arith_operand(host, &b)?;
    Ok(arith_number(op, x, y)?.into_value())
}

pub fn negate(host: &mut dyn RuntimeHost, v: &PhpValue) -> Result<PhpValue, Fault> {
    arith(host, ArithOp::Mul, v, &PhpValue::Long(-1))
}

/// Unary plus: the numeric value.
pub fn plus(host: &mut dyn RuntimeHost, v: &PhpValue) -> Result<PhpValue, Fault> {
    arith(host, ArithOp::Mul, v, &PhpValue::Long(1))
}

fn bitwise_strings(op: BitOp, a: &str, b: &str) -> String {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let bytes: Vec<u8> = match op {
        BitOp::Or => {
            let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
            long.iter().enumerate().map(|(i, x)| x | short.get(i).copied().unwrap_or(0)).collect()
        }
        BitOp::And => a.iter().zip(b).map(|(x, y)| x & y).collect(),
        _ => a.iter().zip(b).map(|(x, y)| x ^ y).collect(),
    };
    String::from_utf8_lossy(&bytes).into_owned()
}

pub fn shift(op: BitOp, a: i64, b: i64) -> Result<i64, Fault> {
    if b < 0 {
        return Err(Fault::arithmetic_error("Bit shift by negative number"));
    }
    Ok(match op {
        BitOp::Shl if b >= 64 => 0,
        BitOp::Shl => a << b,
        _ if b >= 64 => {
            if a < 0 {
                -1
            } else {
                0
            }
        }
        _ => a >> b,
    })
}

pub fn bitwise_long(op: BitOp, a: i64, b: i64) -> Result<i64, Fault> {
    Ok(match op {
        BitOp::And => a & b,
        BitOp::Or => a | b,
        BitOp::Xor => a ^ b,
        BitOp::Shl | BitOp::Shr => shift(op, a, b)?,
    })
}

pub fn bitwise(host: &mut dyn RuntimeHost, op: BitOp, a: &PhpValue, b: &PhpValue) -> Result<PhpValue, Fault> {
    let a = a.clone().dereferenced();
    let b = b.clone().dereferenced();
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        if matches!(op, BitOp::And | BitOp::Or | BitOp::Xor) {
            return Ok(PhpValue::String(bitwise_strings(op, x, y)));
        }
    }
    if is_compound(&a) || is_compound(&b) {
        return Err(unsupported_operands(op.symbol(), &a, &b));
    }
    let x = arith_operand(host, &a)?.to_long();
    let y = arith_operand(host, &b)?.to_long();
    Ok(PhpValue::Long(bitwise_long(op, x, y)?))
}

pub fn bitwise_not(v: &PhpValue) -> Result<PhpValue, Fault> {
    match v {
        PhpValue::Long(l) => Ok(PhpValue::Long(!l)),
        PhpValue::Double(d) => Ok(PhpValue::Long(!convert::double_to_long(*d))),
        PhpValue::String(s) => Ok(PhpValue::String(String::from_utf8_lossy(&s.bytes().map(|b| !b).collect::<Vec<_>>()).into_owned())),
        PhpValue::MutableString(s) => bitwise_not(&PhpValue::String(s.as_str().to_string())),
        PhpValue::Alias(alias) => bitwise_not(&alias.get()),
        other => Err(Fault::type_error(format!("Cannot perform bitwise not on {}", other.type_name()))),
    }
}

pub fn concat(host: &mut dyn RuntimeHost, a: &PhpValue, b: &PhpValue) -> Result<String, Fault> {
    let mut s = convert::to_string(host, a)?;
    s.push_str(&convert::to_string(host, b)?);
    Ok(s)
}

fn threeway_f64(a: f64, b: f64) -> i32 {
    if a == b {
        0
    } else if a < b {
        -1
    } else {
        1
    }
}

fn threeway_i64(a: i64, b: i64) -> i32 {
    match a.cmp(&b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

pub fn compare_numbers(a: PhpNumber, b: PhpNumber) -> i32 {
    match (a, b) {
        (PhpNumber::Long(x), PhpNumber::Long(y)) => threeway_i64(x, y),
        (x, y) => threeway_f64(x.to_double(), y.to_double()),
    }
}

fn strcmp(a: &str, b: &str) -> i32 {
    match a.as_bytes().cmp(b.as_bytes()) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// Two strings compare numerically when both are numeric, bytewise otherwise.
pub fn compare_strings(a: &str, b: &str) -> i32 {
    match (parse_numeric(a), parse_numeric(b)) {
        (Some((x, NumericKind::Whole)), Some((y, NumericKind::Whole))) => compare_numbers(x, y),
        _ => strcmp(a, b),
    }
}

/// A number against a string: numerically if the string is numeric, otherwise as the
/// string form of the number.
pub fn compare_number_string(n: PhpNumber, s: &str) -> i32 {
    match parse_numeric(s) {
        Some((m, NumericKind::Whole)) => compare_numbers(n, m),
        _ => {
            let text = match n {
                PhpNumber::Long(l) => l.to_string(),
                PhpNumber::Double(d) => convert::format_double(d),
            };
            strcmp(&text, s)
        }
    }
}

fn compare_arrays(a: &PhpArray, b: &PhpArray) -> i32 {
    if a.ptr_eq(b) {
        return 0;
    }
    let count = threeway_i64(a.len() as i64, b.len() as i64);
    if count != 0 {
        return count;
    }
    for (k, v) in a.entries() {
        let Some(other) = b.get(&k) else {
            return 1;
        };
        let c = compare(&v, &other);
        if c != 0 {
            return c;
        }
    }
    0
}

fn bool_of(b: bool) -> i32 {
    b as i32
}

/// Three-way comparison (`<=>`).
pub fn compare(a: &PhpValue, b: &PhpValue) -> i32 {
    use PhpValue as V;
    let a = a.clone().dereferenced();
    let b = b.clone().dereferenced();
    match (&a, &b) {
        (V::Long(x), V::Long(y)) => threeway_i64(*x, *y),
        (V::Long(x), V::Double(y)) => threeway_f64(*x as f64, *y),
        (V::Double(x), V::Long(y)) => threeway_f64(*x, *y as f64),
        (V::Double(x), V::Double(y)) => threeway_f64(*x, *y),
        (V::Array(x), V::Array(y)) => compare_arrays(x, y),
        (V::Null, V::Null) => 0,
        (V::Null, V::Bool(y)) => -bool_of(*y),
        (V::Bool(x), V::Null) => bool_of(*x),
        (V::Bool(x), V::Bool(y)) => bool_of(*x) - bool_of(*y),
        (V::Null, _) if b.as_str().is_some() => strcmp("", b.as_str().unwrap_or_default()),
        (_, V::Null) if a.as_str().is_some() => strcmp(a.as_str().unwrap_or_default(), ""),
        (V::Long(_) | V::Double(_), _) if b.as_str().is_some() => {
            compare_number_string(convert::to_number_cast(&a), b.as_str().unwrap_or_default())
        }
        (_, V::Long(_) | V::Double(_)) if a.as_str().is_some() => {
            -compare_number_string(convert::to_number_cast(&b), a.as_str().unwrap_or_default())
        }
        (_, _) if a.as_str().is_some() && b.as_str().is_some() => {
            compare_strings(a.as_str().unwrap_or_default(), b.as_str().unwrap_or_default())
        }
        (V::Object(x), V::Object(y)) => {
            if std::rc::Rc::ptr_eq(x, y) {
                0
            } else if x.class != y.class {
                1
            } else {
                let px = PhpArray::from_pairs(x.props().into_iter().map(|(k, v)| (super::ArrayKey::Str(k), v)));
                let py = PhpArray::from_pairs(y.props().into_iter().map(|(k, v)| (super::ArrayKey::Str(k), v)));
                compare_arrays(&px, &py)
            }
        }
        (V::Bool(x), _) => bool_of(*x) - bool_of(convert::to_bool(&b)),
        (_, V::Bool(y)) => bool_of(convert::to_bool(&a)) - bool_of(*y),
        (V::Null, _) => -bool_of(convert::to_bool(&b)),
        (_, V::Null) => bool_of(convert::to_bool(&a)),
        (V::Array(_), _) => 1,
        (_, V::Array(_)) => -1,
        (V::Object(_), _) => 1,
        (_, V::Object(_)) => -1,
        _ => 0,
    }
}

/// `==`.
pub fn loose_eq(a: &PhpValue, b: &PhpValue) -> bool {
    compare(a, b) == 0
}

/// `===`: same type and value, no coercion.
pub fn strict_eq(a: &PhpValue, b: &PhpValue) -> bool {
    use PhpValue as V;
    let a = a.clone().dereferenced();
    let b = b.clone().dereferenced();
    match (&a, &b) {
        (V::Null, V::Null) => true,
        (V::Bool(x), V::Bool(y)) => x == y,
        (V::Long(x), V::Long(y)) => x == y,
        (V::Double(x), V::Double(y)) => x == y,
        (V::Array(x), V::Array(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            let (ex, ey) = (x.entries(), y.entries());
            ex.len() == ey.len()
                && ex.iter().zip(&ey).all(|((kx, vx), (ky, vy))| kx == ky && strict_eq(vx, vy))
        }
        (V::Object(x), V::Object(y)) => std::rc::Rc::ptr_eq(x, y),
        _ => match (a.as_str(), b.as_str()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn increment_string(s: &str) -> String {
    if s.is_empty() {
        return "1".into();
    }
    let mut bytes = s.as_bytes().to_vec();
    let mut pos = bytes.len();
    let mut carry = false;
    let mut last = b'a';
    while pos > 0 {
        pos -= 1;
        let ch = bytes[pos];
        let (wrap, first) = match ch {
            b'a'..=b'z' => (b'z', b'a'),
            b'A'..=b'Z' => (b'Z', b'A'),
            b'0'..=b'9' => (b'9', b'0'),
            _ => {
                carry = false;
                break;
            }
        };
        last = first;
        if ch == wrap {
            bytes[pos] = first;
            carry = true;
        } else {
            bytes[pos] = ch + 1;
            carry = false;
            break;
        }
    }
    if carry {
        let lead = if last == b'0' { b'1' } else { last };
        bytes.insert(0, lead);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// `++`.
pub fn increment(v: &PhpValue) -> Result<PhpValue, Fault> {
    match v {
        PhpValue::Null => Ok(PhpValue::Long(1)),
        PhpValue::Bool(_) => Ok(v.clone()),
        PhpValue::Long(l) => Ok(add_long(*l, 1).into_value()),
        PhpValue::Double(d) => Ok(PhpValue::Double(d + 1.0)),
        PhpValue::String(_) | PhpValue::MutableString(_) => {
            let s = v.as_str().unwrap_or_default();
            match parse_numeric(s) {
                Some((n, NumericKind::Whole)) => Ok(arith_number(ArithOp::Add, n, PhpNumber::Long(1))?.into_value()),
                _ => Ok(PhpValue::String(increment_string(s))),
            }
        }
        PhpValue::Alias(alias) => increment(&alias.get()),
        PhpValue::Array(_) => Err(Fault::type_error("Cannot increment array")),
        PhpValue::Object(obj) => Err(Fault::type_error(format!("Cannot increment {}", obj.class))),
    }
}

/// `--`.
pub fn decrement(v: &PhpValue) -> Result<PhpValue, Fault> {
    match v {
        PhpValue::Null | PhpValue::Bool(_) => Ok(v.clone()),
        PhpValue::Long(l) => Ok(sub_long(*l, 1).into_value()),
        PhpValue::Double(d) => Ok(PhpValue::Double(d - 1.0)),
        PhpValue::String(_) | PhpValue::MutableString(_) => {
            let s = v.as_str().unwrap_or_default();
            if s.is_empty() {
                return Ok(PhpValue::Long(-1));
            }
            match parse_numeric(s) {
                Some((n, NumericKind::Whole)) => Ok(arith_number(ArithOp::Sub, n, PhpNumber::Long(1))?.into_value()),
                _ => Ok(v.clone()),
            }
        }
        PhpValue::Alias(alias) => decrement(&alias.get()),
        PhpValue::Array(_) => Err(Fault::type_error("Cannot decrement array")),
        PhpValue::Object(obj) => Err(Fault::type_error(format!("Cannot decrement {}", obj.class))),
    }
}

/// Appends `tail` to a writable string.
pub fn append(target: &mut PhpString, tail: &str) {
    target.push_str(tail);
}
