//! Conversions between the value family: numeric strings, truthiness, casts and the
//! string form of floats.

use super::array::{ArrayKey, PhpArray};
use super::host::RuntimeHost;
use super::value::{PhpNumber, PhpValue};
use super::Fault;

/// How much of a string a numeric parse consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    /// The whole string, surrounding whitespace aside.
    Whole,
    /// A numeric prefix followed by other characters.
    Leading,
}

fn is_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// Parses the numeric prefix of `s`: optional whitespace, sign, digits, fraction and
/// exponent. Integers that overflow become floats.
pub fn parse_numeric(s: &str) -> Option<(PhpNumber, NumericKind)> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && is_ws(bytes[i]) {
        i += 1;
    }
    let start = i;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;
    let mut is_float = false;
    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if digits > 0 || j > frac_start {
            digits += j - frac_start;
            is_float = true;
            i = j;
        }
    }
    if digits == 0 {
        return None;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            is_float = true;
            i = j;
        }
    }
    let text = &s[start..i];
    let mut end = i;
    while end < bytes.len() && is_ws(bytes[end]) {
        end += 1;
    }
    let kind = if end == bytes.len() { NumericKind::Whole } else { NumericKind::Leading };
    let number = if is_float {
        PhpNumber::Double(text.parse::<f64>().ok()?)
    } else {
        match text.parse::<i64>() {
            Ok(l) => PhpNumber::Long(l),
            Err(_) => PhpNumber::Double(text.parse::<f64>().ok()?),
        }
    };
    Some((number, kind))
}

/// Whether the whole string is numeric.
pub fn is_numeric_str(s: &str) -> bool {
    matches!(parse_numeric(s), Some((_, NumericKind::Whole)))
}

/// Float to integer the way casts do it: truncation, with 0 for values the integer
/// range cannot hold.
pub fn double_to_long(d: f64) -> i64 {
    if !d.is_finite() || d >= 9.223_372_036_854_775_808e18 || d < -9.223_372_036_854_775_808e18 {
        return 0;
    }
    d as i64
}

pub fn to_bool(v: &PhpValue) -> bool {
    match v {
        PhpValue::Null => false,
        PhpValue::Bool(b) => *b,
        PhpValue::Long(l) => *l != 0,
        PhpValue::Double(d) => *d != 0.0,
        PhpValue::String(s) => !(s.is_empty() || s == "0"),
        PhpValue::MutableString(s) => !(s.is_empty() || s.as_str() == "0"),
        PhpValue::Array(a) => !a.is_empty(),
        PhpValue::Alias(alias) => to_bool(&alias.get()),
        PhpValue::Object(_) => true,
    }
}

pub fn str_to_number(s: &str) -> PhpNumber {
    parse_numeric(s).map_or(PhpNumber::Long(0), |(n, _)| n)
}

/// `(int)`/`(float)` style conversion, which never warns.
pub fn to_number_cast(v: &PhpValue) -> PhpNumber {
    match v {
        PhpValue::Null => PhpNumber::Long(0),
        PhpValue::Bool(b) => PhpNumber::Long(*b as i64),
        PhpValue::Long(l) => PhpNumber::Long(*l),
        PhpValue::Double(d) => PhpNumber::Double(*d),
        PhpValue::String(s) => str_to_number(s),
        PhpValue::MutableString(s) => str_to_number(s.as_str()),
        PhpValue::Array(a) => PhpNumber::Long(!a.is_empty() as i64),
        PhpValue::Alias(alias) => to_number_cast(&alias.get()),
        PhpValue::Object(_) => PhpNumber::Long(1),
    }
}

pub fn to_long(v: &PhpValue) -> i64 {
    to_number_cast(v).to_long()
}

pub fn to_double(v: &PhpValue) -> f64 {
    to_number_cast(v).to_double()
}

/// String form of a float with 14 significant digits, switching to exponent notation
/// outside `1e-4..1e15`.
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        return "NAN".into();
    }
    if d.is_infinite() {
        return if d > 0.0 { "INF".into() } else { "-INF".into() };
    }
    if d == 0.0 {
        return if d.is_sign_negative() { "-0".into() } else { "0".into() };
    }
    const PRECISION: i32 = 14;
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, d.abs());
    let (mantissa, exp) = match sci.split_once('e') {
        Some(parts) => parts,
        None => return sci,
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    let mut digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    while digits.len() > 1 && digits.ends_with('0') {
        digits.pop();
    }
    let decpt = exp + 1;
    let mut out = String::new();
    if d < 0.0 {
        out.push('-');
    }
    if decpt < -3 || decpt > PRECISION {
        let e = decpt - 1;
        out.push_str(&digits[..1]);
        out.push('.');
        if digits.len() > 1 {
            out.push_str(&digits[1..]);
        } else {
            out.push('0');
        }
        out.push('E');
        out.push(if e < 0 { '-' } else { '+' });
        out.push_str(&e.abs().to_string());
    } else if decpt <= 0 {
        out.push_str("0.");
        for _ in 0..(-decpt) {
            out.push('0');
        }
        out.push_str(&digits);
    } else {
        let decpt = decpt as usize;
        if digits.len() <= decpt {
            out.push_str(&digits);
            for _ in digits.len()..decpt {
                out.push('0');
            }
        } else {
            out.push_str(&digits[..decpt]);
            out.push('.');
            out.push_str(&digits[decpt..]);
        }
    }
    out
}

/// String conversion for contexts that cannot report: arrays become `"Array"`.
pub fn to_string_quiet(v: &PhpValue) -> String {
    match v {
        PhpValue::Null => String::new(),
        PhpValue::Bool(true) => "1".into(),
        PhpValue::Bool(false) => String::new(),
        PhpValue::Long(l) => l.to_string(),
        PhpValue::Double(d) => format_double(*d),
        PhpValue::String(s) => s.clone(),
        PhpValue::MutableString(s) => s.as_str().to_string(),
        PhpValue::Array(_) => "Array".into(),
        PhpValue::Alias(alias) => to_string_quiet(&alias.get()),
        PhpValue::Object(obj) => obj.class.to_string(),
    }
}

/// String conversion with the language's diagnostics: arrays warn, objects without
/// `__toString` throw.
pub fn to_string(host: &mut dyn RuntimeHost, v: &PhpValue) -> Result<String, Fault> {
    match v {
        PhpValue::Array(_) => {
            host.warn("Array to string conversion");
            Ok("Array".into())
        }
        PhpValue::Object(obj) => {
            if host.has_method(&obj.class, "__toString") {
                let result = host.invoke_method(obj.clone(), "__toString", Vec::new())?;
                Ok(to_string_quiet(&result))
            } else {
                Err(Fault::error(format!("Object of class {} could not be converted to string", obj.class)))
            }
        }
        PhpValue::Alias(alias) => to_string(host, &alias.get()),
        other => Ok(to_string_quiet(other)),
    }
}

/// `(array)` cast.
pub fn to_array(v: &PhpValue) -> PhpArray {
    match v {
        PhpValue::Null => PhpArray::new(),
        PhpValue::Array(a) => a.clone(),
        PhpValue::Alias(alias) => to_array(&alias.get()),
        PhpValue::Object(obj) => {
            PhpArray::from_pairs(obj.props().into_iter().map(|(k, v)| (ArrayKey::from_str(&k), v.dereferenced())))
        }
        other => PhpArray::from_values([other.clone()]),
    }
}
