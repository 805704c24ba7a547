use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::array::PhpArray;
use super::object::ObjectRef;

/// Integer-or-float result of numeric operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhpNumber {
    Long(i64),
    Double(f64),
}

impl PhpNumber {
    pub fn to_double(self) -> f64 {
        match self {
            PhpNumber::Long(l) => l as f64,
            PhpNumber::Double(d) => d,
        }
    }

    pub fn to_long(self) -> i64 {
        match self {
            PhpNumber::Long(l) => l,
            PhpNumber::Double(d) => super::convert::double_to_long(d),
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            PhpNumber::Long(l) => l == 0,
            PhpNumber::Double(d) => d == 0.0,
        }
    }

    pub fn into_value(self) -> PhpValue {
        match self {
            PhpNumber::Long(l) => PhpValue::Long(l),
            PhpNumber::Double(d) => PhpValue::Double(d),
        }
    }

    /// Bitwise identity, so that `-0.0` and `NaN` compare the way a test expects.
    pub fn same_as(self, other: PhpNumber) -> bool {
        match (self, other) {
            (PhpNumber::Long(a), PhpNumber::Long(b)) => a == b,
            (PhpNumber::Double(a), PhpNumber::Double(b)) => a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan()),
            _ => false,
        }
    }
}

/// Writable string buffer; value semantics like every string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhpString(String);

impl PhpString {
    pub fn new(s: impl Into<String>) -> Self {
        PhpString(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn push_str(&mut self, s: &str) {
        self.0.push_str(s);
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PhpString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared reference cell; every variable bound by reference points at the same alias.
#[derive(Clone)]
pub struct PhpAlias(Rc<RefCell<PhpValue>>);

impl PhpAlias {
    pub fn new(value: PhpValue) -> Self {
        PhpAlias(Rc::new(RefCell::new(value.dereferenced())))
    }

    pub fn get(&self) -> PhpValue {
        self.0.borrow().clone()
    }

    pub fn set(&self, value: PhpValue) {
        *self.0.borrow_mut() = value.dereferenced();
    }

    pub fn ptr_eq(&self, other: &PhpAlias) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Runs `f` on the aliased value in place.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut PhpValue) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}

impl fmt::Debug for PhpAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(v) => write!(f, "&{:?}", *v),
            Err(_) => write!(f, "&<borrowed>"),
        }
    }
}

/// Fully generic value.
#[derive(Debug, Clone, Default)]
pub enum PhpValue {
    #[default]
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
    MutableString(PhpString),
    Array(PhpArray),
    Alias(PhpAlias),
    Object(ObjectRef),
}

impl PhpValue {
    pub fn string(s: impl Into<String>) -> PhpValue {
        PhpValue::String(s.into())
    }

    /// The value itself, or the aliased value for references.
    pub fn dereferenced(self) -> PhpValue {
        match self {
            PhpValue::Alias(alias) => alias.get(),
            other => other,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            PhpValue::Null => true,
            PhpValue::Alias(alias) => alias.get().is_null(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PhpValue::String(s) => Some(s),
            PhpValue::MutableString(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Type name as used in runtime diagnostics.
    pub fn type_name(&self) -> String {
        match self {
            PhpValue::Null => "null".into(),
            PhpValue::Bool(_) => "bool".into(),
            PhpValue::Long(_) => "int".into(),
            PhpValue::Double(_) => "float".into(),
            PhpValue::String(_) | PhpValue::MutableString(_) => "string".into(),
            PhpValue::Array(_) => "array".into(),
            PhpValue::Alias(alias) => alias.get().type_name(),
            PhpValue::Object(obj) => obj.class.to_string(),
        }
    }
}

impl From<PhpNumber> for PhpValue {
    fn from(n: PhpNumber) -> Self {
        n.into_value()
    }
}

impl From<&str> for PhpValue {
    fn from(s: &str) -> Self {
        PhpValue::String(s.to_string())
    }
}

impl From<i64> for PhpValue {
    fn from(l: i64) -> Self {
        PhpValue::Long(l)
    }
}

impl From<f64> for PhpValue {
    fn from(d: f64) -> Self {
        PhpValue::Double(d)
    }
}

impl From<bool> for PhpValue {
    fn from(b: bool) -> Self {
        PhpValue::Bool(b)
    }
}
