use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use super::array::PhpArray;
use super::enumerator::EnumeratorRef;
use super::object::ObjectRef;
use super::value::{PhpAlias, PhpNumber, PhpString, PhpValue};
use super::Fault;
use crate::il::Repr;
use crate::types::QualifiedName;

/// Which kind of callee a dynamic call site dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallSiteKind {
    Function,
    InstanceMethod,
    StaticMethod,
}

impl CallSiteKind {
    pub fn code(self) -> i32 {
        match self {
            CallSiteKind::Function => 0,
            CallSiteKind::InstanceMethod => 1,
            CallSiteKind::StaticMethod => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<CallSiteKind> {
        match code {
            0 => Some(CallSiteKind::Function),
            1 => Some(CallSiteKind::InstanceMethod),
            2 => Some(CallSiteKind::StaticMethod),
            _ => None,
        }
    }
}

bitflags! {
    /// Operands a call-site delegate takes ahead of the arguments, in this order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CallSiteFlags: u32 {
        const HAS_INSTANCE = 1;
        const HAS_TYPE_HANDLE = 1 << 1;
        const HAS_NAME_EXPR = 1 << 2;
    }
}

/// The shape a call-site delegate was built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteShape {
    pub kind: CallSiteKind,
    pub argc: u16,
    pub flags: CallSiteFlags,
    /// Callee name when known at compile time.
    pub name: Option<String>,
}

impl CallSiteShape {
    /// Operands on the stack under the delegate: leading operands plus arguments.
    pub fn operand_count(&self) -> usize {
        self.flags.bits().count_ones() as usize + self.argc as usize
    }
}

/// Invocable bound to one call-site shape.
#[derive(Debug, Clone)]
pub struct Delegate(pub Rc<CallSiteShape>);

impl Delegate {
    pub fn shape(&self) -> &CallSiteShape {
        &self.0
    }
}

/// A value on the evaluation stack or in a local, in one of the target representations.
#[derive(Debug, Clone, Default)]
pub enum Slot {
    #[default]
    Void,
    /// Null reference of any reference representation.
    Null,
    Bool(bool),
    Int32(i32),
    Long(i64),
    Double(f64),
    String(String),
    PhpString(PhpString),
    Number(PhpNumber),
    Value(PhpValue),
    Array(PhpArray),
    Alias(PhpAlias),
    Object(ObjectRef),
    Enumerator(EnumeratorRef),
    Delegate(Delegate),
    TypeHandle(QualifiedName),
}

fn mismatch(expected: &str, got: &Slot) -> Fault {
    Fault::internal(format!("expected {expected} on the stack, found {}", got.kind()))
}

impl Slot {
    /// Zero value of a representation, as held by a fresh local.
    pub fn default_for(repr: Repr) -> Slot {
        match repr {
            Repr::Void => Slot::Void,
            Repr::Bool => Slot::Bool(false),
            Repr::Int32 => Slot::Int32(0),
            Repr::Long => Slot::Long(0),
            Repr::Double => Slot::Double(0.0),
            Repr::String => Slot::String(String::new()),
            Repr::PhpString => Slot::PhpString(PhpString::default()),
            Repr::Number => Slot::Number(PhpNumber::Long(0)),
            Repr::Value => Slot::Value(PhpValue::Null),
            Repr::Array
            | Repr::Alias
            | Repr::Object
            | Repr::Enumerator
            | Repr::Delegate
            | Repr::TypeHandle => Slot::Null,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Slot::Void => "void",
            Slot::Null => "null",
            Slot::Bool(_) => "bool",
            Slot::Int32(_) => "int32",
            Slot::Long(_) => "long",
            Slot::Double(_) => "double",
            Slot::String(_) => "string",
            Slot::PhpString(_) => "phpstring",
            Slot::Number(_) => "number",
            Slot::Value(_) => "value",
            Slot::Array(_) => "array",
            Slot::Alias(_) => "alias",
            Slot::Object(_) => "object",
            Slot::Enumerator(_) => "enumerator",
            Slot::Delegate(_) => "delegate",
            Slot::TypeHandle(_) => "typehandle",
        }
    }

    pub fn is_null_ref(&self) -> bool {
        matches!(self, Slot::Null)
    }

    /// Truth test used by `brtrue`: non-zero numbers, non-null references.
    pub fn is_truthy(&self) -> Result<bool, Fault> {
        match self {
            Slot::Bool(b) => Ok(*b),
            Slot::Int32(i) => Ok(*i != 0),
            Slot::Long(l) => Ok(*l != 0),
            Slot::Double(d) => Ok(*d != 0.0),
            Slot::Null => Ok(false),
            Slot::Array(_)
            | Slot::Alias(_)
            | Slot::Object(_)
            | Slot::Enumerator(_)
            | Slot::Delegate(_)
            | Slot::TypeHandle(_) => Ok(true),
            other => Err(mismatch("a branch condition", other)),
        }
    }

    pub fn as_bool(&self) -> Result<bool, Fault> {
        match self {
            Slot::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }

    pub fn as_i32(&self) -> Result<i32, Fault> {
        match self {
            Slot::Int32(i) => Ok(*i),
            other => Err(mismatch("int32", other)),
        }
    }

    pub fn as_long(&self) -> Result<i64, Fault> {
        match self {
            Slot::Long(l) => Ok(*l),
            other => Err(mismatch("long", other)),
        }
    }

    pub fn as_double(&self) -> Result<f64, Fault> {
        match self {
            Slot::Double(d) => Ok(*d),
            other => Err(mismatch("double", other)),
        }
    }

    pub fn as_number(&self) -> Result<PhpNumber, Fault> {
        match self {
            Slot::Number(n) => Ok(*n),
            other => Err(mismatch("number", other)),
        }
    }

    pub fn into_string(self) -> Result<String, Fault> {
        match self {
            Slot::String(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }

    pub fn into_php_string(self) -> Result<PhpString, Fault> {
        match self {
            Slot::PhpString(s) => Ok(s),
            other => Err(mismatch("phpstring", &other)),
        }
    }

    pub fn into_array(self) -> Result<PhpArray, Fault> {
        match self {
            Slot::Array(a) => Ok(a),
            other => Err(mismatch("array", &other)),
        }
    }

    /// An array handle that may be the null reference.
    pub fn into_array_opt(self) -> Result<Option<PhpArray>, Fault> {
        match self {
            Slot::Array(a) => Ok(Some(a)),
            Slot::Null => Ok(None),
            other => Err(mismatch("array", &other)),
        }
    }

    pub fn into_alias(self) -> Result<PhpAlias, Fault> {
        match self {
            Slot::Alias(a) => Ok(a),
            other => Err(mismatch("alias", &other)),
        }
    }

    pub fn into_object(self) -> Result<ObjectRef, Fault> {
        match self {
            Slot::Object(o) => Ok(o),
            other => Err(mismatch("object", &other)),
        }
    }

    pub fn into_object_opt(self) -> Result<Option<ObjectRef>, Fault> {
        match self {
            Slot::Object(o) => Ok(Some(o)),
            Slot::Null => Ok(None),
            other => Err(mismatch("object", &other)),
        }
    }

    pub fn into_enumerator(self) -> Result<EnumeratorRef, Fault> {
        match self {
            Slot::Enumerator(e) => Ok(e),
            other => Err(mismatch("enumerator", &other)),
        }
    }

    pub fn into_delegate(self) -> Result<Delegate, Fault> {
        match self {
            Slot::Delegate(d) => Ok(d),
            other => Err(mismatch("delegate", &other)),
        }
    }

    pub fn into_type_handle(self) -> Result<QualifiedName, Fault> {
        match self {
            Slot::TypeHandle(q) => Ok(q),
            other => Err(mismatch("typehandle", &other)),
        }
    }

    /// Boxes any slot into the generic value. Aliases stay aliases.
    pub fn into_value(self) -> Result<PhpValue, Fault> {
        Ok(match self {
            Slot::Null => PhpValue::Null,
            Slot::Bool(b) => PhpValue::Bool(b),
            Slot::Int32(i) => PhpValue::Long(i as i64),
            Slot::Long(l) => PhpValue::Long(l),
            Slot::Double(d) => PhpValue::Double(d),
            Slot::String(s) => PhpValue::String(s),
            Slot::PhpString(s) => PhpValue::MutableString(s),
            Slot::Number(n) => n.into_value(),
            Slot::Value(v) => v,
            Slot::Array(a) => PhpValue::Array(a),
            Slot::Alias(a) => PhpValue::Alias(a),
            Slot::Object(o) => PhpValue::Object(o),
            other @ (Slot::Void | Slot::Enumerator(_) | Slot::Delegate(_) | Slot::TypeHandle(_)) => {
                return Err(mismatch("a boxable value", &other));
            }
        })
    }

    /// Whether the slot already has the shape `repr` prescribes.
    pub fn fits(&self, repr: Repr) -> bool {
        match (repr, self) {
            (Repr::Void, Slot::Void) => true,
            (Repr::Bool, Slot::Bool(_)) => true,
            (Repr::Int32, Slot::Int32(_)) => true,
            (Repr::Long, Slot::Long(_)) => true,
            (Repr::Double, Slot::Double(_)) => true,
            (Repr::String, Slot::String(_)) => true,
            (Repr::PhpString, Slot::PhpString(_)) => true,
            (Repr::Number, Slot::Number(_)) => true,
            (Repr::Value, Slot::Value(_)) => true,
            (Repr::Array, Slot::Array(_)) => true,
            (Repr::Alias, Slot::Alias(_)) => true,
            (Repr::Object, Slot::Object(_)) => true,
            (Repr::Enumerator, Slot::Enumerator(_)) => true,
            (Repr::Delegate, Slot::Delegate(_)) => true,
            (Repr::TypeHandle, Slot::TypeHandle(_)) => true,
            (r, Slot::Null) => r.is_reference(),
            _ => false,
        }
    }

    /// Unboxes a helper result into the helper's declared return representation.
    ///
    /// Helpers compute on boxed values; the declared representation is a promise about
    /// which boxed shapes can come back, so only those are accepted here.
    pub fn conform(self, repr: Repr) -> Result<Slot, Fault> {
        if self.fits(repr) {
            return Ok(self);
        }
        if repr == Repr::Value {
            return Ok(Slot::Value(self.into_value()?));
        }
        if repr == Repr::Void {
            return Ok(Slot::Void);
        }
        let Slot::Value(v) = self else {
            return Err(mismatch(repr.name(), &self));
        };
        Ok(match (repr, v.dereferenced()) {
            (Repr::Bool, PhpValue::Bool(b)) => Slot::Bool(b),
            (Repr::Long, PhpValue::Long(l)) => Slot::Long(l),
            (Repr::Int32, PhpValue::Long(l)) => Slot::Int32(l as i32),
            (Repr::Double, PhpValue::Double(d)) => Slot::Double(d),
            (Repr::Double, PhpValue::Long(l)) => Slot::Double(l as f64),
            (Repr::Number, PhpValue::Long(l)) => Slot::Number(PhpNumber::Long(l)),
            (Repr::Number, PhpValue::Double(d)) => Slot::Number(PhpNumber::Double(d)),
            (Repr::String, PhpValue::String(s)) => Slot::String(s),
            (Repr::String, PhpValue::MutableString(s)) => Slot::String(s.into_string()),
            (Repr::PhpString, PhpValue::MutableString(s)) => Slot::PhpString(s),
            (Repr::PhpString, PhpValue::String(s)) => Slot::PhpString(PhpString::new(s)),
            (Repr::Array, PhpValue::Array(a)) => Slot::Array(a),
            (Repr::Object, PhpValue::Object(o)) => Slot::Object(o),
            (r, PhpValue::Null) if r.is_reference() => Slot::Null,
            (_, other) => {
                return Err(Fault::internal(format!(
                    "helper promised {repr} but produced {}",
                    other.type_name()
                )));
            }
        })
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Value(v) => write!(f, "{v:?}"),
            other => write!(f, "{other:?}"),
        }
    }
}

impl From<PhpValue> for Slot {
    fn from(v: PhpValue) -> Self {
        Slot::Value(v)
    }
}
