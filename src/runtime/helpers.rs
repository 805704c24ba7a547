//! The standard helper catalogue.
//!
//! Every overload the code generator may resolve is declared here, grouped by concern.
//! Implementations compute on boxed values and return them boxed; the library unboxes
//! each result into the overload's declared representation.

use std::rc::Rc;

use super::array::{ArrayKey, PhpArray};
use super::convert::{self, NumericKind};
use super::enumerator::{self, EnumeratorRef};
use super::generator;
use super::library::HelperLibrary;
use super::object::{ObjectRef, PhpObject};
use super::ops::{self, ArithOp, BitOp};
use super::slot::{CallSiteFlags, CallSiteKind, CallSiteShape, Delegate, Slot};
use super::value::{PhpAlias, PhpNumber, PhpString, PhpValue};
use super::{Fault, RuntimeHost};
use crate::il::Repr;
use crate::types::QualifiedName;

use crate::il::Repr::{Alias, Array, Bool, Double, Enumerator, Int32, Long, Number, Object, TypeHandle, Value, Void};

/// Arguments of one helper call, consumed in declaration order.
struct Args(std::vec::IntoIter<Slot>);

impl Args {
    fn new(args: Vec<Slot>) -> Self {
        Args(args.into_iter())
    }

    fn next(&mut self) -> Result<Slot, Fault> {
        self.0
            .next()
            .ok_or_else(|| Fault::internal("helper called with too few arguments"))
    }

    /// Boxed, dereferenced argument.
    fn value(&mut self) -> Result<PhpValue, Fault> {
        Ok(self.next()?.into_value()?.dereferenced())
    }

    fn long(&mut self) -> Result<i64, Fault> {
        self.next()?.as_long()
    }

    fn bool(&mut self) -> Result<bool, Fault> {
        self.next()?.as_bool()
    }

    fn i32(&mut self) -> Result<i32, Fault> {
        self.next()?.as_i32()
    }

    fn string(&mut self) -> Result<String, Fault> {
        match self.next()? {
            Slot::String(s) => Ok(s),
            Slot::PhpString(s) => Ok(s.into_string()),
            Slot::Null => Ok(String::new()),
            other => other.into_string(),
        }
    }

    fn array(&mut self) -> Result<PhpArray, Fault> {
        self.next()?
            .into_array_opt()?
            .ok_or_else(|| Fault::error("Cannot use a scalar value as an array"))
    }

    fn array_opt(&mut self) -> Result<Option<PhpArray>, Fault> {
        self.next()?.into_array_opt()
    }

    fn object(&mut self) -> Result<ObjectRef, Fault> {
        self.next()?
            .into_object_opt()?
            .ok_or_else(|| Fault::error("Call to a member function on null"))
    }

    fn alias(&mut self) -> Result<PhpAlias, Fault> {
        self.next()?.into_alias()
    }

    fn enumerator(&mut self) -> Result<EnumeratorRef, Fault> {
        self.next()?.into_enumerator()
    }

    fn type_handle_opt(&mut self) -> Result<Option<QualifiedName>, Fault> {
        match self.next()? {
            Slot::Null => Ok(None),
            other => other.into_type_handle().map(Some),
        }
    }

    /// Array key from a long, string or boxed argument.
    fn key(&mut self) -> Result<ArrayKey, Fault> {
        match self.next()? {
            Slot::Long(l) => Ok(ArrayKey::Int(l)),
            Slot::String(s) => Ok(ArrayKey::from_str(&s)),
            other => ArrayKey::from_value(&other.into_value()?),
        }
    }
}

const ARITH_PAIRS: &[(&[Repr], Repr)] = &[
    (&[Long, Long], Number),
    (&[Long, Double], Double),
    (&[Double, Long], Double),
    (&[Double, Double], Double),
    (&[Number, Number], Number),
    (&[Number, Long], Number),
    (&[Long, Number], Number),
    (&[Number, Double], Double),
    (&[Double, Number], Double),
    (&[Value, Value], Value),
    (&[Value, Long], Value),
    (&[Long, Value], Value),
    (&[Value, Double], Value),
    (&[Double, Value], Value),
    (&[Value, Number], Value),
    (&[Number, Value], Value),
];

const COMPARE_PAIRS: &[&[Repr]] = &[
    &[Long, Long],
    &[Double, Double],
    &[Long, Double],
    &[Double, Long],
    &[Number, Number],
    &[Number, Long],
    &[Long, Number],
    &[Number, Double],
    &[Double, Number],
    &[Repr::String, Repr::String],
    &[Value, Value],
    &[Value, Long],
    &[Long, Value],
    &[Value, Double],
    &[Double, Value],
    &[Value, Number],
    &[Number, Value],
    &[Value, Repr::String],
    &[Repr::String, Value],
    &[Long, Repr::String],
    &[Repr::String, Long],
];

const ARRAY_KEYED: &[&[Repr]] = &[&[Array, Value], &[Array, Long], &[Array, Repr::String]];
const ARRAY_KEYED_VALUE: &[&[Repr]] = &[
    &[Array, Value, Value],
    &[Array, Long, Value],
    &[Array, Repr::String, Value],
];
const ARRAY_KEYED_ALIAS: &[&[Repr]] = &[
    &[Array, Value, Alias],
    &[Array, Long, Alias],
    &[Array, Repr::String, Alias],
];

impl HelperLibrary {
    /// The full catalogue the code generator is built against.
    pub fn standard() -> Self {
        let mut lib = HelperLibrary::new();

        // Arithmetic
        for &(params, ret) in ARITH_PAIRS {
            lib.declare("add", params, ret, add);
            lib.declare("sub", params, ret, sub);
            lib.declare("mul", params, ret, mul);
            lib.declare("div", params, ret, div);
            lib.declare("pow", params, ret, pow);
        }
        lib.declare("add", &[Array, Array], Array, add);
        for params in [&[Long, Long][..], &[Value, Value], &[Value, Long], &[Long, Value]] {
            lib.declare("mod", params, Long, modulo);
        }
        lib.declare("to_number_arith", &[Repr::String], Number, to_number_arith);
        lib.declare("negate", &[Long], Number, negate);
        lib.declare("negate", &[Double], Double, negate);
        lib.declare("negate", &[Number], Number, negate);
        lib.declare("negate", &[Value], Value, negate);
        lib.declare("plus", &[Value], Value, plus);
        lib.declare("increment", &[Long], Number, increment);
        lib.declare("increment", &[Value], Value, increment);
        lib.declare("decrement", &[Long], Number, decrement);
        lib.declare("decrement", &[Value], Value, decrement);

        // Bitwise
        lib.declare("bit_and", &[Long, Long], Long, bit_and);
        lib.declare("bit_and", &[Value, Value], Value, bit_and);
        lib.declare("bit_or", &[Long, Long], Long, bit_or);
        lib.declare("bit_or", &[Value, Value], Value, bit_or);
        lib.declare("bit_xor", &[Long, Long], Long, bit_xor);
        lib.declare("bit_xor", &[Value, Value], Value, bit_xor);
        lib.declare("bit_not", &[Value], Value, bit_not);
        lib.declare("shl", &[Long, Long], Long, shl);
        lib.declare("shl", &[Value, Value], Long, shl);
        lib.declare("shr", &[Long, Long], Long, shr);
        lib.declare("shr", &[Value, Value], Long, shr);

        // Strings
        lib.declare("concat", &[Repr::String, Repr::String], Repr::String, concat);
        lib.declare("string_get_item", &[Repr::String, Value], Repr::String, string_get_item);
        lib.declare("string_get_item_quiet", &[Repr::String, Value], Value, string_get_item_quiet);
        lib.declare("string_with_item_set", &[Repr::String, Value, Value], Repr::String, string_with_item_set);
        lib.declare("string_is_null_or_empty", &[Repr::String], Bool, string_is_null_or_empty);

        // Comparison
        for &params in COMPARE_PAIRS {
            lib.declare("compare", params, Int32, compare);
            lib.declare("loose_eq", params, Bool, loose_eq);
        }
        lib.declare("strict_eq", &[Value, Value], Bool, strict_eq);
        lib.declare("strict_eq", &[Repr::String, Repr::String], Bool, strict_eq);
        lib.declare("is_null", &[Value], Bool, is_null);
        lib.declare("loose_eq_null", &[Value], Bool, loose_eq_null);
        lib.declare("loose_eq_null", &[Number], Bool, loose_eq_null);
        lib.declare("array_is_empty", &[Array], Bool, array_is_empty);
        lib.declare("instance_of", &[Value, TypeHandle], Bool, instance_of);
        lib.declare("switch_table_index", &[Value, Long, Long, Long], Int32, switch_table_index);

        // Conversions
        for from in [Bool, Int32, Long, Double, Repr::String, Repr::PhpString, Number, Array, Object, Alias] {
            lib.declare("to_value", std::slice::from_ref(static_repr(from)), Value, to_value);
        }
        for from in [Value, Repr::String, Repr::PhpString, Number, Array] {
            lib.declare("to_bool", std::slice::from_ref(static_repr(from)), Bool, to_bool);
        }
        for from in [Value, Double, Repr::String, Repr::PhpString, Number] {
            lib.declare("to_long", std::slice::from_ref(static_repr(from)), Long, to_long);
        }
        for from in [Value, Repr::String, Repr::PhpString, Number] {
            lib.declare("to_double", std::slice::from_ref(static_repr(from)), Double, to_double);
        }
        for from in [Value, Bool, Long, Double, Repr::String, Repr::PhpString] {
            lib.declare("to_number", std::slice::from_ref(static_repr(from)), Number, to_number);
        }
        for from in [Value, Bool, Long, Double, Number, Repr::PhpString, Array, Object] {
            lib.declare("to_string", std::slice::from_ref(static_repr(from)), Repr::String, to_string);
        }
        lib.declare("to_php_string", &[Repr::String], Repr::PhpString, to_php_string);
        lib.declare("to_php_string", &[Value], Repr::PhpString, to_php_string);
        lib.declare("to_array", &[Value], Array, to_array);
        lib.declare("to_object", &[Value], Object, to_object);
        lib.declare("to_alias", &[Value], Alias, new_alias);
        lib.declare("new_alias", &[Value], Alias, new_alias);
        lib.declare("alias_set", &[Alias, Value], Void, alias_set);
        lib.declare("deep_copy", &[Array], Array, deep_copy);
        lib.declare("deep_copy", &[Value], Value, deep_copy);
        lib.declare("cast_array", &[Value], Array, cast_array);
        lib.declare("cast_object", &[Value], Object, cast_object);
        lib.declare("to_type_handle", &[Value], TypeHandle, to_type_handle);
        lib.declare("to_throwable", &[Value], Object, to_throwable);

        // Arrays
        lib.declare("new_array", &[], Array, new_array);
        for &params in ARRAY_KEYED {
            lib.declare("array_get_item", params, Value, array_get_item);
            lib.declare("array_get_item_quiet", params, Value, array_get_item_quiet);
            lib.declare("array_ensure_item_array", params, Array, array_ensure_item_array);
            lib.declare("array_ensure_item_alias", params, Alias, array_ensure_item_alias);
            lib.declare("array_remove_item", params, Void, array_remove_item);
        }
        for &params in ARRAY_KEYED_VALUE {
            lib.declare("array_set_item", params, Void, array_set_item);
        }
        for &params in ARRAY_KEYED_ALIAS {
            lib.declare("array_set_alias", params, Void, array_set_alias);
        }
        lib.declare("array_add", &[Array, Value], Void, array_add);
        lib.declare("array_add_alias", &[Array, Alias], Void, array_add_alias);
        lib.declare("array_add_ensure_array", &[Array], Array, array_add_ensure_array);
        lib.declare("locals_get", &[Array, Repr::String], Value, locals_get);

        // Generic containers
        lib.declare("value_get_item", &[Value, Value], Value, value_get_item);
        lib.declare("value_get_item_quiet", &[Value, Value], Value, value_get_item_quiet);
        lib.declare("value_get_list_item", &[Value, Value], Value, value_get_list_item);
        lib.declare("value_with_item_set", &[Value, Value, Value], Value, value_with_item_set);
        lib.declare("value_with_item_added", &[Value, Value], Value, value_with_item_added);
        lib.declare("value_ensure_array", &[Value], Array, value_ensure_array);
        lib.declare("value_remove_item", &[Value, Value], Void, value_remove_item);
        lib.declare("alias_set_item", &[Alias, Value, Value], Void, alias_set_item);
        lib.declare("alias_add_item", &[Alias, Value], Void, alias_add_item);
        lib.declare("alias_ensure_array", &[Alias], Array, alias_ensure_array);
        lib.declare("object_get_item", &[Object, Value], Value, object_get_item);
        lib.declare("object_set_item", &[Object, Value, Value], Void, object_set_item);

        // Fields
        lib.declare("value_get_field", &[Value, Repr::String], Value, value_get_field);
        lib.declare("value_get_field_quiet", &[Value, Repr::String], Value, value_get_field_quiet);
        lib.declare("value_set_field", &[Value, Repr::String, Value], Void, value_set_field);
        lib.declare("value_unset_field", &[Value, Repr::String], Void, value_unset_field);
        lib.declare("value_as_object", &[Value, Repr::String], Object, value_as_object);
        lib.declare("object_get_field", &[Object, Repr::String], Value, object_get_field);
        lib.declare("object_get_field_quiet", &[Object, Repr::String], Value, object_get_field_quiet);
        lib.declare("object_set_field", &[Object, Repr::String, Value], Void, object_set_field);
        lib.declare("object_unset_field", &[Object, Repr::String], Void, object_unset_field);
        lib.declare("object_ensure_field_array", &[Object, Repr::String], Array, object_ensure_field_array);
        lib.declare("object_ensure_field_alias", &[Object, Repr::String], Alias, object_ensure_field_alias);
        lib.declare("object_set_field_alias", &[Object, Repr::String, Alias], Void, object_set_field_alias);

        // Enumeration
        lib.declare("enumerator_for_array", &[Array, Bool], Enumerator, enumerator_for_array);
        lib.declare("enumerator_for_value", &[Value, Bool, TypeHandle], Enumerator, enumerator_for_value);
        lib.declare("enumerator_move_next", &[Enumerator], Bool, enumerator_move_next);
        lib.declare("enumerator_current_value", &[Enumerator], Value, enumerator_current_value);
        lib.declare("enumerator_current_key", &[Enumerator], Value, enumerator_current_key);
        lib.declare("enumerator_current_alias", &[Enumerator], Alias, enumerator_current_alias);
        lib.declare("enumerator_dispose", &[Enumerator], Void, enumerator_dispose);

        // Generators
        lib.declare("generator_take_pending_exception", &[Object], Object, generator_take_pending_exception);
        lib.declare("generator_next_auto_key", &[Object], Void, generator_next_auto_key);
        lib.declare("generator_set_key", &[Object, Value], Void, generator_set_key);

        // Calls and output
        lib.declare("bind_call_site", &[Int32, Int32, Int32, Repr::String], Repr::Delegate, bind_call_site);
        lib.declare("echo", &[Repr::String], Void, echo);
        lib.declare("exit", &[Value], Void, exit);

        lib
    }
}

/// One-element parameter lists for the conversion loops.
fn static_repr(repr: Repr) -> &'static Repr {
    match repr {
        Repr::Void => &Repr::Void,
        Repr::Bool => &Repr::Bool,
        Repr::Int32 => &Repr::Int32,
        Repr::Long => &Repr::Long,
        Repr::Double => &Repr::Double,
        Repr::String => &Repr::String,
        Repr::PhpString => &Repr::PhpString,
        Repr::Number => &Repr::Number,
        Repr::Value => &Repr::Value,
        Repr::Array => &Repr::Array,
        Repr::Alias => &Repr::Alias,
        Repr::Object => &Repr::Object,
        Repr::Enumerator => &Repr::Enumerator,
        Repr::Delegate => &Repr::Delegate,
        Repr::TypeHandle => &Repr::TypeHandle,
    }
}

type HelperResult = Result<Slot, Fault>;

fn arith(host: &mut dyn RuntimeHost, args: Vec<Slot>, op: ArithOp) -> HelperResult {
    let mut a = Args::new(args);
    let (x, y) = (a.value()?, a.value()?);
    Ok(Slot::Value(ops::arith(host, op, &x, &y)?))
}

fn add(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    arith(host, args, ArithOp::Add)
}

fn sub(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    arith(host, args, ArithOp::Sub)
}

fn mul(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    arith(host, args, ArithOp::Mul)
}

fn div(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    arith(host, args, ArithOp::Div)
}

fn modulo(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    arith(host, args, ArithOp::Mod)
}

fn pow(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    arith(host, args, ArithOp::Pow)
}

fn to_number_arith(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let s = Args::new(args).string()?;
    Ok(Slot::Number(ops::str_to_number_arith(host, &s)?))
}

fn negate(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let v = Args::new(args).value()?;
    Ok(Slot::Value(ops::negate(host, &v)?))
}

fn plus(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let v = Args::new(args).value()?;
    Ok(Slot::Value(ops::plus(host, &v)?))
}

fn increment(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let v = Args::new(args).value()?;
    Ok(Slot::Value(ops::increment(&v)?))
}

fn decrement(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let v = Args::new(args).value()?;
    Ok(Slot::Value(ops::decrement(&v)?))
}

fn bitwise(host: &mut dyn RuntimeHost, args: Vec<Slot>, op: BitOp) -> HelperResult {
    let mut a = Args::new(args);
    let (x, y) = (a.value()?, a.value()?);
    Ok(Slot::Value(ops::bitwise(host, op, &x, &y)?))
}

fn bit_and(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    bitwise(host, args, BitOp::And)
}

fn bit_or(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    bitwise(host, args, BitOp::Or)
}

fn bit_xor(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    bitwise(host, args, BitOp::Xor)
}

fn shl(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    bitwise(host, args, BitOp::Shl)
}

fn shr(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    bitwise(host, args, BitOp::Shr)
}

fn bit_not(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let v = Args::new(args).value()?;
    Ok(Slot::Value(ops::bitwise_not(&v)?))
}

fn concat(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let mut s = a.string()?;
    s.push_str(&a.string()?);
    Ok(Slot::String(s))
}

/// Integer offset of a string subscript.
fn string_offset(key: &PhpValue) -> Result<i64, Fault> {
    match ArrayKey::from_value(key)? {
        ArrayKey::Int(i) => Ok(i),
        ArrayKey::Str(_) => Err(Fault::type_error(format!(
            "Cannot access offset of type {} on string",
            key.type_name()
        ))),
    }
}

fn resolve_offset(len: usize, offset: i64) -> Option<usize> {
    let len = len as i64;
    let at = if offset < 0 { len + offset } else { offset };
    (0..len).contains(&at).then_some(at as usize)
}

fn read_string_offset(host: &mut dyn RuntimeHost, s: &str, key: &PhpValue, quiet: bool) -> Result<Option<String>, Fault> {
    let offset = match string_offset(key) {
        Ok(offset) => offset,
        Err(_) if quiet => return Ok(None),
        Err(e) => return Err(e),
    };
    match resolve_offset(s.len(), offset) {
        Some(at) => Ok(Some(String::from_utf8_lossy(&s.as_bytes()[at..at + 1]).into_owned())),
        None => {
            if !quiet {
                host.warn(&format!("Uninitialized string offset {offset}"));
            }
            Ok(None)
        }
    }
}

fn string_get_item(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (s, key) = (a.string()?, a.value()?);
    Ok(Slot::String(read_string_offset(host, &s, &key, false)?.unwrap_or_default()))
}

fn string_get_item_quiet(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (s, key) = (a.string()?, a.value()?);
    Ok(Slot::Value(read_string_offset(host, &s, &key, true)?.map_or(PhpValue::Null, PhpValue::String)))
}

/// The string with the byte at `key` replaced, padding with spaces past the end.
fn with_offset_set(host: &mut dyn RuntimeHost, s: String, key: &PhpValue, value: &PhpValue) -> Result<String, Fault> {
    let offset = string_offset(key)?;
    let replacement = convert::to_string(host, value)?;
    let Some(&byte) = replacement.as_bytes().first() else {
        return Err(Fault::error("Cannot assign an empty string to a string offset"));
    };
    if replacement.len() > 1 {
        host.warn("Only the first byte will be assigned to the string offset");
    }
    let mut bytes = s.into_bytes();
    let at = if offset < 0 { bytes.len() as i64 + offset } else { offset };
    if at < 0 {
        host.warn(&format!("Illegal string offset {offset}"));
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }
    let at = at as usize;
    if at >= bytes.len() {
        bytes.resize(at + 1, b' ');
    }
    bytes[at] = byte;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn string_with_item_set(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (s, key, value) = (a.string()?, a.value()?, a.value()?);
    Ok(Slot::String(with_offset_set(host, s, &key, &value)?))
}

fn string_is_null_or_empty(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    Ok(Slot::Bool(Args::new(args).string()?.is_empty()))
}

fn compare(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (x, y) = (a.value()?, a.value()?);
    Ok(Slot::Int32(ops::compare(&x, &y)))
}

fn loose_eq(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (x, y) = (a.value()?, a.value()?);
    Ok(Slot::Bool(ops::loose_eq(&x, &y)))
}

fn strict_eq(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (x, y) = (a.value()?, a.value()?);
    Ok(Slot::Bool(ops::strict_eq(&x, &y)))
}

fn is_null(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    Ok(Slot::Bool(Args::new(args).value()?.is_null()))
}

fn loose_eq_null(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let v = Args::new(args).value()?;
    Ok(Slot::Bool(ops::loose_eq(&PhpValue::Null, &v)))
}

fn array_is_empty(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    Ok(Slot::Bool(Args::new(args).array_opt()?.is_none_or(|a| a.is_empty())))
}

fn instance_of(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let v = a.value()?;
    let class = a.type_handle_opt()?;
    Ok(Slot::Bool(match (v, class) {
        (PhpValue::Object(obj), Some(class)) => host.is_subclass_of(&obj.class, &class),
        _ => false,
    }))
}

/// Integer case key the subject is loosely equal to, if any.
fn switch_key(subject: &PhpValue, true_key: i64) -> Option<i64> {
    match subject {
        PhpValue::Null | PhpValue::Bool(false) => Some(0),
        PhpValue::Bool(true) => Some(true_key),
        PhpValue::Long(l) => Some(*l),
        PhpValue::Double(d) if d.fract() == 0.0 && d.is_finite() => Some(*d as i64),
        PhpValue::String(_) | PhpValue::MutableString(_) => match convert::parse_numeric(subject.as_str()?) {
            Some((PhpNumber::Long(l), NumericKind::Whole)) => Some(l),
            Some((PhpNumber::Double(d), NumericKind::Whole)) if d.fract() == 0.0 && d.is_finite() => {
                Some(d as i64)
            }
            _ => None,
        },
        _ => None,
    }
}

/// Jump-table slot of a switch subject: the index of the case key it loosely equals,
/// or `-1`. `true` selects `true_key`, the first non-zero case key.
fn switch_table_index(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let subject = a.value()?;
    let (min, count, true_key) = (a.long()?, a.long()?, a.long()?);
    let index = switch_key(&subject, true_key)
        .and_then(|k| k.checked_sub(min))
        .filter(|i| (0..count).contains(i))
        .map_or(-1, |i| i as i32);
    Ok(Slot::Int32(index))
}

fn to_value(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    Ok(Slot::Value(Args::new(args).value()?))
}

fn to_bool(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    Ok(Slot::Bool(convert::to_bool(&Args::new(args).value()?)))
}

fn to_long(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    Ok(Slot::Long(convert::to_long(&Args::new(args).value()?)))
}

fn to_double(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    Ok(Slot::Double(convert::to_double(&Args::new(args).value()?)))
}

fn to_number(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    Ok(Slot::Number(convert::to_number_cast(&Args::new(args).value()?)))
}

fn to_string(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let v = Args::new(args).value()?;
    Ok(Slot::String(convert::to_string(host, &v)?))
}

fn to_php_string(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let v = Args::new(args).value()?;
    Ok(Slot::PhpString(PhpString::new(convert::to_string(host, &v)?)))
}

fn to_array(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    match Args::new(args).value()? {
        PhpValue::Array(a) => Ok(Slot::Array(a)),
        PhpValue::Null => Ok(Slot::Null),
        other => Err(Fault::type_error(format!("Cannot use {} as array", other.type_name()))),
    }
}

fn to_object(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    match Args::new(args).value()? {
        PhpValue::Object(o) => Ok(Slot::Object(o)),
        PhpValue::Null => Ok(Slot::Null),
        other => Err(Fault::type_error(format!("Cannot use {} as object", other.type_name()))),
    }
}

fn new_alias(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    Ok(Slot::Alias(PhpAlias::new(Args::new(args).value()?)))
}

fn alias_set(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let alias = a.alias()?;
    alias.set(a.value()?);
    Ok(Slot::Void)
}

fn deep_copy(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    Ok(match Args::new(args).next()? {
        Slot::Array(a) => Slot::Array(a.deep_copy()),
        Slot::Value(v) => match v.dereferenced() {
            PhpValue::Array(a) => Slot::Value(PhpValue::Array(a.deep_copy())),
            other => Slot::Value(other),
        },
        other => other,
    })
}

fn cast_array(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    Ok(Slot::Array(convert::to_array(&Args::new(args).value()?)))
}

fn cast_object(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let std_class = QualifiedName::new("stdClass");
    Ok(Slot::Object(match Args::new(args).value()? {
        PhpValue::Object(o) => o,
        PhpValue::Null => PhpObject::new(std_class),
        PhpValue::Array(a) => PhpObject::with_props(
            std_class,
            a.entries().into_iter().map(|(k, v)| match k {
                ArrayKey::Int(i) => (i.to_string(), v),
                ArrayKey::Str(s) => (s, v),
            }),
        ),
        scalar => PhpObject::with_props(std_class, [("scalar".to_string(), scalar)]),
    }))
}

fn to_type_handle(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    match Args::new(args).value()? {
        PhpValue::Object(o) => Ok(Slot::TypeHandle(o.class.clone())),
        v @ (PhpValue::String(_) | PhpValue::MutableString(_)) => {
            Ok(Slot::TypeHandle(QualifiedName::new(v.as_str().unwrap_or_default())))
        }
        other => Err(Fault::error(format!(
            "Cannot use value of type {} as class name",
            other.type_name()
        ))),
    }
}

fn to_throwable(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    match Args::new(args).value()? {
        PhpValue::Object(o) if host.is_subclass_of(&o.class, &QualifiedName::new("Throwable")) => Ok(Slot::Object(o)),
        _ => Err(Fault::error("Can only throw objects")),
    }
}

fn new_array(_: &mut dyn RuntimeHost, _: Vec<Slot>) -> HelperResult {
    Ok(Slot::Array(PhpArray::new()))
}

fn read_array_item(host: &mut dyn RuntimeHost, args: Vec<Slot>, quiet: bool) -> HelperResult {
    let mut a = Args::new(args);
    let array = a.array_opt()?;
    let key = a.key()?;
    let Some(array) = array else {
        if !quiet {
            host.warn("Trying to access array offset on value of type null");
        }
        return Ok(Slot::Value(PhpValue::Null));
    };
    match array.get(&key) {
        Some(v) => Ok(Slot::Value(v)),
        None => {
            if !quiet {
                host.warn(&format!("Undefined array key {key}"));
            }
            Ok(Slot::Value(PhpValue::Null))
        }
    }
}

fn array_get_item(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    read_array_item(host, args, false)
}

fn array_get_item_quiet(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    read_array_item(host, args, true)
}

fn array_set_item(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (array, key, value) = (a.array()?, a.key()?, a.value()?);
    array.set(key, value);
    Ok(Slot::Void)
}

fn array_set_alias(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (array, key, alias) = (a.array()?, a.key()?, a.alias()?);
    array.set_alias(key, alias);
    Ok(Slot::Void)
}

fn array_add(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (array, value) = (a.array()?, a.value()?);
    array.push(value)?;
    Ok(Slot::Void)
}

fn array_add_alias(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (array, alias) = (a.array()?, a.alias()?);
    array.push_alias(alias)?;
    Ok(Slot::Void)
}

/// `$a[][...] = v`: appends a fresh array and returns it.
fn array_add_ensure_array(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let array = Args::new(args).array()?;
    let nested = PhpArray::new();
    array.push(PhpValue::Array(nested.clone()))?;
    Ok(Slot::Array(nested))
}

fn array_ensure_item_array(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (array, key) = (a.array()?, a.key()?);
    Ok(Slot::Array(array.ensure_array(key)?))
}

fn array_ensure_item_alias(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (array, key) = (a.array()?, a.key()?);
    Ok(Slot::Alias(array.ensure_alias(key)))
}

fn array_remove_item(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (array, key) = (a.array_opt()?, a.key()?);
    if let Some(array) = array {
        array.remove(&key);
    }
    Ok(Slot::Void)
}

fn locals_get(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (table, name) = (a.array()?, a.string()?);
    match table.get(&ArrayKey::Str(name.clone())) {
        Some(v) => Ok(Slot::Value(v)),
        None => {
            host.warn(&format!("Undefined variable ${name}"));
            Ok(Slot::Value(PhpValue::Null))
        }
    }
}

fn is_array_access(host: &dyn RuntimeHost, obj: &ObjectRef) -> bool {
    host.is_subclass_of(&obj.class, &QualifiedName::new("ArrayAccess"))
}

fn not_an_array(obj: &ObjectRef) -> Fault {
    Fault::error(format!("Cannot use object of type {} as array", obj.class))
}

fn read_item(host: &mut dyn RuntimeHost, container: PhpValue, key: PhpValue, quiet: bool) -> Result<PhpValue, Fault> {
    match container {
        PhpValue::Array(array) => {
            let key = ArrayKey::from_value(&key)?;
            match array.get(&key) {
                Some(v) => Ok(v),
                None => {
                    if !quiet {
                        host.warn(&format!("Undefined array key {key}"));
                    }
                    Ok(PhpValue::Null)
                }
            }
        }
        ref s @ (PhpValue::String(_) | PhpValue::MutableString(_)) => {
            let found = read_string_offset(host, s.as_str().unwrap_or_default(), &key, quiet)?;
            Ok(match found {
                Some(ch) => PhpValue::String(ch),
                None if quiet => PhpValue::Null,
                None => PhpValue::String(String::new()),
            })
        }
        PhpValue::Object(obj) => {
            if !is_array_access(host, &obj) {
                return Err(not_an_array(&obj));
            }
            if quiet {
                let exists = host.invoke_method(obj.clone(), "offsetExists", vec![key.clone()])?;
                if !convert::to_bool(&exists) {
                    return Ok(PhpValue::Null);
                }
            }
            host.invoke_method(obj, "offsetGet", vec![key])
        }
        PhpValue::Alias(alias) => read_item(host, alias.get(), key, quiet),
        other => {
            if !quiet {
                host.warn(&format!("Trying to access array offset on value of type {}", other.type_name()));
            }
            Ok(PhpValue::Null)
        }
    }
}

fn value_get_item(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (container, key) = (a.value()?, a.value()?);
    Ok(Slot::Value(read_item(host, container, key, false)?))
}

fn value_get_item_quiet(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (container, key) = (a.value()?, a.value()?);
    Ok(Slot::Value(read_item(host, container, key, true)?))
}

/// Destructuring read: arrays warn on missing keys, anything else yields null silently.
fn value_get_list_item(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (container, key) = (a.value()?, a.value()?);
    match container {
        array @ PhpValue::Array(_) => Ok(Slot::Value(read_item(host, array, key, false)?)),
        _ => Ok(Slot::Value(PhpValue::Null)),
    }
}

/// Writes an item into a container and returns the container to store back. `None`
/// appends.
fn with_item_set(
    host: &mut dyn RuntimeHost,
    container: PhpValue,
    key: Option<PhpValue>,
    value: PhpValue,
) -> Result<PhpValue, Fault> {
    let store = |array: &PhpArray, key: Option<PhpValue>, value: PhpValue| -> Result<(), Fault> {
        match key {
            Some(k) => array.set(ArrayKey::from_value(&k)?, value),
            None => array.push(value)?,
        }
        Ok(())
    };
    match container {
        PhpValue::Array(array) => {
            store(&array, key, value)?;
            Ok(PhpValue::Array(array))
        }
        PhpValue::Null => {
            let array = PhpArray::new();
            store(&array, key, value)?;
            Ok(PhpValue::Array(array))
        }
        PhpValue::Bool(false) => {
            host.warn("Automatic conversion of false to array is deprecated");
            let array = PhpArray::new();
            store(&array, key, value)?;
            Ok(PhpValue::Array(array))
        }
        ref s @ (PhpValue::String(_) | PhpValue::MutableString(_)) => match key {
            None => Err(Fault::error("[] operator not supported for strings")),
            Some(k) => {
                let text = s.as_str().unwrap_or_default().to_string();
                Ok(PhpValue::String(with_offset_set(host, text, &k, &value)?))
            }
        },
        PhpValue::Object(obj) => {
            if !is_array_access(host, &obj) {
                return Err(not_an_array(&obj));
            }
            host.invoke_method(obj.clone(), "offsetSet", vec![key.unwrap_or_default(), value])?;
            Ok(PhpValue::Object(obj))
        }
        PhpValue::Alias(alias) => {
            let updated = with_item_set(host, alias.get(), key, value)?;
            alias.set(updated);
            Ok(PhpValue::Alias(alias))
        }
        _ => Err(Fault::error("Cannot use a scalar value as an array")),
    }
}

fn value_with_item_set(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (container, key, value) = (a.value()?, a.value()?, a.value()?);
    Ok(Slot::Value(with_item_set(host, container, Some(key), value)?))
}

fn value_with_item_added(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (container, value) = (a.value()?, a.value()?);
    Ok(Slot::Value(with_item_set(host, container, None, value)?))
}

fn value_ensure_array(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    match Args::new(args).value()? {
        PhpValue::Array(a) => Ok(Slot::Array(a)),
        PhpValue::Null => Ok(Slot::Array(PhpArray::new())),
        PhpValue::Bool(false) => {
            host.warn("Automatic conversion of false to array is deprecated");
            Ok(Slot::Array(PhpArray::new()))
        }
        _ => Err(Fault::error("Cannot use a scalar value as an array")),
    }
}

fn value_remove_item(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (container, key) = (a.value()?, a.value()?);
    match container {
        PhpValue::Array(array) => {
            array.remove(&ArrayKey::from_value(&key)?);
        }
        PhpValue::Null => {}
        PhpValue::String(_) | PhpValue::MutableString(_) => {
            return Err(Fault::error("Cannot unset string offsets"));
        }
        PhpValue::Object(obj) => {
            if !is_array_access(host, &obj) {
                return Err(not_an_array(&obj));
            }
            host.invoke_method(obj, "offsetUnset", vec![key])?;
        }
        _ => return Err(Fault::error("Cannot unset offset in a non-array variable")),
    }
    Ok(Slot::Void)
}

fn alias_set_item(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (alias, key, value) = (a.alias()?, a.value()?, a.value()?);
    with_item_set(host, PhpValue::Alias(alias), Some(key), value)?;
    Ok(Slot::Void)
}

fn alias_add_item(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (alias, value) = (a.alias()?, a.value()?);
    with_item_set(host, PhpValue::Alias(alias), None, value)?;
    Ok(Slot::Void)
}

fn alias_ensure_array(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let alias = Args::new(args).alias()?;
    Ok(Slot::Array(super::array::ensure_array_in_alias(&alias)?))
}

fn object_get_item(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (obj, key) = (a.object()?, a.value()?);
    Ok(Slot::Value(read_item(host, PhpValue::Object(obj), key, false)?))
}

fn object_set_item(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (obj, key, value) = (a.object()?, a.value()?, a.value()?);
    with_item_set(host, PhpValue::Object(obj), Some(key), value)?;
    Ok(Slot::Void)
}

fn read_field(host: &mut dyn RuntimeHost, target: PhpValue, name: &str, quiet: bool) -> PhpValue {
    match target {
        PhpValue::Object(obj) => match obj.get(name) {
            Some(v) => v,
            None => {
                if !quiet {
                    host.warn(&format!("Undefined property: {}::${name}", obj.class));
                }
                PhpValue::Null
            }
        },
        other => {
            if !quiet {
                host.warn(&format!("Attempt to read property \"{name}\" on {}", other.type_name()));
            }
            PhpValue::Null
        }
    }
}

fn value_get_field(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (target, name) = (a.value()?, a.string()?);
    Ok(Slot::Value(read_field(host, target, &name, false)))
}

fn value_get_field_quiet(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (target, name) = (a.value()?, a.string()?);
    Ok(Slot::Value(read_field(host, target, &name, true)))
}

fn object_get_field(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (obj, name) = (a.next()?.into_value()?, a.string()?);
    Ok(Slot::Value(read_field(host, obj, &name, false)))
}

fn object_get_field_quiet(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (obj, name) = (a.next()?.into_value()?, a.string()?);
    Ok(Slot::Value(read_field(host, obj, &name, true)))
}

fn assign_target(target: PhpValue, name: &str) -> Result<ObjectRef, Fault> {
    match target {
        PhpValue::Object(obj) => Ok(obj),
        other => Err(Fault::error(format!(
            "Attempt to assign property \"{name}\" on {}",
            other.type_name()
        ))),
    }
}

fn value_as_object(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (target, name) = (a.value()?, a.string()?);
    Ok(Slot::Object(assign_target(target, &name)?))
}

fn value_set_field(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (target, name, value) = (a.value()?, a.string()?, a.value()?);
    assign_target(target, &name)?.set(&name, value);
    Ok(Slot::Void)
}

fn value_unset_field(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (target, name) = (a.value()?, a.string()?);
    if let PhpValue::Object(obj) = target {
        obj.unset(&name);
    }
    Ok(Slot::Void)
}

fn object_set_field(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (target, name, value) = (a.next()?.into_value()?, a.string()?, a.value()?);
    assign_target(target, &name)?.set(&name, value);
    Ok(Slot::Void)
}

fn object_unset_field(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (target, name) = (a.next()?.into_object_opt()?, a.string()?);
    if let Some(obj) = target {
        obj.unset(&name);
    }
    Ok(Slot::Void)
}

fn object_ensure_field_array(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (target, name) = (a.next()?.into_value()?, a.string()?);
    let obj = assign_target(target, &name)?;
    match obj.get(&name) {
        Some(PhpValue::Array(array)) => Ok(Slot::Array(array)),
        None | Some(PhpValue::Null) => {
            let array = PhpArray::new();
            obj.set(&name, PhpValue::Array(array.clone()));
            Ok(Slot::Array(array))
        }
        Some(_) => Err(Fault::error("Cannot use a scalar value as an array")),
    }
}

fn object_ensure_field_alias(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (target, name) = (a.next()?.into_value()?, a.string()?);
    Ok(Slot::Alias(assign_target(target, &name)?.ensure_alias(&name)))
}

fn object_set_field_alias(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (target, name, alias) = (a.next()?.into_value()?, a.string()?, a.alias()?);
    assign_target(target, &name)?.set_alias(&name, alias);
    Ok(Slot::Void)
}

fn enumerator_for_array(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (array, by_ref) = (a.array_opt()?, a.bool()?);
    Ok(Slot::Enumerator(match array {
        Some(array) => enumerator::for_array(array, by_ref),
        None => enumerator::for_value(host, &PhpValue::Null, by_ref)?,
    }))
}

fn enumerator_for_value(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (value, by_ref, scope) = (a.value()?, a.bool()?, a.type_handle_opt()?);
    tracing::trace!(scope = ?scope, "enumerating {}", value.type_name());
    Ok(Slot::Enumerator(enumerator::for_value(host, &value, by_ref)?))
}

fn enumerator_move_next(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let e = Args::new(args).enumerator()?;
    Ok(Slot::Bool(enumerator::move_next(host, &e)?))
}

fn enumerator_current_value(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let e = Args::new(args).enumerator()?;
    Ok(Slot::Value(enumerator::current_value(host, &e)?))
}

fn enumerator_current_key(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let e = Args::new(args).enumerator()?;
    Ok(Slot::Value(enumerator::current_key(host, &e)?))
}

fn enumerator_current_alias(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let e = Args::new(args).enumerator()?;
    Ok(Slot::Alias(enumerator::current_alias(host, &e)?))
}

fn enumerator_dispose(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let e = Args::new(args).enumerator()?;
    enumerator::dispose(&e);
    host.note_enumerator_disposed();
    Ok(Slot::Void)
}

fn generator_take_pending_exception(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let g = Args::new(args).object()?;
    Ok(generator::take_pending_exception(&g)?.map_or(Slot::Null, |ex| Slot::Object(ex.0)))
}

fn generator_next_auto_key(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let g = Args::new(args).object()?;
    generator::state_of(&g)?.next_auto_key();
    Ok(Slot::Void)
}

fn generator_set_key(_: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (g, key) = (a.object()?, a.value()?);
    generator::state_of(&g)?.set_key(key);
    Ok(Slot::Void)
}

/// Builds the delegate a dynamic call site caches. Repeating it is harmless: every
/// construction for one site yields an equivalent delegate.
fn bind_call_site(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let mut a = Args::new(args);
    let (kind, argc, flags, name) = (a.i32()?, a.i32()?, a.i32()?, a.string()?);
    let kind = CallSiteKind::from_code(kind).ok_or_else(|| Fault::internal(format!("bad call-site kind {kind}")))?;
    let flags = CallSiteFlags::from_bits(flags as u32)
        .ok_or_else(|| Fault::internal(format!("bad call-site flags {flags:#x}")))?;
    let shape = CallSiteShape {
        kind,
        argc: u16::try_from(argc).map_err(|_| Fault::internal(format!("bad call-site arity {argc}")))?,
        flags,
        name: (!name.is_empty()).then_some(name),
    };
    host.note_call_site_bind(&shape);
    Ok(Slot::Delegate(Delegate(Rc::new(shape))))
}

fn echo(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    let text = Args::new(args).string()?;
    host.echo(&text);
    Ok(Slot::Void)
}

/// Raises the termination signal. A string status is printed first.
fn exit(host: &mut dyn RuntimeHost, args: Vec<Slot>) -> HelperResult {
    match Args::new(args).value()? {
        PhpValue::Null => Err(Fault::Exit(0)),
        PhpValue::Long(code) => Err(Fault::Exit(code)),
        s @ (PhpValue::String(_) | PhpValue::MutableString(_)) => {
            host.echo(s.as_str().unwrap_or_default());
            Err(Fault::Exit(0))
        }
        other => Err(Fault::Exit(convert::to_long(&other))),
    }
}
