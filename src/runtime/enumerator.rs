use std::cell::RefCell;
use std::rc::Rc;

use super::array::{ArrayKey, PhpArray};
use super::convert;
use super::generator;
use super::object::ObjectRef;
use super::value::{PhpAlias, PhpValue};
use super::{Fault, RuntimeHost};
use crate::types::QualifiedName;

pub type EnumeratorRef = Rc<RefCell<Enumerator>>;

/// Runtime `foreach` cursor used when the enumerated value's shape is not known statically.
#[derive(Debug)]
pub enum Enumerator {
    Array {
        array: PhpArray,
        position: usize,
        by_ref: bool,
        current: Option<(ArrayKey, PhpValue)>,
    },
    Generator {
        object: ObjectRef,
        started: bool,
    },
    Iterator {
        object: ObjectRef,
        started: bool,
    },
    Empty,
}

fn wrap(e: Enumerator) -> EnumeratorRef {
    Rc::new(RefCell::new(e))
}

/// Enumerates an array. By-value iteration walks a copy; by-reference iteration walks
/// the live array and binds every visited item to an alias.
pub fn for_array(array: PhpArray, by_ref: bool) -> EnumeratorRef {
    let array = if by_ref { array } else { array.deep_copy() };
    wrap(Enumerator::Array { array, position: 0, by_ref, current: None })
}

pub fn for_value(host: &mut dyn RuntimeHost, value: &PhpValue, by_ref: bool) -> Result<EnumeratorRef, Fault> {
    match value.clone().dereferenced() {
        PhpValue::Array(a) => Ok(for_array(a, by_ref)),
        PhpValue::Object(obj) => for_object(host, obj, by_ref),
        other => {
            host.warn(&format!(
                "foreach() argument must be of type array|object, {} given",
                other.type_name()
            ));
            Ok(wrap(Enumerator::Empty))
        }
    }
}

fn for_object(host: &mut dyn RuntimeHost, obj: ObjectRef, by_ref: bool) -> Result<EnumeratorRef, Fault> {
    if obj.is_generator() {
        if by_ref {
            return Err(Fault::throw(
                "Exception",
                "You can only iterate a generator by-reference if it declared that it yields by-reference",
            ));
        }
        return Ok(wrap(Enumerator::Generator { object: obj, started: false }));
    }
    if host.is_subclass_of(&obj.class, &QualifiedName::new("Iterator")) {
        return Ok(wrap(Enumerator::Iterator { object: obj, started: false }));
    }
    if host.is_subclass_of(&obj.class, &QualifiedName::new("IteratorAggregate")) {
        let inner = host.invoke_method(obj.clone(), "getIterator", Vec::new())?;
        return match inner.dereferenced() {
            PhpValue::Object(inner) if inner.is_generator() || host.is_subclass_of(&inner.class, &QualifiedName::new("Traversable")) => {
                for_object(host, inner, by_ref)
            }
            _ => Err(Fault::throw(
                "Exception",
                format!("{}::getIterator() must return a Traversable", obj.class),
            )),
        };
    }
    let props = PhpArray::from_pairs(obj.props().into_iter().map(|(k, v)| (ArrayKey::Str(k), v)));
    Ok(for_array(props, false))
}

pub fn move_next(host: &mut dyn RuntimeHost, e: &EnumeratorRef) -> Result<bool, Fault> {
    let mut cursor = e.try_borrow_mut().map_err(|_| Fault::internal("enumerator borrowed twice"))?;
    match &mut *cursor {
        Enumerator::Array { array, position, by_ref, current } => match array.entry_at(*position) {
            Some((key, value)) => {
                *position += 1;
                let value = if *by_ref { PhpValue::Alias(array.ensure_alias(key.clone())) } else { value };
                *current = Some((key, value));
                Ok(true)
            }
            None => {
                *current = None;
                Ok(false)
            }
        },
        Enumerator::Generator { object, started } => {
            let object = object.clone();
            let first = !*started;
            *started = true;
            drop(cursor);
            if first {
                generator::rewind(host, &object)?;
            } else {
                generator::next(host, &object)?;
            }
            generator::valid(host, &object)
        }
        Enumerator::Iterator { object, started } => {
            let object = object.clone();
            let first = !*started;
            *started = true;
            drop(cursor);
            let step = if first { "rewind" } else { "next" };
            host.invoke_method(object.clone(), step, Vec::new())?;
            let valid = host.invoke_method(object, "valid", Vec::new())?;
            Ok(convert::to_bool(&valid))
        }
        Enumerator::Empty => Ok(false),
    }
}

enum Source {
    Ready(PhpValue),
    Generator(ObjectRef),
    Iterator(ObjectRef),
}

fn source(e: &EnumeratorRef, key: bool) -> Source {
    match &*e.borrow() {
        Enumerator::Array { current, .. } => Source::Ready(
            current
                .as_ref()
                .map(|(k, v)| if key { k.to_value() } else { v.clone().dereferenced() })
                .unwrap_or_default(),
        ),
        Enumerator::Generator { object, .. } => Source::Generator(object.clone()),
        Enumerator::Iterator { object, .. } => Source::Iterator(object.clone()),
        Enumerator::Empty => Source::Ready(PhpValue::Null),
    }
}

pub fn current_value(host: &mut dyn RuntimeHost, e: &EnumeratorRef) -> Result<PhpValue, Fault> {
    match source(e, false) {
        Source::Ready(v) => Ok(v),
        Source::Generator(object) => generator::current(host, &object),
        Source::Iterator(object) => host.invoke_method(object, "current", Vec::new()),
    }
}

pub fn current_key(host: &mut dyn RuntimeHost, e: &EnumeratorRef) -> Result<PhpValue, Fault> {
    match source(e, true) {
        Source::Ready(v) => Ok(v),
        Source::Generator(object) => generator::key(host, &object),
        Source::Iterator(object) => host.invoke_method(object, "key", Vec::new()),
    }
}

/// The current item as an alias; only by-reference array iteration hands out shared ones.
pub fn current_alias(host: &mut dyn RuntimeHost, e: &EnumeratorRef) -> Result<PhpAlias, Fault> {
    let shared = match &*e.borrow() {
        Enumerator::Array { current: Some((_, PhpValue::Alias(alias))), .. } => Some(alias.clone()),
        _ => None,
    };
    if let Some(alias) = shared {
        return Ok(alias);
    }
    Ok(PhpAlias::new(current_value(host, e)?))
}

pub fn dispose(e: &EnumeratorRef) {
    *e.borrow_mut() = Enumerator::Empty;
}
