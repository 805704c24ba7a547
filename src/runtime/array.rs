use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::convert::double_to_long;
use super::value::{PhpAlias, PhpValue};
use super::Fault;

/// Normalized array key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrayKey {
    Int(i64),
    Str(String),
}

impl ArrayKey {
    /// Key for `value` under the language's key coercion rules: integral strings become
    /// integers, floats truncate, `null` is the empty string.
    pub fn from_value(value: &PhpValue) -> Result<ArrayKey, Fault> {
        match value {
            PhpValue::Null => Ok(ArrayKey::Str(String::new())),
            PhpValue::Bool(b) => Ok(ArrayKey::Int(*b as i64)),
            PhpValue::Long(l) => Ok(ArrayKey::Int(*l)),
            PhpValue::Double(d) => Ok(ArrayKey::Int(double_to_long(*d))),
            PhpValue::String(s) => Ok(ArrayKey::from_str(s)),
            PhpValue::MutableString(s) => Ok(ArrayKey::from_str(s.as_str())),
            PhpValue::Alias(alias) => ArrayKey::from_value(&alias.get()),
            PhpValue::Array(_) => Err(Fault::type_error("Illegal offset type: array")),
            PhpValue::Object(obj) => Err(Fault::type_error(format!("Illegal offset type: {}", obj.class))),
        }
    }

    pub fn from_str(s: &str) -> ArrayKey {
        if is_canonical_int(s) {
            if let Ok(i) = s.parse::<i64>() {
                return ArrayKey::Int(i);
            }
        }
        ArrayKey::Str(s.to_string())
    }

    pub fn to_value(&self) -> PhpValue {
        match self {
            ArrayKey::Int(i) => PhpValue::Long(*i),
            ArrayKey::Str(s) => PhpValue::String(s.clone()),
        }
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayKey::Int(i) => write!(f, "{i}"),
            ArrayKey::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

/// `"0"`, `"-12"`, never `"012"`, `"+1"` or `"-0"`.
fn is_canonical_int(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return false;
    }
    !(s.starts_with('-') && digits == "0")
}

#[derive(Debug, Clone, Default)]
struct ArrayTable {
    entries: IndexMap<ArrayKey, PhpValue>,
    next_index: i64,
}

/// Insertion-ordered hash table behind a shared handle. Copies are explicit
/// ([`PhpArray::deep_copy`]); the code generator inserts them where value semantics
/// require one.
#[derive(Clone, Default)]
pub struct PhpArray(Rc<RefCell<ArrayTable>>);

impl PhpArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: impl IntoIterator<Item = PhpValue>) -> Self {
        let array = PhpArray::new();
        {
            let mut t = array.0.borrow_mut();
            for v in values {
                let k = t.next_index;
                t.entries.insert(ArrayKey::Int(k), v);
                t.next_index = k + 1;
            }
        }
        array
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (ArrayKey, PhpValue)>) -> Self {
        let array = PhpArray::new();
        for (k, v) in pairs {
            array.set(k, v);
        }
        array
    }

    pub fn len(&self) -> usize {
        self.0.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &PhpArray) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stored item, dereferenced.
    pub fn get(&self, key: &ArrayKey) -> Option<PhpValue> {
        self.0.borrow().entries.get(key).map(|v| v.clone().dereferenced())
    }

    /// Stored item as is, aliases included.
    pub fn get_raw(&self, key: &ArrayKey) -> Option<PhpValue> {
        self.0.borrow().entries.get(key).cloned()
    }

    pub fn contains_key(&self, key: &ArrayKey) -> bool {
        self.0.borrow().entries.contains_key(key)
    }

    /// Assigns an item; writes through an alias already stored under `key`.
    pub fn set(&self, key: ArrayKey, value: PhpValue) {
        let mut t = self.0.borrow_mut();
        if let Some(PhpValue::Alias(alias)) = t.entries.get(&key) {
            alias.set(value);
            return;
        }
        Self::bump_next(&mut t, &key);
        t.entries.insert(key, value.dereferenced());
    }

    /// Stores `alias` itself under `key`, replacing any previous binding.
    pub fn set_alias(&self, key: ArrayKey, alias: PhpAlias) {
        let mut t = self.0.borrow_mut();
        Self::bump_next(&mut t, &key);
        t.entries.insert(key, PhpValue::Alias(alias));
    }

    fn bump_next(t: &mut ArrayTable, key: &ArrayKey) {
        if let ArrayKey::Int(i) = key {
            if *i >= t.next_index {
                t.next_index = i.saturating_add(1);
            }
        }
    }

    fn next_key(&self) -> Result<ArrayKey, Fault> {
        let t = self.0.borrow();
        if t.next_index == i64::MAX && t.entries.contains_key(&ArrayKey::Int(i64::MAX)) {
            return Err(Fault::error("Cannot add element to the array as the next element is already occupied"));
        }
        Ok(ArrayKey::Int(t.next_index))
    }

    /// Appends under the next free integer key.
    pub fn push(&self, value: PhpValue) -> Result<(), Fault> {
        let key = self.next_key()?;
        self.set(key, value);
        Ok(())
    }

    pub fn push_alias(&self, alias: PhpAlias) -> Result<(), Fault> {
        let key = self.next_key()?;
        self.set_alias(key, alias);
        Ok(())
    }

    pub fn remove(&self, key: &ArrayKey) -> Option<PhpValue> {
        self.0.borrow_mut().entries.shift_remove(key)
    }

    /// The alias stored under `key`, upgrading a plain item (or creating a null one).
    pub fn ensure_alias(&self, key: ArrayKey) -> PhpAlias {
        let mut t = self.0.borrow_mut();
        if let Some(PhpValue::Alias(alias)) = t.entries.get(&key) {
            return alias.clone();
        }
        let current = t.entries.get(&key).cloned().unwrap_or_default();
        let alias = PhpAlias::new(current);
        Self::bump_next(&mut t, &key);
        t.entries.insert(key, PhpValue::Alias(alias.clone()));
        alias
    }

    /// The nested array under `key`, creating it when the item is missing, null or false.
    pub fn ensure_array(&self, key: ArrayKey) -> Result<PhpArray, Fault> {
        let current = self.get_raw(&key);
        match current {
            Some(PhpValue::Alias(alias)) => ensure_array_in_alias(&alias),
            Some(PhpValue::Array(a)) => Ok(a),
            None | Some(PhpValue::Null) | Some(PhpValue::Bool(false)) => {
                let nested = PhpArray::new();
                self.set(key, PhpValue::Array(nested.clone()));
                Ok(nested)
            }
            Some(_) => Err(Fault::error("Cannot use a scalar value as an array")),
        }
    }

    pub fn keys(&self) -> Vec<ArrayKey> {
        self.0.borrow().entries.keys().cloned().collect()
    }

    /// Snapshot of every entry, aliases included.
    pub fn entries(&self) -> Vec<(ArrayKey, PhpValue)> {
        self.0.borrow().entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn entry_at(&self, position: usize) -> Option<(ArrayKey, PhpValue)> {
        self.0.borrow().entries.get_index(position).map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Value copy: a new table with nested arrays copied recursively. References stay
    /// shared, the way they survive an array copy in the language.
    pub fn deep_copy(&self) -> PhpArray {
        let t = self.0.borrow();
        let entries = t
            .entries
            .iter()
            .map(|(k, v)| {
                let copied = match v {
                    PhpValue::Array(nested) => PhpValue::Array(nested.deep_copy()),
                    other => other.clone(),
                };
                (k.clone(), copied)
            })
            .collect();
        PhpArray(Rc::new(RefCell::new(ArrayTable { entries, next_index: t.next_index })))
    }

    /// `$a + $b`: a copy of `self` plus the entries of `other` whose keys are new.
    pub fn union(&self, other: &PhpArray) -> PhpArray {
        let result = self.deep_copy();
        for (k, v) in other.entries() {
            if !result.contains_key(&k) {
                let v = match v {
                    PhpValue::Array(nested) => PhpValue::Array(nested.deep_copy()),
                    other => other,
                };
                let mut t = result.0.borrow_mut();
                Self::bump_next(&mut t, &k);
                t.entries.insert(k, v);
            }
        }
        result
    }
}

pub(crate) fn ensure_array_in_alias(alias: &PhpAlias) -> Result<PhpArray, Fault> {
    alias.with_mut(|v| match v {
        PhpValue::Array(a) => Ok(a.clone()),
        PhpValue::Null | PhpValue::Bool(false) => {
            let nested = PhpArray::new();
            *v = PhpValue::Array(nested.clone());
            Ok(nested)
        }
        _ => Err(Fault::error("Cannot use a scalar value as an array")),
    })
}

impl fmt::Debug for PhpArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(t) => f.debug_map().entries(t.entries.iter()).finish(),
            Err(_) => write!(f, "[<borrowed>]"),
        }
    }
}
