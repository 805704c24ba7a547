use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::generator::GeneratorState;
use super::value::{PhpAlias, PhpValue};
use crate::types::QualifiedName;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

pub type ObjectRef = Rc<PhpObject>;

/// Class instance: a name, dynamic properties, and for generator objects the suspended
/// routine state.
pub struct PhpObject {
    pub id: u64,
    pub class: QualifiedName,
    props: RefCell<IndexMap<String, PhpValue>>,
    generator: Option<RefCell<GeneratorState>>,
}

impl PhpObject {
    pub fn new(class: QualifiedName) -> ObjectRef {
        Rc::new(PhpObject {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            class,
            props: RefCell::new(IndexMap::new()),
            generator: None,
        })
    }

    pub fn with_props(class: QualifiedName, props: impl IntoIterator<Item = (String, PhpValue)>) -> ObjectRef {
        let obj = PhpObject::new(class);
        obj.props.borrow_mut().extend(props);
        obj
    }

    pub fn new_generator(state: GeneratorState) -> ObjectRef {
        Rc::new(PhpObject {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            class: QualifiedName::new("Generator"),
            props: RefCell::new(IndexMap::new()),
            generator: Some(RefCell::new(state)),
        })
    }

    pub fn generator(&self) -> Option<&RefCell<GeneratorState>> {
        self.generator.as_ref()
    }

    /// Property value, dereferenced.
    pub fn get(&self, name: &str) -> Option<PhpValue> {
        self.props.borrow().get(name).map(|v| v.clone().dereferenced())
    }

    pub fn has(&self, name: &str) -> bool {
        self.props.borrow().contains_key(name)
    }

    /// Assigns a property, writing through a reference bound to it.
    pub fn set(&self, name: &str, value: PhpValue) {
        let mut props = self.props.borrow_mut();
        if let Some(PhpValue::Alias(alias)) = props.get(name) {
            alias.set(value);
            return;
        }
        props.insert(name.to_string(), value.dereferenced());
    }

    pub fn set_alias(&self, name: &str, alias: PhpAlias) {
        self.props.borrow_mut().insert(name.to_string(), PhpValue::Alias(alias));
    }

    pub fn ensure_alias(&self, name: &str) -> PhpAlias {
        let mut props = self.props.borrow_mut();
        if let Some(PhpValue::Alias(alias)) = props.get(name) {
            return alias.clone();
        }
        let alias = PhpAlias::new(props.get(name).cloned().unwrap_or_default());
        props.insert(name.to_string(), PhpValue::Alias(alias.clone()));
        alias
    }

    pub fn unset(&self, name: &str) {
        self.props.borrow_mut().shift_remove(name);
    }

    /// Snapshot of the properties in declaration order.
    pub fn props(&self) -> Vec<(String, PhpValue)> {
        self.props.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn is_generator(&self) -> bool {
        self.generator.is_some()
    }
}

impl fmt::Debug for PhpObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class, self.id)
    }
}
