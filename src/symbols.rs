//! Resolved declarations the code generator consults: functions, classes, methods and
//! the class hierarchy.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::bound::ConstValue;
use crate::types::QualifiedName;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSymbol {
    pub name: String,
    #[serde(default)]
    pub by_ref: bool,
    #[serde(default)]
    pub has_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSymbol {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamSymbol>,
    #[serde(default)]
    pub is_generator: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSymbol {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamSymbol>,
    #[serde(default)]
    pub is_static: bool,
    /// Class of the returned object, when the method is declared to return one.
    #[serde(default)]
    pub return_class: Option<QualifiedName>,
}

impl MethodSymbol {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSymbol {
    pub name: String,
    #[serde(default)]
    pub default: Option<ConstValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSymbol {
    pub name: QualifiedName,
    #[serde(default)]
    pub parent: Option<QualifiedName>,
    #[serde(default)]
    pub interfaces: Vec<QualifiedName>,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub is_interface: bool,
    #[serde(default)]
    pub methods: Vec<MethodSymbol>,
    #[serde(default)]
    pub fields: Vec<FieldSymbol>,
}

impl ClassSymbol {
    pub fn new(name: impl Into<QualifiedName>) -> Self {
        ClassSymbol {
            name: name.into(),
            parent: None,
            interfaces: Vec::new(),
            is_final: false,
            is_interface: false,
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn extends(mut self, parent: impl Into<QualifiedName>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn implements(mut self, iface: impl Into<QualifiedName>) -> Self {
        self.interfaces.push(iface.into());
        self
    }

    pub fn interface(mut self) -> Self {
        self.is_interface = true;
        self
    }

    pub fn final_class(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn field(mut self, name: &str, default: Option<ConstValue>) -> Self {
        self.fields.push(FieldSymbol { name: name.to_string(), default });
        self
    }

    fn own_method(&self, name: &str) -> Option<&MethodSymbol> {
        self.methods.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }
}

/// Finalized, read-only symbol table shared by every routine of a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolTable {
    #[serde(default)]
    functions: IndexMap<String, FunctionSymbol>,
    #[serde(default)]
    classes: IndexMap<String, ClassSymbol>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

fn key(name: &str) -> String {
    name.trim_start_matches('\\').to_ascii_lowercase()
}

impl SymbolTable {
    /// Table holding the built-in classes and interfaces.
    pub fn new() -> Self {
        let mut table = SymbolTable { functions: IndexMap::new(), classes: IndexMap::new() };
        for class in builtin_classes() {
            table.declare_class(class);
        }
        table
    }

    pub fn declare_function(&mut self, f: FunctionSymbol) {
        self.functions.insert(key(&f.name), f);
    }

    pub fn declare_class(&mut self, class: ClassSymbol) {
        self.classes.insert(key(class.name.as_str()), class);
    }

    pub fn resolve_function(&self, name: &str) -> Option<&FunctionSymbol> {
        self.functions.get(&key(name))
    }

    pub fn class(&self, name: &QualifiedName) -> Option<&ClassSymbol> {
        self.classes.get(&key(name.as_str()))
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionSymbol> {
        self.functions.values()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassSymbol> {
        self.classes.values()
    }

    /// Whether `class` is `ancestor` or derives from or implements it.
    pub fn is_subclass_of(&self, class: &QualifiedName, ancestor: &QualifiedName) -> bool {
        let mut pending = vec![class.clone()];
        let mut seen = Vec::new();
        while let Some(current) = pending.pop() {
            if &current == ancestor {
                return true;
            }
            if seen.contains(&current) {
                continue;
            }
            let Some(sym) = self.class(&current) else {
                seen.push(current);
                continue;
            };
            pending.extend(sym.parent.iter().cloned());
            pending.extend(sym.interfaces.iter().cloned());
            seen.push(current);
        }
        false
    }

    /// Looks `name` up on `class` and then its parents; returns the declaring class too.
    pub fn find_method(&self, class: &QualifiedName, name: &str) -> Option<(&ClassSymbol, &MethodSymbol)> {
        let mut current = self.class(class);
        let mut depth = 0;
        while let Some(sym) = current {
            if let Some(m) = sym.own_method(name) {
                return Some((sym, m));
            }
            depth += 1;
            if depth > self.classes.len() {
                break;
            }
            current = sym.parent.as_ref().and_then(|p| self.class(p));
        }
        None
    }

    /// Declared fields of `class` and its parents, parents first.
    pub fn fields_of(&self, class: &QualifiedName) -> Vec<&FieldSymbol> {
        let mut chain = Vec::new();
        let mut current = self.class(class);
        while let Some(sym) = current {
            if chain.len() > self.classes.len() {
                break;
            }
            chain.push(sym);
            current = sym.parent.as_ref().and_then(|p| self.class(p));
        }
        chain.iter().rev().flat_map(|c| c.fields.iter()).collect()
    }
}

fn builtin_classes() -> Vec<ClassSymbol> {
    let getters = || {
        vec![
            MethodSymbol { name: "getMessage".into(), params: vec![], is_static: false, return_class: None },
            MethodSymbol { name: "getCode".into(), params: vec![], is_static: false, return_class: None },
        ]
    };
    let mut exception = ClassSymbol::new("Exception").implements("Throwable");
    exception.methods = getters();
    let mut error = ClassSymbol::new("Error").implements("Throwable");
    error.methods = getters();
    vec![
        ClassSymbol::new("stdClass"),
        ClassSymbol::new("Throwable").interface(),
        exception,
        error,
        ClassSymbol::new("TypeError").extends("Error"),
        ClassSymbol::new("ArgumentCountError").extends("TypeError"),
        ClassSymbol::new("ArithmeticError").extends("Error"),
        ClassSymbol::new("DivisionByZeroError").extends("ArithmeticError"),
        ClassSymbol::new("ArrayAccess").interface(),
        ClassSymbol::new("Traversable").interface(),
        ClassSymbol::new("Iterator").interface().implements("Traversable"),
        ClassSymbol::new("IteratorAggregate").interface().implements("Traversable"),
        ClassSymbol::new("Generator").implements("Iterator").final_class(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_hierarchy() {
        let table = SymbolTable::new();
        let q = QualifiedName::new;
        assert!(table.is_subclass_of(&q("DivisionByZeroError"), &q("Throwable")));
        assert!(table.is_subclass_of(&q("ArgumentCountError"), &q("Error")));
        assert!(!table.is_subclass_of(&q("TypeError"), &q("Exception")));
        assert!(table.is_subclass_of(&q("Generator"), &q("traversable")));
    }

    #[test]
    fn test_find_method_walks_parents() {
        let mut table = SymbolTable::new();
        let mut base = ClassSymbol::new("Base");
        base.methods.push(MethodSymbol { name: "run".into(), params: vec![], is_static: false, return_class: None });
        table.declare_class(base);
        table.declare_class(ClassSymbol::new("Child").extends("Base"));
        let (owner, m) = table.find_method(&QualifiedName::new("child"), "RUN").unwrap();
        assert_eq!(owner.name.as_str(), "Base");
        assert_eq!(m.arity(), 0);
        assert!(table.find_method(&QualifiedName::new("Child"), "stop").is_none());
    }

    #[test]
    fn test_cyclic_parents_terminate() {
        let mut table = SymbolTable::new();
        table.declare_class(ClassSymbol::new("A").extends("B"));
        table.declare_class(ClassSymbol::new("B").extends("A"));
        assert!(!table.is_subclass_of(&QualifiedName::new("A"), &QualifiedName::new("C")));
        assert!(table.find_method(&QualifiedName::new("A"), "x").is_none());
        assert!(table.fields_of(&QualifiedName::new("A")).len() <= 2 * table.classes().count());
    }
}
