use std::collections::HashMap;
use std::fmt;

use super::slot::Slot;
use super::{Fault, RuntimeHost};
use crate::diagnostics::CompileError;
use crate::il::repr::signature;
use crate::il::{HelperRef, Repr};

/// Implementation of one helper overload. Arguments arrive in declaration order.
pub type HelperFn = fn(&mut dyn RuntimeHost, Vec<Slot>) -> Result<Slot, Fault>;

pub struct HelperDef {
    pub name: &'static str,
    pub params: &'static [Repr],
    pub ret: Repr,
    pub imp: HelperFn,
}

impl fmt::Debug for HelperDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) -> {}", self.name, signature(self.params), self.ret)
    }
}

/// Catalogue of runtime helper overloads, keyed by name and parameter representations.
///
/// Handed to the code generator explicitly; the generator resolves every helper call
/// against it and fails when an overload it needs is missing.
#[derive(Debug, Default)]
pub struct HelperLibrary {
    defs: Vec<HelperDef>,
    by_name: HashMap<&'static str, Vec<u32>>,
}

impl HelperLibrary {
    /// Version of the overload set; bumped whenever an overload changes meaning.
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an overload, replacing an existing one with the same signature.
    pub fn declare(&mut self, name: &'static str, params: &'static [Repr], ret: Repr, imp: HelperFn) -> u32 {
        let ids = self.by_name.entry(name).or_default();
        for &id in ids.iter() {
            let def = &mut self.defs[id as usize];
            if def.params == params {
                def.ret = ret;
                def.imp = imp;
                return id;
            }
        }
        let id = self.defs.len() as u32;
        self.defs.push(HelperDef { name, params, ret, imp });
        ids.push(id);
        id
    }

    /// Drops an overload. Used to build reduced catalogues.
    pub fn remove(&mut self, name: &str, params: &[Repr]) -> bool {
        let Some(ids) = self.by_name.get_mut(name) else {
            return false;
        };
        let before = ids.len();
        let defs = &self.defs;
        ids.retain(|&id| defs[id as usize].params != params);
        before != ids.len()
    }

    /// Non-failing lookup of an exact overload.
    pub fn find(&self, name: &str, params: &[Repr]) -> Option<HelperRef> {
        let ids = self.by_name.get(name)?;
        ids.iter().map(|&id| (id, &self.defs[id as usize])).find(|(_, d)| d.params == params).map(|(id, d)| HelperRef {
            id,
            name: d.name,
            params: d.params,
            ret: d.ret,
        })
    }

    pub fn resolve(&self, name: &str, params: &[Repr]) -> Result<HelperRef, CompileError> {
        self.find(name, params)
            .ok_or_else(|| CompileError::missing_helper(name, signature(params)))
    }

    pub fn get(&self, id: u32) -> Option<&HelperDef> {
        self.defs.get(id as usize)
    }

    /// Calls overload `id` and unboxes its result into the declared representation.
    pub fn invoke(&self, id: u32, host: &mut dyn RuntimeHost, args: Vec<Slot>) -> Result<Slot, Fault> {
        let def = self
            .get(id)
            .ok_or_else(|| Fault::internal(format!("unknown helper #{id}")))?;
        if args.len() != def.params.len() {
            return Err(Fault::internal(format!(
                "{def:?} called with {} argument(s)",
                args.len()
            )));
        }
        (def.imp)(host, args)?.conform(def.ret)
    }

    pub fn overloads<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a HelperDef> + 'a {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .map(move |&id| &self.defs[id as usize])
    }

    pub fn len(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
