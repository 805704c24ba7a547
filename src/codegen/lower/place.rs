//! Places: locals, the local table, array items and fields.
//!
//! A store is split in two: [`LowerContext::prepare_store`] pushes whatever the store
//! needs beneath the value (containers, keys), the caller pushes the value, and
//! [`LowerContext::store`] consumes both. Read-modify-write sequences stash the prepared
//! operands in an [`InstanceCache`] so the load that follows does not evaluate them again.

use super::temps::TempLocal;
use super::{LocalSlot, LowerContext};
use crate::bound::{AccessFlags, BoundExpr, ExprKind, ListItem, MemberName, VariableName};
use crate::diagnostics::CompileError;
use crate::il::{Instr, Repr};

/// How an item place reaches its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ItemShape {
    /// Container is an array; writes go through an ensured array handle.
    Array,
    /// Container is an object (`ArrayAccess`).
    Object,
    /// Container is a string; writes produce a new string that is stored back.
    String,
    /// Unknown container; writes produce a new value that is stored back.
    Value,
}

pub(super) enum Place<'e> {
    Local(LocalSlot),
    /// Named local kept in the local table.
    Table(&'e VariableName),
    This,
    Item { container: &'e BoundExpr, index: Option<&'e BoundExpr>, shape: ItemShape },
    Field { instance: &'e BoundExpr, name: &'e MemberName },
}

/// Operands of a place evaluated once and reused by the load and store that follow.
#[derive(Debug, Default)]
pub(super) struct InstanceCache {
    container: Option<TempLocal>,
    key: Option<TempLocal>,
    /// Representations the prepared instance and key were pushed in.
    instance_repr: Option<Repr>,
    key_repr: Option<Repr>,
    inner: Option<Box<InstanceCache>>,
}

impl LowerContext<'_> {
    pub(super) fn place_of<'e>(&mut self, e: &'e BoundExpr) -> Result<Place<'e>, CompileError> {
        match &e.kind {
            ExprKind::Variable(VariableName::This) => Ok(Place::This),
            ExprKind::Variable(name @ VariableName::Indirect(_)) => {
                if self.table.is_none() {
                    return Err(CompileError::invariant(format!(
                        "{} addresses a local by name but declares no local table",
                        self.routine.qualified_name()
                    )));
                }
                Ok(Place::Table(name))
            }
            ExprKind::Variable(name @ VariableName::Local(local)) => {
                if self.table.is_some() {
                    Ok(Place::Table(name))
                } else {
                    Ok(Place::Local(self.local_slot(local)))
                }
            }
            ExprKind::ArrayItem { array, index } => {
                let shape = self.item_shape(array);
                Ok(Place::Item { container: array, index: index.as_deref(), shape })
            }
            ExprKind::Field { instance, name } => Ok(Place::Field { instance, name }),
            _ => Err(self.unsupported("cannot use a temporary expression in write context")),
        }
    }

    fn item_shape(&mut self, container: &BoundExpr) -> ItemShape {
        if let Some(name) = container.local_name() {
            if self.table.is_none() {
                match self.local_slot(name).repr {
                    Repr::Array => return ItemShape::Array,
                    Repr::Object => return ItemShape::Object,
                    Repr::String => return ItemShape::String,
                    Repr::Value | Repr::Alias => return ItemShape::Value,
                    _ => {}
                }
            }
        }
        let mask = container.mask;
        if mask.is_any_type() {
            ItemShape::Value
        } else if self.ctx.is_array(mask) {
            ItemShape::Array
        } else if self.ctx.is_object(mask) {
            ItemShape::Object
        } else if self.ctx.is_string(mask) && !self.ctx.is_writable_string(mask) {
            ItemShape::String
        } else {
            ItemShape::Value
        }
    }

    fn stash(&mut self, slot: &mut Option<TempLocal>, repr: Repr) {
        self.w.emit(Instr::Dup);
        let t = self.temps.acquire(self.w, repr);
        self.w.emit(Instr::StLoc(t.id()));
        *slot = Some(t);
    }

    fn reload(&mut self, slot: &Option<TempLocal>) -> Option<Repr> {
        slot.as_ref().map(|t| {
            self.w.emit(Instr::LdLoc(t.id()));
            t.repr()
        })
    }

    pub(super) fn release_cache(&mut self, cache: InstanceCache) {
        for t in [cache.container, cache.key].into_iter().flatten() {
            self.temps.release(t);
        }
        if let Some(inner) = cache.inner {
            self.release_cache(*inner);
        }
    }

    /// Pushes the name of a table local as a string.
    fn emit_table_name(&mut self, name: &VariableName) -> Result<(), CompileError> {
        match name {
            VariableName::Local(local) => {
                self.w.emit(Instr::LdStr(local.clone()));
                Ok(())
            }
            VariableName::Indirect(e) => self.emit_expr_as(e, Repr::String),
            VariableName::This => Err(self.unsupported("$this is not a named local")),
        }
    }

    pub(super) fn emit_member_name(&mut self, name: &MemberName) -> Result<(), CompileError> {
        match name {
            MemberName::Static(s) => {
                self.w.emit(Instr::LdStr(s.clone()));
                Ok(())
            }
            MemberName::Dynamic(e) => self.emit_expr_as(e, Repr::String),
        }
    }

    /// Pushes an array key: a long or string when statically known, otherwise a value.
    pub(super) fn emit_key(&mut self, index: &BoundExpr, generic: bool) -> Result<Repr, CompileError> {
        let r = self.emit_expr(index)?;
        let key = match r {
            Repr::Long | Repr::String if !generic => r,
            Repr::Int32 if !generic => {
                self.convert(r, Repr::Long)?;
                Repr::Long
            }
            _ => {
                self.convert(r, Repr::Value)?;
                Repr::Value
            }
        };
        Ok(key)
    }

    /// Pushes the instance a field is accessed on, as an object when statically one.
    fn emit_field_instance(&mut self, instance: &BoundExpr) -> Result<Repr, CompileError> {
        let r = self.emit_expr(instance)?;
        if r == Repr::Object {
            return Ok(r);
        }
        self.convert(r, Repr::Value)?;
        Ok(Repr::Value)
    }

    /// Like [`Self::emit_field_instance`], but turns a generic instance into an object.
    fn emit_field_object(&mut self, instance: &BoundExpr, name: &MemberName) -> Result<(), CompileError> {
        if self.emit_field_instance(instance)? == Repr::Value {
            self.w.emit(Instr::LdStr(name.as_static().unwrap_or_default().to_string()));
            self.call("value_as_object", &[Repr::Value, Repr::String])?;
        }
        Ok(())
    }

    pub(super) fn prepare_store(&mut self, place: &Place<'_>, cache: &mut InstanceCache, rmw: bool) -> Result<(), CompileError> {
        match place {
            Place::Local(slot) => {
                if slot.repr == Repr::Alias {
                    self.w.emit(Instr::LdLoc(slot.id));
                }
                Ok(())
            }
            Place::Table(name) => {
                self.emit_table_local()?;
                self.emit_table_name(name)?;
                if rmw {
                    self.stash(&mut cache.key, Repr::String);
                }
                Ok(())
            }
            Place::This => Err(self.unsupported("cannot re-assign $this")),
            Place::Item { container, index, shape } => {
                match shape {
                    ItemShape::Array => {
                        self.emit_ensure_array(container)?;
                        if rmw {
                            self.stash(&mut cache.container, Repr::Array);
                        }
                    }
                    ItemShape::Object => {
                        self.emit_expr_as(container, Repr::Object)?;
                        if rmw {
                            self.stash(&mut cache.container, Repr::Object);
                        }
                    }
                    ItemShape::String | ItemShape::Value => {
                        let cplace = self.place_of(container)?;
                        let inner = cache.inner.get_or_insert_with(Box::default);
                        self.prepare_store(&cplace, inner, true)?;
                        let r = self.load(&cplace, inner, true)?;
                        let repr = if *shape == ItemShape::String { Repr::String } else { Repr::Value };
                        self.convert(r, repr)?;
                        if rmw {
                            self.stash(&mut cache.container, repr);
                        }
                    }
                }
                match index {
                    Some(i) => {
                        let key = self.emit_key(i, *shape != ItemShape::Array)?;
                        cache.key_repr = Some(key);
                        if rmw {
                            self.stash(&mut cache.key, key);
                        }
                    }
                    None if *shape == ItemShape::Object => {
                        self.w.emit(Instr::LdNull);
                        if rmw {
                            self.stash(&mut cache.key, Repr::Value);
                        }
                    }
                    None if *shape == ItemShape::String => {
                        return Err(self.unsupported("[] operator not supported for strings"));
                    }
                    None => {}
                }
                Ok(())
            }
            Place::Field { instance, name } => {
                let r = self.emit_field_instance(instance)?;
                cache.instance_repr = Some(r);
                if rmw {
                    self.stash(&mut cache.container, r);
                }
                self.emit_member_name(name)?;
                if rmw {
                    self.stash(&mut cache.key, Repr::String);
                }
                Ok(())
            }
        }
    }

    /// Pushes the value at `place`, reusing stashed operands.
    pub(super) fn load(&mut self, place: &Place<'_>, cache: &mut InstanceCache, quiet: bool) -> Result<Repr, CompileError> {
        match place {
            Place::Local(slot) => {
                self.w.emit(Instr::LdLoc(slot.id));
                if slot.repr == Repr::Alias {
                    self.convert(Repr::Alias, Repr::Value)?;
                    return Ok(Repr::Value);
                }
                Ok(slot.repr)
            }
            Place::Table(name) => {
                self.emit_table_local()?;
                if self.reload(&cache.key).is_none() {
                    self.emit_table_name(name)?;
                }
                let helper = if quiet { "array_get_item_quiet" } else { "locals_get" };
                self.call(helper, &[Repr::Array, Repr::String])
            }
            Place::This => {
                self.w.emit(Instr::LdThis);
                Ok(Repr::Object)
            }
            Place::Item { container, index, shape } => {
                let Some(index) = index else {
                    return Err(self.unsupported("cannot use [] for reading"));
                };
                let repr = match shape {
                    ItemShape::Array => Repr::Array,
                    ItemShape::Object => Repr::Object,
                    ItemShape::String => Repr::String,
                    ItemShape::Value => Repr::Value,
                };
                if self.reload(&cache.container).is_none() {
                    self.emit_expr_as(container, repr)?;
                }
                let key = match self.reload(&cache.key) {
                    Some(k) => k,
                    None => self.emit_key(index, *shape != ItemShape::Array)?,
                };
                match (shape, quiet) {
                    (ItemShape::Array, false) => self.call("array_get_item", &[Repr::Array, key]),
                    (ItemShape::Array, true) => self.call("array_get_item_quiet", &[Repr::Array, key]),
                    (ItemShape::Object, _) => self.call("object_get_item", &[Repr::Object, Repr::Value]),
                    (ItemShape::String, false) => self.call("string_get_item", &[Repr::String, Repr::Value]),
                    (ItemShape::String, true) => self.call("string_get_item_quiet", &[Repr::String, Repr::Value]),
                    (ItemShape::Value, false) => self.call("value_get_item", &[Repr::Value, Repr::Value]),
                    (ItemShape::Value, true) => self.call("value_get_item_quiet", &[Repr::Value, Repr::Value]),
                }
            }
            Place::Field { instance, name } => {
                let r = match self.reload(&cache.container) {
                    Some(r) => r,
                    None => self.emit_field_instance(instance)?,
                };
                if self.reload(&cache.key).is_none() {
                    self.emit_member_name(name)?;
                }
                let helper = match (r, quiet) {
                    (Repr::Object, false) => "object_get_field",
                    (Repr::Object, true) => "object_get_field_quiet",
                    (_, false) => "value_get_field",
                    (_, true) => "value_get_field_quiet",
                };
                self.call(helper, &[r, Repr::String])
            }
        }
    }

    /// Consumes the prepared operands and the value of representation `value` on top.
    pub(super) fn store(&mut self, place: &Place<'_>, cache: &mut InstanceCache, value: Repr) -> Result<(), CompileError> {
        match place {
            Place::Local(slot) => {
                if slot.repr == Repr::Alias {
                    self.convert(value, Repr::Value)?;
                    return self.call("alias_set", &[Repr::Alias, Repr::Value]).map(drop);
                }
                self.convert(value, slot.repr)?;
                self.w.emit(Instr::StLoc(slot.id));
                Ok(())
            }
            Place::Table(_) => {
                self.convert(value, Repr::Value)?;
                self.call("array_set_item", &[Repr::Array, Repr::String, Repr::Value]).map(drop)
            }
            Place::This => Err(self.unsupported("cannot re-assign $this")),
            Place::Item { container, index, shape } => {
                self.convert(value, Repr::Value)?;
                match shape {
                    ItemShape::Array => {
                        let key = index.and(cache.key_repr);
                        match key {
                            Some(k) => self.call("array_set_item", &[Repr::Array, k, Repr::Value]).map(drop),
                            None => self.call("array_add", &[Repr::Array, Repr::Value]).map(drop),
                        }
                    }
                    ItemShape::Object => {
                        self.call("object_set_item", &[Repr::Object, Repr::Value, Repr::Value]).map(drop)
                    }
                    ItemShape::String | ItemShape::Value => {
                        let r = if *shape == ItemShape::String {
                            self.call("string_with_item_set", &[Repr::String, Repr::Value, Repr::Value])?
                        } else if index.is_some() {
                            self.call("value_with_item_set", &[Repr::Value, Repr::Value, Repr::Value])?
                        } else {
                            self.call("value_with_item_added", &[Repr::Value, Repr::Value])?
                        };
                        let cplace = self.place_of(container)?;
                        let inner = cache.inner.get_or_insert_with(Box::default);
                        self.store(&cplace, inner, r)
                    }
                }
            }
            Place::Field { .. } => {
                self.convert(value, Repr::Value)?;
                if cache.instance_repr == Some(Repr::Object) {
                    self.call("object_set_field", &[Repr::Object, Repr::String, Repr::Value]).map(drop)
                } else {
                    self.call("value_set_field", &[Repr::Value, Repr::String, Repr::Value]).map(drop)
                }
            }
        }
    }

    fn emit_table_local(&mut self) -> Result<(), CompileError> {
        let table = self.table.ok_or_else(|| CompileError::invariant("no local table"))?;
        self.w.emit(Instr::LdLoc(table));
        Ok(())
    }

    /// Reads a place with the accesses recorded on it.
    pub(super) fn emit_place_read(&mut self, e: &BoundExpr) -> Result<Repr, CompileError> {
        if e.access.is_read_ref() {
            self.emit_place_ref(e)?;
            return Ok(Repr::Alias);
        }
        if e.access.contains(AccessFlags::ENSURE_ARRAY) {
            self.emit_ensure_array(e)?;
            return Ok(Repr::Array);
        }
        if matches!(e.kind, ExprKind::List { .. }) {
            return Err(self.unsupported("cannot read a list() expression"));
        }
        let place = self.place_of(e)?;
        let mut cache = InstanceCache::default();
        let r = self.load(&place, &mut cache, e.access.is_quiet())?;
        self.release_cache(cache);
        if e.access.is_read_copy() {
            return self.emit_copy(r);
        }
        Ok(r)
    }

    /// Detaches an array read from the storage it came from.
    fn emit_copy(&mut self, repr: Repr) -> Result<Repr, CompileError> {
        match repr {
            Repr::Array | Repr::Value => self.call("deep_copy", &[repr]),
            Repr::Alias => {
                self.convert(repr, Repr::Value)?;
                self.call("deep_copy", &[Repr::Value])
            }
            _ => Ok(repr),
        }
    }

    /// Pushes the alias stored at `e`, creating the storage when missing.
    pub(super) fn emit_place_ref(&mut self, e: &BoundExpr) -> Result<(), CompileError> {
        let place = self.place_of(e)?;
        match place {
            Place::Local(slot) => {
                self.expect_alias_slot(&slot, e.local_name())?;
                self.w.emit(Instr::LdLoc(slot.id));
                Ok(())
            }
            Place::Table(name) => {
                self.emit_table_local()?;
                self.emit_table_name(name)?;
                self.call("array_ensure_item_alias", &[Repr::Array, Repr::String]).map(drop)
            }
            Place::This => Err(self.unsupported("cannot take a reference to $this")),
            Place::Item { container, index, .. } => {
                self.emit_ensure_array(container)?;
                match index {
                    Some(i) => {
                        let key = self.emit_key(i, false)?;
                        self.call("array_ensure_item_alias", &[Repr::Array, key]).map(drop)
                    }
                    None => {
                        self.w.emit(Instr::LdNull);
                        self.call("new_alias", &[Repr::Value])?;
                        let t = self.temps.acquire(self.w, Repr::Alias);
                        self.w.emit(Instr::StLoc(t.id()));
                        self.w.emit(Instr::LdLoc(t.id()));
                        self.call("array_add_alias", &[Repr::Array, Repr::Alias])?;
                        self.w.emit(Instr::LdLoc(t.id()));
                        self.temps.release(t);
                        Ok(())
                    }
                }
            }
            Place::Field { instance, name } => {
                self.emit_field_object(instance, name)?;
                self.emit_member_name(name)?;
                self.call("object_ensure_field_alias", &[Repr::Object, Repr::String]).map(drop)
            }
        }
    }

    /// Locals bound by reference are declared as aliases; anything else would turn the
    /// binding into a copy.
    fn expect_alias_slot(&self, slot: &LocalSlot, name: Option<&str>) -> Result<(), CompileError> {
        if slot.repr == Repr::Alias {
            return Ok(());
        }
        Err(CompileError::invariant(format!(
            "{}: local {} is bound by reference but stored as {}",
            self.routine.qualified_name(),
            name.map_or_else(|| format!("#{}", slot.id), |n| format!("${n}")),
            slot.repr
        )))
    }

    /// Pushes the array stored at `e`, storing a new one there when it holds nothing.
    pub(super) fn emit_ensure_array(&mut self, e: &BoundExpr) -> Result<(), CompileError> {
        if !e.is_place() {
            return self.emit_expr_as(e, Repr::Array);
        }
        let place = self.place_of(e)?;
        match place {
            Place::Local(slot) => {
                self.w.emit(Instr::LdLoc(slot.id));
                match slot.repr {
                    Repr::Array => {
                        let ok = self.w.define_label();
                        self.w.emit(Instr::Dup);
                        self.w.emit(Instr::BrTrue(ok));
                        self.w.emit(Instr::Pop);
                        self.call("new_array", &[])?;
                        self.w.emit(Instr::Dup);
                        self.w.emit(Instr::StLoc(slot.id));
                        self.w.mark_label(ok)
                    }
                    Repr::Alias => self.call("alias_ensure_array", &[Repr::Alias]).map(drop),
                    Repr::Value => {
                        self.call("value_ensure_array", &[Repr::Value])?;
                        self.w.emit(Instr::Dup);
                        self.convert(Repr::Array, Repr::Value)?;
                        self.w.emit(Instr::StLoc(slot.id));
                        Ok(())
                    }
                    other => {
                        self.convert(other, Repr::Value)?;
                        self.call("value_ensure_array", &[Repr::Value]).map(drop)
                    }
                }
            }
            Place::Table(name) => {
                self.emit_table_local()?;
                self.emit_table_name(name)?;
                self.call("array_ensure_item_array", &[Repr::Array, Repr::String]).map(drop)
            }
            Place::This => Err(self.unsupported("cannot use $this as an array")),
            Place::Item { container, index, .. } => {
                self.emit_ensure_array(container)?;
                match index {
                    Some(i) => {
                        let key = self.emit_key(i, false)?;
                        self.call("array_ensure_item_array", &[Repr::Array, key]).map(drop)
                    }
                    None => self.call("array_add_ensure_array", &[Repr::Array]).map(drop),
                }
            }
            Place::Field { instance, name } => {
                self.emit_field_object(instance, name)?;
                self.emit_member_name(name)?;
                self.call("object_ensure_field_array", &[Repr::Object, Repr::String]).map(drop)
            }
        }
    }

    /// Pushes what a by-reference store into `place` needs beneath the alias.
    pub(super) fn prepare_store_ref(&mut self, place: &Place<'_>, cache: &mut InstanceCache) -> Result<(), CompileError> {
        match place {
            Place::Local(_) => Ok(()),
            Place::Table(name) => {
                self.emit_table_local()?;
                self.emit_table_name(name)
            }
            Place::This => Err(self.unsupported("cannot re-assign $this")),
            Place::Item { container, index, .. } => {
                self.emit_ensure_array(container)?;
                if let Some(i) = index {
                    cache.key_repr = Some(self.emit_key(i, false)?);
                }
                Ok(())
            }
            Place::Field { instance, name } => {
                self.emit_field_object(instance, name)?;
                self.emit_member_name(name)
            }
        }
    }

    /// Binds `place` to the alias on top of the stack.
    pub(super) fn store_ref(&mut self, place: &Place<'_>, cache: &InstanceCache) -> Result<(), CompileError> {
        match place {
            Place::Local(slot) => {
                self.expect_alias_slot(slot, None)?;
                self.w.emit(Instr::StLoc(slot.id));
                Ok(())
            }
            Place::Table(_) => self.call("array_set_alias", &[Repr::Array, Repr::String, Repr::Alias]).map(drop),
            Place::This => Err(self.unsupported("cannot re-assign $this")),
            Place::Item { .. } => match cache.key_repr {
                Some(key) => self.call("array_set_alias", &[Repr::Array, key, Repr::Alias]).map(drop),
                None => self.call("array_add_alias", &[Repr::Array, Repr::Alias]).map(drop),
            },
            Place::Field { .. } => {
                self.call("object_set_field_alias", &[Repr::Object, Repr::String, Repr::Alias]).map(drop)
            }
        }
    }

    pub(super) fn emit_unset(&mut self, e: &BoundExpr) -> Result<(), CompileError> {
        let place = self.place_of(e)?;
        match place {
            Place::Local(slot) => {
                self.emit_default(slot.repr)?;
                self.w.emit(Instr::StLoc(slot.id));
                Ok(())
            }
            Place::Table(name) => {
                self.emit_table_local()?;
                self.emit_table_name(name)?;
                self.call("array_remove_item", &[Repr::Array, Repr::String]).map(drop)
            }
            Place::This => Err(self.unsupported("cannot unset $this")),
            Place::Item { container, index, shape } => {
                let Some(index) = index else {
                    return Err(self.unsupported("cannot use [] for unsetting"));
                };
                if shape == ItemShape::Array {
                    self.emit_expr_as(container, Repr::Array)?;
                    let key = self.emit_key(index, false)?;
                    return self.call("array_remove_item", &[Repr::Array, key]).map(drop);
                }
                self.emit_expr_as(container, Repr::Value)?;
                self.emit_expr_as(index, Repr::Value)?;
                self.call("value_remove_item", &[Repr::Value, Repr::Value]).map(drop)
            }
            Place::Field { instance, name } => {
                let r = self.emit_field_instance(instance)?;
                self.emit_member_name(name)?;
                let helper = if r == Repr::Object { "object_unset_field" } else { "value_unset_field" };
                self.call(helper, &[r, Repr::String]).map(drop)
            }
        }
    }

    /// Destructures the value on top of the stack into `items`.
    pub(super) fn emit_list_assign(&mut self, items: &[ListItem], value: Repr) -> Result<(), CompileError> {
        self.convert(value, Repr::Value)?;
        let source = self.temps.acquire(self.w, Repr::Value);
        self.w.emit(Instr::StLoc(source.id()));
        let mut position = 0i64;
        for item in items {
            let key_expr = item.key.as_ref();
            let Some(target) = &item.target else {
                if key_expr.is_none() {
                    position += 1;
                }
                continue;
            };
            if target.access.contains(AccessFlags::WRITE_REF) {
                return Err(self.unsupported("list() with references"));
            }
            let mut emit_element = |cx: &mut Self| -> Result<(), CompileError> {
                cx.w.emit(Instr::LdLoc(source.id()));
                match key_expr {
                    Some(k) => cx.emit_expr_as(k, Repr::Value)?,
                    None => {
                        cx.w.emit(Instr::LdI8(position));
                        cx.convert(Repr::Long, Repr::Value)?;
                    }
                }
                cx.call("value_get_list_item", &[Repr::Value, Repr::Value]).map(drop)
            };
            if let ExprKind::List { items: nested } = &target.kind {
                emit_element(self)?;
                self.emit_list_assign(nested, Repr::Value)?;
            } else {
                let place = self.place_of(target)?;
                let mut cache = InstanceCache::default();
                self.prepare_store(&place, &mut cache, false)?;
                emit_element(self)?;
                self.store(&place, &mut cache, Repr::Value)?;
                self.release_cache(cache);
            }
            if key_expr.is_none() {
                position += 1;
            }
        }
        self.temps.release(source);
        Ok(())
    }
}
