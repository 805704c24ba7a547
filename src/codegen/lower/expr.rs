use super::ops::Operand;
use super::place::{InstanceCache, Place};
use super::LowerContext;
use crate::bound::{
    ArrayItemInit, BoundExpr, CastKind, ConstValue, ExprKind, IncDecKind, ListItem,
};
use crate::diagnostics::CompileError;
use crate::il::{Instr, Repr};
use crate::types::{QualifiedName, TypeRefMask};

impl LowerContext<'_> {
    /// Emits `e` and returns the representation left on the stack; `Void` when the
    /// expression is evaluated for its effect only.
    pub(super) fn emit_expr(&mut self, e: &BoundExpr) -> Result<Repr, CompileError> {
        let needed = e.access.yields_value();
        let r = match (&e.constant, e.is_place()) {
            (Some(c), false) => self.emit_const(c),
            _ => self.emit_expr_kind(e, needed)?,
        };
        if !needed && r != Repr::Void {
            self.w.emit(Instr::Pop);
            return Ok(Repr::Void);
        }
        Ok(r)
    }

    pub(super) fn emit_expr_as(&mut self, e: &BoundExpr, to: Repr) -> Result<(), CompileError> {
        let r = self.emit_expr(e)?;
        self.convert(r, to)
    }

    fn emit_const(&mut self, c: &ConstValue) -> Repr {
        match c {
            ConstValue::Null => {
                self.w.emit(Instr::LdNull);
                Repr::Value
            }
            ConstValue::Bool(b) => {
                self.w.emit(Instr::LdBool(*b));
                Repr::Bool
            }
            ConstValue::Long(l) => {
                self.w.emit(Instr::LdI8(*l));
                Repr::Long
            }
            ConstValue::Double(d) => {
                self.w.emit(Instr::LdR8(*d));
                Repr::Double
            }
            ConstValue::String(s) => {
                self.w.emit(Instr::LdStr(s.clone()));
                Repr::String
            }
        }
    }

    fn emit_expr_kind(&mut self, e: &BoundExpr, needed: bool) -> Result<Repr, CompileError> {
        match &e.kind {
            ExprKind::Literal(c) => Ok(self.emit_const(c)),
            ExprKind::Variable(_) | ExprKind::ArrayItem { .. } | ExprKind::Field { .. } => self.emit_place_read(e),
            ExprKind::List { .. } => Err(self.unsupported("cannot use list() outside of an assignment")),
            ExprKind::Binary { op, left, right } => self.emit_binary(*op, left, right, e.mask),
            ExprKind::Unary { op, operand } => self.emit_unary(*op, operand, e.mask),
            ExprKind::Assign { target, value } => self.emit_assign(target, value, needed),
            ExprKind::AssignRef { target, value } => self.emit_assign_ref(target, value, needed),
            ExprKind::CompoundAssign { op, target, value } => {
                let place = self.place_of(target)?;
                let mut cache = InstanceCache::default();
                self.prepare_store(&place, &mut cache, true)?;
                let current = self.load(&place, &mut cache, false)?;
                let left = Operand { repr: current, mask: target.mask };
                let r = self.emit_binary_tail(*op, left, value, e.mask)?;
                let r = self.store_keeping(&place, &mut cache, r, needed)?;
                self.release_cache(cache);
                Ok(r)
            }
            ExprKind::IncDec { kind, target } => self.emit_inc_dec(*kind, target, e.mask, needed),
            ExprKind::Conditional { condition, if_true, if_false } => {
                self.emit_conditional(condition, if_true.as_deref(), if_false, e.mask)
            }
            ExprKind::Coalesce { left, right } => {
                let end = self.w.define_label();
                self.emit_expr_as(left, Repr::Value)?;
                self.w.emit(Instr::Dup);
                self.call("is_null", &[Repr::Value])?;
                self.w.emit(Instr::BrFalse(end));
                self.w.emit(Instr::Pop);
                self.emit_expr_as(right, Repr::Value)?;
                self.w.mark_label(end)?;
                Ok(Repr::Value)
            }
            ExprKind::ArrayLiteral { items } => self.emit_array_literal(items),
            ExprKind::Call { target, args } => self.emit_call(target, args),
            ExprKind::New { class, args } => self.emit_new(class, args),
            ExprKind::Cast { kind, operand } => self.emit_cast(*kind, operand),
            ExprKind::Isset { targets } => self.emit_isset(targets),
            ExprKind::Empty { target } => {
                let r = self.emit_expr(target)?;
                self.convert(r, Repr::Bool)?;
                self.w.emit(Instr::Not);
                Ok(Repr::Bool)
            }
            ExprKind::InstanceOf { operand, class } => {
                self.emit_expr_as(operand, Repr::Value)?;
                self.w.emit(Instr::LdTypeHandle(class.clone()));
                self.call("instance_of", &[Repr::Value, Repr::TypeHandle])
            }
            ExprKind::Yield { .. } => {
                Err(self.unsupported("yield is only supported as a statement or the value of an assignment"))
            }
        }
    }

    fn emit_assign(&mut self, target: &BoundExpr, value: &BoundExpr, needed: bool) -> Result<Repr, CompileError> {
        if let ExprKind::List { items } = &target.kind {
            return self.emit_destructure(items, value, needed);
        }
        let place = self.place_of(target)?;
        let mut cache = InstanceCache::default();
        self.prepare_store(&place, &mut cache, false)?;
        let r = self.emit_expr(value)?;
        let r = self.store_keeping(&place, &mut cache, r, needed)?;
        self.release_cache(cache);
        Ok(r)
    }

    fn emit_destructure(&mut self, items: &[ListItem], value: &BoundExpr, needed: bool) -> Result<Repr, CompileError> {
        let r = self.emit_expr(value)?;
        if needed {
            self.w.emit(Instr::Dup);
        }
        self.emit_list_assign(items, r)?;
        Ok(if needed { r } else { Repr::Void })
    }

    /// Stores the value on top of the stack into a prepared place, leaving a copy behind
    /// when `needed`.
    pub(super) fn store_keeping(
        &mut self,
        place: &Place<'_>,
        cache: &mut InstanceCache,
        value: Repr,
        needed: bool,
    ) -> Result<Repr, CompileError> {
        if let Place::Local(slot) = place {
            if slot.repr != Repr::Alias {
                self.convert(value, slot.repr)?;
                if needed {
                    self.w.emit(Instr::Dup);
                }
                self.w.emit(Instr::StLoc(slot.id));
                return Ok(if needed { slot.repr } else { Repr::Void });
            }
        }
        if !needed {
            self.store(place, cache, value)?;
            return Ok(Repr::Void);
        }
        self.w.emit(Instr::Dup);
        let kept = self.temps.acquire(self.w, value);
        self.w.emit(Instr::StLoc(kept.id()));
        self.store(place, cache, value)?;
        self.w.emit(Instr::LdLoc(kept.id()));
        self.temps.release(kept);
        Ok(value)
    }

    fn emit_assign_ref(&mut self, target: &BoundExpr, value: &BoundExpr, needed: bool) -> Result<Repr, CompileError> {
        let place = self.place_of(target)?;
        let mut cache = InstanceCache::default();
        self.prepare_store_ref(&place, &mut cache)?;
        self.emit_alias_of(value)?;
        let kept = if needed {
            self.w.emit(Instr::Dup);
            let t = self.temps.acquire(self.w, Repr::Alias);
            self.w.emit(Instr::StLoc(t.id()));
            Some(t)
        } else {
            None
        };
        self.store_ref(&place, &cache)?;
        self.release_cache(cache);
        match kept {
            Some(t) => {
                self.w.emit(Instr::LdLoc(t.id()));
                self.temps.release(t);
                self.convert(Repr::Alias, Repr::Value)?;
                Ok(Repr::Value)
            }
            None => Ok(Repr::Void),
        }
    }

    /// Pushes an alias of `e`: the storage itself for places, a fresh alias otherwise.
    pub(super) fn emit_alias_of(&mut self, e: &BoundExpr) -> Result<(), CompileError> {
        if e.is_place() && !matches!(e.kind, ExprKind::List { .. }) {
            return self.emit_place_ref(e);
        }
        self.emit_expr_as(e, Repr::Value)?;
        self.call("new_alias", &[Repr::Value]).map(drop)
    }

    fn emit_inc_dec(
        &mut self,
        kind: IncDecKind,
        target: &BoundExpr,
        result_mask: TypeRefMask,
        needed: bool,
    ) -> Result<Repr, CompileError> {
        let place = self.place_of(target)?;
        let mut cache = InstanceCache::default();
        self.prepare_store(&place, &mut cache, true)?;
        let current = self.load(&place, &mut cache, false)?;
        let current = match current {
            Repr::Int32 | Repr::Bool => {
                self.convert(current, Repr::Long)?;
                Repr::Long
            }
            Repr::Long | Repr::Double => current,
            other => {
                self.convert(other, Repr::Value)?;
                Repr::Value
            }
        };
        let old = if needed && kind.is_postfix() {
            self.w.emit(Instr::Dup);
            let t = self.temps.acquire(self.w, current);
            self.w.emit(Instr::StLoc(t.id()));
            Some(t)
        } else {
            None
        };
        let op = if kind.is_increment() { Instr::Add } else { Instr::Sub };
        let stays_long = !result_mask.is_any_type() && self.ctx.is_long(result_mask);
        let r = match current {
            Repr::Long if stays_long => {
                self.w.emit(Instr::LdI8(1));
                self.w.emit(op);
                Repr::Long
            }
            Repr::Double => {
                self.w.emit(Instr::LdR8(1.0));
                self.w.emit(op);
                Repr::Double
            }
            _ => {
                let name = if kind.is_increment() { "increment" } else { "decrement" };
                self.call(name, &[current])?
            }
        };
        let result = match old {
            Some(t) => {
                self.store_keeping(&place, &mut cache, r, false)?;
                self.w.emit(Instr::LdLoc(t.id()));
                let repr = t.repr();
                self.temps.release(t);
                repr
            }
            None => self.store_keeping(&place, &mut cache, r, needed)?,
        };
        self.release_cache(cache);
        Ok(result)
    }

    fn emit_conditional(
        &mut self,
        condition: &BoundExpr,
        if_true: Option<&BoundExpr>,
        if_false: &BoundExpr,
        mask: TypeRefMask,
    ) -> Result<Repr, CompileError> {
        let target = self.value_repr(mask);
        let end = self.w.define_label();
        match if_true {
            Some(if_true) => {
                let otherwise = self.w.define_label();
                self.emit_condition(condition)?;
                self.w.emit(Instr::BrFalse(otherwise));
                self.emit_expr_as(if_true, target)?;
                self.w.emit(Instr::Br(end));
                self.w.mark_label(otherwise)?;
                self.emit_expr_as(if_false, target)?;
            }
            None => {
                self.emit_expr_as(condition, target)?;
                self.w.emit(Instr::Dup);
                self.convert(target, Repr::Bool)?;
                self.w.emit(Instr::BrTrue(end));
                self.w.emit(Instr::Pop);
                self.emit_expr_as(if_false, target)?;
            }
        }
        self.w.mark_label(end)?;
        Ok(target)
    }

    fn emit_array_literal(&mut self, items: &[ArrayItemInit]) -> Result<Repr, CompileError> {
        self.call("new_array", &[])?;
        for item in items {
            self.w.emit(Instr::Dup);
            let key = match &item.key {
                Some(k) => Some(self.emit_key(k, false)?),
                None => None,
            };
            if item.by_ref {
                self.emit_alias_of(&item.value)?;
                match key {
                    Some(k) => self.call("array_set_alias", &[Repr::Array, k, Repr::Alias])?,
                    None => self.call("array_add_alias", &[Repr::Array, Repr::Alias])?,
                };
            } else {
                self.emit_expr_as(&item.value, Repr::Value)?;
                match key {
                    Some(k) => self.call("array_set_item", &[Repr::Array, k, Repr::Value])?,
                    None => self.call("array_add", &[Repr::Array, Repr::Value])?,
                };
            }
        }
        Ok(Repr::Array)
    }

    fn emit_new(&mut self, class: &QualifiedName, args: &[BoundExpr]) -> Result<Repr, CompileError> {
        let symbols = self.symbols;
        let params = symbols
            .find_method(class, "__construct")
            .map(|(_, m)| m.params.as_slice())
            .unwrap_or_default();
        self.emit_arguments(params, args)?;
        self.w.emit(Instr::NewObj { class: class.clone(), argc: args.len() as u16 });
        Ok(Repr::Object)
    }

    fn emit_cast(&mut self, kind: CastKind, operand: &BoundExpr) -> Result<Repr, CompileError> {
        let to = match kind {
            CastKind::Long => Repr::Long,
            CastKind::Double => Repr::Double,
            CastKind::String => Repr::String,
            CastKind::Bool => Repr::Bool,
            CastKind::Array => Repr::Array,
            CastKind::Object => Repr::Object,
        };
        let r = self.emit_expr(operand)?;
        match kind {
            CastKind::Array | CastKind::Object if r != to => {
                self.convert(r, Repr::Value)?;
                let helper = if kind == CastKind::Array { "cast_array" } else { "cast_object" };
                self.call(helper, &[Repr::Value])
            }
            _ => {
                self.convert(r, to)?;
                Ok(to)
            }
        }
    }

    /// `isset($a, $b, ...)`: every target is set; stops at the first that is not.
    fn emit_isset(&mut self, targets: &[BoundExpr]) -> Result<Repr, CompileError> {
        if targets.is_empty() {
            self.w.emit(Instr::LdBool(true));
            return Ok(Repr::Bool);
        }
        let end = self.w.define_label();
        for (i, target) in targets.iter().enumerate() {
            if i > 0 {
                self.w.emit(Instr::Dup);
                self.w.emit(Instr::BrFalse(end));
                self.w.emit(Instr::Pop);
            }
            let r = self.emit_expr(target)?;
            self.null_test_strict(r)?;
            self.w.emit(Instr::Not);
        }
        self.w.mark_label(end)?;
        Ok(Repr::Bool)
    }
}
