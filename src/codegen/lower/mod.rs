//! Lowering of one bound routine into the instruction stream.
//!
//! The walk is driven by [`LowerContext`]: blocks are emitted in layout order, each
//! statement and edge is lowered against the routine's type context, and every runtime
//! operation the stream needs is resolved against the helper catalogue up front.

mod callsite;
mod cfg;
mod convert;
mod expr;
mod generator;
mod ops;
mod place;
mod temps;

use std::collections::HashMap;
use std::ops::Range;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::bound::{
    AccessFlags, BlockId, BoundExpr, BoundRoutine, CallTarget, ClassRef, Edge, ExprKind, MemberName, VariableName,
};
use crate::config::CodegenOptions;
use crate::diagnostics::CompileError;
use crate::il::{AssemblyWriter, IlBuilder, Instr, Label, LocalId, Repr, RoutineBody};
use crate::runtime::HelperLibrary;
use crate::span::Span;
use crate::symbols::SymbolTable;
use crate::types::{TypeRefContext, TypeRefMask};

use cfg::ForeachStrategy;
use generator::GeneratorPlan;
use temps::TempPool;

/// Storage of a named local.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LocalSlot {
    id: LocalId,
    repr: Repr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SectionKind {
    /// Try body, or the protected part of a `foreach` loop.
    Protected,
    /// Catch handler.
    Handler,
    /// Finally handler; falling out of it means reaching `end`, right before `EndFinally`.
    Finally { end: Label, next: BlockId },
}

/// A range of blocks whose exits need more than a plain branch.
#[derive(Debug, Clone)]
struct Section {
    blocks: Range<BlockId>,
    kind: SectionKind,
}

struct LowerContext<'a> {
    w: &'a mut dyn AssemblyWriter,
    routine: &'a BoundRoutine,
    ctx: &'a TypeRefContext,
    symbols: &'a SymbolTable,
    helpers: &'a HelperLibrary,
    opts: &'a CodegenOptions,
    // Per-routine mutable state
    locals: IndexMap<String, LocalSlot>,
    /// Array holding every named local when the routine addresses locals by name.
    table: Option<LocalId>,
    temps: TempPool,
    /// Label of each block, by ordinal.
    labels: Vec<Label>,
    reachable: Vec<bool>,
    emitted: Vec<bool>,
    /// Enclosing sections at the current emission point, innermost last.
    sections: Vec<Section>,
    return_label: Label,
    /// Holds the return value while protected regions unwind.
    return_local: Option<LocalId>,
    /// Strategy of each `foreach`, keyed by the block evaluating its enumeree.
    foreach: HashMap<BlockId, ForeachStrategy>,
    /// Enumerator local of each `foreach`, keyed by the block advancing it.
    enumerators: HashMap<BlockId, LocalId>,
    generator: Option<GeneratorPlan>,
    /// Span of the statement being lowered, for diagnostics.
    span: Span,
}

/// Lowers `routine` into a finished body.
pub fn lower_routine(
    routine: &BoundRoutine,
    symbols: &SymbolTable,
    helpers: &HelperLibrary,
    opts: &CodegenOptions,
) -> Result<RoutineBody, CompileError> {
    let mut il = IlBuilder::new();
    lower_routine_into(&mut il, routine, symbols, helpers, opts)?;
    il.finish()
}

/// Streams the body of `routine` into `w`.
pub fn lower_routine_into(
    w: &mut dyn AssemblyWriter,
    routine: &BoundRoutine,
    symbols: &SymbolTable,
    helpers: &HelperLibrary,
    opts: &CodegenOptions,
) -> Result<(), CompileError> {
    routine.cfg.validate()?;
    let mut cx = LowerContext {
        return_label: w.define_label(),
        w,
        routine,
        ctx: &routine.ctx,
        symbols,
        helpers,
        opts,
        locals: IndexMap::new(),
        table: None,
        temps: TempPool::default(),
        labels: Vec::new(),
        reachable: Vec::new(),
        emitted: Vec::new(),
        sections: Vec::new(),
        return_local: None,
        foreach: HashMap::new(),
        enumerators: HashMap::new(),
        generator: None,
        span: routine.span,
    };
    cx.lower_body()
}

impl<'a> LowerContext<'a> {
    fn lower_body(&mut self) -> Result<(), CompileError> {
        let routine = self.routine;
        let n = routine.cfg.len();
        debug!(
            routine = %routine.qualified_name(),
            blocks = n,
            generator = routine.is_generator,
            "lowering routine"
        );
        if self.ctx.is_saturated() {
            warn!(routine = %routine.qualified_name(), "type context saturated; lowering with generic values");
        }
        self.labels = (0..n).map(|_| self.w.define_label()).collect();
        self.reachable = self.reachability();
        self.emitted = vec![false; n];
        self.declare_locals();
        self.plan_foreach_loops();
        if routine.is_generator {
            let plan = self.plan_generator()?;
            self.generator = Some(plan);
            self.emit_generator_entry()?;
        }
        self.emit_prologue()?;
        if routine.cfg.start != 0 {
            self.w.emit(Instr::Br(self.labels[routine.cfg.start]));
        }
        self.emit_range(0..n)?;
        self.emit_epilogue()?;
        debug!(
            routine = %routine.qualified_name(),
            locals = self.locals.len(),
            temps = self.temps.declared(),
            "routine lowered"
        );
        Ok(())
    }

    fn reachability(&self) -> Vec<bool> {
        let cfg = &self.routine.cfg;
        let mut seen = vec![false; cfg.len()];
        let mut work = vec![cfg.start];
        while let Some(id) = work.pop() {
            if std::mem::replace(&mut seen[id], true) {
                continue;
            }
            work.extend(cfg.blocks[id].edge.successors().into_iter().filter(|&s| !seen[s]));
        }
        seen
    }

    fn declare_locals(&mut self) {
        let routine = self.routine;
        if routine.uses_indirect_locals {
            self.table = Some(self.w.declare_local(Repr::Array, Some("<locals>")));
            return;
        }
        let referenced = self.referenced_locals();
        for local in &routine.locals {
            let repr = if referenced.contains(local.name.as_str()) { Repr::Alias } else { self.local_repr(local.mask) };
            let id = self.w.declare_local(repr, Some(&local.name));
            self.locals.insert(local.name.clone(), LocalSlot { id, repr });
        }
        for name in referenced {
            if !self.locals.contains_key(name) {
                let id = self.w.declare_local(Repr::Alias, Some(name));
                self.locals.insert(name.to_string(), LocalSlot { id, repr: Repr::Alias });
            }
        }
    }

    /// Locals bound by reference somewhere in the routine: `&$x`, `[&$x]`, by-reference
    /// `foreach` values and arguments to by-reference parameters of known callees.
    /// Their storage is an alias whatever type flow analysis inferred.
    fn referenced_locals(&self) -> IndexSet<&'a str> {
        let routine = self.routine;
        let symbols = self.symbols;
        let mut out = IndexSet::new();
        let mut visit = |e: &'a BoundExpr| match &e.kind {
            ExprKind::Variable(VariableName::Local(name))
                if e.access.is_read_ref() || e.access.contains(AccessFlags::WRITE_REF) =>
            {
                out.insert(name.as_str());
            }
            ExprKind::ArrayLiteral { items } => {
                out.extend(items.iter().filter(|item| item.by_ref).filter_map(|item| item.value.local_name()));
            }
            ExprKind::Call { target, args } => {
                let params = match target {
                    CallTarget::Function { name } => symbols.resolve_function(name).map(|f| f.params.as_slice()),
                    CallTarget::StaticMethod { class: ClassRef::Named(q), name: MemberName::Static(n) } => {
                        symbols.find_method(q, n).map(|(_, m)| m.params.as_slice())
                    }
                    CallTarget::Method { instance, name: MemberName::Static(n) } => self
                        .known_class(instance)
                        .and_then(|class| symbols.find_method(&class, n))
                        .filter(|(_, m)| !m.is_static)
                        .map(|(_, m)| m.params.as_slice()),
                    _ => None,
                };
                for (arg, param) in args.iter().zip(params.unwrap_or_default()) {
                    if let (true, Some(name)) = (param.by_ref, arg.local_name()) {
                        out.insert(name);
                    }
                }
            }
            _ => {}
        };
        for block in &routine.cfg.blocks {
            for stmt in &block.statements {
                for e in stmt.expressions() {
                    e.walk(&mut visit);
                }
            }
            for e in block.edge.expressions() {
                e.walk(&mut visit);
            }
        }
        out
    }

    /// Storage of local `$name`, declaring an untyped one for names flow analysis missed.
    fn local_slot(&mut self, name: &str) -> LocalSlot {
        if let Some(slot) = self.locals.get(name) {
            return *slot;
        }
        let slot = LocalSlot { id: self.w.declare_local(Repr::Value, Some(name)), repr: Repr::Value };
        self.locals.insert(name.to_string(), slot);
        slot
    }

    /// Representation a local with inferred types `mask` is stored in.
    fn local_repr(&self, mask: TypeRefMask) -> Repr {
        if mask.is_ref() {
            return Repr::Alias;
        }
        self.value_repr(mask)
    }

    /// Representation of a value of type `mask`, ignoring reference-ness.
    fn value_repr(&self, mask: TypeRefMask) -> Repr {
        let ctx = self.ctx;
        if mask.is_any_type() || mask.is_uninitialized() {
            Repr::Value
        } else if ctx.is_long(mask) {
            Repr::Long
        } else if ctx.is_double(mask) {
            Repr::Double
        } else if ctx.is_boolean(mask) {
            Repr::Bool
        } else if ctx.is_number(mask) {
            Repr::Number
        } else if ctx.is_string(mask) && !ctx.is_writable_string(mask) {
            Repr::String
        } else if ctx.is_object(mask) {
            Repr::Object
        } else if ctx.is_array(mask) {
            Repr::Array
        } else {
            Repr::Value
        }
    }

    /// Copies the arguments into their locals, converting to each local's representation.
    fn emit_prologue(&mut self) -> Result<(), CompileError> {
        let routine = self.routine;
        if let Some(table) = self.table {
            self.call("new_array", &[])?;
            self.w.emit(Instr::StLoc(table));
            for (i, p) in routine.params.iter().enumerate() {
                self.w.emit(Instr::LdLoc(table));
                self.w.emit(Instr::LdStr(p.name.clone()));
                self.w.emit(Instr::LdArg(i as u16));
                if p.by_ref {
                    self.call("array_set_alias", &[Repr::Array, Repr::String, Repr::Alias])?;
                } else {
                    self.call("array_set_item", &[Repr::Array, Repr::String, Repr::Value])?;
                }
            }
            return Ok(());
        }
        for (i, p) in routine.params.iter().enumerate() {
            let slot = self.local_slot(&p.name);
            self.w.emit(Instr::LdArg(i as u16));
            let arrives = if p.by_ref { Repr::Alias } else { Repr::Value };
            self.convert(arrives, slot.repr)?;
            self.w.emit(Instr::StLoc(slot.id));
        }
        Ok(())
    }

    fn emit_epilogue(&mut self) -> Result<(), CompileError> {
        self.w.mark_label(self.return_label)?;
        if self.generator.is_none() {
            match self.return_local {
                Some(local) => self.w.emit(Instr::LdLoc(local)),
                None => self.w.emit(Instr::LdNull),
            }
        }
        self.w.emit(Instr::Ret);
        Ok(())
    }

    fn return_local(&mut self) -> LocalId {
        match self.return_local {
            Some(local) => local,
            None => {
                let local = self.w.declare_local(Repr::Value, None);
                self.return_local = Some(local);
                local
            }
        }
    }

    fn plan_foreach_loops(&mut self) {
        let routine = self.routine;
        for (id, block) in routine.cfg.blocks.iter().enumerate() {
            let Edge::ForeachEnumeree { enumeree, move_next } = &block.edge else {
                continue;
            };
            if !self.reachable[id] {
                continue;
            }
            let (key, by_ref) = match routine.cfg.blocks.get(*move_next).map(|b| &b.edge) {
                Some(Edge::ForeachMoveNext { key, by_ref, .. }) => (key.is_some(), *by_ref),
                _ => (false, false),
            };
            let strategy = self.foreach_strategy(enumeree, key, by_ref);
            self.foreach.insert(id, strategy);
        }
    }

    /// Emits a call of helper `name` over `params` and returns its result representation.
    fn call(&mut self, name: &str, params: &[Repr]) -> Result<Repr, CompileError> {
        let helper = self.helpers.resolve(name, params)?;
        self.w.emit(Instr::Call(helper));
        Ok(helper.ret)
    }

    fn has_helper(&self, name: &str, params: &[Repr]) -> bool {
        self.helpers.find(name, params).is_some()
    }

    fn unsupported(&self, msg: impl Into<String>) -> CompileError {
        CompileError::unsupported(msg, self.span)
    }
}
