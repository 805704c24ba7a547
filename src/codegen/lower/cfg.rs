//! Blocks, statements and edges.
//!
//! Blocks are emitted in layout order. A try region, a `foreach` loop and a switch each
//! own a contiguous block range, so emitting one of them emits its range recursively
//! under a [`Section`] describing how control may leave it.

use std::ops::Range;

use tracing::trace;

use super::place::InstanceCache;
use super::{LowerContext, Section, SectionKind};
use crate::bound::{BlockId, BlockKind, BoundExpr, BoundStmt, Edge, ExprKind, StmtKind, SwitchCase};
use crate::diagnostics::CompileError;
use crate::il::{CatchFilter, Instr, Label, Repr};
use crate::types::QualifiedName;

/// How a `foreach` obtains its enumerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum ForeachStrategy {
    /// The enumerated value is statically an array.
    Array,
    /// The enumerated object is of a known class with a non-static, parameterless
    /// `getIterator()`.
    Structural { class: QualifiedName },
    /// Runtime dispatch on whatever the value turns out to be.
    Dynamic,
}

impl ForeachStrategy {
    /// Whether the loop runs inside a region whose finally disposes the enumerator.
    pub(super) fn disposes(&self) -> bool {
        !matches!(self, ForeachStrategy::Array)
    }
}

/// A transfer of control to a block or label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Jump {
    Branch(Label),
    /// Leaves one or more protected regions on the way.
    Leave(Label),
}

impl LowerContext<'_> {
    /// Picks how a `foreach` over `enumeree` enumerates. By-reference loops take the
    /// same strategy and ask the enumerator for aliases.
    pub(super) fn foreach_strategy(&self, enumeree: &BoundExpr, key: bool, by_ref: bool) -> ForeachStrategy {
        if !enumeree.mask.is_any_type() && self.ctx.is_array(enumeree.mask) {
            return ForeachStrategy::Array;
        }
        if let Some(class) = self.known_class(enumeree) {
            let iterable = self
                .symbols
                .find_method(&class, "getIterator")
                .is_some_and(|(_, m)| !m.is_static && m.params.is_empty());
            if iterable {
                trace!(%class, key, by_ref, "structural foreach");
                return ForeachStrategy::Structural { class };
            }
        }
        ForeachStrategy::Dynamic
    }

    /// Emits the blocks of `range` in order.
    pub(super) fn emit_range(&mut self, range: Range<BlockId>) -> Result<(), CompileError> {
        let mut id = range.start;
        while id < range.end {
            id = self.emit_block(id, range.end)?;
        }
        Ok(())
    }

    /// Emits block `id` and returns the ordinal to continue from.
    fn emit_block(&mut self, id: BlockId, end: BlockId) -> Result<BlockId, CompileError> {
        if !self.reachable[id] {
            return Ok(id + 1);
        }
        if std::mem::replace(&mut self.emitted[id], true) {
            return Err(CompileError::invariant(format!("block #{id} emitted twice")));
        }
        let routine = self.routine;
        let block = routine.cfg.block(id)?;
        self.w.mark_label(self.labels[id])?;
        for (index, stmt) in block.statements.iter().enumerate() {
            self.span = stmt.span;
            if self.opts.emit_sequence_points && !stmt.span.is_dummy() {
                self.w.sequence_point(stmt.span);
            }
            self.emit_statement(id, index, stmt)?;
        }
        self.emit_edge(id, &block.edge, end)
    }

    fn emit_statement(&mut self, id: BlockId, index: usize, stmt: &BoundStmt) -> Result<(), CompileError> {
        if self.generator.is_some() && stmt.statement_yield().is_some() {
            return self.emit_yield_statement(id, index, stmt);
        }
        match &stmt.kind {
            StmtKind::Expr(e) => {
                let r = self.emit_expr(e)?;
                if r != Repr::Void {
                    self.w.emit(Instr::Pop);
                }
            }
            StmtKind::Echo(values) => {
                for v in values {
                    self.emit_expr_as(v, Repr::String)?;
                    self.call("echo", &[Repr::String])?;
                }
            }
            StmtKind::Unset(places) => {
                for p in places {
                    self.emit_unset(p)?;
                }
            }
        }
        Ok(())
    }

    fn emit_edge(&mut self, id: BlockId, edge: &Edge, end: BlockId) -> Result<BlockId, CompileError> {
        if let Some(e) = edge.expressions().first() {
            self.span = e.span;
        }
        match edge {
            Edge::Simple { target } => {
                self.emit_goto(id, *target, end)?;
                Ok(id + 1)
            }
            Edge::Conditional { condition, true_target, false_target } => {
                self.emit_conditional_edge(id, condition, *true_target, *false_target, end)?;
                Ok(id + 1)
            }
            Edge::TryCatch { .. } => self.emit_try(id, edge),
            Edge::ForeachEnumeree { enumeree, move_next } => self.emit_foreach(id, enumeree, *move_next),
            Edge::ForeachMoveNext { value, key, by_ref, body, next } => {
                self.emit_move_next(id, value, key.as_ref(), *by_ref, *body, *next, end)?;
                Ok(id + 1)
            }
            Edge::Switch { subject, cases, next } => {
                self.emit_switch(id, subject, cases, *next, end)?;
                Ok(id + 1)
            }
            Edge::Leave { value } => {
                self.emit_return(value.as_ref())?;
                Ok(id + 1)
            }
            Edge::Throw { value } => {
                self.emit_expr_as(value, Repr::Value)?;
                self.call("to_throwable", &[Repr::Value])?;
                self.w.emit(Instr::Throw);
                Ok(id + 1)
            }
            Edge::Exit { status } => {
                match status {
                    Some(s) => self.emit_expr_as(s, Repr::Value)?,
                    None => self.w.emit(Instr::LdNull),
                }
                self.call("exit", &[Repr::Value])?;
                // `exit` never returns; the jump keeps the block terminated.
                let leave = !self.sections.is_empty();
                self.w.emit(if leave { Instr::Leave(self.return_label) } else { Instr::Br(self.return_label) });
                Ok(id + 1)
            }
        }
    }

    // ---- Jumps ----

    /// Whether `target` is the block emitted right after `from` in the current range.
    fn falls_through(&self, from: BlockId, target: BlockId, end: BlockId) -> bool {
        target == from + 1 && target < end && self.reachable[target] && !self.emitted[target]
    }

    fn jump_to(&self, target: BlockId) -> Result<Jump, CompileError> {
        let mut leave = false;
        for section in self.sections.iter().rev() {
            if section.blocks.contains(&target) {
                break;
            }
            match &section.kind {
                SectionKind::Protected | SectionKind::Handler => leave = true,
                SectionKind::Finally { end, next } if *next == target => {
                    return Ok(if leave { Jump::Leave(*end) } else { Jump::Branch(*end) });
                }
                SectionKind::Finally { .. } => {
                    return Err(self.unsupported(format!("jump from a finally block to block #{target}")));
                }
            }
        }
        let label = self.labels[target];
        Ok(if leave { Jump::Leave(label) } else { Jump::Branch(label) })
    }

    fn emit_jump(&mut self, target: BlockId) -> Result<(), CompileError> {
        match self.jump_to(target)? {
            Jump::Branch(l) => self.w.emit(Instr::Br(l)),
            Jump::Leave(l) => self.w.emit(Instr::Leave(l)),
        }
        Ok(())
    }

    fn emit_goto(&mut self, from: BlockId, target: BlockId, end: BlockId) -> Result<(), CompileError> {
        if self.falls_through(from, target, end) {
            return Ok(());
        }
        self.emit_jump(target)
    }

    /// Pops a bool and jumps to `target` when it equals `when`.
    fn emit_branch_if(&mut self, target: BlockId, when: bool) -> Result<(), CompileError> {
        match self.jump_to(target)? {
            Jump::Branch(l) => self.w.emit(if when { Instr::BrTrue(l) } else { Instr::BrFalse(l) }),
            Jump::Leave(l) => {
                let skip = self.w.define_label();
                self.w.emit(if when { Instr::BrFalse(skip) } else { Instr::BrTrue(skip) });
                self.w.emit(Instr::Leave(l));
                self.w.mark_label(skip)?;
            }
        }
        Ok(())
    }

    /// Jumps to the epilogue from wherever the emission point is.
    pub(super) fn emit_jump_to_return(&mut self) -> Result<(), CompileError> {
        if self.sections.iter().any(|s| matches!(s.kind, SectionKind::Finally { .. })) {
            return Err(self.unsupported("return from a finally block"));
        }
        let l = self.return_label;
        self.w.emit(if self.sections.is_empty() { Instr::Br(l) } else { Instr::Leave(l) });
        Ok(())
    }

    fn emit_conditional_edge(
        &mut self,
        id: BlockId,
        condition: &BoundExpr,
        t: BlockId,
        f: BlockId,
        end: BlockId,
    ) -> Result<(), CompileError> {
        self.emit_condition(condition)?;
        if t == f {
            self.w.emit(Instr::Pop);
            return self.emit_goto(id, t, end);
        }
        if self.falls_through(id, t, end) {
            self.emit_branch_if(f, false)
        } else if self.falls_through(id, f, end) {
            self.emit_branch_if(t, true)
        } else if t <= id && self.opts.invert_loop_conditions {
            self.emit_branch_if(t, true)?;
            self.emit_jump(f)
        } else {
            self.emit_branch_if(f, false)?;
            self.emit_jump(t)
        }
    }

    fn emit_return(&mut self, value: Option<&BoundExpr>) -> Result<(), CompileError> {
        match value {
            Some(v) => self.emit_expr_as(v, Repr::Value)?,
            None => self.w.emit(Instr::LdNull),
        }
        if self.generator.is_some() {
            self.w.emit(Instr::StGenField(crate::il::GenField::Return));
            self.w.emit(Instr::LdI4(crate::runtime::generator::FINISHED));
            self.w.emit(Instr::StGenField(crate::il::GenField::State));
            return self.emit_jump_to_return();
        }
        if self.sections.is_empty() {
            self.w.emit(Instr::Ret);
            return Ok(());
        }
        let local = self.return_local();
        self.w.emit(Instr::StLoc(local));
        self.emit_jump_to_return()
    }

    // ---- Try ----

    fn emit_try(&mut self, id: BlockId, edge: &Edge) -> Result<BlockId, CompileError> {
        let routine = self.routine;
        let layout = routine.cfg.try_layout(id, edge)?;
        let Edge::TryCatch { next, .. } = edge else {
            return Err(CompileError::invariant(format!("block #{id} does not open a try region")));
        };
        let has_catches = !layout.catches.is_empty();
        trace!(block = id, catches = layout.catches.len(), finally = layout.finally.is_some(), "try region");

        self.mark_region_entry(id)?;
        if let Some(f) = &layout.finally {
            self.w.begin_try();
            self.sections.push(Section { blocks: layout.body.start..f.start, kind: SectionKind::Protected });
        }
        if has_catches {
            self.w.begin_try();
            self.sections.push(Section { blocks: layout.body.clone(), kind: SectionKind::Protected });
        }
        self.emit_region_dispatch(id)?;
        self.emit_range(layout.body.clone())?;

        if has_catches {
            self.sections.pop();
            // `exit` unwinds through every user handler.
            self.w.begin_catch(CatchFilter::ScriptDied)?;
            self.w.emit(Instr::Pop);
            self.w.emit(Instr::Rethrow);
            for range in &layout.catches {
                self.emit_catch(range.clone())?;
            }
            self.w.end_try()?;
        }

        if let Some(f) = &layout.finally {
            self.sections.pop();
            self.w.begin_finally()?;
            let end = self.w.define_label();
            self.emit_suspension_guard(end);
            self.sections.push(Section { blocks: f.clone(), kind: SectionKind::Finally { end, next: *next } });
            self.emit_range(f.clone())?;
            self.sections.pop();
            self.w.mark_label(end)?;
            self.w.emit(Instr::EndFinally);
            self.w.end_try()?;
        }
        Ok(layout.end())
    }

    fn emit_catch(&mut self, range: Range<BlockId>) -> Result<(), CompileError> {
        let routine = self.routine;
        let BlockKind::Catch { classes, variable } = &routine.cfg.block(range.start)?.kind else {
            return Err(CompileError::invariant(format!("block #{} is not a catch block", range.start)));
        };
        let filter = if classes.is_empty() { CatchFilter::Any } else { CatchFilter::Classes(classes.clone()) };
        self.w.begin_catch(filter)?;
        let caught = self.temps.acquire(self.w, Repr::Object);
        self.w.emit(Instr::StLoc(caught.id()));
        if let Some(var) = variable {
            let place = self.place_of(var)?;
            let mut cache = InstanceCache::default();
            self.prepare_store(&place, &mut cache, false)?;
            self.w.emit(Instr::LdLoc(caught.id()));
            self.store(&place, &mut cache, Repr::Object)?;
            self.release_cache(cache);
        }
        self.temps.release(caught);
        self.sections.push(Section { blocks: range.clone(), kind: SectionKind::Handler });
        self.emit_range(range)?;
        self.sections.pop();
        Ok(())
    }

    /// In a generator, finally handlers are skipped while a yield unwinds to the epilogue.
    fn emit_suspension_guard(&mut self, end: Label) {
        if self.generator.is_some() {
            self.w.emit(Instr::LdGenField(crate::il::GenField::Suspending));
            self.w.emit(Instr::BrTrue(end));
        }
    }

    // ---- Foreach ----

    fn emit_foreach(&mut self, id: BlockId, enumeree: &BoundExpr, move_next: BlockId) -> Result<BlockId, CompileError> {
        let routine = self.routine;
        let Edge::ForeachMoveNext { by_ref, next, .. } = &routine.cfg.block(move_next)?.edge else {
            return Err(CompileError::invariant(format!("block #{move_next} does not advance an enumerator")));
        };
        let (by_ref, next) = (*by_ref, *next);
        let strategy = self.foreach.get(&id).cloned().unwrap_or(ForeachStrategy::Dynamic);

        match &strategy {
            ForeachStrategy::Array => {
                self.emit_expr_as(enumeree, Repr::Array)?;
                self.w.emit(Instr::LdBool(by_ref));
                self.call("enumerator_for_array", &[Repr::Array, Repr::Bool])?;
            }
            ForeachStrategy::Structural { .. } => {
                self.emit_expr_as(enumeree, Repr::Object)?;
                self.w.emit(Instr::CallMethod { name: "getIterator".into(), argc: 0 });
                self.w.emit(Instr::LdBool(by_ref));
                self.emit_scope_handle();
                self.call("enumerator_for_value", &[Repr::Value, Repr::Bool, Repr::TypeHandle])?;
            }
            ForeachStrategy::Dynamic => {
                self.emit_expr_as(enumeree, Repr::Value)?;
                self.w.emit(Instr::LdBool(by_ref));
                self.emit_scope_handle();
                self.call("enumerator_for_value", &[Repr::Value, Repr::Bool, Repr::TypeHandle])?;
            }
        }
        let enumerator = self.temps.acquire(self.w, Repr::Enumerator);
        self.w.emit(Instr::StLoc(enumerator.id()));
        self.enumerators.insert(move_next, enumerator.id());

        if !strategy.disposes() {
            self.emit_range(move_next..next)?;
            self.temps.release(enumerator);
            return Ok(next);
        }
        self.mark_region_entry(id)?;
        self.w.begin_try();
        self.sections.push(Section { blocks: move_next..next, kind: SectionKind::Protected });
        self.emit_region_dispatch(id)?;
        self.emit_range(move_next..next)?;
        self.sections.pop();
        self.w.begin_finally()?;
        let end = self.w.define_label();
        self.emit_suspension_guard(end);
        self.w.emit(Instr::LdLoc(enumerator.id()));
        self.call("enumerator_dispose", &[Repr::Enumerator])?;
        self.w.mark_label(end)?;
        self.w.emit(Instr::EndFinally);
        self.w.end_try()?;
        self.temps.release(enumerator);
        Ok(next)
    }

    /// Class context handed to runtime enumeration for visibility checks.
    fn emit_scope_handle(&mut self) {
        match self.ctx.self_type() {
            Some(class) => self.w.emit(Instr::LdTypeHandle(class.clone())),
            None => self.w.emit(Instr::LdNull),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_move_next(
        &mut self,
        id: BlockId,
        value: &BoundExpr,
        key: Option<&BoundExpr>,
        by_ref: bool,
        body: BlockId,
        next: BlockId,
        end: BlockId,
    ) -> Result<(), CompileError> {
        let enumerator = *self
            .enumerators
            .get(&id)
            .ok_or_else(|| CompileError::invariant(format!("block #{id} advances an enumerator never created")))?;
        self.w.emit(Instr::LdLoc(enumerator));
        self.call("enumerator_move_next", &[Repr::Enumerator])?;
        self.emit_branch_if(next, false)?;

        if let Some(k) = key {
            let place = self.place_of(k)?;
            let mut cache = InstanceCache::default();
            self.prepare_store(&place, &mut cache, false)?;
            self.w.emit(Instr::LdLoc(enumerator));
            self.call("enumerator_current_key", &[Repr::Enumerator])?;
            self.store(&place, &mut cache, Repr::Value)?;
            self.release_cache(cache);
        }
        if let ExprKind::List { items } = &value.kind {
            self.w.emit(Instr::LdLoc(enumerator));
            self.call("enumerator_current_value", &[Repr::Enumerator])?;
            self.emit_list_assign(items, Repr::Value)?;
        } else if by_ref {
            let place = self.place_of(value)?;
            let mut cache = InstanceCache::default();
            self.prepare_store_ref(&place, &mut cache)?;
            self.w.emit(Instr::LdLoc(enumerator));
            self.call("enumerator_current_alias", &[Repr::Enumerator])?;
            self.store_ref(&place, &cache)?;
            self.release_cache(cache);
        } else {
            let place = self.place_of(value)?;
            let mut cache = InstanceCache::default();
            self.prepare_store(&place, &mut cache, false)?;
            self.w.emit(Instr::LdLoc(enumerator));
            self.call("enumerator_current_value", &[Repr::Enumerator])?;
            self.store(&place, &mut cache, Repr::Value)?;
            self.release_cache(cache);
        }
        self.emit_goto(id, body, end)
    }

    // ---- Switch ----

    fn emit_switch(
        &mut self,
        id: BlockId,
        subject: &BoundExpr,
        cases: &[SwitchCase],
        next: BlockId,
        end: BlockId,
    ) -> Result<(), CompileError> {
        let default = cases.iter().find(|c| c.value.is_none()).map(|c| c.block);
        let fallback = default.unwrap_or(next);
        let valued: Vec<&SwitchCase> = cases.iter().filter(|c| c.value.is_some()).collect();

        if valued.is_empty() {
            let r = self.emit_expr(subject)?;
            if r != Repr::Void {
                self.w.emit(Instr::Pop);
            }
            return self.emit_goto(id, fallback, end);
        }
        if let Some(keys) = self.table_keys(&valued) {
            match self.table_labels(&valued, fallback)? {
                Some((labels, otherwise)) => {
                    return self.emit_switch_table(id, subject, &labels, &keys, otherwise, fallback, end);
                }
                None => trace!(block = id, "switch target leaves a region, comparing sequentially"),
            }
        }

        trace!(block = id, cases = valued.len(), "sequential switch");
        self.emit_expr_as(subject, Repr::Value)?;
        let subject_temp = self.temps.acquire(self.w, Repr::Value);
        self.w.emit(Instr::StLoc(subject_temp.id()));
        for case in &valued {
            let Some(value) = &case.value else { continue };
            self.w.emit(Instr::LdLoc(subject_temp.id()));
            self.emit_expr_as(value, Repr::Value)?;
            self.call("loose_eq", &[Repr::Value, Repr::Value])?;
            self.emit_branch_if(case.block, true)?;
        }
        self.temps.release(subject_temp);
        self.emit_goto(id, fallback, end)
    }

    /// Integer keys of the cases when every one is a constant and the table stays small.
    fn table_keys(&self, cases: &[&SwitchCase]) -> Option<Vec<i64>> {
        if !self.opts.integer_switch_tables {
            return None;
        }
        let keys: Vec<i64> = cases
            .iter()
            .map(|c| c.value.as_ref().and_then(case_key))
            .collect::<Option<_>>()?;
        if keys.iter().any(|k| i32::try_from(*k).is_err()) {
            return None;
        }
        let (min, max) = (*keys.iter().min()?, *keys.iter().max()?);
        let span = u64::try_from(max - min + 1).ok()?;
        (span <= u64::from(self.opts.max_switch_table_span)).then_some(keys)
    }

    /// Branch labels of the cases and of the fallback, or `None` when reaching any of
    /// them leaves a protected region: a jump table cannot `leave`.
    fn table_labels(&self, cases: &[&SwitchCase], fallback: BlockId) -> Result<Option<(Vec<Label>, Label)>, CompileError> {
        let mut labels = Vec::with_capacity(cases.len());
        for case in cases {
            match self.jump_to(case.block)? {
                Jump::Branch(l) => labels.push(l),
                Jump::Leave(_) => return Ok(None),
            }
        }
        match self.jump_to(fallback)? {
            Jump::Branch(otherwise) => Ok(Some((labels, otherwise))),
            Jump::Leave(_) => Ok(None),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_switch_table(
        &mut self,
        id: BlockId,
        subject: &BoundExpr,
        labels: &[Label],
        keys: &[i64],
        otherwise: Label,
        fallback: BlockId,
        end: BlockId,
    ) -> Result<(), CompileError> {
        let min = keys.iter().copied().min().unwrap_or(0);
        let max = keys.iter().copied().max().unwrap_or(0);
        let count = max - min + 1;
        let mut targets = vec![otherwise; count as usize];
        // Duplicate keys: the first case in source order wins.
        for (label, key) in labels.iter().zip(keys).rev() {
            targets[(key - min) as usize] = *label;
        }
        let true_key = keys.iter().copied().find(|k| *k != 0).unwrap_or(i64::MIN);
        trace!(block = id, min, count, "switch jump table");

        self.emit_expr_as(subject, Repr::Value)?;
        self.w.emit(Instr::LdI8(min));
        self.w.emit(Instr::LdI8(count));
        self.w.emit(Instr::LdI8(true_key));
        self.call("switch_table_index", &[Repr::Value, Repr::Long, Repr::Long, Repr::Long])?;
        self.w.emit(Instr::Switch(targets));
        self.emit_goto(id, fallback, end)
    }
}

/// Constant integer key of a case label.
fn case_key(e: &BoundExpr) -> Option<i64> {
    match (&e.constant, &e.kind) {
        (Some(c), _) => c.as_long(),
        (None, ExprKind::Literal(c)) => c.as_long(),
        _ => None,
    }
}
