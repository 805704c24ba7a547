//! Generator routines as resumable state machines.
//!
//! The generator object's `State` field holds `0` before the first resumption, the
//! 1-based index of the yield the routine is suspended at, `-2` while running and `-1`
//! once finished. Entry dispatches on it. A yield inside protected regions is reached by
//! a chain of dispatches, one right after each region's `BeginTry`, since a branch may
//! not enter a region from outside.

use std::collections::HashMap;
use std::ops::Range;

use tracing::debug;

use super::place::InstanceCache;
use super::LowerContext;
use crate::bound::{BlockId, BoundStmt, Edge, ExprKind, StmtKind};
use crate::diagnostics::CompileError;
use crate::il::{GenField, Instr, Label, Repr};
use crate::runtime::generator::{NOT_STARTED, RUNNING};

#[derive(Debug, Clone, Copy)]
pub(super) struct YieldPoint {
    /// Resumption index stored in `State` while suspended here.
    pub(super) index: i32,
    pub(super) resume: Label,
}

/// Dispatch emitted at the top of a protected region that encloses yields.
#[derive(Debug)]
struct RegionDispatch {
    /// Marked right before the region opens.
    entry: Label,
    /// Where each resumption index continues from inside the region.
    targets: Vec<(i32, Label)>,
}

#[derive(Debug)]
pub(super) struct GeneratorPlan {
    /// Statement-level yields, keyed by block and statement index.
    yields: HashMap<(BlockId, usize), YieldPoint>,
    regions: HashMap<BlockId, RegionDispatch>,
    /// Targets of the entry switch, by state.
    entry: Vec<Label>,
}

impl GeneratorPlan {
    pub(super) fn yield_count(&self) -> usize {
        self.yields.len()
    }
}

/// A block range control can only enter through its owner's region.
struct Protected {
    owner: BlockId,
    blocks: Range<BlockId>,
}

impl LowerContext<'_> {
    pub(super) fn plan_generator(&mut self) -> Result<GeneratorPlan, CompileError> {
        let routine = self.routine;
        let cfg = &routine.cfg;
        let mut protected = Vec::new();
        let mut handlers: Vec<Range<BlockId>> = Vec::new();
        for (id, block) in cfg.blocks.iter().enumerate() {
            if !self.reachable[id] {
                continue;
            }
            match &block.edge {
                Edge::TryCatch { .. } => {
                    let layout = cfg.try_layout(id, &block.edge)?;
                    protected.push(Protected { owner: id, blocks: layout.body.clone() });
                    handlers.extend(layout.catches.iter().cloned());
                    handlers.extend(layout.finally.clone());
                }
                Edge::ForeachEnumeree { move_next, .. } => {
                    let disposes = self.foreach.get(&id).is_some_and(|s| s.disposes());
                    if let (true, Edge::ForeachMoveNext { next, .. }) = (disposes, &cfg.block(*move_next)?.edge) {
                        protected.push(Protected { owner: id, blocks: *move_next..*next });
                    }
                }
                _ => {}
            }
        }

        let start = self.w.define_label();
        let mut plan = GeneratorPlan { yields: HashMap::new(), regions: HashMap::new(), entry: vec![start] };
        for (id, block) in cfg.blocks.iter().enumerate() {
            if !self.reachable[id] {
                continue;
            }
            if block.edge.expressions().iter().any(|e| e.contains_yield()) {
                return Err(self.unsupported(format!("yield in the {} edge of block #{id}", block.edge.name())));
            }
            for (index, stmt) in block.statements.iter().enumerate() {
                let nested = stmt.expressions().iter().any(|e| e.contains_yield());
                if !nested {
                    continue;
                }
                self.span = stmt.span;
                let Some(y) = stmt.statement_yield() else {
                    return Err(self.unsupported("yield nested inside an expression"));
                };
                let ExprKind::Yield { key, value } = &y.kind else {
                    return Err(CompileError::invariant("statement yield is not a yield"));
                };
                if key.iter().chain(value.iter()).any(|e| e.contains_yield()) {
                    return Err(self.unsupported("yield nested inside an expression"));
                }
                if handlers.iter().any(|h| h.contains(&id)) {
                    return Err(self.unsupported("yield inside a catch or finally block"));
                }

                let point = YieldPoint { index: plan.entry.len() as i32, resume: self.w.define_label() };
                let mut chain: Vec<&Protected> = protected.iter().filter(|p| p.blocks.contains(&id)).collect();
                chain.sort_by_key(|p| p.owner);
                for p in &chain {
                    if !plan.regions.contains_key(&p.owner) {
                        let entry = self.w.define_label();
                        plan.regions.insert(p.owner, RegionDispatch { entry, targets: Vec::new() });
                    }
                }
                let region_entry = |plan: &GeneratorPlan, owner: BlockId| plan.regions.get(&owner).map(|r| r.entry);
                let first = match chain.first() {
                    Some(p) => region_entry(&plan, p.owner).unwrap_or(point.resume),
                    None => point.resume,
                };
                plan.entry.push(first);
                for (i, p) in chain.iter().enumerate() {
                    let target = match chain.get(i + 1) {
                        Some(inner) => region_entry(&plan, inner.owner).unwrap_or(point.resume),
                        None => point.resume,
                    };
                    if let Some(r) = plan.regions.get_mut(&p.owner) {
                        r.targets.push((point.index, target));
                    }
                }
                plan.yields.insert((id, index), point);
            }
        }
        debug!(
            routine = %routine.qualified_name(),
            yields = plan.yield_count(),
            regions = plan.regions.len(),
            "generator planned"
        );
        Ok(plan)
    }

    /// Dispatch on `State`, then the first-run entry that marks the generator running.
    pub(super) fn emit_generator_entry(&mut self) -> Result<(), CompileError> {
        let Some(plan) = &self.generator else {
            return Ok(());
        };
        let targets = plan.entry.clone();
        let start = targets[NOT_STARTED as usize];
        self.w.emit(Instr::LdGenField(GenField::State));
        self.w.emit(Instr::Switch(targets));
        // Finished or running generators are never resumed; the runtime rejects it first.
        self.w.emit(Instr::Br(self.return_label));
        self.w.mark_label(start)?;
        self.w.emit(Instr::LdI4(RUNNING));
        self.w.emit(Instr::StGenField(GenField::State));
        Ok(())
    }

    /// Marks where the entry dispatch (or an enclosing region's) jumps to reach the region
    /// owned by block `owner`.
    pub(super) fn mark_region_entry(&mut self, owner: BlockId) -> Result<(), CompileError> {
        let entry = self.generator.as_ref().and_then(|p| p.regions.get(&owner)).map(|r| r.entry);
        match entry {
            Some(l) => self.w.mark_label(l),
            None => Ok(()),
        }
    }

    /// Emitted right after the region of `owner` opens: resumes into it, or falls through
    /// when the routine is running normally.
    pub(super) fn emit_region_dispatch(&mut self, owner: BlockId) -> Result<(), CompileError> {
        let Some(dispatch) = self.generator.as_ref().and_then(|p| p.regions.get(&owner)) else {
            return Ok(());
        };
        let Some(max) = dispatch.targets.iter().map(|(i, _)| *i).max() else {
            return Ok(());
        };
        let pairs = dispatch.targets.clone();
        let go = self.w.define_label();
        let mut targets = vec![go; max as usize + 1];
        for (index, label) in pairs {
            targets[index as usize] = label;
        }
        self.w.emit(Instr::LdGenField(GenField::State));
        self.w.emit(Instr::Switch(targets));
        self.w.mark_label(go)?;
        Ok(())
    }

    /// Suspends at `yield`, then resumes at the same point: rethrows an exception thrown
    /// into the generator, and binds the sent value for `$x = yield`.
    pub(super) fn emit_yield_statement(&mut self, id: BlockId, index: usize, stmt: &BoundStmt) -> Result<(), CompileError> {
        let point = self
            .generator
            .as_ref()
            .and_then(|p| p.yields.get(&(id, index)).copied())
            .ok_or_else(|| CompileError::invariant(format!("yield in block #{id} was not planned")))?;
        let Some(y) = stmt.statement_yield() else {
            return Err(CompileError::invariant("not a yield statement"));
        };
        let ExprKind::Yield { key, value } = &y.kind else {
            return Err(CompileError::invariant("statement yield is not a yield"));
        };

        self.w.emit(Instr::LdGenerator);
        match key {
            Some(k) => {
                self.emit_expr_as(k, Repr::Value)?;
                self.call("generator_set_key", &[Repr::Object, Repr::Value])?;
            }
            None => {
                self.call("generator_next_auto_key", &[Repr::Object])?;
            }
        }
        match value {
            Some(v) => self.emit_expr_as(v, Repr::Value)?,
            None => self.w.emit(Instr::LdNull),
        }
        self.w.emit(Instr::StGenField(GenField::Current));
        self.w.emit(Instr::LdI4(point.index));
        self.w.emit(Instr::StGenField(GenField::State));
        self.w.emit(Instr::LdBool(true));
        self.w.emit(Instr::StGenField(GenField::Suspending));
        self.emit_jump_to_return()?;

        self.w.mark_label(point.resume)?;
        self.w.emit(Instr::LdBool(false));
        self.w.emit(Instr::StGenField(GenField::Suspending));
        self.w.emit(Instr::LdI4(RUNNING));
        self.w.emit(Instr::StGenField(GenField::State));
        let ok = self.w.define_label();
        self.w.emit(Instr::LdGenerator);
        self.call("generator_take_pending_exception", &[Repr::Object])?;
        self.w.emit(Instr::Dup);
        self.w.emit(Instr::BrFalse(ok));
        self.w.emit(Instr::Throw);
        self.w.mark_label(ok)?;
        self.w.emit(Instr::Pop);

        if let StmtKind::Expr(e) = &stmt.kind {
            if let ExprKind::Assign { target, .. } = &e.kind {
                let place = self.place_of(target)?;
                let mut cache = InstanceCache::default();
                self.prepare_store(&place, &mut cache, false)?;
                self.w.emit(Instr::LdGenField(GenField::Sent));
                self.store(&place, &mut cache, Repr::Value)?;
                self.release_cache(cache);
            }
        }
        Ok(())
    }
}
