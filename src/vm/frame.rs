//! Activation records and the exception-region protocol: `leave` runs the finally
//! handlers it crosses, faults look for the innermost matching catch.

use std::ops::Range;

use crate::codegen::CompiledRoutine;
use crate::il::{CatchFilter, HandlerKind, Label, Region, RoutineBody};
use crate::runtime::{Fault, ObjectRef, Slot};

/// What resumes once a finally handler reaches `endfinally`.
#[derive(Debug)]
enum Continuation {
    Leave(usize),
    Fault(Fault),
}

#[derive(Debug)]
struct Pending {
    handler: Range<usize>,
    then: Continuation,
}

pub(super) struct Frame<'m> {
    pub routine: &'m CompiledRoutine,
    pub args: Vec<Slot>,
    pub locals: Vec<Slot>,
    pub this: Option<ObjectRef>,
    /// Generator object, when this frame runs a generator body.
    pub generator: Option<ObjectRef>,
    pub stack: Vec<Slot>,
    pub pc: usize,
    pending: Vec<Pending>,
    /// Faults being handled, by the catch handler body handling them.
    caught: Vec<(Range<usize>, Fault)>,
}

impl<'m> Frame<'m> {
    pub fn new(routine: &'m CompiledRoutine, args: Vec<Slot>, this: Option<ObjectRef>) -> Self {
        let locals = fresh_locals(&routine.body);
        Frame::resume(routine, args, locals, this, None)
    }

    pub fn resume(
        routine: &'m CompiledRoutine,
        args: Vec<Slot>,
        locals: Vec<Slot>,
        this: Option<ObjectRef>,
        generator: Option<ObjectRef>,
    ) -> Self {
        Frame {
            routine,
            args,
            locals,
            this,
            generator,
            stack: Vec::new(),
            pc: 0,
            pending: Vec::new(),
            caught: Vec::new(),
        }
    }

    pub fn body(&self) -> &'m RoutineBody {
        &self.routine.body
    }

    pub fn pop(&mut self) -> Result<Slot, Fault> {
        self.stack
            .pop()
            .ok_or_else(|| Fault::internal(format!("stack underflow in {} at {}", self.routine.name, self.pc)))
    }

    /// Pops `n` slots, deepest first.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Slot>, Fault> {
        if self.stack.len() < n {
            return Err(Fault::internal(format!("stack underflow in {} at {}", self.routine.name, self.pc)));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    pub fn push(&mut self, slot: Slot) {
        self.stack.push(slot);
    }

    pub fn target(&self, label: Label) -> Result<usize, Fault> {
        match self.body().label_offset(label) {
            Some(at) if at != usize::MAX => Ok(at),
            _ => Err(Fault::internal(format!("unmarked label {label} in {}", self.routine.name))),
        }
    }

    /// Branches from `at` to `target`, entering the finally handler of every region the
    /// branch exits on the way.
    pub fn leave(&mut self, at: usize, target: usize) -> Result<(), Fault> {
        self.stack.clear();
        self.caught.retain(|(body, _)| !body.contains(&at) || body.contains(&target));
        for region in &self.body().regions {
            if !guards(region, at) || (region.start..=region.end).contains(&target) {
                continue;
            }
            if let Some(finally) = region.finally() {
                self.pending.push(Pending { handler: finally.body(), then: Continuation::Leave(target) });
                self.pc = finally.start + 1;
                return Ok(());
            }
        }
        self.pc = target;
        Ok(())
    }

    /// Resumes whatever entered the finally handler `endfinally` at `at` closes.
    pub fn end_finally(&mut self, at: usize, matches: &dyn Fn(&CatchFilter, &Fault) -> bool) -> Result<(), Fault> {
        let pending = self
            .pending
            .pop()
            .ok_or_else(|| Fault::internal(format!("endfinally without a pending exit in {}", self.routine.name)))?;
        match pending.then {
            Continuation::Leave(target) => self.leave(at, target),
            Continuation::Fault(fault) => self.unwind(at, fault, matches),
        }
    }

    /// The fault being handled by the catch handler around `at`.
    pub fn caught_at(&self, at: usize) -> Result<Fault, Fault> {
        self.caught
            .iter()
            .rev()
            .find(|(body, _)| body.contains(&at))
            .map(|(_, fault)| fault.clone())
            .ok_or_else(|| Fault::internal(format!("rethrow outside of a catch handler in {}", self.routine.name)))
    }

    /// Transfers control to the handler for `fault` raised at `at`: the first catch
    /// whose filter accepts it, or a finally handler to run on the way out. Returns the
    /// fault when no handler in this frame applies.
    pub fn unwind(&mut self, at: usize, fault: Fault, matches: &dyn Fn(&CatchFilter, &Fault) -> bool) -> Result<(), Fault> {
        if matches!(fault, Fault::Internal(_)) {
            return Err(fault);
        }
        for region in &self.body().regions {
            if region.try_body().contains(&at) {
                let handler = region.handlers.iter().find(|h| match &h.kind {
                    HandlerKind::Catch(filter) => matches(filter, &fault),
                    HandlerKind::Finally => false,
                });
                if let Some(handler) = handler {
                    let dest = handler.start + 1;
                    self.abandon(at, dest);
                    self.stack.clear();
                    self.stack.push(match &fault {
                        Fault::Thrown(ex) => Slot::Object(ex.0.clone()),
                        _ => Slot::Null,
                    });
                    self.caught.push((handler.body(), fault));
                    self.pc = dest;
                    return Ok(());
                }
            } else if !in_catch(region, at) {
                continue;
            }
            if let Some(finally) = region.finally() {
                let dest = finally.start + 1;
                self.abandon(at, dest);
                self.stack.clear();
                self.pending.push(Pending { handler: finally.body(), then: Continuation::Fault(fault) });
                self.pc = dest;
                return Ok(());
            }
        }
        Err(fault)
    }

    /// Drops the bookkeeping of handlers a fault escapes from `at` to `dest`.
    fn abandon(&mut self, at: usize, dest: usize) {
        let escaped = |body: &Range<usize>| body.contains(&at) && !body.contains(&dest);
        self.pending.retain(|p| !escaped(&p.handler));
        self.caught.retain(|(body, _)| !escaped(body));
    }
}

/// Whether `at` lies in the part of `region` its finally handler protects.
fn guards(region: &Region, at: usize) -> bool {
    region.try_body().contains(&at) || in_catch(region, at)
}

fn in_catch(region: &Region, at: usize) -> bool {
    region
        .handlers
        .iter()
        .any(|h| matches!(h.kind, HandlerKind::Catch(_)) && h.body().contains(&at))
}

pub(super) fn fresh_locals(body: &RoutineBody) -> Vec<Slot> {
    body.locals.iter().map(|l| Slot::default_for(l.repr)).collect()
}
