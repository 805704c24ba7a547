use std::collections::HashMap;
use std::ops::Range;

use super::instr::{CatchFilter, Instr, Label, LocalId};
use super::repr::Repr;
use crate::diagnostics::CompileError;
use crate::span::Span;

/// Sink for the instruction stream of one routine body.
pub trait AssemblyWriter {
    fn declare_local(&mut self, repr: Repr, name: Option<&str>) -> LocalId;
    fn define_label(&mut self) -> Label;
    fn mark_label(&mut self, label: Label) -> Result<(), CompileError>;
    fn emit(&mut self, instr: Instr);
    fn begin_try(&mut self);
    fn begin_catch(&mut self, filter: CatchFilter) -> Result<(), CompileError>;
    fn begin_finally(&mut self) -> Result<(), CompileError>;
    fn end_try(&mut self) -> Result<(), CompileError>;
    fn sequence_point(&mut self, span: Span);
    fn declare_call_site(&mut self) -> u32;
    /// Index the next emitted instruction will occupy.
    fn position(&self) -> usize;
    /// Replace the targets of the `Switch` emitted at `at`.
    fn patch_switch(&mut self, at: usize, targets: Vec<Label>) -> Result<(), CompileError>;
    fn finish(self) -> Result<RoutineBody, CompileError>
    where
        Self: Sized;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInfo {
    pub repr: Repr,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerKind {
    Catch(CatchFilter),
    Finally,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler {
    pub kind: HandlerKind,
    /// Index of the `BeginCatch`/`BeginFinally` marker.
    pub start: usize,
    /// Index of the next marker closing the handler.
    pub end: usize,
}

impl Handler {
    pub fn body(&self) -> Range<usize> {
        self.start + 1..self.end
    }
}

/// One protected region: a try body followed by its handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Index of the `BeginTry` marker.
    pub start: usize,
    pub handlers: Vec<Handler>,
    /// Index of the `EndTry` marker.
    pub end: usize,
}

impl Region {
    pub fn try_body(&self) -> Range<usize> {
        let end = self.handlers.first().map_or(self.end, |h| h.start);
        self.start + 1..end
    }

    pub fn finally(&self) -> Option<&Handler> {
        self.handlers.iter().find(|h| h.kind == HandlerKind::Finally)
    }
}

/// Finished routine body.
#[derive(Debug, Clone)]
pub struct RoutineBody {
    pub instrs: Vec<Instr>,
    pub locals: Vec<LocalInfo>,
    /// Instruction index of each label.
    pub labels: Vec<usize>,
    pub regions: Vec<Region>,
    pub call_sites: u32,
    region_starts: HashMap<usize, usize>,
}

impl RoutineBody {
    pub fn label_offset(&self, label: Label) -> Option<usize> {
        self.labels.get(label.index()).copied()
    }

    pub fn region_at(&self, start: usize) -> Option<&Region> {
        self.region_starts.get(&start).map(|&i| &self.regions[i])
    }

    pub fn count(&self, pred: impl Fn(&Instr) -> bool) -> usize {
        self.instrs.iter().filter(|i| pred(i)).count()
    }
}

struct OpenRegion {
    start: usize,
    handlers: Vec<Handler>,
}

/// In-memory [`AssemblyWriter`].
#[derive(Default)]
pub struct IlBuilder {
    instrs: Vec<Instr>,
    locals: Vec<LocalInfo>,
    labels: Vec<Option<usize>>,
    open: Vec<OpenRegion>,
    regions: Vec<Region>,
    call_sites: u32,
}

impl IlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn close_handler(open: &mut OpenRegion, at: usize) {
        if let Some(last) = open.handlers.last_mut() {
            last.end = at;
        }
    }
}

impl AssemblyWriter for IlBuilder {
    fn declare_local(&mut self, repr: Repr, name: Option<&str>) -> LocalId {
        self.locals.push(LocalInfo { repr, name: name.map(str::to_string) });
        LocalId(self.locals.len() as u32 - 1)
    }

    fn define_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    fn mark_label(&mut self, label: Label) -> Result<(), CompileError> {
        let at = self.instrs.len();
        match self.labels.get_mut(label.index()) {
            Some(slot @ None) => {
                *slot = Some(at);
                self.instrs.push(Instr::MarkLabel(label));
                Ok(())
            }
            Some(Some(_)) => Err(CompileError::emit(format!("label {label} marked twice"))),
            None => Err(CompileError::emit(format!("label {label} was never defined"))),
        }
    }

    fn emit(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    fn begin_try(&mut self) {
        self.open.push(OpenRegion { start: self.instrs.len(), handlers: Vec::new() });
        self.instrs.push(Instr::BeginTry);
    }

    fn begin_catch(&mut self, filter: CatchFilter) -> Result<(), CompileError> {
        let at = self.instrs.len();
        let open = self.open.last_mut().ok_or_else(|| CompileError::emit("catch outside of a try region"))?;
        if open.handlers.iter().any(|h| h.kind == HandlerKind::Finally) {
            return Err(CompileError::emit("catch handler after finally handler"));
        }
        Self::close_handler(open, at);
        open.handlers.push(Handler { kind: HandlerKind::Catch(filter.clone()), start: at, end: at });
        self.instrs.push(Instr::BeginCatch(filter));
        Ok(())
    }

    fn begin_finally(&mut self) -> Result<(), CompileError> {
        let at = self.instrs.len();
        let open = self.open.last_mut().ok_or_else(|| CompileError::emit("finally outside of a try region"))?;
        Self::close_handler(open, at);
        open.handlers.push(Handler { kind: HandlerKind::Finally, start: at, end: at });
        self.instrs.push(Instr::BeginFinally);
        Ok(())
    }

    fn end_try(&mut self) -> Result<(), CompileError> {
        let at = self.instrs.len();
        let mut open = self.open.pop().ok_or_else(|| CompileError::emit("end of try without a region"))?;
        if open.handlers.is_empty() {
            return Err(CompileError::emit("try region without handlers"));
        }
        Self::close_handler(&mut open, at);
        self.regions.push(Region { start: open.start, handlers: open.handlers, end: at });
        self.instrs.push(Instr::EndTry);
        Ok(())
    }

    fn sequence_point(&mut self, span: Span) {
        self.instrs.push(Instr::SequencePoint(span));
    }

    fn declare_call_site(&mut self) -> u32 {
        self.call_sites += 1;
        self.call_sites - 1
    }

    fn position(&self) -> usize {
        self.instrs.len()
    }

    fn patch_switch(&mut self, at: usize, targets: Vec<Label>) -> Result<(), CompileError> {
        match self.instrs.get_mut(at) {
            Some(Instr::Switch(slot)) => {
                *slot = targets;
                Ok(())
            }
            _ => Err(CompileError::emit(format!("no switch instruction at {at}"))),
        }
    }

    fn finish(self) -> Result<RoutineBody, CompileError> {
        if !self.open.is_empty() {
            return Err(CompileError::emit(format!("{} try region(s) left open", self.open.len())));
        }
        let mut labels = Vec::with_capacity(self.labels.len());
        for (i, offset) in self.labels.iter().enumerate() {
            match offset {
                Some(at) => labels.push(*at),
                None => {
                    let used = self
                        .instrs
                        .iter()
                        .any(|instr| instr.branch_targets().iter().any(|l| l.index() == i));
                    if used {
                        return Err(CompileError::emit(format!("branch to unmarked label L{i}")));
                    }
                    labels.push(usize::MAX);
                }
            }
        }
        let region_starts = self.regions.iter().enumerate().map(|(i, r)| (r.start, i)).collect();
        Ok(RoutineBody {
            instrs: self.instrs,
            locals: self.locals,
            labels,
            regions: self.regions,
            call_sites: self.call_sites,
            region_starts,
        })
    }
}
