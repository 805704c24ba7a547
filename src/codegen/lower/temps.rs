use std::collections::HashMap;

use smallvec::SmallVec;

use crate::il::{AssemblyWriter, LocalId, Repr};

/// A borrowed temporary. Not `Copy`: giving it back consumes the handle, so a released
/// temporary cannot be used or returned twice.
#[derive(Debug)]
pub(super) struct TempLocal {
    id: LocalId,
    repr: Repr,
}

impl TempLocal {
    pub(super) fn id(&self) -> LocalId {
        self.id
    }

    pub(super) fn repr(&self) -> Repr {
        self.repr
    }
}

/// Free lists of unnamed locals, keyed by representation.
#[derive(Debug, Default)]
pub(super) struct TempPool {
    free: HashMap<Repr, SmallVec<[LocalId; 4]>>,
    declared: usize,
}

impl TempPool {
    pub(super) fn acquire(&mut self, w: &mut dyn AssemblyWriter, repr: Repr) -> TempLocal {
        if let Some(id) = self.free.get_mut(&repr).and_then(|ids| ids.pop()) {
            return TempLocal { id, repr };
        }
        self.declared += 1;
        TempLocal { id: w.declare_local(repr, None), repr }
    }

    pub(super) fn release(&mut self, temp: TempLocal) {
        self.free.entry(temp.repr).or_default().push(temp.id);
    }

    /// Number of temporaries declared so far.
    pub(super) fn declared(&self) -> usize {
        self.declared
    }
}
