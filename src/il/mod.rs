//! Target instruction model: representations, instructions, and the writer interface the
//! code generator streams into.

pub mod builder;
pub mod instr;
mod listing;
pub mod repr;

pub use builder::{AssemblyWriter, Handler, HandlerKind, IlBuilder, LocalInfo, Region, RoutineBody};
pub use instr::{CatchFilter, GenField, HelperRef, Instr, Label, LocalId};
pub use repr::Repr;
