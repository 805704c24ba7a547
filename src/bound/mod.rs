//! The bound control-flow graph the code generator consumes: routines, blocks with a
//! closed set of outgoing edges, and type-annotated expressions.

pub mod access;
pub mod builder;
pub mod expr;
pub mod graph;
pub mod routine;
pub mod stmt;

use serde::{Deserialize, Serialize};

pub use access::AccessFlags;
pub use expr::{
    ArrayItemInit, BinaryOp, BoundExpr, CallTarget, CastKind, ClassRef, ConstValue, ExprKind, IncDecKind,
    ListItem, MemberName, UnaryOp, VariableName,
};
pub use graph::{BlockId, BlockKind, BoundBlock, ControlFlowGraph, Edge, SwitchCase, TryLayout};
pub use routine::{BoundLocal, BoundParam, BoundRoutine};
pub use stmt::{BoundStmt, StmtKind};

use crate::diagnostics::CompileError;
use crate::symbols::SymbolTable;

/// Every routine of a compilation unit plus the finalized symbol table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundModule {
    pub routines: Vec<BoundRoutine>,
    #[serde(default)]
    pub symbols: SymbolTable,
}

impl BoundModule {
    pub fn from_json(source: &str) -> Result<Self, CompileError> {
        let module: BoundModule =
            serde_json::from_str(source).map_err(|e| CompileError::input(format!("invalid bound module: {e}")))?;
        module.validate()?;
        Ok(module)
    }

    pub fn to_json(&self) -> Result<String, CompileError> {
        serde_json::to_string_pretty(self).map_err(|e| CompileError::input(e.to_string()))
    }

    pub fn routine(&self, qualified_name: &str) -> Option<&BoundRoutine> {
        self.routines
            .iter()
            .find(|r| r.qualified_name().eq_ignore_ascii_case(qualified_name))
    }

    pub fn validate(&self) -> Result<(), CompileError> {
        for routine in &self.routines {
            routine.cfg.validate().map_err(|e| match e {
                CompileError::Invariant { msg } => {
                    CompileError::invariant(format!("{}: {msg}", routine.qualified_name()))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}
