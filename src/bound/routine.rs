use serde::{Deserialize, Serialize};

use super::expr::ConstValue;
use super::graph::ControlFlowGraph;
use crate::span::Span;
use crate::types::{QualifiedName, TypeRefContext, TypeRefMask};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundParam {
    pub name: String,
    #[serde(default)]
    pub by_ref: bool,
    #[serde(default)]
    pub default: Option<ConstValue>,
    #[serde(default = "any")]
    pub mask: TypeRefMask,
}

/// A local variable and the union of types flow analysis found for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundLocal {
    pub name: String,
    #[serde(default = "any")]
    pub mask: TypeRefMask,
}

fn any() -> TypeRefMask {
    TypeRefMask::ANY
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundRoutine {
    pub name: String,
    /// Declaring class of a method.
    #[serde(default)]
    pub class: Option<QualifiedName>,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub params: Vec<BoundParam>,
    #[serde(default)]
    pub locals: Vec<BoundLocal>,
    #[serde(default = "any")]
    pub return_mask: TypeRefMask,
    #[serde(default)]
    pub is_generator: bool,
    /// Locals are addressed by name at runtime (`$$name`), so they live in a table.
    #[serde(default)]
    pub uses_indirect_locals: bool,
    #[serde(default)]
    pub ctx: TypeRefContext,
    pub cfg: ControlFlowGraph,
    #[serde(default)]
    pub span: Span,
}

impl BoundRoutine {
    /// Name the routine is called by: `f` for functions, `C::m` for methods.
    pub fn qualified_name(&self) -> String {
        match &self.class {
            Some(class) => format!("{class}::{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn local(&self, name: &str) -> Option<&BoundLocal> {
        self.locals.iter().find(|l| l.name == name)
    }

    pub fn param(&self, name: &str) -> Option<(usize, &BoundParam)> {
        self.params.iter().enumerate().find(|(_, p)| p.name == name)
    }
}
