use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::expr::BoundExpr;
use super::stmt::BoundStmt;
use crate::diagnostics::CompileError;
use crate::types::QualifiedName;

/// Index of a block in [`ControlFlowGraph::blocks`]; also its layout ordinal.
pub type BlockId = usize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockKind {
    Plain,
    /// Entry of a catch handler. An empty class list catches every throwable.
    Catch {
        classes: Vec<QualifiedName>,
        #[serde(default)]
        variable: Option<BoundExpr>,
    },
    Case,
    Finally,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// `None` for `default:`.
    #[serde(default)]
    pub value: Option<BoundExpr>,
    pub block: BlockId,
}

/// The single outgoing edge of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Edge {
    Simple {
        target: BlockId,
    },
    Conditional {
        condition: BoundExpr,
        true_target: BlockId,
        false_target: BlockId,
    },
    /// Protected region. The try body spans `body..` up to the first handler block; each
    /// catch block spans up to the next handler; the finally block spans up to `next`.
    TryCatch {
        body: BlockId,
        #[serde(default)]
        catches: Vec<BlockId>,
        #[serde(default)]
        finally: Option<BlockId>,
        next: BlockId,
    },
    /// Evaluates the enumerated value and enters the loop at `move_next`.
    ForeachEnumeree {
        enumeree: BoundExpr,
        move_next: BlockId,
    },
    /// Advances the enumerator; binds `value` (and `key`) and enters `body`, or leaves
    /// for `next` once exhausted. The loop spans `move_next..next`.
    ForeachMoveNext {
        value: BoundExpr,
        #[serde(default)]
        key: Option<BoundExpr>,
        #[serde(default)]
        by_ref: bool,
        body: BlockId,
        next: BlockId,
    },
    /// Case blocks are laid out in source order; each spans up to the following one.
    Switch {
        subject: BoundExpr,
        cases: Vec<SwitchCase>,
        next: BlockId,
    },
    /// `return`, with an optional value.
    Leave {
        #[serde(default)]
        value: Option<BoundExpr>,
    },
    Throw {
        value: BoundExpr,
    },
    Exit {
        #[serde(default)]
        status: Option<BoundExpr>,
    },
}

impl Edge {
    /// Blocks control may reach directly from this edge.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Edge::Simple { target } => vec![*target],
            Edge::Conditional { true_target, false_target, .. } => vec![*true_target, *false_target],
            Edge::TryCatch { body, catches, finally, next } => {
                let mut out = vec![*body];
                out.extend(catches.iter().copied());
                out.extend(*finally);
                out.push(*next);
                out
            }
            Edge::ForeachEnumeree { move_next, .. } => vec![*move_next],
            Edge::ForeachMoveNext { body, next, .. } => vec![*body, *next],
            Edge::Switch { cases, next, .. } => {
                let mut out: Vec<BlockId> = cases.iter().map(|c| c.block).collect();
                out.push(*next);
                out
            }
            Edge::Leave { .. } | Edge::Throw { .. } | Edge::Exit { .. } => Vec::new(),
        }
    }

    pub fn expressions(&self) -> Vec<&BoundExpr> {
        match self {
            Edge::Conditional { condition, .. } => vec![condition],
            Edge::ForeachEnumeree { enumeree, .. } => vec![enumeree],
            Edge::ForeachMoveNext { value, key, .. } => {
                let mut out = vec![value];
                out.extend(key.as_ref());
                out
            }
            Edge::Switch { subject, cases, .. } => {
                let mut out = vec![subject];
                out.extend(cases.iter().filter_map(|c| c.value.as_ref()));
                out
            }
            Edge::Leave { value } => value.iter().collect(),
            Edge::Throw { value } => vec![value],
            Edge::Exit { status } => status.iter().collect(),
            Edge::Simple { .. } | Edge::TryCatch { .. } => Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Edge::Simple { .. } => "simple",
            Edge::Conditional { .. } => "conditional",
            Edge::TryCatch { .. } => "try",
            Edge::ForeachEnumeree { .. } => "foreach-enumeree",
            Edge::ForeachMoveNext { .. } => "foreach-move-next",
            Edge::Switch { .. } => "switch",
            Edge::Leave { .. } => "leave",
            Edge::Throw { .. } => "throw",
            Edge::Exit { .. } => "exit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundBlock {
    #[serde(default = "plain")]
    pub kind: BlockKind,
    #[serde(default)]
    pub statements: Vec<BoundStmt>,
    pub edge: Edge,
}

fn plain() -> BlockKind {
    BlockKind::Plain
}

/// Block ranges of one protected region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryLayout {
    pub body: Range<BlockId>,
    pub catches: Vec<Range<BlockId>>,
    pub finally: Option<Range<BlockId>>,
}

impl TryLayout {
    pub fn end(&self) -> BlockId {
        self.finally
            .as_ref()
            .or(self.catches.last())
            .map_or(self.body.end, |r| r.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    pub blocks: Vec<BoundBlock>,
    #[serde(default)]
    pub start: BlockId,
}

impl ControlFlowGraph {
    pub fn block(&self, id: BlockId) -> Result<&BoundBlock, CompileError> {
        self.blocks
            .get(id)
            .ok_or_else(|| CompileError::invariant(format!("block #{id} does not exist")))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Splits a try edge owned by block `owner` into contiguous block ranges.
    pub fn try_layout(&self, owner: BlockId, edge: &Edge) -> Result<TryLayout, CompileError> {
        let Edge::TryCatch { body, catches, finally, next } = edge else {
            return Err(CompileError::invariant(format!("block #{owner} does not open a try region")));
        };
        let mut bounds = vec![*body];
        bounds.extend(catches.iter().copied());
        bounds.extend(*finally);
        bounds.push(*next);
        if *body != owner + 1 || bounds.windows(2).any(|w| w[0] >= w[1]) || *next > self.blocks.len() {
            return Err(CompileError::invariant(format!(
                "try region of block #{owner} is not laid out contiguously"
            )));
        }
        let range = |i: usize| bounds[i]..bounds[i + 1];
        Ok(TryLayout {
            body: range(0),
            catches: (0..catches.len()).map(|i| range(i + 1)).collect(),
            finally: finally.map(|_| range(catches.len() + 1)),
        })
    }

    /// Every block must exist and every region must be laid out by ordinal.
    pub fn validate(&self) -> Result<(), CompileError> {
        if self.blocks.is_empty() {
            return Err(CompileError::invariant("control-flow graph has no blocks"));
        }
        self.block(self.start)?;
        for (id, block) in self.blocks.iter().enumerate() {
            for succ in block.edge.successors() {
                if succ >= self.blocks.len() {
                    return Err(CompileError::invariant(format!(
                        "block #{id} has a {} edge to missing block #{succ}",
                        block.edge.name()
                    )));
                }
            }
            for expr in block.edge.expressions() {
                expr.access.validate()?;
            }
            match &block.edge {
                Edge::TryCatch { catches, finally, .. } => {
                    let layout = self.try_layout(id, &block.edge)?;
                    for (&c, range) in catches.iter().zip(&layout.catches) {
                        if !matches!(self.blocks[c].kind, BlockKind::Catch { .. }) {
                            return Err(CompileError::invariant(format!("block #{c} is not a catch block")));
                        }
                        debug_assert_eq!(range.start, c);
                    }
                    if let Some(f) = finally {
                        if self.blocks[*f].kind != BlockKind::Finally {
                            return Err(CompileError::invariant(format!("block #{f} is not a finally block")));
                        }
                    }
                }
                Edge::ForeachEnumeree { move_next, .. } => {
                    if *move_next != id + 1 {
                        return Err(CompileError::invariant(format!(
                            "foreach of block #{id} must advance in the following block"
                        )));
                    }
                    if !matches!(self.blocks[*move_next].edge, Edge::ForeachMoveNext { .. }) {
                        return Err(CompileError::invariant(format!(
                            "block #{move_next} does not advance an enumerator"
                        )));
                    }
                }
                Edge::ForeachMoveNext { body, next, .. } => {
                    if *body != id + 1 || *next <= *body {
                        return Err(CompileError::invariant(format!(
                            "foreach loop at block #{id} is not laid out contiguously"
                        )));
                    }
                }
                Edge::Switch { cases, next, .. } => {
                    let mut prev = id;
                    for case in cases {
                        if case.block < prev || case.block == id {
                            return Err(CompileError::invariant(format!(
                                "switch cases of block #{id} are not in layout order"
                            )));
                        }
                        prev = case.block;
                    }
                    if cases.iter().any(|c| c.block >= *next) {
                        return Err(CompileError::invariant(format!(
                            "switch case of block #{id} lies past its exit"
                        )));
                    }
                }
                _ => {}
            }
            for stmt in &block.statements {
                stmt.validate()?;
            }
        }
        Ok(())
    }
}
