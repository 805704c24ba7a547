use serde::{Deserialize, Serialize};

use super::expr::{BoundExpr, ExprKind, VariableName};
use crate::diagnostics::CompileError;
use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// Expression evaluated for its effect; a bare `yield` lands here.
    Expr(BoundExpr),
    Echo(Vec<BoundExpr>),
    Unset(Vec<BoundExpr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundStmt {
    pub kind: StmtKind,
    #[serde(default)]
    pub span: Span,
}

impl BoundStmt {
    pub fn new(kind: StmtKind) -> Self {
        BoundStmt { kind, span: Span::dummy() }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn expressions(&self) -> Vec<&BoundExpr> {
        match &self.kind {
            StmtKind::Expr(e) => vec![e],
            StmtKind::Echo(es) | StmtKind::Unset(es) => es.iter().collect(),
        }
    }

    /// The yield this statement suspends at, when it is a statement-level yield:
    /// `yield v;` or `$x = yield v;`.
    pub fn statement_yield(&self) -> Option<&BoundExpr> {
        let StmtKind::Expr(e) = &self.kind else {
            return None;
        };
        match &e.kind {
            ExprKind::Yield { .. } => Some(e),
            ExprKind::Assign { target, value }
                if matches!(target.kind, ExprKind::Variable(VariableName::Local(_)))
                    && matches!(value.kind, ExprKind::Yield { .. }) =>
            {
                Some(value)
            }
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), CompileError> {
        for e in self.expressions() {
            let mut result = Ok(());
            e.walk(&mut |sub| {
                if result.is_ok() {
                    result = sub.access.validate();
                }
            });
            result?;
        }
        Ok(())
    }
}
