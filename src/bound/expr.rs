use std::fmt;

use serde::{Deserialize, Serialize};

use super::access::AccessFlags;
use crate::span::Span;
use crate::types::{QualifiedName, TypeRefMask};

/// Compile-time constant attached to an expression by the binder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
}

impl ConstValue {
    pub fn as_long(&self) -> Option<i64> {
        match self {
            ConstValue::Long(l) => Some(*l),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConstValue::Null)
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Null => write!(f, "null"),
            ConstValue::Bool(b) => write!(f, "{b}"),
            ConstValue::Long(l) => write!(f, "{l}"),
            ConstValue::Double(d) => write!(f, "{d:?}"),
            ConstValue::String(s) => write!(f, "{s:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Concat,
    Eq,
    NotEq,
    Identical,
    NotIdentical,
    Lt,
    Gt,
    Le,
    Ge,
    Spaceship,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Concat => ".",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Identical => "===",
            BinaryOp::NotIdentical => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Spaceship => "<=>",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Xor => "xor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncDecKind {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl IncDecKind {
    pub fn is_increment(self) -> bool {
        matches!(self, IncDecKind::PreInc | IncDecKind::PostInc)
    }

    pub fn is_postfix(self) -> bool {
        matches!(self, IncDecKind::PostInc | IncDecKind::PostDec)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastKind {
    Long,
    Double,
    String,
    Bool,
    Array,
    Object,
}

/// A variable reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VariableName {
    /// Named local (without the `$`).
    Local(String),
    /// `$$expr`: the variable whose name the expression evaluates to.
    Indirect(Box<BoundExpr>),
    This,
}

/// A field or method name, static or computed at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemberName {
    Static(String),
    Dynamic(Box<BoundExpr>),
}

impl MemberName {
    pub fn as_static(&self) -> Option<&str> {
        match self {
            MemberName::Static(s) => Some(s),
            MemberName::Dynamic(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClassRef {
    Named(QualifiedName),
    /// Class given by a runtime value (a class-name string or an object).
    Expr(Box<BoundExpr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallTarget {
    Function { name: String },
    /// `$f(...)` where `$f` holds a function name.
    FunctionExpr { callee: Box<BoundExpr> },
    Method { instance: Box<BoundExpr>, name: MemberName },
    StaticMethod { class: ClassRef, name: MemberName },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayItemInit {
    #[serde(default)]
    pub key: Option<BoundExpr>,
    pub value: BoundExpr,
    #[serde(default)]
    pub by_ref: bool,
}

/// One slot of a `list()`/`[...]` destructuring target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    #[serde(default)]
    pub key: Option<BoundExpr>,
    /// `None` for a skipped position (`[, $b] = ...`).
    #[serde(default)]
    pub target: Option<BoundExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(ConstValue),
    Variable(VariableName),
    /// `$a[index]`; a missing index is the append form `$a[]`.
    ArrayItem {
        array: Box<BoundExpr>,
        #[serde(default)]
        index: Option<Box<BoundExpr>>,
    },
    Field {
        instance: Box<BoundExpr>,
        name: MemberName,
    },
    List {
        items: Vec<ListItem>,
    },
    Binary {
        op: BinaryOp,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<BoundExpr>,
    },
    Assign {
        target: Box<BoundExpr>,
        value: Box<BoundExpr>,
    },
    AssignRef {
        target: Box<BoundExpr>,
        value: Box<BoundExpr>,
    },
    CompoundAssign {
        op: BinaryOp,
        target: Box<BoundExpr>,
        value: Box<BoundExpr>,
    },
    IncDec {
        kind: IncDecKind,
        target: Box<BoundExpr>,
    },
    /// `c ? a : b`, or `c ?: b` when `if_true` is missing.
    Conditional {
        condition: Box<BoundExpr>,
        #[serde(default)]
        if_true: Option<Box<BoundExpr>>,
        if_false: Box<BoundExpr>,
    },
    Coalesce {
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },
    ArrayLiteral {
        items: Vec<ArrayItemInit>,
    },
    Call {
        target: CallTarget,
        args: Vec<BoundExpr>,
    },
    New {
        class: QualifiedName,
        args: Vec<BoundExpr>,
    },
    Cast {
        kind: CastKind,
        operand: Box<BoundExpr>,
    },
    Isset {
        targets: Vec<BoundExpr>,
    },
    Empty {
        target: Box<BoundExpr>,
    },
    InstanceOf {
        operand: Box<BoundExpr>,
        class: QualifiedName,
    },
    Yield {
        #[serde(default)]
        key: Option<Box<BoundExpr>>,
        #[serde(default)]
        value: Option<Box<BoundExpr>>,
    },
}

/// Expression annotated by binding and flow analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundExpr {
    pub kind: ExprKind,
    #[serde(default)]
    pub access: AccessFlags,
    /// Inferred types, interpreted against the owning routine's context.
    #[serde(default = "any_mask")]
    pub mask: TypeRefMask,
    #[serde(default)]
    pub constant: Option<ConstValue>,
    #[serde(default)]
    pub span: Span,
}

fn any_mask() -> TypeRefMask {
    TypeRefMask::ANY
}

impl BoundExpr {
    pub fn new(kind: ExprKind, mask: TypeRefMask) -> Self {
        let constant = match &kind {
            ExprKind::Literal(c) => Some(c.clone()),
            _ => None,
        };
        BoundExpr { kind, access: AccessFlags::READ, mask, constant, span: Span::dummy() }
    }

    pub fn with_access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_constant(mut self, constant: ConstValue) -> Self {
        self.constant = Some(constant);
        self
    }

    /// Whether the expression denotes a storage location.
    pub fn is_place(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Variable(_) | ExprKind::ArrayItem { .. } | ExprKind::Field { .. } | ExprKind::List { .. }
        )
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(&self.constant, Some(ConstValue::Null))
    }

    pub fn local_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Variable(VariableName::Local(name)) => Some(name),
            _ => None,
        }
    }

    /// Visits the expression and every sub-expression, parents first.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a BoundExpr)) {
        f(self);
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Variable(VariableName::Local(_) | VariableName::This) => {}
            ExprKind::Variable(VariableName::Indirect(e)) => e.walk(f),
            ExprKind::ArrayItem { array, index } => {
                array.walk(f);
                if let Some(index) = index {
                    index.walk(f);
                }
            }
            ExprKind::Field { instance, name } => {
                instance.walk(f);
                if let MemberName::Dynamic(e) = name {
                    e.walk(f);
                }
            }
            ExprKind::List { items } => {
                for item in items {
                    if let Some(key) = &item.key {
                        key.walk(f);
                    }
                    if let Some(target) = &item.target {
                        target.walk(f);
                    }
                }
            }
            ExprKind::Binary { left, right, .. } | ExprKind::Coalesce { left, right } => {
                left.walk(f);
                right.walk(f);
            }
            ExprKind::Unary { operand, .. }
            | ExprKind::Cast { operand, .. }
            | ExprKind::InstanceOf { operand, .. } => operand.walk(f),
            ExprKind::Assign { target, value }
            | ExprKind::AssignRef { target, value }
            | ExprKind::CompoundAssign { target, value, .. } => {
                target.walk(f);
                value.walk(f);
            }
            ExprKind::IncDec { target, .. } | ExprKind::Empty { target } => target.walk(f),
            ExprKind::Conditional { condition, if_true, if_false } => {
                condition.walk(f);
                if let Some(t) = if_true {
                    t.walk(f);
                }
                if_false.walk(f);
            }
            ExprKind::ArrayLiteral { items } => {
                for item in items {
                    if let Some(key) = &item.key {
                        key.walk(f);
                    }
                    item.value.walk(f);
                }
            }
            ExprKind::Call { target, args } => {
                match target {
                    CallTarget::Function { .. } => {}
                    CallTarget::FunctionExpr { callee } => callee.walk(f),
                    CallTarget::Method { instance, name } => {
                        instance.walk(f);
                        if let MemberName::Dynamic(e) = name {
                            e.walk(f);
                        }
                    }
                    CallTarget::StaticMethod { class, name } => {
                        if let ClassRef::Expr(e) = class {
                            e.walk(f);
                        }
                        if let MemberName::Dynamic(e) = name {
                            e.walk(f);
                        }
                    }
                }
                for arg in args {
                    arg.walk(f);
                }
            }
            ExprKind::New { args, .. } => {
                for arg in args {
                    arg.walk(f);
                }
            }
            ExprKind::Isset { targets } => {
                for t in targets {
                    t.walk(f);
                }
            }
            ExprKind::Yield { key, value } => {
                if let Some(k) = key {
                    k.walk(f);
                }
                if let Some(v) = value {
                    v.walk(f);
                }
            }
        }
    }

    pub fn contains_yield(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| found |= matches!(e.kind, ExprKind::Yield { .. }));
        found
    }
}
