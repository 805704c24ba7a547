use std::fmt;

use super::repr::{signature, Repr};
use crate::span::Span;
use crate::types::QualifiedName;

/// Opaque branch target handed out by an [`AssemblyWriter`](super::AssemblyWriter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub(crate) u32);

impl Label {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub(crate) u32);

impl LocalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolved handle of a runtime helper overload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelperRef {
    pub id: u32,
    pub name: &'static str,
    pub params: &'static [Repr],
    pub ret: Repr,
}

impl fmt::Display for HelperRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) -> {}", self.name, signature(self.params), self.ret)
    }
}

/// Which faults a catch handler accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatchFilter {
    /// Thrown objects that are instances of any of the classes.
    Classes(Vec<QualifiedName>),
    /// The termination signal raised by `exit`. Nothing else matches it.
    ScriptDied,
    /// Any thrown object.
    Any,
}

/// Fields of the generator object backing a generator routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenField {
    /// Resumption index (`int32`).
    State,
    Current,
    Key,
    Sent,
    Return,
    /// Set while a yield unwinds to the return label (`bool`).
    Suspending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Nop,
    LdNull,
    LdBool(bool),
    LdI4(i32),
    LdI8(i64),
    LdR8(f64),
    LdStr(String),
    LdLoc(LocalId),
    StLoc(LocalId),
    LdArg(u16),
    StArg(u16),
    LdThis,
    Dup,
    Pop,

    Add,
    Sub,
    Mul,
    Neg,
    And,
    Or,
    Xor,
    Not,
    Ceq,
    Clt,
    Cgt,
    /// Less-than, or unordered for floats.
    CltUn,
    /// Greater-than, or unordered for floats.
    CgtUn,
    ConvI4,
    ConvI8,
    ConvR8,
    /// Non-zero test of an int32, long or double.
    ConvBool,

    Br(Label),
    BrTrue(Label),
    BrFalse(Label),
    /// Pops an int32 and jumps to `targets[i]`; out of range falls through.
    Switch(Vec<Label>),
    /// Branch that exits protected regions, running their finally handlers.
    Leave(Label),
    Ret,
    Throw,
    Rethrow,
    EndFinally,

    BeginTry,
    BeginCatch(CatchFilter),
    BeginFinally,
    EndTry,

    Call(HelperRef),
    /// Direct call of a compiled routine by name; arguments are values or aliases.
    CallRoutine { name: String, argc: u16 },
    /// Virtual call by name on the receiver under the arguments.
    CallMethod { name: String, argc: u16 },
    NewObj { class: QualifiedName, argc: u16 },
    /// Invokes the delegate under the `argc` operands.
    InvokeDelegate { argc: u16 },
    LdSite(u32),
    StSite(u32),

    LdGenerator,
    LdGenField(GenField),
    StGenField(GenField),

    LdTypeHandle(QualifiedName),
    MarkLabel(Label),
    SequencePoint(Span),
}

impl Instr {
    pub fn branch_targets(&self) -> Vec<Label> {
        match self {
            Instr::Br(l) | Instr::BrTrue(l) | Instr::BrFalse(l) | Instr::Leave(l) => vec![*l],
            Instr::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Nop => write!(f, "nop"),
            Instr::LdNull => write!(f, "ldnull"),
            Instr::LdBool(b) => write!(f, "ldc.bool {b}"),
            Instr::LdI4(v) => write!(f, "ldc.i4 {v}"),
            Instr::LdI8(v) => write!(f, "ldc.i8 {v}"),
            Instr::LdR8(v) => write!(f, "ldc.r8 {v:?}"),
            Instr::LdStr(s) => write!(f, "ldstr {s:?}"),
            Instr::LdLoc(l) => write!(f, "ldloc {l}"),
            Instr::StLoc(l) => write!(f, "stloc {l}"),
            Instr::LdArg(i) => write!(f, "ldarg {i}"),
            Instr::StArg(i) => write!(f, "starg {i}"),
            Instr::LdThis => write!(f, "ldthis"),
            Instr::Dup => write!(f, "dup"),
            Instr::Pop => write!(f, "pop"),
            Instr::Add => write!(f, "add"),
            Instr::Sub => write!(f, "sub"),
            Instr::Mul => write!(f, "mul"),
            Instr::Neg => write!(f, "neg"),
            Instr::And => write!(f, "and"),
            Instr::Or => write!(f, "or"),
            Instr::Xor => write!(f, "xor"),
            Instr::Not => write!(f, "not"),
            Instr::Ceq => write!(f, "ceq"),
            Instr::Clt => write!(f, "clt"),
            Instr::Cgt => write!(f, "cgt"),
            Instr::CltUn => write!(f, "clt.un"),
            Instr::CgtUn => write!(f, "cgt.un"),
            Instr::ConvI4 => write!(f, "conv.i4"),
            Instr::ConvI8 => write!(f, "conv.i8"),
            Instr::ConvR8 => write!(f, "conv.r8"),
            Instr::ConvBool => write!(f, "conv.bool"),
            Instr::Br(l) => write!(f, "br {l}"),
            Instr::BrTrue(l) => write!(f, "brtrue {l}"),
            Instr::BrFalse(l) => write!(f, "brfalse {l}"),
            Instr::Switch(targets) => {
                let names: Vec<String> = targets.iter().map(|l| l.to_string()).collect();
                write!(f, "switch ({})", names.join(", "))
            }
            Instr::Leave(l) => write!(f, "leave {l}"),
            Instr::Ret => write!(f, "ret"),
            Instr::Throw => write!(f, "throw"),
            Instr::Rethrow => write!(f, "rethrow"),
            Instr::EndFinally => write!(f, "endfinally"),
            Instr::BeginTry => write!(f, ".try {{"),
            Instr::BeginCatch(CatchFilter::Classes(classes)) => {
                let names: Vec<&str> = classes.iter().map(|c| c.as_str()).collect();
                write!(f, "}} catch ({}) {{", names.join(" | "))
            }
            Instr::BeginCatch(CatchFilter::ScriptDied) => write!(f, "}} catch (<exit>) {{"),
            Instr::BeginCatch(CatchFilter::Any) => write!(f, "}} catch (*) {{"),
            Instr::BeginFinally => write!(f, "}} finally {{"),
            Instr::EndTry => write!(f, "}}"),
            Instr::Call(h) => write!(f, "call {h}"),
            Instr::CallRoutine { name, argc } => write!(f, "call.routine {name}/{argc}"),
            Instr::CallMethod { name, argc } => write!(f, "callvirt {name}/{argc}"),
            Instr::NewObj { class, argc } => write!(f, "newobj {class}/{argc}"),
            Instr::InvokeDelegate { argc } => write!(f, "invoke/{argc}"),
            Instr::LdSite(k) => write!(f, "ldsite {k}"),
            Instr::StSite(k) => write!(f, "stsite {k}"),
            Instr::LdGenerator => write!(f, "ldgen"),
            Instr::LdGenField(field) => write!(f, "ldgenfld {field:?}"),
            Instr::StGenField(field) => write!(f, "stgenfld {field:?}"),
            Instr::LdTypeHandle(q) => write!(f, "ldtoken {q}"),
            Instr::MarkLabel(l) => write!(f, "{l}:"),
            Instr::SequencePoint(span) => write!(f, ".line {}..{}", span.start, span.end),
        }
    }
}
