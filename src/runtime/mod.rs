//! Runtime value ABI: the boxed value family, the operator semantics the generated code
//! falls back to, and the helper catalogue the code generator resolves calls against.

pub mod array;
pub mod convert;
pub mod enumerator;
pub mod generator;
pub mod helpers;
pub mod host;
pub mod library;
pub mod object;
pub mod ops;
pub mod slot;
pub mod value;

use std::fmt;

use thiserror::Error;

pub use array::{ArrayKey, PhpArray};
pub use enumerator::{Enumerator, EnumeratorRef};
pub use generator::{GeneratorFrame, GeneratorState};
pub use host::RuntimeHost;
pub use library::{HelperDef, HelperFn, HelperLibrary};
pub use object::{ObjectRef, PhpObject};
pub use slot::{CallSiteFlags, CallSiteKind, CallSiteShape, Delegate, Slot};
pub use value::{PhpAlias, PhpNumber, PhpString, PhpValue};

use crate::types::QualifiedName;

/// A thrown object. Only instances of `Throwable` classes are ever wrapped.
#[derive(Clone)]
pub struct PhpException(pub ObjectRef);

impl PhpException {
    pub fn new(class: impl AsRef<str>, message: impl Into<String>) -> Self {
        let obj = PhpObject::with_props(
            QualifiedName::new(class),
            [
                ("message".to_string(), PhpValue::String(message.into())),
                ("code".to_string(), PhpValue::Long(0)),
            ],
        );
        PhpException(obj)
    }

    pub fn class(&self) -> &QualifiedName {
        &self.0.class
    }

    pub fn message(&self) -> String {
        match self.0.get("message") {
            Some(v) => convert::to_string_quiet(&v),
            None => String::new(),
        }
    }
}

impl fmt::Debug for PhpException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.0.class, self.message())
    }
}

impl fmt::Display for PhpException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.0.class, self.message())
    }
}

/// Abnormal completion of generated code.
#[derive(Debug, Clone, Error)]
pub enum Fault {
    /// A language-level exception; catchable by handlers whose filter matches its class.
    #[error("Uncaught {0}")]
    Thrown(PhpException),

    /// Script termination through `exit`. Only the termination filter sees it.
    #[error("exit({0})")]
    Exit(i64),

    /// A defect in the generated code or the evaluator. Never catchable.
    #[error("internal runtime error: {0}")]
    Internal(String),
}

impl Fault {
    pub fn throw(class: &str, message: impl Into<String>) -> Self {
        Fault::Thrown(PhpException::new(class, message))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Fault::throw("Error", message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Fault::throw("TypeError", message)
    }

    pub fn arithmetic_error(message: impl Into<String>) -> Self {
        Fault::throw("ArithmeticError", message)
    }

    pub fn division_by_zero(message: impl Into<String>) -> Self {
        Fault::throw("DivisionByZeroError", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Fault::Internal(message.into())
    }

    /// Class of the thrown object, if this is a language-level exception.
    pub fn thrown_class(&self) -> Option<&QualifiedName> {
        match self {
            Fault::Thrown(ex) => Some(ex.class()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_message() {
        let fault = Fault::division_by_zero("Division by zero");
        assert_eq!(fault.to_string(), "Uncaught DivisionByZeroError: Division by zero");
        assert_eq!(fault.thrown_class().map(|c| c.as_str()), Some("DivisionByZeroError"));
        assert!(Fault::Exit(3).thrown_class().is_none());
    }
}
