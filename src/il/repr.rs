use std::fmt;

/// Runtime representation of a value on the evaluation stack or in a local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Repr {
    Void,
    Bool,
    Int32,
    Long,
    Double,
    /// Immutable string.
    String,
    /// Writable string buffer.
    PhpString,
    /// Integer-or-float box.
    Number,
    /// Fully generic tagged union.
    Value,
    Array,
    Alias,
    Object,
    Enumerator,
    Delegate,
    TypeHandle,
}

impl Repr {
    /// Representations whose values are handles that may be the null reference.
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            Repr::Array | Repr::Alias | Repr::Object | Repr::Enumerator | Repr::Delegate | Repr::TypeHandle
        )
    }

    pub fn is_native_numeric(self) -> bool {
        matches!(self, Repr::Int32 | Repr::Long | Repr::Double)
    }

    pub fn is_string(self) -> bool {
        matches!(self, Repr::String | Repr::PhpString)
    }

    pub fn name(self) -> &'static str {
        match self {
            Repr::Void => "void",
            Repr::Bool => "bool",
            Repr::Int32 => "int32",
            Repr::Long => "long",
            Repr::Double => "double",
            Repr::String => "string",
            Repr::PhpString => "phpstring",
            Repr::Number => "number",
            Repr::Value => "value",
            Repr::Array => "array",
            Repr::Alias => "alias",
            Repr::Object => "object",
            Repr::Enumerator => "enumerator",
            Repr::Delegate => "delegate",
            Repr::TypeHandle => "typehandle",
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Comma-separated parameter list, as printed in helper signatures.
pub fn signature(params: &[Repr]) -> String {
    params.iter().map(|r| r.name()).collect::<Vec<_>>().join(", ")
}
