use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::context::TypeRefContext;
use super::mask::TypeRefMask;
use crate::diagnostics::CompileError;

/// Primitive type codes known to the type lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveTypeCode {
    Void,
    Null,
    Boolean,
    Long,
    Double,
    String,
    WritableString,
    Array,
    Resource,
    Callable,
}

impl fmt::Display for PrimitiveTypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimitiveTypeCode::Void => "void",
            PrimitiveTypeCode::Null => "null",
            PrimitiveTypeCode::Boolean => "bool",
            PrimitiveTypeCode::Long => "int",
            PrimitiveTypeCode::Double => "float",
            PrimitiveTypeCode::String => "string",
            PrimitiveTypeCode::WritableString => "string!",
            PrimitiveTypeCode::Array => "array",
            PrimitiveTypeCode::Resource => "resource",
            PrimitiveTypeCode::Callable => "callable",
        };
        f.write_str(s)
    }
}

/// Fully qualified class name. Class names compare case-insensitively and ignore a
/// leading namespace separator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct QualifiedName(String);

impl QualifiedName {
    pub fn new(name: impl AsRef<str>) -> Self {
        QualifiedName(name.as_ref().trim_start_matches('\\').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last namespace segment.
    pub fn short_name(&self) -> &str {
        self.0.rsplit('\\').next().unwrap_or(&self.0)
    }

    pub fn matches(&self, name: &str) -> bool {
        self.0.eq_ignore_ascii_case(name.trim_start_matches('\\'))
    }
}

impl PartialEq for QualifiedName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for QualifiedName {}

impl Hash for QualifiedName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QualifiedName {
    fn from(s: &str) -> Self {
        QualifiedName::new(s)
    }
}

/// Statically known array key, used as a key-set hint on array types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArrayKeyHint {
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayTypeRef {
    /// Element types, against the owning context. `ANY` when unknown.
    pub element: TypeRefMask,
    #[serde(default)]
    pub keys: Option<Vec<ArrayKeyHint>>,
}

impl PartialEq for ArrayTypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.element == other.element
    }
}

impl Eq for ArrayTypeRef {}

impl Hash for ArrayTypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.element.hash(state);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaParam {
    pub name: String,
    pub mask: TypeRefMask,
    #[serde(default)]
    pub by_ref: bool,
    #[serde(default)]
    pub variadic: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaTypeRef {
    pub return_type: TypeRefMask,
    pub signature: Vec<LambdaParam>,
}

impl PartialEq for LambdaTypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.return_type == other.return_type
            && self.signature.len() == other.signature.len()
            && self.signature.iter().zip(&other.signature).all(|(a, b)| a.name == b.name)
    }
}

impl Eq for LambdaTypeRef {}

impl Hash for LambdaTypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.return_type.hash(state);
        for p in &self.signature {
            p.name.hash(state);
        }
    }
}

/// A type descriptor interned by a [`TypeRefContext`]. Descriptors are value-like and
/// context-independent except for the nested masks of arrays and lambdas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeRef {
    Primitive(PrimitiveTypeCode),
    Class(QualifiedName),
    Array(ArrayTypeRef),
    Lambda(LambdaTypeRef),
}

impl TypeRef {
    /// Primitive descriptor; the `Array` code is normalized to an array of unknown elements.
    pub fn primitive(code: PrimitiveTypeCode) -> TypeRef {
        match code {
            PrimitiveTypeCode::Array => TypeRef::array(TypeRefMask::ANY),
            code => TypeRef::Primitive(code),
        }
    }

    pub fn class(name: impl Into<QualifiedName>) -> TypeRef {
        TypeRef::Class(name.into())
    }

    pub fn array(element: TypeRefMask) -> TypeRef {
        TypeRef::Array(ArrayTypeRef { element, keys: None })
    }

    pub fn lambda(return_type: TypeRefMask, signature: Vec<LambdaParam>) -> TypeRef {
        TypeRef::Lambda(LambdaTypeRef { return_type, signature })
    }

    pub fn is_object(&self) -> bool {
        matches!(self, TypeRef::Class(_) | TypeRef::Lambda(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeRef::Array(_))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeRef::Primitive(_))
    }

    pub fn is_lambda(&self) -> bool {
        matches!(self, TypeRef::Lambda(_))
    }

    pub fn type_code(&self) -> Option<PrimitiveTypeCode> {
        match self {
            TypeRef::Primitive(code) => Some(*code),
            TypeRef::Array(_) => Some(PrimitiveTypeCode::Array),
            _ => None,
        }
    }

    pub fn class_name(&self) -> Option<&QualifiedName> {
        match self {
            TypeRef::Class(name) => Some(name),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Result<TypeRefMask, CompileError> {
        match self {
            TypeRef::Array(array) => Ok(array.element),
            other => Err(CompileError::invariant(format!(
                "element type requested of non-array type `{other}`"
            ))),
        }
    }

    pub fn lambda_return(&self) -> Result<TypeRefMask, CompileError> {
        match self {
            TypeRef::Lambda(lambda) => Ok(lambda.return_type),
            other => Err(CompileError::invariant(format!(
                "lambda return type requested of `{other}`"
            ))),
        }
    }

    pub fn lambda_signature(&self) -> Result<&[LambdaParam], CompileError> {
        match self {
            TypeRef::Lambda(lambda) => Ok(&lambda.signature),
            other => Err(CompileError::invariant(format!(
                "lambda signature requested of `{other}`"
            ))),
        }
    }

    /// Copy of this descriptor whose nested masks are expressed against `target`
    /// instead of `source`.
    pub fn transfer(&self, source: &TypeRefContext, target: &TypeRefContext) -> TypeRef {
        match self {
            TypeRef::Primitive(_) | TypeRef::Class(_) => self.clone(),
            TypeRef::Array(array) => TypeRef::Array(ArrayTypeRef {
                element: target.add_to_context(source, array.element),
                keys: array.keys.clone(),
            }),
            TypeRef::Lambda(lambda) => TypeRef::Lambda(LambdaTypeRef {
                return_type: target.add_to_context(source, lambda.return_type),
                signature: lambda
                    .signature
                    .iter()
                    .map(|p| LambdaParam {
                        mask: target.add_to_context(source, p.mask),
                        ..p.clone()
                    })
                    .collect(),
            }),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Primitive(code) => write!(f, "{code}"),
            TypeRef::Class(name) => write!(f, "{name}"),
            TypeRef::Array(_) => write!(f, "array"),
            TypeRef::Lambda(lambda) => {
                write!(f, "Closure(")?;
                for (i, p) in lambda.signature.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}${}", if p.by_ref { "&" } else { "" }, p.name)?;
                }
                write!(f, ")")
            }
        }
    }
}
