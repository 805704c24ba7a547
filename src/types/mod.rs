//! The type lattice: bitmask type sets and the per-routine contexts that give their
//! bits meaning.

pub mod context;
pub mod mask;
pub mod type_ref;

pub use context::TypeRefContext;
pub use mask::{TypeRefMask, INDICES_COUNT};
pub use type_ref::{ArrayKeyHint, ArrayTypeRef, LambdaParam, LambdaTypeRef, PrimitiveTypeCode, QualifiedName, TypeRef};
