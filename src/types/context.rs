use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::mask::{TypeRefMask, INDICES_COUNT};
use super::type_ref::{PrimitiveTypeCode, QualifiedName, TypeRef};
use crate::diagnostics::CompileError;

/// Interned types and the membership bitmasks derived from them.
#[derive(Debug, Default, Clone)]
struct Tables {
    types: Vec<TypeRef>,
    lookup: HashMap<TypeRef, usize>,
    object: u64,
    array: u64,
    long: u64,
    double: u64,
    boolean: u64,
    string: u64,
    writable_string: u64,
    lambda: u64,
    primitive: u64,
    null: u64,
    saturated: bool,
}

impl Tables {
    fn push(&mut self, t: TypeRef) -> usize {
        let index = self.types.len();
        let bit = 1u64 << index;
        if t.is_object() {
            self.object |= bit;
        }
        if t.is_lambda() {
            self.lambda |= bit;
        }
        if t.is_array() {
            self.array |= bit;
        }
        if let TypeRef::Primitive(code) = &t {
            self.primitive |= bit;
            match code {
                PrimitiveTypeCode::Long => self.long |= bit,
                PrimitiveTypeCode::Double => self.double |= bit,
                PrimitiveTypeCode::Boolean => self.boolean |= bit,
                PrimitiveTypeCode::String => self.string |= bit,
                PrimitiveTypeCode::WritableString => {
                    self.string |= bit;
                    self.writable_string |= bit;
                }
                PrimitiveTypeCode::Null => self.null |= bit,
                _ => {}
            }
        }
        self.lookup.insert(t.clone(), index);
        self.types.push(t);
        index
    }
}

/// Per-routine table giving meaning to the bits of a [`TypeRefMask`].
///
/// Interning goes through `&self`: a context is owned by exactly one routine and used
/// from one thread, while the code generator keeps interning result types as it emits.
#[derive(Debug, Serialize, Deserialize)]
#[serde(try_from = "ContextData", into = "ContextData")]
pub struct TypeRefContext {
    tables: RefCell<Tables>,
    self_type: Option<QualifiedName>,
    parent_type: Option<QualifiedName>,
    self_is_final: bool,
    static_mask: Cell<Option<TypeRefMask>>,
}

#[derive(Serialize, Deserialize)]
struct ContextData {
    types: Vec<TypeRef>,
    #[serde(default)]
    self_type: Option<QualifiedName>,
    #[serde(default)]
    parent_type: Option<QualifiedName>,
    #[serde(default)]
    self_is_final: bool,
}

impl TryFrom<ContextData> for TypeRefContext {
    type Error = String;

    fn try_from(data: ContextData) -> Result<Self, String> {
        if data.types.len() > INDICES_COUNT {
            return Err(format!(
                "type context holds {} types, at most {INDICES_COUNT} are addressable",
                data.types.len()
            ));
        }
        let ctx = TypeRefContext::new(data.self_type, data.parent_type, data.self_is_final);
        {
            let mut tables = ctx.tables.borrow_mut();
            for t in data.types {
                if tables.lookup.contains_key(&t) {
                    return Err(format!("type `{t}` is interned twice"));
                }
                tables.push(t);
            }
        }
        Ok(ctx)
    }
}

impl From<TypeRefContext> for ContextData {
    fn from(ctx: TypeRefContext) -> Self {
        ContextData {
            types: ctx.tables.into_inner().types,
            self_type: ctx.self_type,
            parent_type: ctx.parent_type,
            self_is_final: ctx.self_is_final,
        }
    }
}

impl Clone for TypeRefContext {
    fn clone(&self) -> Self {
        TypeRefContext {
            tables: RefCell::new(self.tables.borrow().clone()),
            self_type: self.self_type.clone(),
            parent_type: self.parent_type.clone(),
            self_is_final: self.self_is_final,
            static_mask: Cell::new(self.static_mask.get()),
        }
    }
}

impl Default for TypeRefContext {
    fn default() -> Self {
        TypeRefContext::new(None, None, false)
    }
}

impl TypeRefContext {
    pub fn new(
        self_type: Option<QualifiedName>,
        parent_type: Option<QualifiedName>,
        self_is_final: bool,
    ) -> Self {
        TypeRefContext {
            tables: RefCell::new(Tables::default()),
            self_type,
            parent_type,
            self_is_final,
            static_mask: Cell::new(None),
        }
    }

    /// Context for a method body of `class`.
    pub fn for_class(class: QualifiedName, parent: Option<QualifiedName>, is_final: bool) -> Self {
        TypeRefContext::new(Some(class), parent, is_final)
    }

    pub fn self_type(&self) -> Option<&QualifiedName> {
        self.self_type.as_ref()
    }

    pub fn parent_type(&self) -> Option<&QualifiedName> {
        self.parent_type.as_ref()
    }

    pub fn types_count(&self) -> usize {
        self.tables.borrow().types.len()
    }

    /// Whether some type could not be interned and collapsed to the any-type mask.
    pub fn is_saturated(&self) -> bool {
        self.tables.borrow().saturated
    }

    pub fn type_at(&self, index: usize) -> Option<TypeRef> {
        self.tables.borrow().types.get(index).cloned()
    }

    /// Descriptors whose bits are set in `mask`; empty for the any-type mask.
    pub fn get_types(&self, mask: TypeRefMask) -> Vec<TypeRef> {
        let tables = self.tables.borrow();
        mask.indices().filter_map(|i| tables.types.get(i).cloned()).collect()
    }

    fn intern(&self, t: TypeRef) -> Option<usize> {
        let mut tables = self.tables.borrow_mut();
        if let Some(&index) = tables.lookup.get(&t) {
            return Some(index);
        }
        if tables.types.len() >= INDICES_COUNT {
            if !tables.saturated {
                tracing::warn!(
                    ty = %t,
                    "type context saturated, further types collapse to any-type"
                );
            }
            tables.saturated = true;
            return None;
        }
        Some(tables.push(t))
    }

    /// Single-type mask for `t`, interning it if new. The subclass flag is only set for
    /// object types. Once the context is full, novel types yield the any-type mask.
    pub fn get_type_mask(&self, t: TypeRef, includes_subclasses: bool) -> TypeRefMask {
        let is_object = t.is_object();
        match self.intern(t) {
            Some(index) => TypeRefMask::from_index(index).with_subclasses(includes_subclasses && is_object),
            None => TypeRefMask::ANY,
        }
    }

    /// `mask`, owned by `other`, translated into this context. The any-type and void
    /// masks pass through untouched and nothing is interned for them.
    pub fn add_to_context(&self, other: &TypeRefContext, mask: TypeRefMask) -> TypeRefMask {
        if std::ptr::eq(self, other) || mask.is_any_type() || mask.is_uninitialized() {
            return mask;
        }
        let mut data = 0u64;
        for index in mask.indices() {
            let Some(foreign) = other.type_at(index) else {
                return mask.with_data(TypeRefMask::ANY.data());
            };
            let local = foreign.transfer(other, self);
            let translated = self.get_type_mask(local, false);
            if translated.is_any_type() {
                return mask.with_data(TypeRefMask::ANY.data());
            }
            data |= translated.data();
        }
        mask.with_data(data)
    }

    fn only(&self, mask: TypeRefMask, category: u64) -> bool {
        let data = mask.data();
        !mask.is_any_type() && data != 0 && data & !category == 0
    }

    fn can(&self, mask: TypeRefMask, category: u64) -> bool {
        mask.is_any_type() || mask.data() & category != 0
    }

    pub fn is_long(&self, mask: TypeRefMask) -> bool {
        self.only(mask, self.tables.borrow().long)
    }

    pub fn is_double(&self, mask: TypeRefMask) -> bool {
        self.only(mask, self.tables.borrow().double)
    }

    /// Only integers and floats.
    pub fn is_number(&self, mask: TypeRefMask) -> bool {
        let t = self.tables.borrow();
        self.only(mask, t.long | t.double)
    }

    pub fn is_boolean(&self, mask: TypeRefMask) -> bool {
        self.only(mask, self.tables.borrow().boolean)
    }

    /// Only strings, writable or not.
    pub fn is_string(&self, mask: TypeRefMask) -> bool {
        self.only(mask, self.tables.borrow().string)
    }

    pub fn is_writable_string(&self, mask: TypeRefMask) -> bool {
        self.only(mask, self.tables.borrow().writable_string)
    }

    pub fn is_array(&self, mask: TypeRefMask) -> bool {
        self.only(mask, self.tables.borrow().array)
    }

    pub fn is_object(&self, mask: TypeRefMask) -> bool {
        self.only(mask, self.tables.borrow().object)
    }

    pub fn is_lambda(&self, mask: TypeRefMask) -> bool {
        self.only(mask, self.tables.borrow().lambda)
    }

    pub fn is_null(&self, mask: TypeRefMask) -> bool {
        self.only(mask, self.tables.borrow().null)
    }

    pub fn is_primitive(&self, mask: TypeRefMask) -> bool {
        self.only(mask, self.tables.borrow().primitive)
    }

    pub fn can_be_long(&self, mask: TypeRefMask) -> bool {
        self.can(mask, self.tables.borrow().long)
    }

    pub fn can_be_double(&self, mask: TypeRefMask) -> bool {
        self.can(mask, self.tables.borrow().double)
    }

    pub fn can_be_boolean(&self, mask: TypeRefMask) -> bool {
        self.can(mask, self.tables.borrow().boolean)
    }

    pub fn can_be_string(&self, mask: TypeRefMask) -> bool {
        self.can(mask, self.tables.borrow().string)
    }

    pub fn can_be_array(&self, mask: TypeRefMask) -> bool {
        self.can(mask, self.tables.borrow().array)
    }

    pub fn can_be_object(&self, mask: TypeRefMask) -> bool {
        self.can(mask, self.tables.borrow().object)
    }

    pub fn can_be_null(&self, mask: TypeRefMask) -> bool {
        self.can(mask, self.tables.borrow().null)
    }

    pub fn get_primitive_type_mask(&self, code: PrimitiveTypeCode) -> TypeRefMask {
        self.get_type_mask(TypeRef::primitive(code), false)
    }

    pub fn get_null_type_mask(&self) -> TypeRefMask {
        self.get_primitive_type_mask(PrimitiveTypeCode::Null)
    }

    pub fn get_boolean_type_mask(&self) -> TypeRefMask {
        self.get_primitive_type_mask(PrimitiveTypeCode::Boolean)
    }

    pub fn get_long_type_mask(&self) -> TypeRefMask {
        self.get_primitive_type_mask(PrimitiveTypeCode::Long)
    }

    pub fn get_double_type_mask(&self) -> TypeRefMask {
        self.get_primitive_type_mask(PrimitiveTypeCode::Double)
    }

    pub fn get_number_type_mask(&self) -> TypeRefMask {
        self.get_long_type_mask() | self.get_double_type_mask()
    }

    pub fn get_string_type_mask(&self) -> TypeRefMask {
        self.get_primitive_type_mask(PrimitiveTypeCode::String)
    }

    pub fn get_writable_string_type_mask(&self) -> TypeRefMask {
        self.get_primitive_type_mask(PrimitiveTypeCode::WritableString)
    }

    pub fn get_class_type_mask(&self, name: QualifiedName, includes_subclasses: bool) -> TypeRefMask {
        self.get_type_mask(TypeRef::Class(name), includes_subclasses)
    }

    /// Mask of arrays holding `element`.
    ///
    /// An element union is not turned into one array-of-union; every element bit gets
    /// its own array type and the results are OR-ed, so the bit count stays bounded by
    /// the element bit count.
    pub fn get_array_type_mask(&self, element: TypeRefMask) -> TypeRefMask {
        if element.is_any_type() || element.is_uninitialized() || element.is_single_type() {
            return self.get_type_mask(TypeRef::array(element), false);
        }
        let mut result = TypeRefMask::VOID;
        for index in element.indices() {
            let single = TypeRefMask::from_index(index).with_subclasses(element.includes_subclasses());
            let array = self.get_type_mask(TypeRef::array(single), false);
            if array.is_any_type() {
                return TypeRefMask::ANY;
            }
            result |= array;
        }
        result
    }

    /// Union of the element types of every array in `mask`.
    pub fn get_element_type(&self, mask: TypeRefMask) -> Result<TypeRefMask, CompileError> {
        if mask.is_any_type() {
            return Ok(TypeRefMask::ANY);
        }
        let tables = self.tables.borrow();
        let arrays = mask.data() & tables.array;
        if arrays == 0 {
            return Err(CompileError::invariant(format!(
                "element type requested of a mask without arrays ({})",
                self.display_tables(&tables, mask)
            )));
        }
        let mut result = TypeRefMask::VOID;
        for index in TypeRefMask::from_bits(arrays).indices() {
            result |= tables.types[index].element_type()?;
        }
        Ok(result)
    }

    pub fn get_self_type_mask(&self) -> TypeRefMask {
        match &self.self_type {
            Some(name) => self.get_class_type_mask(name.clone(), false),
            None => TypeRefMask::ANY,
        }
    }

    pub fn get_parent_type_mask(&self) -> TypeRefMask {
        match &self.parent_type {
            Some(name) => self.get_class_type_mask(name.clone(), false),
            None => TypeRefMask::ANY,
        }
    }

    /// Type of `static`: the enclosing class and, unless it is final, its subclasses.
    /// Resolved on first use.
    pub fn get_static_type_mask(&self) -> TypeRefMask {
        if let Some(mask) = self.static_mask.get() {
            return mask;
        }
        let mask = match &self.self_type {
            Some(name) => self.get_class_type_mask(name.clone(), !self.self_is_final),
            None => TypeRefMask::ANY,
        };
        self.static_mask.set(Some(mask));
        mask
    }

    /// Human-readable rendering such as `int|string|array<int>`.
    pub fn display(&self, mask: TypeRefMask) -> String {
        let tables = self.tables.borrow();
        self.display_tables(&tables, mask)
    }

    fn display_tables(&self, tables: &Tables, mask: TypeRefMask) -> String {
        let mut out = String::new();
        if mask.is_ref() {
            out.push('&');
        }
        if mask.is_any_type() {
            out.push_str("mixed");
            return out;
        }
        if mask.is_uninitialized() {
            out.push_str("void");
            return out;
        }
        for (n, index) in mask.indices().enumerate() {
            if n > 0 {
                out.push('|');
            }
            match tables.types.get(index) {
                Some(TypeRef::Array(array)) => {
                    let element = if array.element.is_any_type() {
                        "mixed".to_string()
                    } else {
                        self.display_tables(tables, array.element)
                    };
                    let _ = write!(out, "array<{element}>");
                }
                Some(t) => {
                    let _ = write!(out, "{t}");
                }
                None => {
                    let _ = write!(out, "#{index}");
                }
            }
        }
        if mask.includes_subclasses() {
            out.push('+');
        }
        out
    }

    /// One line per interned type, `index: type`.
    pub fn dump(&self) -> String {
        let tables = self.tables.borrow();
        let mut out = String::new();
        for (i, t) in tables.types.iter().enumerate() {
            let shown = match t {
                TypeRef::Array(_) => self.display_tables(&tables, TypeRefMask::from_index(i)),
                other => other.to_string(),
            };
            let _ = writeln!(out, "{i:>2}: {shown}");
        }
        out
    }
}
