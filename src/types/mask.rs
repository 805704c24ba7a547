use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Number of data bits, one per interned type of a [`TypeRefContext`](super::TypeRefContext).
pub const INDICES_COUNT: usize = 62;

const IS_REF_FLAG: u64 = 1 << 62;
const INCLUDES_SUBCLASSES_FLAG: u64 = 1 << 63;
const FLAGS_MASK: u64 = IS_REF_FLAG | INCLUDES_SUBCLASSES_FLAG;
const ANY_DATA: u64 = (1 << INDICES_COUNT) - 1;

/// Set of the types an expression may have at runtime, one bit per type of the owning
/// context plus two flags.
///
/// All data bits set is the "any type" value; no bits at all is "void".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeRefMask(u64);

impl TypeRefMask {
    pub const VOID: TypeRefMask = TypeRefMask(0);
    pub const ANY: TypeRefMask = TypeRefMask(ANY_DATA);

    pub const fn from_bits(bits: u64) -> Self {
        TypeRefMask(bits)
    }

    /// Mask with the single data bit `index` set.
    pub fn from_index(index: usize) -> Self {
        debug_assert!(index < INDICES_COUNT, "type index {index} out of range");
        TypeRefMask(1 << index)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Data region without the flags.
    pub const fn data(self) -> u64 {
        self.0 & ANY_DATA
    }

    pub const fn is_any_type(self) -> bool {
        self.0 & ANY_DATA == ANY_DATA
    }

    pub const fn is_void(self) -> bool {
        self.0 == 0
    }

    /// No type information, flags aside.
    pub const fn is_uninitialized(self) -> bool {
        self.data() == 0
    }

    pub const fn is_single_type(self) -> bool {
        self.data().count_ones() == 1
    }

    pub const fn type_count(self) -> u32 {
        self.data().count_ones()
    }

    pub const fn is_ref(self) -> bool {
        self.0 & IS_REF_FLAG != 0
    }

    pub const fn includes_subclasses(self) -> bool {
        self.0 & INCLUDES_SUBCLASSES_FLAG != 0
    }

    pub const fn with_ref(self, is_ref: bool) -> Self {
        if is_ref {
            TypeRefMask(self.0 | IS_REF_FLAG)
        } else {
            TypeRefMask(self.0 & !IS_REF_FLAG)
        }
    }

    pub const fn with_subclasses(self, includes: bool) -> Self {
        if includes {
            TypeRefMask(self.0 | INCLUDES_SUBCLASSES_FLAG)
        } else {
            TypeRefMask(self.0 & !INCLUDES_SUBCLASSES_FLAG)
        }
    }

    /// The flags of `self` applied to a different data region.
    pub(crate) const fn flags(self) -> u64 {
        self.0 & FLAGS_MASK
    }

    pub(crate) const fn with_data(self, data: u64) -> Self {
        TypeRefMask((data & ANY_DATA) | self.flags())
    }

    pub fn contains_index(self, index: usize) -> bool {
        index < INDICES_COUNT && self.0 & (1 << index) != 0
    }

    /// Set bit positions in ascending order; empty for the any-type mask, which carries
    /// no per-type information.
    pub fn indices(self) -> impl Iterator<Item = usize> {
        let data = if self.is_any_type() { 0 } else { self.data() };
        (0..INDICES_COUNT).filter(move |i| data & (1 << i) != 0)
    }

    /// Whether the data bits of `self` are a subset of `other`.
    pub fn is_subset_of(self, other: TypeRefMask) -> bool {
        other.is_any_type() || self.data() & !other.data() == 0
    }
}

impl BitOr for TypeRefMask {
    type Output = TypeRefMask;

    fn bitor(self, rhs: TypeRefMask) -> TypeRefMask {
        TypeRefMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for TypeRefMask {
    fn bitor_assign(&mut self, rhs: TypeRefMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for TypeRefMask {
    type Output = TypeRefMask;

    fn bitand(self, rhs: TypeRefMask) -> TypeRefMask {
        TypeRefMask(self.0 & rhs.0)
    }
}

impl fmt::Debug for TypeRefMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any_type() {
            write!(f, "TypeRefMask(any")?;
        } else {
            write!(f, "TypeRefMask({:#x}", self.data())?;
        }
        if self.is_ref() {
            write!(f, ", &")?;
        }
        if self.includes_subclasses() {
            write!(f, ", +sub")?;
        }
        write!(f, ")")
    }
}
