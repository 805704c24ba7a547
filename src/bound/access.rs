use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::diagnostics::CompileError;

bitflags! {
    /// How an expression is used at the point it is evaluated.
    ///
    /// The empty set means the value is evaluated for side effects only and never
    /// left on the evaluation stack.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AccessFlags: u32 {
        const READ = 1;
        const WRITE = 1 << 1;
        /// Target of a by-reference assignment; receives an alias.
        const WRITE_REF = 1 << 2;
        /// Read as an alias (source of `=&`, by-reference argument, `foreach` by reference).
        const READ_REF = 1 << 3;
        /// Read of a value that must not share storage with its source.
        const READ_COPY = 1 << 4;
        /// Read that creates an array at the place when it holds nothing.
        const ENSURE_ARRAY = 1 << 5;
        /// Read that creates an object at the place when it holds nothing.
        const ENSURE_OBJECT = 1 << 6;
        const UNSET = 1 << 7;
        /// Read that suppresses undefined-variable/index diagnostics (`isset`, `??`).
        const QUIET = 1 << 8;
    }
}

impl AccessFlags {
    pub const NONE: AccessFlags = AccessFlags::empty();

    pub fn is_none(self) -> bool {
        self.is_empty()
    }

    /// Whether evaluating the expression leaves a value on the stack.
    pub fn yields_value(self) -> bool {
        self.intersects(
            AccessFlags::READ
                | AccessFlags::READ_REF
                | AccessFlags::READ_COPY
                | AccessFlags::ENSURE_ARRAY
                | AccessFlags::ENSURE_OBJECT,
        )
    }

    pub fn is_read(self) -> bool {
        self.contains(AccessFlags::READ)
    }

    pub fn is_read_ref(self) -> bool {
        self.contains(AccessFlags::READ_REF)
    }

    pub fn is_read_copy(self) -> bool {
        self.contains(AccessFlags::READ_COPY)
    }

    pub fn is_quiet(self) -> bool {
        self.contains(AccessFlags::QUIET)
    }

    pub fn is_ensure(self) -> bool {
        self.intersects(AccessFlags::ENSURE_ARRAY | AccessFlags::ENSURE_OBJECT)
    }

    /// Checks the mutual constraints between flags.
    pub fn validate(self) -> Result<(), CompileError> {
        let conflict = |a: AccessFlags, b: AccessFlags| self.contains(a) && self.contains(b);
        if conflict(AccessFlags::WRITE_REF, AccessFlags::READ_COPY) {
            return Err(CompileError::invariant("write-ref access cannot be a copying read"));
        }
        if conflict(AccessFlags::READ_REF, AccessFlags::READ_COPY) {
            return Err(CompileError::invariant("read-ref access cannot be a copying read"));
        }
        if conflict(AccessFlags::ENSURE_ARRAY, AccessFlags::ENSURE_OBJECT) {
            return Err(CompileError::invariant("a place cannot be ensured as both array and object"));
        }
        if self.contains(AccessFlags::UNSET) && self.intersects(!AccessFlags::UNSET) {
            return Err(CompileError::invariant("unset access does not combine with other accesses"));
        }
        if self.contains(AccessFlags::READ_COPY) && !self.contains(AccessFlags::READ) {
            return Err(CompileError::invariant("copying read without read access"));
        }
        Ok(())
    }
}

impl Default for AccessFlags {
    fn default() -> Self {
        AccessFlags::READ
    }
}
