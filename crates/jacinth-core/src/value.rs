//! Slot representation for frames
//!
//! A [`Slot`] is one cell of a frame's local variables or operand stack. It
//! holds a 64-bit scalar, an object reference (or null), or the empty
//! sentinel that marks a cell as unused.
//!
//! # Encoding Strategy
//!
//! ```text
//! int/short/char/byte/boolean:  Scalar(sign-extended i32)
//! long:                         Scalar(i64), second slot Empty
//! float:                        Scalar(f32 bits)
//! double:                       Scalar(f64 bits), second slot Empty
//! reference:                    Ref(ObjectRef) or Null
//! ```
//!
//! References held in slots keep their object alive. Slots that are logically
//! consumed must be reset to [`Slot::Empty`] so that stale references do not
//! outlive their use.

use crate::object::ObjectRef;
use std::fmt;
use std::sync::Arc;

/// A single frame cell
#[derive(Clone, Default)]
pub enum Slot {
    /// Unused cell
    #[default]
    Empty,
    /// 64-bit scalar payload
    Scalar(i64),
    /// Null reference
    Null,
    /// Non-null object reference
    Ref(ObjectRef),
}

/// Coarse classification of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Empty sentinel
    Empty,
    /// Scalar payload
    Scalar,
    /// Reference (null or not)
    Reference,
}

impl Slot {
    /// Create an int slot
    #[inline]
    pub const fn int(v: i32) -> Self {
        Slot::Scalar(v as i64)
    }

    /// Create a long slot
    #[inline]
    pub const fn long(v: i64) -> Self {
        Slot::Scalar(v)
    }

    /// Create a float slot
    #[inline]
    pub fn float(v: f32) -> Self {
        Slot::Scalar(v.to_bits() as i64)
    }

    /// Create a double slot
    #[inline]
    pub fn double(v: f64) -> Self {
        Slot::Scalar(v.to_bits() as i64)
    }

    /// Create a boolean slot (stored as int 0/1)
    #[inline]
    pub const fn boolean(b: bool) -> Self {
        Slot::int(b as i32)
    }

    /// Create a reference slot
    #[inline]
    pub fn reference(obj: Option<ObjectRef>) -> Self {
        match obj {
            Some(obj) => Slot::Ref(obj),
            None => Slot::Null,
        }
    }

    /// Check if this slot is the empty sentinel
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }

    /// Check if this slot holds a reference (including null)
    #[inline]
    pub fn is_reference(&self) -> bool {
        matches!(self, Slot::Ref(_) | Slot::Null)
    }

    /// Get the slot kind
    pub fn kind(&self) -> SlotKind {
        match self {
            Slot::Empty => SlotKind::Empty,
            Slot::Scalar(_) => SlotKind::Scalar,
            Slot::Null | Slot::Ref(_) => SlotKind::Reference,
        }
    }

    /// Get the raw scalar payload
    #[inline]
    pub fn as_scalar(&self) -> Option<i64> {
        match self {
            Slot::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as int (low 32 bits of the scalar)
    #[inline]
    pub fn as_int(&self) -> Option<i32> {
        self.as_scalar().map(|v| v as i32)
    }

    /// Get as long
    #[inline]
    pub fn as_long(&self) -> Option<i64> {
        self.as_scalar()
    }

    /// Get as float
    pub fn as_float(&self) -> Option<f32> {
        self.as_scalar().map(|v| f32::from_bits(v as u32))
    }

    /// Get as double
    pub fn as_double(&self) -> Option<f64> {
        self.as_scalar().map(|v| f64::from_bits(v as u64))
    }

    /// Get as boolean (non-zero int is true)
    pub fn as_boolean(&self) -> Option<bool> {
        self.as_int().map(|v| v != 0)
    }

    /// Get the referenced object
    ///
    /// Returns `Some(None)` for null and `None` if the slot is not a reference.
    pub fn as_object(&self) -> Option<Option<&ObjectRef>> {
        match self {
            Slot::Ref(obj) => Some(Some(obj)),
            Slot::Null => Some(None),
            _ => None,
        }
    }

    /// Get the slot kind name (for error messages)
    pub fn type_name(&self) -> &'static str {
        match self {
            Slot::Empty => "empty",
            Slot::Scalar(_) => "scalar",
            Slot::Null => "null",
            Slot::Ref(_) => "reference",
        }
    }
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Slot::Empty, Slot::Empty) | (Slot::Null, Slot::Null) => true,
            (Slot::Scalar(a), Slot::Scalar(b)) => a == b,
            // References compare by identity
            (Slot::Ref(a), Slot::Ref(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Empty => write!(f, "Empty"),
            Slot::Scalar(v) => write!(f, "Scalar({})", v),
            Slot::Null => write!(f, "Null"),
            Slot::Ref(obj) => write!(f, "Ref({:?})", obj.id()),
        }
    }
}
