//! Compare-and-swap over object and array storage
//!
//! Three primitives back `sun/misc/Unsafe.compareAndSwap{Int,Long,Object}`:
//!
//! | operation | object field                     | array element              |
//! |-----------|----------------------------------|----------------------------|
//! | int       | 32-bit CAS on an int field       | 32-bit CAS on `int[]`      |
//! | long      | 64-bit CAS on a long field       | 64-bit CAS on `long[]`     |
//! | reference | monitor-protected compare + store | lock-free CAS on `Object[]` |
//!
//! Reference CAS on an object field enters the target's monitor and may
//! block; reference CAS on an array element never does. Every CAS uses
//! sequentially consistent ordering.
//!
//! A mismatch returns `Ok(false)`. Any storage the table does not list
//! (float or double fields, `byte[]`, `char[]`, a width that does not match
//! the operation) is rejected with [`AtomicError::Unsupported`].

use crate::object::{ArrayStorage, FieldSlot, Object, ObjectRef, Storage};
use crate::thread::ThreadId;
use std::fmt;
use std::sync::atomic::Ordering;

/// Which compare-and-swap primitive was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasKind {
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// Object reference
    Ref,
}

impl fmt::Display for CasKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CasKind::Int => write!(f, "int"),
            CasKind::Long => write!(f, "long"),
            CasKind::Ref => write!(f, "reference"),
        }
    }
}

/// Errors raised by the compare-and-swap layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AtomicError {
    /// The target storage has no atomic representation for this operation
    #[error("{op} compare-and-swap is not supported on {storage}")]
    Unsupported {
        /// Requested operation
        op: CasKind,
        /// Storage that was targeted
        storage: &'static str,
    },

    /// Field offset or element index past the end of the storage
    #[error("Offset {offset} out of bounds for storage of length {len}")]
    OffsetOutOfBounds {
        /// Requested offset
        offset: usize,
        /// Length of the storage
        len: usize,
    },
}

fn at<T>(cells: &[T], offset: usize) -> Result<&T, AtomicError> {
    cells.get(offset).ok_or(AtomicError::OffsetOutOfBounds {
        offset,
        len: cells.len(),
    })
}

#[inline]
fn swapped<T>(result: Result<T, T>) -> bool {
    result.is_ok()
}

/// Atomically replace an int field or `int[]` element
///
/// # Errors
///
/// Returns `AtomicError::Unsupported` if the target cell is not 32-bit
/// integer storage, or `AtomicError::OffsetOutOfBounds`.
pub fn compare_and_swap_int(
    target: &Object,
    offset: usize,
    expected: i32,
    new: i32,
) -> Result<bool, AtomicError> {
    let cell = match target.storage() {
        Storage::Fields(fields) => match at(fields, offset)? {
            FieldSlot::Int(cell) => cell,
            other => {
                return Err(AtomicError::Unsupported {
                    op: CasKind::Int,
                    storage: other.kind_name(),
                })
            }
        },
        Storage::Array(ArrayStorage::Ints(elems)) => at(elems, offset)?,
        Storage::Array(other) => {
            return Err(AtomicError::Unsupported {
                op: CasKind::Int,
                storage: other.kind_name(),
            })
        }
    };
    Ok(swapped(cell.compare_exchange(
        expected,
        new,
        Ordering::SeqCst,
        Ordering::SeqCst,
    )))
}

/// Atomically replace a long field or `long[]` element
///
/// # Errors
///
/// Returns `AtomicError::Unsupported` if the target cell is not 64-bit
/// integer storage, or `AtomicError::OffsetOutOfBounds`.
pub fn compare_and_swap_long(
    target: &Object,
    offset: usize,
    expected: i64,
    new: i64,
) -> Result<bool, AtomicError> {
    let cell = match target.storage() {
        Storage::Fields(fields) => match at(fields, offset)? {
            FieldSlot::Long(cell) => cell,
            other => {
                return Err(AtomicError::Unsupported {
                    op: CasKind::Long,
                    storage: other.kind_name(),
                })
            }
        },
        Storage::Array(ArrayStorage::Longs(elems)) => at(elems, offset)?,
        Storage::Array(other) => {
            return Err(AtomicError::Unsupported {
                op: CasKind::Long,
                storage: other.kind_name(),
            })
        }
    };
    Ok(swapped(cell.compare_exchange(
        expected,
        new,
        Ordering::SeqCst,
        Ordering::SeqCst,
    )))
}

/// Replace a reference field or reference array element by identity
///
/// On an object field the compare and store happen while `thread` holds the
/// target's monitor, so this call blocks if another thread owns it. On a
/// reference array the element is swapped with a single lock-free CAS.
///
/// # Errors
///
/// Returns `AtomicError::Unsupported` if the target cell is not reference
/// storage, or `AtomicError::OffsetOutOfBounds`.
pub fn compare_and_swap_ref(
    target: &Object,
    offset: usize,
    expected: Option<&ObjectRef>,
    new: Option<&ObjectRef>,
    thread: ThreadId,
) -> Result<bool, AtomicError> {
    let expected = expected.map(|obj| obj.id());
    let new = new.map(|obj| obj.id());

    match target.storage() {
        Storage::Fields(fields) => {
            let cell = match at(fields, offset)? {
                FieldSlot::Ref(cell) => cell,
                other => {
                    return Err(AtomicError::Unsupported {
                        op: CasKind::Ref,
                        storage: other.kind_name(),
                    })
                }
            };
            let _guard = target.monitor().enter_guard(thread);
            if cell.load() != expected {
                return Ok(false);
            }
            cell.store(new);
            Ok(true)
        }
        Storage::Array(ArrayStorage::Refs(elems)) => {
            Ok(swapped(at(elems, offset)?.compare_exchange(expected, new)))
        }
        Storage::Array(other) => Err(AtomicError::Unsupported {
            op: CasKind::Ref,
            storage: other.kind_name(),
        }),
    }
}
