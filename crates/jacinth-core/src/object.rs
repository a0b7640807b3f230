//! Object model and slot storage
//!
//! Every object owns either a flat sequence of field slots (one per declared
//! instance field, flattened across the superclass chain) or a dense array
//! of elements of a single kind. Offsets are assigned at class preparation
//! and never change for the lifetime of the object.
//!
//! All cells are atomics of their declared width so that the compare-and-swap
//! layer in [`crate::atomic`] can operate on them in place. Reference cells
//! hold [`ObjectId`] handles resolved through the [`crate::heap::Heap`]
//! rather than raw addresses.

use crate::class::{Class, FieldKind};
use crate::descriptor::FieldType;
use crate::sync::Monitor;
use crate::{VmError, VmResult};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::atomic::{AtomicI16, AtomicI32, AtomicI64, AtomicI8, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared handle to a heap object
pub type ObjectRef = Arc<Object>;

// ============================================================================
// Object identity
// ============================================================================

/// Unique identifier for a heap object
///
/// Identifiers start at 1; 0 is reserved as the null encoding in [`AtomicRef`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

impl ObjectId {
    /// Generate a new unique ObjectId
    pub fn new() -> Self {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Create an ObjectId from a u64 value (`None` for the null encoding)
    pub fn from_u64(id: u64) -> Option<Self> {
        (id != 0).then_some(ObjectId(id))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

/// Atomic reference cell storing an optional [`ObjectId`]
#[derive(Debug, Default)]
pub struct AtomicRef(AtomicU64);

impl AtomicRef {
    /// Create a null reference cell
    pub const fn null() -> Self {
        AtomicRef(AtomicU64::new(0))
    }

    #[inline]
    fn encode(id: Option<ObjectId>) -> u64 {
        id.map_or(0, ObjectId::as_u64)
    }

    /// Load the current reference
    #[inline]
    pub fn load(&self) -> Option<ObjectId> {
        ObjectId::from_u64(self.0.load(Ordering::SeqCst))
    }

    /// Store a reference
    #[inline]
    pub fn store(&self, id: Option<ObjectId>) {
        self.0.store(Self::encode(id), Ordering::SeqCst);
    }

    /// Atomically replace `current` with `new`
    ///
    /// Returns the previous value on success, or the value actually observed
    /// on failure.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: Option<ObjectId>,
        new: Option<ObjectId>,
    ) -> Result<Option<ObjectId>, Option<ObjectId>> {
        self.0
            .compare_exchange(
                Self::encode(current),
                Self::encode(new),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(ObjectId::from_u64)
            .map_err(ObjectId::from_u64)
    }
}

// ============================================================================
// Field storage
// ============================================================================

/// One instance or static field cell, sized to its declared type
#[derive(Debug)]
pub enum FieldSlot {
    /// `I`, `S`, `C`, `B`, `Z`
    Int(AtomicI32),
    /// `J`
    Long(AtomicI64),
    /// `F` (IEEE bits)
    Float(AtomicU32),
    /// `D` (IEEE bits)
    Double(AtomicU64),
    /// Object or array reference
    Ref(AtomicRef),
}

impl FieldSlot {
    /// Create a zeroed cell for a field kind
    pub fn new(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Int => FieldSlot::Int(AtomicI32::new(0)),
            FieldKind::Long => FieldSlot::Long(AtomicI64::new(0)),
            FieldKind::Float => FieldSlot::Float(AtomicU32::new(0)),
            FieldKind::Double => FieldSlot::Double(AtomicU64::new(0)),
            FieldKind::Ref => FieldSlot::Ref(AtomicRef::null()),
        }
    }

    /// Get the field kind of this cell
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldSlot::Int(_) => FieldKind::Int,
            FieldSlot::Long(_) => FieldKind::Long,
            FieldSlot::Float(_) => FieldKind::Float,
            FieldSlot::Double(_) => FieldKind::Double,
            FieldSlot::Ref(_) => FieldKind::Ref,
        }
    }

    /// Storage name used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldSlot::Int(_) => "int field",
            FieldSlot::Long(_) => "long field",
            FieldSlot::Float(_) => "float field",
            FieldSlot::Double(_) => "double field",
            FieldSlot::Ref(_) => "reference field",
        }
    }

    fn mismatch(&self, wanted: &str) -> VmError {
        VmError::TypeError(format!("expected {} field, found {}", wanted, self.kind_name()))
    }

    /// Load an int-like field
    ///
    /// # Errors
    ///
    /// Returns `VmError::TypeError` if the cell is not an int field.
    pub fn load_int(&self) -> VmResult<i32> {
        match self {
            FieldSlot::Int(v) => Ok(v.load(Ordering::SeqCst)),
            other => Err(other.mismatch("int")),
        }
    }

    /// Store an int-like field
    ///
    /// # Errors
    ///
    /// Returns `VmError::TypeError` if the cell is not an int field.
    pub fn store_int(&self, value: i32) -> VmResult<()> {
        match self {
            FieldSlot::Int(v) => {
                v.store(value, Ordering::SeqCst);
                Ok(())
            }
            other => Err(other.mismatch("int")),
        }
    }

    /// Load a long field
    ///
    /// # Errors
    ///
    /// Returns `VmError::TypeError` if the cell is not a long field.
    pub fn load_long(&self) -> VmResult<i64> {
        match self {
            FieldSlot::Long(v) => Ok(v.load(Ordering::SeqCst)),
            other => Err(other.mismatch("long")),
        }
    }

    /// Store a long field
    ///
    /// # Errors
    ///
    /// Returns `VmError::TypeError` if the cell is not a long field.
    pub fn store_long(&self, value: i64) -> VmResult<()> {
        match self {
            FieldSlot::Long(v) => {
                v.store(value, Ordering::SeqCst);
                Ok(())
            }
            other => Err(other.mismatch("long")),
        }
    }

    /// Load a reference field
    ///
    /// # Errors
    ///
    /// Returns `VmError::TypeError` if the cell is not a reference field.
    pub fn load_ref(&self) -> VmResult<Option<ObjectId>> {
        match self {
            FieldSlot::Ref(v) => Ok(v.load()),
            other => Err(other.mismatch("reference")),
        }
    }

    /// Store a reference field
    ///
    /// # Errors
    ///
    /// Returns `VmError::TypeError` if the cell is not a reference field.
    pub fn store_ref(&self, value: Option<&ObjectRef>) -> VmResult<()> {
        match self {
            FieldSlot::Ref(v) => {
                v.store(value.map(|obj| obj.id()));
                Ok(())
            }
            other => Err(other.mismatch("reference")),
        }
    }
}

/// Look up a field cell by offset
pub(crate) fn field_at(slots: &[FieldSlot], offset: usize) -> VmResult<&FieldSlot> {
    slots.get(offset).ok_or(VmError::IndexOutOfBounds {
        index: offset,
        len: slots.len(),
    })
}

// ============================================================================
// Array storage
// ============================================================================

/// Dense array storage, one representation per element kind
#[derive(Debug)]
pub enum ArrayStorage {
    /// `[B` and `[Z`
    Bytes(Box<[AtomicI8]>),
    /// `[S`
    Shorts(Box<[AtomicI16]>),
    /// `[C`
    Chars(Box<[AtomicU16]>),
    /// `[I`
    Ints(Box<[AtomicI32]>),
    /// `[J`
    Longs(Box<[AtomicI64]>),
    /// `[F` (IEEE bits)
    Floats(Box<[AtomicU32]>),
    /// `[D` (IEEE bits)
    Doubles(Box<[AtomicU64]>),
    /// `[L...;` and `[[...`
    Refs(Box<[AtomicRef]>),
}

fn zeroed<T: Default>(len: usize) -> Box<[T]> {
    (0..len).map(|_| T::default()).collect()
}

impl ArrayStorage {
    /// Allocate zeroed storage for `len` elements of `element`
    pub fn new(element: &FieldType, len: usize) -> Self {
        match element {
            FieldType::Byte | FieldType::Boolean => ArrayStorage::Bytes(zeroed(len)),
            FieldType::Short => ArrayStorage::Shorts(zeroed(len)),
            FieldType::Char => ArrayStorage::Chars(zeroed(len)),
            FieldType::Int => ArrayStorage::Ints(zeroed(len)),
            FieldType::Long => ArrayStorage::Longs(zeroed(len)),
            FieldType::Float => ArrayStorage::Floats(zeroed(len)),
            FieldType::Double => ArrayStorage::Doubles(zeroed(len)),
            FieldType::Object(_) | FieldType::Array(_) => ArrayStorage::Refs(zeroed(len)),
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ArrayStorage::Bytes(v) => v.len(),
            ArrayStorage::Shorts(v) => v.len(),
            ArrayStorage::Chars(v) => v.len(),
            ArrayStorage::Ints(v) => v.len(),
            ArrayStorage::Longs(v) => v.len(),
            ArrayStorage::Floats(v) => v.len(),
            ArrayStorage::Doubles(v) => v.len(),
            ArrayStorage::Refs(v) => v.len(),
        }
    }

    /// Check if the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage name used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            ArrayStorage::Bytes(_) => "byte[]",
            ArrayStorage::Shorts(_) => "short[]",
            ArrayStorage::Chars(_) => "char[]",
            ArrayStorage::Ints(_) => "int[]",
            ArrayStorage::Longs(_) => "long[]",
            ArrayStorage::Floats(_) => "float[]",
            ArrayStorage::Doubles(_) => "double[]",
            ArrayStorage::Refs(_) => "reference[]",
        }
    }
}

/// Object storage
#[derive(Debug)]
pub enum Storage {
    /// Instance fields
    Fields(Box<[FieldSlot]>),
    /// Array elements
    Array(ArrayStorage),
}

// ============================================================================
// Object
// ============================================================================

/// Heap object
///
/// Objects are created by the [`crate::heap::Heap`] only. The monitor is
/// allocated on first use.
pub struct Object {
    id: ObjectId,
    class: Arc<Class>,
    storage: Storage,
    monitor: OnceCell<Arc<Monitor>>,
}

impl Object {
    /// Create an instance with zeroed fields laid out per `class`
    pub(crate) fn new_instance(class: Arc<Class>) -> Self {
        let fields = class
            .instance_layout()
            .iter()
            .map(|kind| FieldSlot::new(*kind))
            .collect();
        Self {
            id: ObjectId::new(),
            class,
            storage: Storage::Fields(fields),
            monitor: OnceCell::new(),
        }
    }

    /// Create an array of `len` zeroed elements of `element`
    pub(crate) fn new_array(class: Arc<Class>, element: &FieldType, len: usize) -> Self {
        Self {
            id: ObjectId::new(),
            class,
            storage: Storage::Array(ArrayStorage::new(element, len)),
            monitor: OnceCell::new(),
        }
    }

    /// Get the object ID
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Get the object's class
    #[inline]
    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    /// Get the raw storage
    #[inline]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Get the object's monitor, creating it on first use
    pub fn monitor(&self) -> &Arc<Monitor> {
        self.monitor.get_or_init(|| Arc::new(Monitor::new()))
    }

    /// Check if this object is an array
    pub fn is_array(&self) -> bool {
        matches!(self.storage, Storage::Array(_))
    }

    /// Get the array storage
    ///
    /// # Errors
    ///
    /// Returns `VmError::TypeError` if the object is not an array.
    pub fn array(&self) -> VmResult<&ArrayStorage> {
        match &self.storage {
            Storage::Array(array) => Ok(array),
            Storage::Fields(_) => Err(VmError::TypeError(format!(
                "{} is not an array",
                self.class.name()
            ))),
        }
    }

    /// Get the array length
    ///
    /// # Errors
    ///
    /// Returns `VmError::TypeError` if the object is not an array.
    pub fn array_len(&self) -> VmResult<usize> {
        self.array().map(ArrayStorage::len)
    }

    /// Get the field cell at `offset`
    ///
    /// # Errors
    ///
    /// Returns `VmError::TypeError` for arrays and `VmError::IndexOutOfBounds`
    /// if the offset is past the last field.
    pub fn field(&self, offset: usize) -> VmResult<&FieldSlot> {
        match &self.storage {
            Storage::Fields(slots) => field_at(slots, offset),
            Storage::Array(_) => Err(VmError::TypeError(format!(
                "{} has no fields",
                self.class.name()
            ))),
        }
    }

    /// Get an int field
    pub fn get_int_field(&self, offset: usize) -> VmResult<i32> {
        self.field(offset)?.load_int()
    }

    /// Set an int field
    pub fn set_int_field(&self, offset: usize, value: i32) -> VmResult<()> {
        self.field(offset)?.store_int(value)
    }

    /// Get a long field
    pub fn get_long_field(&self, offset: usize) -> VmResult<i64> {
        self.field(offset)?.load_long()
    }

    /// Set a long field
    pub fn set_long_field(&self, offset: usize, value: i64) -> VmResult<()> {
        self.field(offset)?.store_long(value)
    }

    /// Get a reference field
    pub fn get_ref_field(&self, offset: usize) -> VmResult<Option<ObjectId>> {
        self.field(offset)?.load_ref()
    }

    /// Set a reference field
    pub fn set_ref_field(&self, offset: usize, value: Option<&ObjectRef>) -> VmResult<()> {
        self.field(offset)?.store_ref(value)
    }

    fn element_mismatch(&self, wanted: &str) -> VmError {
        let found = self.array().map_or("non-array", ArrayStorage::kind_name);
        VmError::TypeError(format!("expected {}, found {}", wanted, found))
    }

    /// Get an int array element
    ///
    /// # Errors
    ///
    /// Returns `VmError::TypeError` if this is not an `int[]` and
    /// `VmError::IndexOutOfBounds` for a bad index.
    pub fn get_int_element(&self, index: usize) -> VmResult<i32> {
        match self.array() {
            Ok(ArrayStorage::Ints(elems)) => Ok(element(elems, index)?.load(Ordering::SeqCst)),
            _ => Err(self.element_mismatch("int[]")),
        }
    }

    /// Set an int array element
    pub fn set_int_element(&self, index: usize, value: i32) -> VmResult<()> {
        match self.array() {
            Ok(ArrayStorage::Ints(elems)) => {
                element(elems, index)?.store(value, Ordering::SeqCst);
                Ok(())
            }
            _ => Err(self.element_mismatch("int[]")),
        }
    }

    /// Get a long array element
    pub fn get_long_element(&self, index: usize) -> VmResult<i64> {
        match self.array() {
            Ok(ArrayStorage::Longs(elems)) => Ok(element(elems, index)?.load(Ordering::SeqCst)),
            _ => Err(self.element_mismatch("long[]")),
        }
    }

    /// Set a long array element
    pub fn set_long_element(&self, index: usize, value: i64) -> VmResult<()> {
        match self.array() {
            Ok(ArrayStorage::Longs(elems)) => {
                element(elems, index)?.store(value, Ordering::SeqCst);
                Ok(())
            }
            _ => Err(self.element_mismatch("long[]")),
        }
    }

    /// Get a reference array element
    pub fn get_ref_element(&self, index: usize) -> VmResult<Option<ObjectId>> {
        match self.array() {
            Ok(ArrayStorage::Refs(elems)) => Ok(element(elems, index)?.load()),
            _ => Err(self.element_mismatch("reference[]")),
        }
    }

    /// Set a reference array element
    pub fn set_ref_element(&self, index: usize, value: Option<&ObjectRef>) -> VmResult<()> {
        match self.array() {
            Ok(ArrayStorage::Refs(elems)) => {
                element(elems, index)?.store(value.map(|obj| obj.id()));
                Ok(())
            }
            _ => Err(self.element_mismatch("reference[]")),
        }
    }
}

fn element<T>(elems: &[T], index: usize) -> VmResult<&T> {
    elems.get(index).ok_or(VmError::IndexOutOfBounds {
        index,
        len: elems.len(),
    })
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("class", &self.class.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassBuilder;

    fn point_class() -> Arc<Class> {
        ClassBuilder::new("Point")
            .field("x", "I", 0)
            .field("next", "LPoint;", 0)
            .field("stamp", "J", 0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_object_ids_unique() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        assert_eq!(ObjectId::from_u64(0), None);
        assert_eq!(ObjectId::from_u64(a.as_u64()), Some(a));
    }

    #[test]
    fn test_atomic_ref_compare_exchange() {
        let cell = AtomicRef::null();
        let a = ObjectId::new();
        let b = ObjectId::new();

        assert_eq!(cell.compare_exchange(None, Some(a)), Ok(None));
        assert_eq!(cell.compare_exchange(None, Some(b)), Err(Some(a)));
        assert_eq!(cell.load(), Some(a));
    }

    #[test]
    fn test_instance_fields_native_width() {
        let obj = Object::new_instance(point_class());
        assert!(matches!(obj.field(0).unwrap(), FieldSlot::Int(_)));
        assert!(matches!(obj.field(1).unwrap(), FieldSlot::Ref(_)));
        assert!(matches!(obj.field(2).unwrap(), FieldSlot::Long(_)));
        assert!(obj.field(3).is_err());
    }

    #[test]
    fn test_field_get_set() {
        let obj = Object::new_instance(point_class());
        obj.set_int_field(0, 12).unwrap();
        obj.set_long_field(2, i64::MAX).unwrap();
        assert_eq!(obj.get_int_field(0).unwrap(), 12);
        assert_eq!(obj.get_long_field(2).unwrap(), i64::MAX);
        assert_eq!(obj.get_ref_field(1).unwrap(), None);

        // Wrong width is a type error, not a reinterpretation
        assert!(matches!(obj.get_long_field(0), Err(VmError::TypeError(_))));
    }

    #[test]
    fn test_array_storage_by_kind() {
        let ints = ArrayStorage::new(&FieldType::Int, 4);
        assert_eq!(ints.len(), 4);
        assert_eq!(ints.kind_name(), "int[]");
        assert_eq!(ArrayStorage::new(&FieldType::Boolean, 1).kind_name(), "byte[]");
        assert_eq!(
            ArrayStorage::new(&FieldType::Object("X".into()), 0).kind_name(),
            "reference[]"
        );
        assert!(ArrayStorage::new(&FieldType::Double, 0).is_empty());
    }

    #[test]
    fn test_monitor_is_lazy_and_stable() {
        let obj = Object::new_instance(point_class());
        let first = Arc::clone(obj.monitor());
        assert!(Arc::ptr_eq(&first, obj.monitor()));
    }
}
