//! Object allocator and handle table
//!
//! The heap hands out [`ObjectRef`]s and maps [`ObjectId`] handles (the form
//! references take inside field and array storage) back to live objects.
//! Reclamation is driven from outside by the collector; the execution core
//! never frees objects itself.

use crate::class::Class;
use crate::object::{Object, ObjectId, ObjectRef};
use crate::runtime::HeapOptions;
use crate::{VmError, VmResult};
use dashmap::DashMap;
use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Heap of live objects
pub struct Heap {
    /// Live objects by handle
    objects: DashMap<ObjectId, ObjectRef, FxBuildHasher>,

    /// Live objects plus allocations in flight
    reserved: AtomicUsize,

    /// Maximum number of live objects (None = unlimited)
    max_objects: Option<usize>,
}

impl Heap {
    /// Create a heap with the given options
    pub fn new(options: &HeapOptions) -> Self {
        Self {
            objects: DashMap::with_hasher(FxBuildHasher::default()),
            reserved: AtomicUsize::new(0),
            max_objects: options.max_objects,
        }
    }

    /// Reserve room for one object, failing at the limit
    fn reserve(&self) -> VmResult<()> {
        let previous = self.reserved.fetch_add(1, Ordering::AcqRel);
        match self.max_objects {
            Some(limit) if previous >= limit => {
                self.reserved.fetch_sub(1, Ordering::AcqRel);
                Err(VmError::HeapExhausted { limit })
            }
            _ => Ok(()),
        }
    }

    fn register(&self, object: Object) -> ObjectRef {
        let object = Arc::new(object);
        self.objects.insert(object.id(), Arc::clone(&object));
        object
    }

    /// Allocate an instance of `class` with zeroed fields
    ///
    /// # Errors
    ///
    /// Returns `VmError::TypeError` for array classes and
    /// `VmError::HeapExhausted` when the object limit is reached.
    pub fn alloc_object(&self, class: &Arc<Class>) -> VmResult<ObjectRef> {
        if class.is_array() {
            return Err(VmError::TypeError(format!(
                "cannot instantiate array class {} without a length",
                class.name()
            )));
        }
        self.reserve()?;
        Ok(self.register(Object::new_instance(Arc::clone(class))))
    }

    /// Allocate an array of `len` zeroed elements
    ///
    /// # Errors
    ///
    /// Returns `VmError::TypeError` if `class` is not an array class and
    /// `VmError::HeapExhausted` when the object limit is reached.
    pub fn alloc_array(&self, class: &Arc<Class>, len: usize) -> VmResult<ObjectRef> {
        let element = class.element_type().ok_or_else(|| {
            VmError::TypeError(format!("{} is not an array class", class.name()))
        })?;
        self.reserve()?;
        Ok(self.register(Object::new_array(Arc::clone(class), element, len)))
    }

    /// Resolve a handle to its object
    pub fn resolve(&self, id: ObjectId) -> Option<ObjectRef> {
        self.objects.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Resolve an optional handle, mapping a dangling handle to `None`
    pub fn resolve_opt(&self, id: Option<ObjectId>) -> Option<ObjectRef> {
        id.and_then(|id| self.resolve(id))
    }

    /// Drop the heap's handle to an object
    ///
    /// Called by the collector once the object is unreachable. Outstanding
    /// [`ObjectRef`]s stay valid until dropped.
    pub fn reclaim(&self, id: ObjectId) -> Option<ObjectRef> {
        let (_, object) = self.objects.remove(&id)?;
        self.reserved.fetch_sub(1, Ordering::AcqRel);
        Some(object)
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the heap holds no objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
