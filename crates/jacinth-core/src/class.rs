//! Class and method metadata
//!
//! The execution core only needs a small slice of a loaded class: its field
//! layout, its methods with their sizing and access flags, its static storage
//! and its monitor. Classes are assembled with [`ClassBuilder`] (the class
//! loader's job in a full VM) and looked up through [`ClassRegistry`].

use crate::descriptor::{FieldType, MethodDescriptor};
use crate::object::{field_at, FieldSlot, ObjectId, ObjectRef};
use crate::sync::Monitor;
use crate::{VmError, VmResult};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Access flags (class file encoding)
pub mod flags {
    /// `public`
    pub const ACC_PUBLIC: u16 = 0x0001;
    /// `private`
    pub const ACC_PRIVATE: u16 = 0x0002;
    /// `static`
    pub const ACC_STATIC: u16 = 0x0008;
    /// `final`
    pub const ACC_FINAL: u16 = 0x0010;
    /// `synchronized`
    pub const ACC_SYNCHRONIZED: u16 = 0x0020;
    /// `native`
    pub const ACC_NATIVE: u16 = 0x0100;
    /// `abstract`
    pub const ACC_ABSTRACT: u16 = 0x0400;
}

/// Operand stack size given to native frames
const NATIVE_MAX_STACK: usize = 4;

/// Name of the root class
pub const OBJECT_CLASS: &str = "java/lang/Object";

// ============================================================================
// Fields
// ============================================================================

/// Storage kind of a field, derived from its descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// `I`, `S`, `C`, `B`, `Z` (32-bit)
    Int,
    /// `J` (64-bit)
    Long,
    /// `F` (32-bit)
    Float,
    /// `D` (64-bit)
    Double,
    /// Object or array reference
    Ref,
}

impl FieldKind {
    /// Map a field type to its storage kind
    pub fn of(ty: &FieldType) -> Self {
        match ty {
            FieldType::Byte
            | FieldType::Char
            | FieldType::Short
            | FieldType::Boolean
            | FieldType::Int => FieldKind::Int,
            FieldType::Long => FieldKind::Long,
            FieldType::Float => FieldKind::Float,
            FieldType::Double => FieldKind::Double,
            FieldType::Object(_) | FieldType::Array(_) => FieldKind::Ref,
        }
    }
}

/// Declared field
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Storage kind
    pub kind: FieldKind,
    /// Offset into instance storage (or static storage for static fields)
    pub slot_id: usize,
    /// Access flags
    pub access_flags: u16,
}

impl FieldInfo {
    /// Check if this is a static field
    pub fn is_static(&self) -> bool {
        self.access_flags & flags::ACC_STATIC != 0
    }
}

// ============================================================================
// Methods
// ============================================================================

/// Method metadata
pub struct Method {
    class: Weak<Class>,
    class_name: String,
    name: String,
    descriptor: String,
    parsed: MethodDescriptor,
    access_flags: u16,
    max_locals: usize,
    max_stack: usize,
    arg_slot_count: usize,
}

impl Method {
    fn new(class: Weak<Class>, class_name: &str, def: MethodDef, parsed: MethodDescriptor) -> Self {
        let is_static = def.access_flags & flags::ACC_STATIC != 0;
        let arg_slot_count = parsed.param_slot_count() + usize::from(!is_static);

        // Native methods are sized from their arguments alone
        let (max_locals, max_stack) = if def.access_flags & flags::ACC_NATIVE != 0 {
            (arg_slot_count, NATIVE_MAX_STACK)
        } else {
            (def.max_locals.max(arg_slot_count), def.max_stack)
        };

        Self {
            class,
            class_name: class_name.to_string(),
            name: def.name,
            descriptor: def.descriptor,
            parsed,
            access_flags: def.access_flags,
            max_locals,
            max_stack,
            arg_slot_count,
        }
    }

    /// Create a synthetic shim method whose frame carries `arg_slots` values
    ///
    /// Shim frames let native code call back into managed code: the arguments
    /// sit on the shim's operand stack and are transferred by the normal
    /// invocation protocol.
    pub fn shim(arg_slots: usize) -> Arc<Self> {
        Arc::new(Self {
            class: Weak::new(),
            class_name: "<shim>".to_string(),
            name: "<shim>".to_string(),
            descriptor: "()V".to_string(),
            parsed: MethodDescriptor::default(),
            access_flags: flags::ACC_STATIC,
            max_locals: 0,
            max_stack: arg_slots,
            arg_slot_count: 0,
        })
    }

    /// Get the declaring class
    ///
    /// # Errors
    ///
    /// Returns `VmError::ClassUnloaded` if the class has been dropped (or for
    /// shim methods, which have none).
    pub fn class(&self) -> VmResult<Arc<Class>> {
        self.class
            .upgrade()
            .ok_or_else(|| VmError::ClassUnloaded(self.class_name.clone()))
    }

    /// Name of the declaring class
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Method descriptor string
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Parsed method descriptor
    pub fn parsed_descriptor(&self) -> &MethodDescriptor {
        &self.parsed
    }

    /// Access flags
    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }

    /// Number of local variable slots
    pub fn max_locals(&self) -> usize {
        self.max_locals
    }

    /// Operand stack capacity
    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    /// Number of slots the caller passes, including `this` for instance methods
    pub fn arg_slot_count(&self) -> usize {
        self.arg_slot_count
    }

    /// Check if the method is static
    #[inline]
    pub fn is_static(&self) -> bool {
        self.access_flags & flags::ACC_STATIC != 0
    }

    /// Check if the method is synchronized
    #[inline]
    pub fn is_synchronized(&self) -> bool {
        self.access_flags & flags::ACC_SYNCHRONIZED != 0
    }

    /// Check if the method is native
    #[inline]
    pub fn is_native(&self) -> bool {
        self.access_flags & flags::ACC_NATIVE != 0
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Method({}.{}{})", self.class_name, self.name, self.descriptor)
    }
}

// ============================================================================
// Classes
// ============================================================================

/// Loaded class
pub struct Class {
    name: String,
    access_flags: u16,
    superclass: Option<Arc<Class>>,
    /// Fields declared by this class (not inherited ones)
    fields: Vec<FieldInfo>,
    /// Instance field kinds, flattened across the superclass chain
    instance_layout: Vec<FieldKind>,
    static_fields: Box<[FieldSlot]>,
    methods: Vec<Arc<Method>>,
    element_type: Option<FieldType>,
    monitor: OnceCell<Arc<Monitor>>,
}

impl Class {
    /// Class name in internal form (`java/lang/Object`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Access flags
    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }

    /// Direct superclass
    pub fn superclass(&self) -> Option<&Arc<Class>> {
        self.superclass.as_ref()
    }

    /// Instance field kinds by offset
    pub fn instance_layout(&self) -> &[FieldKind] {
        &self.instance_layout
    }

    /// Methods declared by this class
    pub fn methods(&self) -> &[Arc<Method>] {
        &self.methods
    }

    /// Check if this is an array class
    pub fn is_array(&self) -> bool {
        self.element_type.is_some()
    }

    /// Element type of an array class
    pub fn element_type(&self) -> Option<&FieldType> {
        self.element_type.as_ref()
    }

    /// Get the class monitor (used by static synchronized methods)
    pub fn monitor(&self) -> &Arc<Monitor> {
        self.monitor.get_or_init(|| Arc::new(Monitor::new()))
    }

    /// Check if this class is `name` or inherits from it
    pub fn is_subclass_of(&self, name: &str) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.name == name {
                return true;
            }
            current = class.superclass.as_deref();
        }
        false
    }

    /// Find a field by name and descriptor, searching superclasses
    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<&FieldInfo> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.descriptor == descriptor)
            .or_else(|| self.superclass.as_deref()?.find_field(name, descriptor))
    }

    /// Find a method by name and descriptor, searching superclasses
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<Arc<Method>> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
            .cloned()
            .or_else(|| self.superclass.as_deref()?.find_method(name, descriptor))
    }

    /// Get a method by name and descriptor
    ///
    /// # Errors
    ///
    /// Returns `VmError::MethodNotFound` if neither this class nor a
    /// superclass declares it.
    pub fn get_method(&self, name: &str, descriptor: &str) -> VmResult<Arc<Method>> {
        self.find_method(name, descriptor)
            .ok_or_else(|| VmError::MethodNotFound {
                class: self.name.clone(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            })
    }

    fn static_field(&self, name: &str, descriptor: &str) -> VmResult<&FieldSlot> {
        let info = self
            .fields
            .iter()
            .find(|f| f.is_static() && f.name == name && f.descriptor == descriptor)
            .ok_or_else(|| VmError::FieldNotFound {
                class: self.name.clone(),
                name: name.to_string(),
            })?;
        field_at(&self.static_fields, info.slot_id)
    }

    /// Read a static reference field declared by this class
    pub fn get_static_ref(&self, name: &str, descriptor: &str) -> VmResult<Option<ObjectId>> {
        self.static_field(name, descriptor)?.load_ref()
    }

    /// Write a static reference field declared by this class
    pub fn set_static_ref(
        &self,
        name: &str,
        descriptor: &str,
        value: Option<&ObjectRef>,
    ) -> VmResult<()> {
        self.static_field(name, descriptor)?.store_ref(value)
    }

    /// Read a static int field declared by this class
    pub fn get_static_int(&self, name: &str) -> VmResult<i32> {
        self.static_field(name, "I")?.load_int()
    }

    /// Write a static int field declared by this class
    pub fn set_static_int(&self, name: &str, value: i32) -> VmResult<()> {
        self.static_field(name, "I")?.store_int(value)
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("fields", &self.fields.len())
            .field("methods", &self.methods.len())
            .finish_non_exhaustive()
    }
}

struct MethodDef {
    name: String,
    descriptor: String,
    access_flags: u16,
    max_locals: usize,
    max_stack: usize,
}

/// Builder for [`Class`]
///
/// ```
/// use jacinth_core::class::{flags, ClassBuilder};
///
/// let counter = ClassBuilder::new("Counter")
///     .field("value", "I", 0)
///     .method("incr", "()V", flags::ACC_SYNCHRONIZED, 1, 2)
///     .build()
///     .unwrap();
/// assert_eq!(counter.instance_layout().len(), 1);
/// ```
pub struct ClassBuilder {
    name: String,
    access_flags: u16,
    superclass: Option<Arc<Class>>,
    fields: Vec<(String, String, u16)>,
    methods: Vec<MethodDef>,
    element_type: Option<FieldType>,
}

impl ClassBuilder {
    /// Start a class named `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            access_flags: flags::ACC_PUBLIC,
            superclass: None,
            fields: Vec::new(),
            methods: Vec::new(),
            element_type: None,
        }
    }

    /// Set the class access flags
    pub fn access_flags(mut self, access_flags: u16) -> Self {
        self.access_flags = access_flags;
        self
    }

    /// Set the superclass
    pub fn superclass(mut self, superclass: Arc<Class>) -> Self {
        self.superclass = Some(superclass);
        self
    }

    /// Declare a field
    pub fn field(mut self, name: &str, descriptor: &str, access_flags: u16) -> Self {
        self.fields
            .push((name.to_string(), descriptor.to_string(), access_flags));
        self
    }

    /// Declare a method with explicit frame sizing
    pub fn method(
        mut self,
        name: &str,
        descriptor: &str,
        access_flags: u16,
        max_locals: usize,
        max_stack: usize,
    ) -> Self {
        self.methods.push(MethodDef {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access_flags,
            max_locals,
            max_stack,
        });
        self
    }

    /// Declare a native method (frame sizing derives from the descriptor)
    pub fn native_method(self, name: &str, descriptor: &str, access_flags: u16) -> Self {
        self.method(name, descriptor, access_flags | flags::ACC_NATIVE, 0, 0)
    }

    /// Make this an array class with the given element type
    pub fn array_of(mut self, element: FieldType) -> Self {
        self.element_type = Some(element);
        self
    }

    /// Prepare the class: assign field offsets and bind methods
    ///
    /// # Errors
    ///
    /// Returns `VmError::InvalidDescriptor` if any field or method
    /// descriptor is malformed.
    pub fn build(self) -> VmResult<Arc<Class>> {
        let mut instance_layout = self
            .superclass
            .as_ref()
            .map(|s| s.instance_layout.clone())
            .unwrap_or_default();
        let mut static_layout = Vec::new();

        let mut fields = Vec::with_capacity(self.fields.len());
        for (name, descriptor, access_flags) in self.fields {
            let kind = FieldKind::of(&FieldType::parse(&descriptor)?);
            let layout = if access_flags & flags::ACC_STATIC != 0 {
                &mut static_layout
            } else {
                &mut instance_layout
            };
            fields.push(FieldInfo {
                name,
                descriptor,
                kind,
                slot_id: layout.len(),
                access_flags,
            });
            layout.push(kind);
        }

        let methods = self
            .methods
            .into_iter()
            .map(|def| MethodDescriptor::parse(&def.descriptor).map(|parsed| (def, parsed)))
            .collect::<VmResult<Vec<_>>>()?;

        let name = self.name;
        Ok(Arc::new_cyclic(|weak| Class {
            methods: methods
                .into_iter()
                .map(|(def, parsed)| Arc::new(Method::new(weak.clone(), &name, def, parsed)))
                .collect(),
            static_fields: static_layout.into_iter().map(FieldSlot::new).collect(),
            name,
            access_flags: self.access_flags,
            superclass: self.superclass,
            fields,
            instance_layout,
            element_type: self.element_type,
            monitor: OnceCell::new(),
        }))
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Registry of loaded classes, keyed by internal name
pub struct ClassRegistry {
    classes: RwLock<FxHashMap<String, Arc<Class>>>,
}

impl ClassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(FxHashMap::default()),
        }
    }

    /// Define (or redefine) a class
    pub fn define(&self, class: Arc<Class>) -> Arc<Class> {
        self.classes
            .write()
            .insert(class.name.clone(), Arc::clone(&class));
        class
    }

    /// Get a class if it is defined
    pub fn get(&self, name: &str) -> Option<Arc<Class>> {
        self.classes.read().get(name).cloned()
    }

    /// Load a class by name, creating array classes on demand
    ///
    /// # Errors
    ///
    /// Returns `VmError::ClassNotFound` for undefined non-array classes.
    pub fn load(&self, name: &str) -> VmResult<Arc<Class>> {
        if let Some(class) = self.get(name) {
            return Ok(class);
        }
        if name.starts_with('[') {
            return self.array_class(name);
        }
        Err(VmError::ClassNotFound(name.to_string()))
    }

    /// Get or create the array class for a descriptor such as `[I`
    ///
    /// # Errors
    ///
    /// Returns `VmError::InvalidDescriptor` if `descriptor` is not an array
    /// type.
    pub fn array_class(&self, descriptor: &str) -> VmResult<Arc<Class>> {
        let element = match FieldType::parse(descriptor)? {
            FieldType::Array(element) => *element,
            _ => return Err(VmError::InvalidDescriptor(descriptor.to_string())),
        };

        let mut classes = self.classes.write();
        if let Some(class) = classes.get(descriptor) {
            return Ok(Arc::clone(class));
        }
        let mut builder = ClassBuilder::new(descriptor)
            .access_flags(flags::ACC_PUBLIC | flags::ACC_FINAL)
            .array_of(element);
        if let Some(object) = classes.get(OBJECT_CLASS) {
            builder = builder.superclass(Arc::clone(object));
        }
        let class = builder.build()?;
        classes.insert(descriptor.to_string(), Arc::clone(&class));
        Ok(class)
    }

    /// Number of defined classes
    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    /// Check if no classes are defined
    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}
