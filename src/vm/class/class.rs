use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex, RwLock};
use smallvec::SmallVec;
use crate::helper::has_flag;
use crate::vm::class::access::AccessFlagClass;
use crate::vm::class::cache::ResolvedSymbolCache;
use crate::vm::class::constant_pool::CPEntry;
use crate::vm::class::field::{FieldRef, FieldType, pretty_type};
use crate::vm::class::method::{Method, MethodDescriptor, MethodRef};
use crate::vm::error::Exception;
use crate::vm::object::Value;

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a class for as long as the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u64);

impl ClassId {
    pub(crate) fn next() -> Self {
        ClassId(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(TryFromPrimitive, IntoPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InitState {
    NotInitialized = 0,
    Initializing = 1,
    Initialized = 2,
    InitializationFailed = 3,
}

/// Initialization progress of one class. `state` is read lock-free; `lock`/`cond` are
/// only used by threads that have to wait for another thread's initializer.
pub(crate) struct ClassInit {
    pub(crate) state: AtomicU8,
    /// Thread running the initializer, valid while `state` is `Initializing`.
    pub(crate) initializing_thread: AtomicU64,
    /// Error handed to every caller once the initializer failed.
    pub(crate) failure: OnceCell<Exception>,
    pub(crate) lock: Mutex<()>,
    pub(crate) cond: Condvar,
}

impl ClassInit {
    pub(crate) fn new(state: InitState) -> Self {
        ClassInit {
            state: AtomicU8::new(state.into()),
            initializing_thread: AtomicU64::new(0),
            failure: OnceCell::new(),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn state(&self) -> InitState {
        // Only values of InitState are ever stored.
        InitState::try_from(self.state.load(Ordering::Acquire)).unwrap_or(InitState::InitializationFailed)
    }

    pub(crate) fn set_state(&self, state: InitState) {
        let _guard = self.lock.lock();
        self.state.store(state.into(), Ordering::Release);
        self.cond.notify_all();
    }
}

/// Maps the method slots of one implemented interface to vtable slots of the class.
#[derive(Debug, Clone)]
pub struct IfTableEntry {
    pub interface: ClassRef,
    pub slots: SmallVec<[u16; 8]>,
}

/// Runtime representation of a loaded class: its linked layout, dispatch tables,
/// constant pool with the cache of what it resolved to, static storage and init state.
pub struct Class {
    pub(crate) id: ClassId,
    pub(crate) name: String,
    pub(crate) flag: u16,
    pub(crate) superclass: Option<ClassRef>,
    pub(crate) interfaces: SmallVec<[ClassRef; 4]>,
    pub(crate) component_type: Option<ClassRef>,
    pub(crate) primitive_type: Option<FieldType>,
    pub(crate) fields: Vec<FieldRef>,
    pub(crate) methods: Vec<MethodRef>,
    pub(crate) vtable: Vec<MethodRef>,
    pub(crate) iftable: Vec<IfTableEntry>,
    pub(crate) constant_pool: Vec<CPEntry>,
    pub(crate) cache: ResolvedSymbolCache,
    pub(crate) static_fields: RwLock<Box<[Value]>>,
    pub(crate) instance_field_count: usize,
    pub(crate) init: ClassInit,
}

/// Concrete type used as "pointer" to a Class instance
pub type ClassRef = Arc<Class>;

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Class {}

impl Debug for Class {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("flag", &format_args!("{:#06x}", self.flag))
            .field("state", &self.init_state())
            .finish()
    }
}

impl Class {
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flag(&self) -> u16 {
        self.flag
    }

    /// Dotted source-level name: `java.lang.String`, `int[]`.
    pub fn pretty_name(&self) -> String {
        match &self.primitive_type {
            Some(ty) => pretty_type(ty),
            None if self.is_array() => match FieldType::parse(&self.name) {
                Ok(ty) => pretty_type(&ty),
                Err(_) => self.name.replace('/', "."),
            },
            None => self.name.replace('/', "."),
        }
    }

    /// Type descriptor of this class: `Ljava/lang/String;`, `[I`, `J`.
    pub fn descriptor(&self) -> String {
        if self.is_array() || self.is_primitive() {
            self.name.clone()
        } else {
            format!("L{};", self.name)
        }
    }

    /// Name of the innermost element class for arrays, the class name otherwise.
    pub fn element_class_name(&self) -> &str {
        let mut name = self.name.trim_start_matches('[');
        if self.is_array() {
            name = name.strip_prefix('L').and_then(|n| n.strip_suffix(';')).unwrap_or(name);
        }
        name
    }

    pub fn is_public(&self) -> bool {
        has_flag(self.flag, AccessFlagClass::ACC_PUBLIC)
    }

    pub fn is_final(&self) -> bool {
        has_flag(self.flag, AccessFlagClass::ACC_FINAL)
    }

    pub fn is_interface(&self) -> bool {
        has_flag(self.flag, AccessFlagClass::ACC_INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        has_flag(self.flag, AccessFlagClass::ACC_ABSTRACT)
    }

    pub fn is_array(&self) -> bool {
        self.component_type.is_some()
    }

    pub fn is_primitive(&self) -> bool {
        self.primitive_type.is_some()
    }

    pub fn primitive_type(&self) -> Option<&FieldType> {
        self.primitive_type.as_ref()
    }

    pub fn is_object_class(&self) -> bool {
        self.superclass.is_none() && !self.is_interface() && !self.is_primitive()
    }

    pub fn is_instantiable(&self) -> bool {
        !self.is_interface() && !self.is_abstract() && !self.is_array() && !self.is_primitive()
    }

    pub fn superclass(&self) -> Option<&ClassRef> {
        self.superclass.as_ref()
    }

    pub fn interfaces(&self) -> &[ClassRef] {
        &self.interfaces
    }

    pub fn component_type(&self) -> Option<&ClassRef> {
        self.component_type.as_ref()
    }

    pub fn fields(&self) -> &[FieldRef] {
        &self.fields
    }

    pub fn methods(&self) -> &[MethodRef] {
        &self.methods
    }

    pub fn vtable(&self) -> &[MethodRef] {
        &self.vtable
    }

    pub fn iftable(&self) -> &[IfTableEntry] {
        &self.iftable
    }

    pub fn constant_pool(&self) -> &[CPEntry] {
        &self.constant_pool
    }

    pub fn cp_entry(&self, index: u32) -> Option<&CPEntry> {
        self.constant_pool.get(index as usize)
    }

    pub fn cache(&self) -> &ResolvedSymbolCache {
        &self.cache
    }

    pub fn instance_field_count(&self) -> usize {
        self.instance_field_count
    }

    /// Walks the superclass chain; a class is a subclass of itself.
    pub fn is_subclass_of(&self, other: &Class) -> bool {
        if self == other {
            return true;
        }
        let mut current = self.superclass.as_deref();
        while let Some(class) = current {
            if class == other {
                return true;
            }
            current = class.superclass.as_deref();
        }
        false
    }

    pub fn implements(&self, interface: &Class) -> bool {
        self.iftable.iter().any(|entry| *entry.interface == *interface)
    }

    /// Could a value of class `src` be stored in a variable of this class?
    pub fn is_assignable_from(&self, src: &Class) -> bool {
        if self == src {
            return true;
        }
        if self.is_object_class() {
            return !src.is_primitive();
        }
        if self.is_interface() {
            return src.implements(self);
        }
        if let Some(component) = &self.component_type {
            return match &src.component_type {
                Some(src_component) if component.is_primitive() || src_component.is_primitive() =>
                    component == src_component,
                Some(src_component) => component.is_assignable_from(src_component),
                None => false,
            };
        }
        src.is_subclass_of(self)
    }

    pub fn find_declared_field(&self, name: &str, descriptor: &FieldType) -> Option<&FieldRef> {
        self.fields.iter().find(|f| f.name == name && &f.descriptor == descriptor)
    }

    pub fn find_declared_field_by_name(&self, name: &str) -> Option<&FieldRef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn find_declared_method(&self, name: &str, descriptor: &MethodDescriptor) -> Option<&MethodRef> {
        self.methods.iter().find(|m| m.matches(name, descriptor))
    }

    pub fn find_declared_method_by_name(&self, name: &str) -> Option<&MethodRef> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn class_initializer(&self) -> Option<&MethodRef> {
        self.methods.iter().find(|m| {
            m.is_class_initializer()
                && m.descriptor.ret == FieldType::V
                && m.descriptor.parameters.is_empty()
        })
    }

    /// Target of an interface call on an instance of this class.
    pub fn find_virtual_method_for_interface(&self, method: &Method) -> Option<&MethodRef> {
        let interface = method.declaring_class()?;
        if !interface.is_interface() {
            // Methods of java/lang/Object reached through an interface reference.
            return self.vtable.get(method.method_index as usize);
        }
        let entry = self.iftable.iter().find(|e| *e.interface == *interface)?;
        let slot = *entry.slots.get(method.method_index as usize)?;
        self.vtable.get(slot as usize)
    }

    pub fn init_state(&self) -> InitState {
        self.init.state()
    }

    pub fn is_initialized(&self) -> bool {
        self.init_state() == InitState::Initialized
    }

    /// Initialization has at least started: `Initializing` or `Initialized`.
    pub fn is_initializing(&self) -> bool {
        matches!(self.init_state(), InitState::Initializing | InitState::Initialized)
    }

    pub fn is_erroneous(&self) -> bool {
        self.init_state() == InitState::InitializationFailed
    }

    pub fn get_static(&self, slot: usize) -> Option<Value> {
        self.static_fields.read().get(slot).cloned()
    }

    pub fn set_static(&self, slot: usize, value: Value) -> bool {
        match self.static_fields.write().get_mut(slot) {
            Some(stored) => {
                *stored = value;
                true
            }
            None => false
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::vm::class::access::{AccessFlagClass, AccessFlagMethod};
    use crate::vm::class::class::InitState;
    use crate::vm::class_loader::bootstrap::{BootstrapClassLoader, ClassBuilder};

    const INTERFACE: u16 = AccessFlagClass::ACC_INTERFACE as u16 | AccessFlagClass::ACC_ABSTRACT as u16;
    const PUBLIC: u16 = AccessFlagMethod::ACC_PUBLIC as u16;

    #[test]
    fn assignability() {
        let loader = BootstrapClassLoader::new().unwrap();
        let object = loader.find_or_create_class("java/lang/Object").unwrap();
        let runnable = loader.define_class(ClassBuilder::new("t/Runnable").flags(INTERFACE)
            .abstract_method("run", "()V", PUBLIC)).unwrap();
        let base = loader.define_class(ClassBuilder::new("t/Base").interface("t/Runnable")
            .native_method("run", "()V", PUBLIC, |_, _| None)).unwrap();
        let derived = loader.define_class(ClassBuilder::new("t/Derived").super_class("t/Base")).unwrap();
        let other = loader.define_class(ClassBuilder::new("t/Other")).unwrap();

        assert!(object.is_assignable_from(&derived));
        assert!(base.is_assignable_from(&derived));
        assert!(!derived.is_assignable_from(&base));
        assert!(runnable.is_assignable_from(&derived));
        assert!(!runnable.is_assignable_from(&other));

        let base_array = loader.find_or_create_class("[Lt/Base;").unwrap();
        let derived_array = loader.find_or_create_class("[Lt/Derived;").unwrap();
        let ints = loader.find_or_create_class("[I").unwrap();
        let longs = loader.find_or_create_class("[J").unwrap();
        assert!(base_array.is_assignable_from(&derived_array));
        assert!(!derived_array.is_assignable_from(&base_array));
        assert!(!ints.is_assignable_from(&longs));
        assert!(object.is_assignable_from(&ints));
    }

    #[test]
    fn interface_dispatch_goes_through_iftable() {
        let loader = BootstrapClassLoader::new().unwrap();
        let iface = loader.define_class(ClassBuilder::new("t/Shape").flags(INTERFACE)
            .abstract_method("area", "()I", PUBLIC)
            .abstract_method("sides", "()I", PUBLIC)).unwrap();
        let square = loader.define_class(ClassBuilder::new("t/Square").interface("t/Shape")
            .native_method("sides", "()I", PUBLIC, |_, _| None)
            .native_method("area", "()I", PUBLIC, |_, _| None)).unwrap();

        let sides = iface.find_declared_method_by_name("sides").unwrap();
        let target = square.find_virtual_method_for_interface(sides).unwrap();
        assert_eq!(target.name, "sides");
        assert_eq!(*target.declaring_class().unwrap(), *square);
    }

    #[test]
    fn names_and_states() {
        let loader = BootstrapClassLoader::new().unwrap();
        let class = loader.define_class(ClassBuilder::new("t/Plain")).unwrap();
        let array = loader.find_or_create_class("[[Lt/Plain;").unwrap();

        assert_eq!(class.pretty_name(), "t.Plain");
        assert_eq!(class.descriptor(), "Lt/Plain;");
        assert_eq!(array.pretty_name(), "t.Plain[][]");
        assert_eq!(array.element_class_name(), "t/Plain");
        assert_eq!(class.init_state(), InitState::NotInitialized);
        assert!(array.is_initialized());
        assert!(!array.is_instantiable());
    }
}
