use std::collections::HashMap;
use std::sync::{Arc, Weak};
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use tracing::debug;
use crate::helper::{has_flag, package_of};
use crate::vm::class::access::{AccessFlagClass, AccessFlagField, AccessFlagMethod};
use crate::vm::class::cache::ResolvedSymbolCache;
use crate::vm::class::class::{Class, ClassId, ClassInit, ClassRef, IfTableEntry, InitState};
use crate::vm::class::constant_pool::CPEntry;
use crate::vm::class::field::{Field, FieldType};
use crate::vm::class::method::{Code, Method, MethodDescriptor, MethodRef, MethodRepr, NativeFn};
use crate::vm::class_loader::array::{create_array_class, create_primitive_class};
use crate::vm::class_loader::ClassLoader;
use crate::vm::error::{Exception, ThrowableKind};
use crate::vm::object::Value;
use crate::vm::pool::string::STRING_CLASS;
use crate::vm::thread::thread::VMThread;

pub const OBJECT_CLASS: &str = "java/lang/Object";

enum MethodBody {
    Native(NativeFn),
    Bytecode(Code),
    Abstract,
}

struct MethodSpec {
    name: String,
    descriptor: String,
    flag: u16,
    body: MethodBody,
}

/// Description of a class to define: what a parsed class file would provide.
pub struct ClassBuilder {
    name: String,
    flag: u16,
    super_class: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<(String, String, u16)>,
    methods: Vec<MethodSpec>,
    constant_pool: Vec<CPEntry>,
}

impl ClassBuilder {
    /// A package-private class extending `java/lang/Object`.
    pub fn new(name: &str) -> Self {
        ClassBuilder {
            name: name.to_string(),
            flag: 0,
            super_class: None,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            constant_pool: vec![],
        }
    }

    pub fn flags(mut self, flag: u16) -> Self {
        self.flag = flag;
        self
    }

    pub fn super_class(mut self, name: &str) -> Self {
        self.super_class = Some(name.to_string());
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    pub fn field(mut self, name: &str, descriptor: &str, flag: u16) -> Self {
        self.fields.push((name.to_string(), descriptor.to_string(), flag));
        self
    }

    pub fn native_method<F>(mut self, name: &str, descriptor: &str, flag: u16, body: F) -> Self
    where
        F: Fn(&VMThread, &[Value]) -> Option<Value> + Send + Sync + 'static,
    {
        self.methods.push(MethodSpec {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            flag: flag | AccessFlagMethod::ACC_NATIVE as u16,
            body: MethodBody::Native(Arc::new(body)),
        });
        self
    }

    pub fn abstract_method(mut self, name: &str, descriptor: &str, flag: u16) -> Self {
        self.methods.push(MethodSpec {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            flag: flag | AccessFlagMethod::ACC_ABSTRACT as u16,
            body: MethodBody::Abstract,
        });
        self
    }

    pub fn bytecode_method(mut self, name: &str, descriptor: &str, flag: u16, code: Code) -> Self {
        self.methods.push(MethodSpec {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            flag,
            body: MethodBody::Bytecode(code),
        });
        self
    }

    /// Native `<clinit>`.
    pub fn static_initializer<F>(self, body: F) -> Self
    where
        F: Fn(&VMThread, &[Value]) -> Option<Value> + Send + Sync + 'static,
    {
        self.native_method("<clinit>", "()V", AccessFlagMethod::ACC_STATIC as u16, body)
    }

    pub fn constant_pool(mut self, entries: Vec<CPEntry>) -> Self {
        self.constant_pool = entries;
        self
    }

    /// Appends one constant pool entry. Its index is the number of entries before it.
    pub fn cp(mut self, entry: CPEntry) -> Self {
        self.constant_pool.push(entry);
        self
    }

    fn is_interface(&self) -> bool {
        has_flag(self.flag, AccessFlagClass::ACC_INTERFACE)
    }
}

fn not_found(name: &str) -> Exception {
    Exception::new(ThrowableKind::ClassNotFoundException, name.replace('/', "."))
}

fn no_class_def(name: &str, cause: Exception) -> Exception {
    Exception::new(ThrowableKind::NoClassDefFoundError, name.to_string()).with_cause(cause)
}

fn incompatible(message: String) -> Exception {
    Exception::new(ThrowableKind::IncompatibleClassChangeError, message)
}

fn is_direct_spec(name: &str, flag: u16) -> bool {
    has_flag(flag, AccessFlagMethod::ACC_STATIC)
        || has_flag(flag, AccessFlagMethod::ACC_PRIVATE)
        || name == "<init>"
        || name == "<clinit>"
}

/// Can a method of class `class_name` override `method`?
fn can_override(class_name: &str, method: &Method) -> bool {
    if has_flag(method.flag, AccessFlagMethod::ACC_PUBLIC) || has_flag(method.flag, AccessFlagMethod::ACC_PROTECTED) {
        return true;
    }
    method.declaring_class()
        .map_or(false, |declaring| package_of(declaring.name()) == package_of(class_name))
}

/// The only class loader: an in-memory registry of classes defined from `ClassBuilder`s,
/// plus primitive and array classes synthesized on demand.
pub struct BootstrapClassLoader {
    classes: RwLock<HashMap<String, ClassRef>>,
    define_lock: Mutex<()>,
}

impl BootstrapClassLoader {
    /// A loader holding `java/lang/Object` and `java/lang/String`.
    pub fn new() -> Result<Self, Exception> {
        let loader = BootstrapClassLoader {
            classes: RwLock::new(HashMap::new()),
            define_lock: Mutex::new(()),
        };
        let public = AccessFlagMethod::ACC_PUBLIC as u16;

        let object = ClassBuilder::new(OBJECT_CLASS)
            .flags(AccessFlagClass::ACC_PUBLIC as u16)
            .native_method("<init>", "()V", public, |_, _| None)
            .native_method("hashCode", "()I", public, |_, args| {
                let this = args.first()?.as_object()?;
                Some(Value::int(Arc::as_ptr(this) as usize as i32))
            })
            .native_method("equals", "(Ljava/lang/Object;)Z", public, |_, args| {
                let same = args.len() == 2 && args[0] == args[1];
                Some(Value::int(same as i32))
            });

        let string = ClassBuilder::new(STRING_CLASS)
            .flags(AccessFlagClass::ACC_PUBLIC as u16 | AccessFlagClass::ACC_FINAL as u16)
            .native_method("length", "()I", public, |_, args| {
                let this = args.first()?.as_object()?;
                Some(Value::int(this.as_str()?.encode_utf16().count() as i32))
            });

        loader.define_class(object)?;
        loader.define_class(string)?;
        Ok(loader)
    }

    pub fn find_loaded_class(&self, name: &str) -> Option<ClassRef> {
        self.classes.read().get(name).cloned()
    }

    /// Returns the class `name`, synthesizing array and primitive classes on first use.
    pub fn find_or_create_class(&self, name: &str) -> Result<ClassRef, Exception> {
        if let Some(class) = self.find_loaded_class(name) {
            return Ok(class);
        }

        let class = if name.starts_with('[') {
            let component_name = match FieldType::parse(name) {
                Ok(FieldType::A(component)) => component.class_name(),
                _ => return Err(not_found(name)),
            };
            let component = self.find_or_create_class(&component_name)?;
            let object = self.find_or_create_class(OBJECT_CLASS)?;
            create_array_class(name, component, &object)
        } else {
            match FieldType::parse(name).ok().filter(|_| name.len() == 1).and_then(create_primitive_class) {
                Some(class) => class,
                None => return Err(not_found(name)),
            }
        };

        let mut classes = self.classes.write();
        let class = classes.entry(name.to_string()).or_insert_with(|| Arc::new(class)).clone();
        Ok(class)
    }

    /// Links `builder` against the classes already loaded and registers the result.
    pub fn define_class(&self, builder: ClassBuilder) -> Result<ClassRef, Exception> {
        let _define = self.define_lock.lock();

        if self.find_loaded_class(&builder.name).is_some() {
            return Err(Exception::new(ThrowableKind::LinkageError,
                format!("duplicate class definition for {}", builder.name)));
        }

        let class = self.link(builder)?;
        self.classes.write().insert(class.name.clone(), class.clone());
        debug!(class = class.name(), vtable = class.vtable.len(), interfaces = class.iftable.len(), "defined class");
        Ok(class)
    }

    fn load_super(&self, name: &str) -> Result<ClassRef, Exception> {
        self.find_or_create_class(name).map_err(|e| no_class_def(name, e))
    }

    fn link(&self, builder: ClassBuilder) -> Result<ClassRef, Exception> {
        let is_interface = builder.is_interface();
        let mut flag = builder.flag;
        if is_interface {
            flag |= AccessFlagClass::ACC_ABSTRACT as u16;
        }

        let superclass = if builder.name == OBJECT_CLASS {
            None
        } else {
            let super_name = match &builder.super_class {
                Some(name) if !is_interface => name.as_str(),
                _ => OBJECT_CLASS,
            };
            let superclass = self.load_super(super_name)?;
            if superclass.is_interface() {
                return Err(incompatible(format!("class {} has interface {} as super class",
                    builder.name, superclass.name())));
            }
            if superclass.is_final() || superclass.is_array() || superclass.is_primitive() {
                return Err(incompatible(format!("class {} cannot inherit from final class {}",
                    builder.name, superclass.name())));
            }
            Some(superclass)
        };

        let mut interfaces: SmallVec<[ClassRef; 4]> = SmallVec::new();
        for name in &builder.interfaces {
            let interface = self.load_super(name)?;
            if !interface.is_interface() {
                return Err(incompatible(format!("class {} can not implement {}, because it is not an interface",
                    builder.name, interface.name())));
            }
            interfaces.push(interface);
        }

        // Field layout: statics get their own storage, instance slots follow the
        // superclass' slots.
        let mut static_types = vec![];
        let mut instance_field_count = superclass.as_ref().map_or(0, |s| s.instance_field_count);
        let mut fields = Vec::with_capacity(builder.fields.len());
        for (name, descriptor, field_flag) in builder.fields {
            let descriptor = FieldType::parse(&descriptor)?;
            let slot = if has_flag(field_flag, AccessFlagField::ACC_STATIC) {
                static_types.push(descriptor.clone());
                static_types.len() - 1
            } else {
                instance_field_count += 1;
                instance_field_count - 1
            };
            fields.push((name, descriptor, field_flag, slot));
        }

        // Dispatch indices: overriding methods take the slot they override, new virtual
        // methods are appended. Interface methods are numbered in declaration order.
        let super_vtable: &[MethodRef] = match (&superclass, is_interface) {
            (Some(superclass), false) => superclass.vtable.as_slice(),
            _ => &[],
        };
        let mut next_index = super_vtable.len();
        let mut methods = Vec::with_capacity(builder.methods.len());
        for spec in builder.methods {
            let descriptor = MethodDescriptor::parse(&spec.descriptor)?;
            if methods.iter().any(|(s, d, _): &(MethodSpec, MethodDescriptor, u16)| s.name == spec.name && *d == descriptor) {
                return Err(Exception::new(ThrowableKind::ClassFormatError,
                    format!("duplicate method {}{} in class {}", spec.name, spec.descriptor, builder.name)));
            }

            let method_index = if is_direct_spec(&spec.name, spec.flag) {
                0
            } else if is_interface {
                next_index += 1;
                next_index - 1
            } else {
                let overridden = super_vtable.iter()
                    .position(|m| m.matches(&spec.name, &descriptor) && can_override(&builder.name, m));
                match overridden {
                    Some(slot) if has_flag(super_vtable[slot].flag, AccessFlagMethod::ACC_FINAL) => {
                        return Err(incompatible(format!("class {} overrides final method {}",
                            builder.name, super_vtable[slot].pretty())));
                    }
                    Some(slot) => slot,
                    None => {
                        next_index += 1;
                        next_index - 1
                    }
                }
            };
            let method_index = u16::try_from(method_index).map_err(|_| Exception::new(
                ThrowableKind::ClassFormatError, format!("too many methods in class {}", builder.name)))?;
            methods.push((spec, descriptor, method_index));
        }
        let inherited_vtable = super_vtable.to_vec();

        let constant_pool = builder.constant_pool;
        let name = builder.name;

        Ok(Arc::new_cyclic(|this: &Weak<Class>| {
            let fields: Vec<_> = fields.into_iter().map(|(name, descriptor, flag, slot)| Arc::new(Field {
                declaring_class: this.clone(),
                flag,
                name,
                descriptor,
                slot,
            })).collect();

            let methods: Vec<MethodRef> = methods.into_iter().map(|(spec, descriptor, method_index)| Arc::new(Method {
                declaring_class: this.clone(),
                flag: spec.flag,
                name: spec.name,
                descriptor,
                method_index,
                repr: match spec.body {
                    MethodBody::Native(native) => MethodRepr::Native(native),
                    MethodBody::Bytecode(code) => MethodRepr::Bytecode(code),
                    MethodBody::Abstract => MethodRepr::Abstract,
                },
            })).collect();

            let mut vtable = inherited_vtable;
            if !is_interface {
                for method in methods.iter().filter(|m| !m.is_direct()) {
                    let slot = method.method_index as usize;
                    if slot < vtable.len() {
                        vtable[slot] = method.clone();
                    } else {
                        vtable.push(method.clone());
                    }
                }
            }

            let iftable = build_iftable(superclass.as_ref(), &interfaces, is_interface, &mut vtable);
            let static_fields: Box<[Value]> = static_types.iter().map(Value::zero_for).collect();
            let cache = ResolvedSymbolCache::new(constant_pool.len());

            Class {
                id: ClassId::next(),
                name,
                flag,
                superclass,
                interfaces,
                component_type: None,
                primitive_type: None,
                fields,
                methods,
                vtable,
                iftable,
                constant_pool,
                cache,
                static_fields: RwLock::new(static_fields),
                instance_field_count,
                init: ClassInit::new(InitState::NotInitialized),
            }
        }))
    }
}

/// Every interface the class implements, directly or not, with each interface method
/// mapped to a vtable slot. Interface methods nothing implements get an abstract
/// ("miranda") slot appended to the vtable. Interfaces only list their superinterfaces.
fn build_iftable(superclass: Option<&ClassRef>, interfaces: &[ClassRef], is_interface: bool,
                 vtable: &mut Vec<MethodRef>) -> Vec<IfTableEntry> {
    let mut iftable: Vec<IfTableEntry> = match superclass {
        Some(superclass) if !is_interface => superclass.iftable.clone(),
        _ => vec![],
    };

    let mut all_interfaces: Vec<ClassRef> = vec![];
    for interface in interfaces {
        let inherited = interface.iftable.iter().map(|e| &e.interface).chain(std::iter::once(interface));
        for candidate in inherited {
            let known = all_interfaces.iter().chain(iftable.iter().map(|e| &e.interface))
                .any(|i| i.id() == candidate.id());
            if !known {
                all_interfaces.push(candidate.clone());
            }
        }
    }

    for interface in all_interfaces {
        let mut slots = SmallVec::new();
        if !is_interface {
            for method in interface.methods.iter().filter(|m| !m.is_direct()) {
                let slot = match vtable.iter().position(|m| m.matches(&method.name, &method.descriptor)) {
                    Some(slot) => slot,
                    None => {
                        vtable.push(method.clone());
                        vtable.len() - 1
                    }
                };
                slots.push(slot as u16);
            }
        }
        iftable.push(IfTableEntry { interface, slots });
    }
    iftable
}

impl ClassLoader for BootstrapClassLoader {
    fn load_class(&self, name: &str) -> Result<ClassRef, Exception> {
        self.find_or_create_class(name)
    }
}
