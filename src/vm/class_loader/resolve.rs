use std::sync::atomic::Ordering;
use tracing::debug;
use crate::vm::class::class::{Class, ClassRef, InitState};
use crate::vm::class::constant_pool::CPEntry;
use crate::vm::class::field::{FieldRef, FieldType};
use crate::vm::class::method::{MethodDescriptor, MethodRef};
use crate::vm::error::{Exception, ThrowableKind};
use crate::vm::object::ObjectRef;
use crate::vm::pool::string::STRING_CLASS;
use crate::vm::stats::Counter;
use crate::vm::thread::thread::VMThread;
use crate::vm::vm::VM;

fn bad_entry(referrer: &Class, index: u32, expected: &str) -> Exception {
    Exception::new(ThrowableKind::ClassFormatError,
        format!("constant pool index {} of {} is not a {} reference", index, referrer.name(), expected))
}

/// Failures of an initializer are delivered as `java/lang/Error`s.
fn initializer_error(e: Exception) -> Exception {
    if e.kind.is_error() {
        e
    } else {
        Exception::bare(ThrowableKind::ExceptionInInitializerError).with_cause(e)
    }
}

impl Class {
    /// Field lookup: declared fields, then superinterfaces, then the superclass chain.
    pub fn find_field(&self, name: &str, descriptor: &FieldType) -> Option<FieldRef> {
        if let Some(field) = self.find_declared_field(name, descriptor) {
            return Some(field.clone());
        }
        for interface in self.interfaces() {
            if let Some(field) = interface.find_field(name, descriptor) {
                return Some(field);
            }
        }
        self.superclass()?.find_field(name, descriptor)
    }

    /// Method lookup for a class: the class and its superclasses, then the implemented
    /// interfaces, preferring a method with a body.
    pub fn find_class_method(&self, name: &str, descriptor: &MethodDescriptor) -> Option<MethodRef> {
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(method) = class.find_declared_method(name, descriptor) {
                return Some(method.clone());
            }
            current = class.superclass().map(|c| &**c);
        }
        self.find_superinterface_method(name, descriptor)
    }

    /// Method lookup for an interface: the interface, its superinterfaces, then the
    /// public instance methods of `java/lang/Object`.
    pub fn find_interface_method(&self, name: &str, descriptor: &MethodDescriptor) -> Option<MethodRef> {
        if let Some(method) = self.find_declared_method(name, descriptor) {
            return Some(method.clone());
        }
        if let Some(method) = self.find_superinterface_method(name, descriptor) {
            return Some(method);
        }
        self.superclass()
            .filter(|object| object.is_object_class())
            .and_then(|object| object.find_declared_method(name, descriptor))
            .filter(|m| !m.is_static() && !m.is_private())
            .cloned()
    }

    fn find_superinterface_method(&self, name: &str, descriptor: &MethodDescriptor) -> Option<MethodRef> {
        let candidates = self.iftable().iter()
            .filter_map(|entry| entry.interface.find_declared_method(name, descriptor))
            .filter(|m| !m.is_static() && !m.is_private());

        let mut fallback = None;
        for method in candidates {
            if !method.is_abstract() {
                return Some(method.clone());
            }
            fallback.get_or_insert_with(|| method.clone());
        }
        fallback
    }
}

impl VM {
    /// Resolves the class reference `type_idx` of `referrer` through the class loader.
    pub fn resolve_type(&self, referrer: &ClassRef, type_idx: u32) -> Result<ClassRef, Exception> {
        if let Some(class) = referrer.cache.types.get(type_idx) {
            return Ok(class.clone());
        }

        let name = match referrer.cp_entry(type_idx) {
            Some(CPEntry::ClassReference(name)) => name,
            _ => return Err(bad_entry(referrer, type_idx, "class")),
        };

        let class = self.class_loader().load_class(name).map_err(|e| match e.kind {
            ThrowableKind::ClassNotFoundException =>
                Exception::new(ThrowableKind::NoClassDefFoundError, name.clone()).with_cause(e),
            _ => e,
        })?;

        debug!(referrer = referrer.name(), type_idx, class = class.name(), "resolved type");
        Ok(referrer.cache.types.put(type_idx, class))
    }

    /// Resolves the field reference `field_idx` of `referrer`. The declaring class is
    /// initialized before the field is cached.
    pub fn resolve_field(&self, thread: &VMThread, referrer: &ClassRef, field_idx: u32) -> Result<FieldRef, Exception> {
        if let Some(field) = referrer.cache.fields.get(field_idx) {
            return Ok(field.clone());
        }

        let (class_idx, name, descriptor) = match referrer.cp_entry(field_idx) {
            Some(CPEntry::FieldReference(class_idx, name, descriptor)) => (*class_idx, name, descriptor),
            _ => return Err(bad_entry(referrer, field_idx, "field")),
        };

        let class = self.resolve_type(referrer, class_idx)?;
        let ty = FieldType::parse(descriptor)?;
        let field = class.find_field(name, &ty).ok_or_else(|| Exception::new(ThrowableKind::NoSuchFieldError,
            format!("No field {} of type {} in class {} or its superclasses", name, descriptor, class.pretty_name())))?;

        self.initialize_declaring_class(thread, field.declaring_class())?;
        debug!(referrer = referrer.name(), field_idx, field = %field.pretty(), "resolved field");
        Ok(referrer.cache.fields.put(field_idx, field))
    }

    /// Resolves the method or interface method reference `method_idx` of `referrer`.
    /// The declaring class is initialized before the method is cached.
    pub fn resolve_method(&self, thread: &VMThread, referrer: &ClassRef, method_idx: u32) -> Result<MethodRef, Exception> {
        if let Some(method) = referrer.cache.methods.get(method_idx) {
            return Ok(method.clone());
        }

        let (class_idx, name, descriptor, interface) = match referrer.cp_entry(method_idx) {
            Some(CPEntry::MethodReference(class_idx, name, descriptor)) => (*class_idx, name, descriptor, false),
            Some(CPEntry::InterfaceMethodReference(class_idx, name, descriptor)) => (*class_idx, name, descriptor, true),
            _ => return Err(bad_entry(referrer, method_idx, "method")),
        };

        let class = self.resolve_type(referrer, class_idx)?;
        if class.is_interface() != interface {
            let (found, expected) = if interface { ("class", "interface") } else { ("interface", "class") };
            return Err(Exception::new(ThrowableKind::IncompatibleClassChangeError,
                format!("Found {} {}, but {} was expected", found, class.pretty_name(), expected)));
        }

        let parsed = MethodDescriptor::parse(descriptor)?;
        let method = if interface {
            class.find_interface_method(name, &parsed)
        } else {
            class.find_class_method(name, &parsed)
        };
        let method = method.ok_or_else(|| Exception::new(ThrowableKind::NoSuchMethodError,
            format!("{}.{}{}", class.pretty_name(), name, descriptor)))?;

        self.initialize_declaring_class(thread, method.declaring_class())?;
        debug!(referrer = referrer.name(), method_idx, method = %method.pretty(), "resolved method");
        Ok(referrer.cache.methods.put(method_idx, method))
    }

    /// Resolves the string constant `string_idx` of `referrer` to its interned object.
    pub fn resolve_string(&self, referrer: &ClassRef, string_idx: u32) -> Result<ObjectRef, Exception> {
        if let Some(string) = referrer.cache.strings.get(string_idx) {
            return Ok(string.clone());
        }

        let value = match referrer.cp_entry(string_idx) {
            Some(CPEntry::StringConstant(value)) => value,
            _ => return Err(bad_entry(referrer, string_idx, "string")),
        };

        let string_class = self.class_loader().load_class(STRING_CLASS)?;
        let string = self.string_pool().intern(&string_class, value);
        Ok(referrer.cache.strings.put(string_idx, string))
    }

    fn initialize_declaring_class(&self, thread: &VMThread, class: Option<ClassRef>) -> Result<(), Exception> {
        let class = class.ok_or_else(|| Exception::new(ThrowableKind::NoClassDefFoundError,
            "declaring class has been unloaded"))?;
        self.ensure_initialized(thread, &class, true).map(|_| ())
    }

    /// Makes sure `class` has been initialized, running its initializer on this thread
    /// if nobody has started it yet.
    ///
    /// Returns `Ok(false)` without doing anything when initialization would be needed
    /// but `can_run_clinit` is not set. A class whose initializer is being run by the
    /// calling thread itself counts as initialized, so an initializer can use its own
    /// class. Another thread's initializer is waited for with the mutator lock released.
    pub fn ensure_initialized(&self, thread: &VMThread, class: &ClassRef, can_run_clinit: bool) -> Result<bool, Exception> {
        loop {
            match class.init_state() {
                InitState::Initialized => return Ok(true),
                InitState::InitializationFailed => return Err(self.recorded_failure(class)),
                InitState::Initializing => {
                    if class.init.initializing_thread.load(Ordering::Acquire) == thread.id() {
                        return Ok(true);
                    }
                    if !can_run_clinit {
                        return Ok(false);
                    }
                    self.wait_for_initializer(thread, class);
                }
                InitState::NotInitialized => {
                    if !can_run_clinit {
                        return Ok(false);
                    }
                    let claimed = class.init.state.compare_exchange(
                        InitState::NotInitialized.into(), InitState::Initializing.into(),
                        Ordering::AcqRel, Ordering::Acquire);
                    if claimed.is_ok() {
                        class.init.initializing_thread.store(thread.id(), Ordering::Release);
                        return self.run_initializer(thread, class).map(|_| true);
                    }
                }
            }
        }
    }

    fn recorded_failure(&self, class: &Class) -> Exception {
        match class.init.failure.get() {
            Some(e) => e.clone(),
            None => Exception::new(ThrowableKind::NoClassDefFoundError,
                format!("Could not initialize class {}", class.pretty_name())),
        }
    }

    fn wait_for_initializer(&self, thread: &VMThread, class: &Class) {
        debug!(class = class.name(), thread = thread.id(), "waiting for initializer of another thread");
        let slice = self.options().init_wait_slice;
        thread.in_blocked_state(|| {
            let mut guard = class.init.lock.lock();
            while class.init_state() == InitState::Initializing {
                class.init.cond.wait_for(&mut guard, slice);
            }
        });
    }

    fn run_initializer(&self, thread: &VMThread, class: &ClassRef) -> Result<(), Exception> {
        debug!(class = class.name(), thread = thread.id(), "initializing class");
        self.stats().record(Counter::ClassInitialization);

        let result = self.initialize_supertypes_and_run_clinit(thread, class).map_err(initializer_error);
        match &result {
            Ok(()) => {
                class.init.set_state(InitState::Initialized);
                debug!(class = class.name(), "initialized class");
            }
            Err(e) => {
                let _ = class.init.failure.set(e.clone());
                class.init.set_state(InitState::InitializationFailed);
                debug!(class = class.name(), error = %e, "class initialization failed");
            }
        }
        result
    }

    fn initialize_supertypes_and_run_clinit(&self, thread: &VMThread, class: &ClassRef) -> Result<(), Exception> {
        if !class.is_interface() {
            if let Some(superclass) = class.superclass() {
                self.ensure_initialized(thread, superclass, true)?;
            }
        }
        for interface in class.interfaces() {
            self.ensure_initialized(thread, interface, true)?;
        }

        if let Some(clinit) = class.class_initializer() {
            self.invoke(thread, clinit, &[]);
            if let Some(e) = thread.take_exception() {
                return Err(e);
            }
        }
        Ok(())
    }
}
