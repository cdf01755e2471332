use tracing::debug;
use crate::vm::class::class::{Class, ClassRef};
use crate::vm::class::field::{FieldRef, FieldType};
use crate::vm::class::method::{InvokeType, Method, MethodRef};
use crate::vm::error::{Exception, PendingException, ThrowableKind};
use crate::vm::object::ObjectRef;
use crate::vm::runtime_support::fast_path::FindFieldType;
use crate::vm::stats::Counter;
use crate::vm::thread::thread::VMThread;

fn referring_class(referrer: &Method, thread: &VMThread) -> Result<ClassRef, PendingException> {
    referrer.declaring_class().ok_or_else(|| thread.throw_new(ThrowableKind::InternalError,
        format!("declaring class of {} has been unloaded", referrer.name)))
}

fn throw_illegal_access_class(thread: &VMThread, referrer: &Class, accessed: &Class) -> PendingException {
    thread.throw_new(ThrowableKind::IllegalAccessError,
        format!("Illegal class access: '{}' attempting to access '{}'",
            referrer.pretty_name(), accessed.pretty_name()))
}

/// Slow field lookup: resolves and initializes as needed and raises the precise error
/// for everything `find_field_fast` declines.
pub fn find_field_from_code(field_idx: u32, referrer: &Method, thread: &VMThread,
                            find_type: FindFieldType, expected_size: usize) -> Result<FieldRef, PendingException> {
    let vm = thread.vm();
    vm.stats().record(Counter::SlowResolution);
    let referring_class = referring_class(referrer, thread)?;

    let resolved_field = vm.resolve_field(thread, &referring_class, field_idx)
        .map_err(|e| thread.throw(e))?;
    let fields_class = match resolved_field.declaring_class() {
        Some(class) => class,
        None => return Err(thread.throw_new(ThrowableKind::NoSuchFieldError, resolved_field.name.clone())),
    };

    if resolved_field.is_static() != find_type.is_static() {
        let (expected, found) = if find_type.is_static() { ("static", "instance") } else { ("instance", "static") };
        return Err(thread.throw_new(ThrowableKind::IncompatibleClassChangeError,
            format!("Expected '{}' to be a {} field rather than a {} field",
                resolved_field.pretty(), expected, found)));
    }
    if !referring_class.can_access(&fields_class) {
        return Err(throw_illegal_access_class(thread, &referring_class, &fields_class));
    }
    if !referring_class.can_access_member(&fields_class, resolved_field.flag) {
        return Err(thread.throw_new(ThrowableKind::IllegalAccessError,
            format!("Field '{}' is inaccessible to class '{}'",
                resolved_field.pretty(), referring_class.pretty_name())));
    }
    if find_type.is_set() && resolved_field.is_final() && fields_class != referring_class {
        return Err(thread.throw_new(ThrowableKind::IllegalAccessError,
            format!("Final field '{}' cannot be written to by method '{}'",
                resolved_field.pretty(), referrer.pretty())));
    }
    if resolved_field.is_primitive_type() != find_type.is_primitive()
        || resolved_field.field_size() != expected_size {
        return Err(thread.throw_new(ThrowableKind::NoSuchFieldError,
            format!("Attempted read of {}-bit {} on field '{}'", expected_size * 8,
                if find_type.is_primitive() { "primitive" } else { "non-primitive" },
                resolved_field.pretty())));
    }

    if find_type.is_static() {
        // Resolution started initialization; another thread may still be running it.
        vm.ensure_initialized(thread, &fields_class, true).map_err(|e| thread.throw(e))?;
    }
    debug!(field = %resolved_field.pretty(), %find_type, "slow path field");
    Ok(resolved_field)
}

/// Slow method lookup and dispatch.
pub fn find_method_from_code(method_idx: u32, this_object: Option<&ObjectRef>, referrer: &Method,
                             thread: &VMThread, access_check: bool, invoke_type: InvokeType)
                             -> Result<MethodRef, PendingException> {
    let vm = thread.vm();
    vm.stats().record(Counter::SlowResolution);
    let referring_class = referring_class(referrer, thread)?;

    let resolved_method = vm.resolve_method(thread, &referring_class, method_idx)
        .map_err(|e| thread.throw(e))?;
    let methods_class = match resolved_method.declaring_class() {
        Some(class) => class,
        None => return Err(thread.throw_new(ThrowableKind::NoSuchMethodError, resolved_method.pretty())),
    };

    let receiver = match this_object {
        Some(receiver) => Some(receiver),
        None if invoke_type.is_direct() => None,
        None => return Err(thread.throw_new(ThrowableKind::NullPointerException,
            format!("Attempt to invoke {} method '{}' on a null object reference",
                invoke_type, resolved_method.pretty()))),
    };

    if access_check {
        if resolved_method.check_incompatible_class_change(invoke_type) {
            return Err(thread.throw_new(ThrowableKind::IncompatibleClassChangeError,
                format!("The method '{}' was expected to be of type {} but instead was found to be of type {}",
                    resolved_method.pretty(), invoke_type, resolved_method.invoke_type())));
        }
        if !referring_class.can_access(&methods_class) {
            return Err(throw_illegal_access_class(thread, &referring_class, &methods_class));
        }
        if !referring_class.can_access_member(&methods_class, resolved_method.flag) {
            return Err(thread.throw_new(ThrowableKind::IllegalAccessError,
                format!("Method '{}' is inaccessible to class '{}'",
                    resolved_method.pretty(), referring_class.pretty_name())));
        }
    }

    let target = match (invoke_type, receiver) {
        (InvokeType::Static | InvokeType::Direct, _) => return Ok(resolved_method),
        (InvokeType::Interface, Some(receiver)) => {
            let class = receiver.class();
            match class.find_virtual_method_for_interface(&resolved_method) {
                Some(method) => method.clone(),
                None => return Err(thread.throw_new(ThrowableKind::IncompatibleClassChangeError,
                    format!("Class '{}' does not implement interface '{}' in call to '{}'",
                        class.pretty_name(), methods_class.pretty_name(), resolved_method.pretty()))),
            }
        }
        (InvokeType::Virtual, Some(receiver)) if methods_class.is_interface() => {
            match receiver.class().find_virtual_method_for_interface(&resolved_method) {
                Some(method) => method.clone(),
                None => return Err(no_such_virtual(thread, &resolved_method, receiver.class())),
            }
        }
        (InvokeType::Virtual, Some(receiver)) => {
            let class = receiver.class();
            match class.vtable().get(resolved_method.method_index as usize) {
                Some(method) => method.clone(),
                None => return Err(no_such_virtual(thread, &resolved_method, class)),
            }
        }
        (InvokeType::Super, _) => {
            let superclass = match referring_class.superclass() {
                Some(superclass) if !methods_class.is_interface() => superclass,
                _ => return Err(thread.throw_new(ThrowableKind::IncompatibleClassChangeError,
                    format!("Invalid super call to '{}' from '{}'",
                        resolved_method.pretty(), referring_class.pretty_name()))),
            };
            match superclass.vtable().get(resolved_method.method_index as usize) {
                Some(method) => method.clone(),
                None => return Err(no_such_virtual(thread, &resolved_method, superclass)),
            }
        }
        (_, None) => return Err(thread.throw_new(ThrowableKind::NullPointerException, resolved_method.pretty())),
    };

    debug!(resolved = %resolved_method.pretty(), target = %target.pretty(), %invoke_type, "slow path dispatch");
    Ok(target)
}

fn no_such_virtual(thread: &VMThread, method: &Method, class: &Class) -> PendingException {
    thread.throw_new(ThrowableKind::NoSuchMethodError,
        format!("{} has no vtable slot {} for '{}'", class.pretty_name(), method.method_index, method.pretty()))
}

/// Resolves the class `type_idx` of the referrer for a const-class or static access and
/// initializes it, unless the referrer is that class's own initializer.
pub fn resolve_verify_and_clinit(type_idx: u32, referrer: &Method, thread: &VMThread,
                                 can_run_clinit: bool, verify_access: bool) -> Result<ClassRef, PendingException> {
    let vm = thread.vm();
    let referring_class = referring_class(referrer, thread)?;

    if let Some(class) = referring_class.cache().initialized_static_storage.get(type_idx) {
        if !verify_access || referring_class.can_access(class) {
            return Ok(class.clone());
        }
    }

    let class = vm.resolve_type(&referring_class, type_idx).map_err(|e| thread.throw(e))?;
    if verify_access && !referring_class.can_access(&class) {
        return Err(throw_illegal_access_class(thread, &referring_class, &class));
    }

    // The initializer of a class may refer to the class itself.
    if referrer.is_class_initializer() && referring_class == class {
        return Ok(class);
    }

    match vm.ensure_initialized(thread, &class, can_run_clinit) {
        Ok(true) if class.is_initialized() => {
            Ok(referring_class.cache().initialized_static_storage.put(type_idx, class))
        }
        Ok(_) => Ok(class),
        Err(e) => Err(thread.throw(e)),
    }
}

pub fn resolve_string_from_code(referrer: &Method, string_idx: u32, thread: &VMThread) -> Result<ObjectRef, PendingException> {
    let referring_class = referring_class(referrer, thread)?;
    thread.vm().resolve_string(&referring_class, string_idx).map_err(|e| thread.throw(e))
}

fn resolve_type_from_code(type_idx: u32, referring_class: &ClassRef, thread: &VMThread) -> Result<ClassRef, PendingException> {
    match referring_class.cache().types.get(type_idx) {
        Some(class) => Ok(class.clone()),
        None => thread.vm().resolve_type(referring_class, type_idx).map_err(|e| thread.throw(e)),
    }
}

/// `new`: resolves the type, checks that it can be instantiated from the referrer,
/// initializes it and allocates an instance.
pub fn alloc_object_from_code(type_idx: u32, method: &Method, thread: &VMThread,
                              access_check: bool) -> Result<ObjectRef, PendingException> {
    let vm = thread.vm();
    let referring_class = referring_class(method, thread)?;
    let class = resolve_type_from_code(type_idx, &referring_class, thread)?;

    if access_check {
        if !class.is_instantiable() {
            return Err(thread.throw_new(ThrowableKind::InstantiationError, class.pretty_name()));
        }
        if !referring_class.can_access(&class) {
            return Err(throw_illegal_access_class(thread, &referring_class, &class));
        }
    }
    if !class.is_initialized() {
        vm.ensure_initialized(thread, &class, true).map_err(|e| thread.throw(e))?;
    }
    vm.heap().alloc_object(&class).map_err(|e| thread.throw(e))
}

/// `newarray`/`anewarray`. A negative length is rejected before anything is resolved.
pub fn alloc_array_from_code(type_idx: u32, method: &Method, component_count: i32, thread: &VMThread,
                             access_check: bool) -> Result<ObjectRef, PendingException> {
    if component_count < 0 {
        return Err(thread.throw_new(ThrowableKind::NegativeArraySizeException, component_count.to_string()));
    }
    let referring_class = referring_class(method, thread)?;
    let class = resolve_array_class(type_idx, &referring_class, thread, access_check)?;
    allocate_array(&class, component_count as usize, thread)
}

/// `filled-new-array`: like `alloc_array_from_code`, restricted to `int` and reference
/// element types.
pub fn check_and_alloc_array_from_code(type_idx: u32, method: &Method, component_count: i32,
                                       thread: &VMThread, access_check: bool) -> Result<ObjectRef, PendingException> {
    if component_count < 0 {
        return Err(thread.throw_new(ThrowableKind::NegativeArraySizeException, component_count.to_string()));
    }
    let referring_class = referring_class(method, thread)?;
    let class = resolve_array_class(type_idx, &referring_class, thread, access_check)?;

    if let Some(component) = class.component_type().and_then(|c| c.primitive_type().cloned()) {
        match component {
            FieldType::I => {}
            FieldType::J | FieldType::D => {
                return Err(thread.throw_new(ThrowableKind::RuntimeException,
                    format!("Bad filled array request for type {}", class.pretty_name())));
            }
            _ => {
                return Err(thread.throw_new(ThrowableKind::InternalError,
                    format!("Found type {}; filled-new-array not implemented for anything but 'int'",
                        class.pretty_name())));
            }
        }
    }
    allocate_array(&class, component_count as usize, thread)
}

fn resolve_array_class(type_idx: u32, referring_class: &ClassRef, thread: &VMThread,
                       access_check: bool) -> Result<ClassRef, PendingException> {
    let class = resolve_type_from_code(type_idx, referring_class, thread)?;
    if !class.is_array() {
        return Err(thread.throw_new(ThrowableKind::IncompatibleClassChangeError,
            format!("{} is not an array class", class.pretty_name())));
    }
    if access_check && !referring_class.can_access(&class) {
        return Err(throw_illegal_access_class(thread, referring_class, &class));
    }
    Ok(class)
}

fn allocate_array(class: &ClassRef, length: usize, thread: &VMThread) -> Result<ObjectRef, PendingException> {
    let vm = thread.vm();
    if !class.is_initialized() {
        vm.ensure_initialized(thread, class, true).map_err(|e| thread.throw(e))?;
    }
    vm.heap().alloc_array(class, length).map_err(|e| thread.throw(e))
}

pub fn throw_stack_overflow_error(thread: &VMThread) -> PendingException {
    debug!(thread = thread.id(), "stack overflow");
    thread.throw(Exception::new(ThrowableKind::StackOverflowError, "stack size exhausted"))
}
