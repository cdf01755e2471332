use strum_macros::Display;
use crate::vm::class::class::Class;
use crate::vm::class::field::FieldRef;
use crate::vm::class::method::{InvokeType, Method, MethodRef};
use crate::vm::object::ObjectRef;
use crate::vm::stats::Counter;

/// Kind of field access a call site performs.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FindFieldType {
    InstanceObjectRead,
    InstanceObjectWrite,
    InstancePrimitiveRead,
    InstancePrimitiveWrite,
    StaticObjectRead,
    StaticObjectWrite,
    StaticPrimitiveRead,
    StaticPrimitiveWrite,
}

impl FindFieldType {
    pub fn is_static(self) -> bool {
        matches!(self, FindFieldType::StaticObjectRead | FindFieldType::StaticObjectWrite
            | FindFieldType::StaticPrimitiveRead | FindFieldType::StaticPrimitiveWrite)
    }

    pub fn is_primitive(self) -> bool {
        matches!(self, FindFieldType::InstancePrimitiveRead | FindFieldType::InstancePrimitiveWrite
            | FindFieldType::StaticPrimitiveRead | FindFieldType::StaticPrimitiveWrite)
    }

    pub fn is_set(self) -> bool {
        matches!(self, FindFieldType::InstanceObjectWrite | FindFieldType::InstancePrimitiveWrite
            | FindFieldType::StaticObjectWrite | FindFieldType::StaticPrimitiveWrite)
    }
}

/// Field lookup that can't initialize classes or throw. `None` means the slow path has
/// to decide, which includes every case the slow path would turn into an error.
pub fn find_field_fast(field_idx: u32, referrer: &Method, find_type: FindFieldType,
                       expected_size: usize) -> Option<FieldRef> {
    let referring_class = referrer.declaring_class()?;
    let found = lookup_field(field_idx, &referring_class, find_type, expected_size);
    referring_class.cache().stats.record(if found.is_some() { Counter::FastFieldHit } else { Counter::FastFieldMiss });
    found
}

fn lookup_field(field_idx: u32, referring_class: &Class, find_type: FindFieldType,
                expected_size: usize) -> Option<FieldRef> {
    let resolved_field = referring_class.cache().fields.get(field_idx)?;

    let fields_class = resolved_field.declaring_class()?;
    if !fields_class.is_initializing() {
        return None;
    }
    // Incompatible class change.
    if resolved_field.is_static() != find_type.is_static() {
        return None;
    }
    // Illegal access.
    if !referring_class.can_access(&fields_class)
        || !referring_class.can_access_member(&fields_class, resolved_field.flag)
        || (find_type.is_set() && resolved_field.is_final() && *fields_class != *referring_class) {
        return None;
    }
    if resolved_field.is_primitive_type() != find_type.is_primitive()
        || resolved_field.field_size() != expected_size {
        return None;
    }
    Some(resolved_field.clone())
}

/// Method lookup and dispatch that can't throw. The receiver is needed for everything
/// but static and direct calls.
pub fn find_method_fast(method_idx: u32, this_object: Option<&ObjectRef>, referrer: &Method,
                        access_check: bool, invoke_type: InvokeType) -> Option<MethodRef> {
    let referring_class = referrer.declaring_class()?;
    let found = lookup_method(method_idx, this_object, &referring_class, access_check, invoke_type);
    referring_class.cache().stats.record(if found.is_some() { Counter::FastMethodHit } else { Counter::FastMethodMiss });
    found
}

fn lookup_method(method_idx: u32, this_object: Option<&ObjectRef>, referring_class: &Class,
                 access_check: bool, invoke_type: InvokeType) -> Option<MethodRef> {
    if this_object.is_none() && !invoke_type.is_direct() {
        return None;
    }
    let resolved_method = referring_class.cache().methods.get(method_idx)?;
    let methods_class = resolved_method.declaring_class()?;

    if access_check {
        if resolved_method.check_incompatible_class_change(invoke_type) {
            return None;
        }
        // Potential illegal access, the slow path may refine the method's class.
        if !referring_class.can_access(&methods_class)
            || !referring_class.can_access_member(&methods_class, resolved_method.flag) {
            return None;
        }
    }

    match invoke_type {
        InvokeType::Interface => this_object?.class().find_virtual_method_for_interface(resolved_method).cloned(),
        InvokeType::Static | InvokeType::Direct => Some(resolved_method.clone()),
        // Interface methods carry an interface slot, not a vtable slot.
        _ if methods_class.is_interface() => None,
        InvokeType::Super => referring_class.superclass()?
            .vtable().get(resolved_method.method_index as usize).cloned(),
        InvokeType::Virtual => this_object?.class()
            .vtable().get(resolved_method.method_index as usize).cloned(),
    }
}
