use parking_lot::RwLock;
use smallvec::SmallVec;
use crate::vm::class::access::AccessFlagClass;
use crate::vm::class::cache::ResolvedSymbolCache;
use crate::vm::class::class::{Class, ClassId, ClassInit, ClassRef, InitState};
use crate::vm::class::field::FieldType;

const ARRAY_FLAGS: u16 = AccessFlagClass::ACC_ABSTRACT as u16 | AccessFlagClass::ACC_FINAL as u16;

/// Synthesizes the class of a primitive type (`I`, `J`, ...). Only used as array
/// component; it has no members and nothing to initialize.
pub fn create_primitive_class(component: FieldType) -> Option<Class> {
    match component {
        FieldType::L(_) | FieldType::A(_) | FieldType::V => return None,
        _ => {}
    }

    Some(Class {
        id: ClassId::next(),
        name: component.to_string(),
        flag: ARRAY_FLAGS | AccessFlagClass::ACC_PUBLIC as u16,
        superclass: None,
        interfaces: SmallVec::new(),
        component_type: None,
        primitive_type: Some(component),
        fields: vec![],
        methods: vec![],
        vtable: vec![],
        iftable: vec![],
        constant_pool: vec![],
        cache: ResolvedSymbolCache::new(0),
        static_fields: RwLock::new(Box::new([])),
        instance_field_count: 0,
        init: ClassInit::new(InitState::Initialized),
    })
}

/// Synthesizes the array class `name` whose elements are `component`. Arrays extend
/// `java/lang/Object`, dispatch through its vtable and share the accessibility of
/// their element class.
pub fn create_array_class(name: &str, component: ClassRef, object_class: &ClassRef) -> Class {
    let public = if component.is_public() { AccessFlagClass::ACC_PUBLIC as u16 } else { 0 };

    Class {
        id: ClassId::next(),
        name: name.to_string(),
        flag: ARRAY_FLAGS | public,
        superclass: Some(object_class.clone()),
        interfaces: SmallVec::new(),
        component_type: Some(component),
        primitive_type: None,
        fields: vec![],
        methods: vec![],
        vtable: object_class.vtable.clone(),
        iftable: vec![],
        constant_pool: vec![],
        cache: ResolvedSymbolCache::new(0),
        static_fields: RwLock::new(Box::new([])),
        instance_field_count: 0,
        init: ClassInit::new(InitState::Initialized),
    }
}
