use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use crate::vm::class::class::ClassRef;
use crate::vm::object::{Object, ObjectData, ObjectRef};

pub const STRING_CLASS: &str = "java/lang/String";

/// Interned string constants. Equal contents always map to the identical object.
#[derive(Debug, Default)]
pub struct StringPool {
    interned_strings: RwLock<HashMap<Arc<str>, ObjectRef>>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, value: &str) -> Option<ObjectRef> {
        self.interned_strings.read().get(value).cloned()
    }

    /// Returns the interned object for `value`, creating it as an instance of
    /// `string_class` on first use.
    pub fn intern(&self, string_class: &ClassRef, value: &str) -> ObjectRef {
        if let Some(object) = self.get(value) {
            return object;
        }

        let mut interned_strings = self.interned_strings.write();
        interned_strings.entry(Arc::from(value))
            .or_insert_with_key(|key| {
                Arc::new(Object::new(string_class.clone(), ObjectData::String(key.clone())))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.interned_strings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
