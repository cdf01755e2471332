use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use crate::vm::class::class::ClassRef;
use crate::vm::class::field::FieldType;
use crate::vm::error::{Exception, ThrowableKind};
use crate::vm::object::{Object, ObjectData, ObjectRef, Value};
use crate::vm::pool::HeapAllocator;

/// Default heap. Objects are reference counted and freed when the last reference goes
/// away; the arena only keeps count so an allocation limit can be enforced.
#[derive(Debug)]
pub struct ObjectArena {
    allocated: AtomicUsize,
    limit: Option<usize>,
}

impl ObjectArena {
    pub fn new(limit: Option<usize>) -> Self {
        ObjectArena {
            allocated: AtomicUsize::new(0),
            limit,
        }
    }

    /// Number of objects handed out so far.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    fn reserve(&self, class: &ClassRef) -> Result<(), Exception> {
        let previous = self.allocated.fetch_add(1, Ordering::Relaxed);
        match self.limit {
            Some(limit) if previous >= limit => {
                self.allocated.fetch_sub(1, Ordering::Relaxed);
                Err(Exception::new(ThrowableKind::OutOfMemoryError,
                    format!("heap limit of {} objects reached allocating {}", limit, class.pretty_name())))
            }
            _ => Ok(())
        }
    }
}

impl Default for ObjectArena {
    fn default() -> Self {
        Self::new(None)
    }
}

impl HeapAllocator for ObjectArena {
    fn alloc_object(&self, class: &ClassRef) -> Result<ObjectRef, Exception> {
        self.reserve(class)?;

        // Slots are laid out superclass first, so walk the whole chain for the types.
        let mut slots = vec![Value::default(); class.instance_field_count()];
        let mut current = Some(class);
        while let Some(c) = current {
            for field in c.fields().iter().filter(|f| !f.is_static()) {
                if let Some(slot) = slots.get_mut(field.slot) {
                    *slot = Value::zero_for(&field.descriptor);
                }
            }
            current = c.superclass();
        }

        Ok(Arc::new(Object::new(class.clone(), ObjectData::Instance(RwLock::new(slots.into_boxed_slice())))))
    }

    fn alloc_array(&self, class: &ClassRef, length: usize) -> Result<ObjectRef, Exception> {
        let component = match class.component_type() {
            Some(component) => component,
            None => return Err(Exception::new(ThrowableKind::InternalError,
                format!("{} is not an array class", class.pretty_name())))
        };
        self.reserve(class)?;

        let zero = match component.primitive_type() {
            Some(ty) => Value::zero_for(ty),
            None => Value::zero_for(&FieldType::L(component.name().to_string())),
        };
        let elements = vec![zero; length].into_boxed_slice();

        Ok(Arc::new(Object::new(class.clone(), ObjectData::Array(RwLock::new(elements)))))
    }
}

#[cfg(test)]
mod tests {
    use crate::vm::class::access::AccessFlagField;
    use crate::vm::class_loader::bootstrap::{BootstrapClassLoader, ClassBuilder};
    use crate::vm::error::ThrowableKind;
    use crate::vm::object::Value;
    use crate::vm::pool::object::ObjectArena;
    use crate::vm::pool::HeapAllocator;

    #[test]
    fn instances_have_zeroed_slots_for_the_whole_chain() {
        let loader = BootstrapClassLoader::new().unwrap();
        loader.define_class(ClassBuilder::new("t/Base").field("count", "I", 0)).unwrap();
        let derived = loader.define_class(ClassBuilder::new("t/Derived").super_class("t/Base")
            .field("next", "Lt/Derived;", 0)
            .field("total", "J", AccessFlagField::ACC_STATIC as u16)).unwrap();

        let arena = ObjectArena::default();
        let object = arena.alloc_object(&derived).unwrap();
        let next = derived.find_declared_field_by_name("next").unwrap();
        let count = derived.superclass().unwrap().find_declared_field_by_name("count").unwrap();

        assert_eq!(derived.instance_field_count(), 2);
        assert_eq!(next.slot, 1);
        assert_eq!(object.get_field(next), Some(Value::null()));
        assert_eq!(object.get_field(count), Some(Value::int(0)));
        assert_eq!(arena.allocated(), 1);
    }

    #[test]
    fn arrays_and_limit() {
        let loader = BootstrapClassLoader::new().unwrap();
        let ints = loader.find_or_create_class("[I").unwrap();
        let strings = loader.find_or_create_class("[Ljava/lang/String;").unwrap();

        let arena = ObjectArena::new(Some(2));
        let array = arena.alloc_array(&ints, 3).unwrap();
        assert_eq!(array.array_length(), Some(3));
        assert_eq!(array.array_get(2), Some(Value::int(0)));

        let array = arena.alloc_array(&strings, 1).unwrap();
        assert_eq!(array.array_get(0), Some(Value::null()));

        let err = arena.alloc_array(&ints, 1).unwrap_err();
        assert_eq!(err.kind, ThrowableKind::OutOfMemoryError);
        assert_eq!(arena.allocated(), 2);
    }
}
