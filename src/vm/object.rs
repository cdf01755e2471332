use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use parking_lot::{Condvar, Mutex, RwLock};
use crate::vm::class::class::{Class, ClassRef};
use crate::vm::class::field::{Field, FieldType};
use crate::vm::error::{Exception, ThrowableKind};
use crate::vm::thread::thread::VMThread;

/// Contents of a field, array element, argument or return value.
#[derive(Clone)]
pub enum Value {
    Primitive(u64),
    Reference(Option<ObjectRef>),
}

impl Value {
    pub fn zero_for(ty: &FieldType) -> Value {
        if ty.is_reference() {
            Value::Reference(None)
        } else {
            Value::Primitive(0)
        }
    }

    pub fn int(value: i32) -> Value {
        Value::Primitive(value as u32 as u64)
    }

    pub fn long(value: i64) -> Value {
        Value::Primitive(value as u64)
    }

    pub fn null() -> Value {
        Value::Reference(None)
    }

    pub fn object(object: ObjectRef) -> Value {
        Value::Reference(Some(object))
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Primitive(bits) => Some(*bits as u32 as i32),
            Value::Reference(_) => None
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Primitive(bits) => Some(*bits as i64),
            Value::Reference(_) => None
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Reference(Some(object)) => Some(object),
            _ => None
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Reference(None))
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Primitive(0)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Primitive(a), Value::Primitive(b)) => a == b,
            (Value::Reference(None), Value::Reference(None)) => true,
            (Value::Reference(Some(a)), Value::Reference(Some(b))) => Arc::ptr_eq(a, b),
            _ => false
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Primitive(bits) => write!(f, "{}", bits),
            Value::Reference(None) => write!(f, "null"),
            Value::Reference(Some(object)) => write!(f, "{}@{:p}", object.class.name(), Arc::as_ptr(object)),
        }
    }
}

#[derive(Debug)]
struct MonitorState {
    /// Id of the owning thread, 0 when unlocked.
    owner: u64,
    recursion_count: usize,
}

/// Reentrant object monitor.
#[derive(Debug)]
pub struct Monitor {
    state: Mutex<MonitorState>,
    condvar: Condvar,
}

impl Monitor {
    fn new() -> Self {
        Monitor {
            state: Mutex::new(MonitorState { owner: 0, recursion_count: 0 }),
            condvar: Condvar::new(),
        }
    }

    pub fn try_enter(&self, thread_id: u64) -> bool {
        let mut state = self.state.lock();
        if state.owner == 0 {
            state.owner = thread_id;
            state.recursion_count = 1;
            true
        } else if state.owner == thread_id {
            state.recursion_count += 1;
            true
        } else {
            false
        }
    }

    /// Blocks until the monitor is acquired. The wait happens with the mutator lock
    /// released so a collection can proceed meanwhile.
    pub fn enter(&self, thread: &VMThread) {
        if self.try_enter(thread.id()) {
            return;
        }
        thread.in_blocked_state(|| {
            let mut state = self.state.lock();
            while state.owner != 0 {
                self.condvar.wait(&mut state);
            }
            state.owner = thread.id();
            state.recursion_count = 1;
        });
    }

    pub fn exit(&self, thread_id: u64) -> Result<(), Exception> {
        let mut state = self.state.lock();
        if state.owner != thread_id {
            return Err(Exception::new(ThrowableKind::IllegalMonitorStateException,
                format!("thread {} does not own the monitor", thread_id)));
        }
        state.recursion_count -= 1;
        if state.recursion_count == 0 {
            state.owner = 0;
            self.condvar.notify_one();
        }
        Ok(())
    }

    pub fn owner(&self) -> Option<u64> {
        match self.state.lock().owner {
            0 => None,
            id => Some(id)
        }
    }
}

#[derive(Debug)]
pub enum ObjectData {
    Instance(RwLock<Box<[Value]>>),
    Array(RwLock<Box<[Value]>>),
    String(Arc<str>),
}

/// A heap object. Its class is fixed at allocation.
#[derive(Debug)]
pub struct Object {
    pub(crate) class: ClassRef,
    pub(crate) data: ObjectData,
    monitor: Monitor,
}

pub type ObjectRef = Arc<Object>;

impl Object {
    pub(crate) fn new(class: ClassRef, data: ObjectData) -> Self {
        Object { class, data, monitor: Monitor::new() }
    }

    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    pub fn instance_of(&self, class: &Class) -> bool {
        class.is_assignable_from(&self.class)
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn get_field(&self, field: &Field) -> Option<Value> {
        match &self.data {
            ObjectData::Instance(slots) if !field.is_static() => slots.read().get(field.slot).cloned(),
            _ => None
        }
    }

    pub fn set_field(&self, field: &Field, value: Value) -> bool {
        match &self.data {
            ObjectData::Instance(slots) if !field.is_static() => match slots.write().get_mut(field.slot) {
                Some(stored) => {
                    *stored = value;
                    true
                }
                None => false
            },
            _ => false
        }
    }

    pub fn array_length(&self) -> Option<usize> {
        match &self.data {
            ObjectData::Array(elements) => Some(elements.read().len()),
            _ => None
        }
    }

    pub fn array_get(&self, index: usize) -> Option<Value> {
        match &self.data {
            ObjectData::Array(elements) => elements.read().get(index).cloned(),
            _ => None
        }
    }

    pub fn array_set(&self, index: usize, value: Value) -> bool {
        match &self.data {
            ObjectData::Array(elements) => match elements.write().get_mut(index) {
                Some(stored) => {
                    *stored = value;
                    true
                }
                None => false
            },
            _ => false
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            ObjectData::String(value) => Some(&value[..]),
            _ => None
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::vm::object::Value;

    #[test]
    fn value_helpers() {
        assert_eq!(Value::int(-1).as_int(), Some(-1));
        assert_eq!(Value::long(-1).as_long(), Some(-1));
        assert_eq!(Value::int(7), Value::Primitive(7));
        assert!(Value::null().is_null());
        assert_eq!(Value::null().as_int(), None);
    }
}
