use tracing::{error, warn};
use crate::vm::class::method::Method;
use crate::vm::error::FatalError;
use crate::vm::object::{ObjectRef, Value};
use crate::vm::thread::thread::VMThread;

/// Checks a reference returned by native code against the declared return type of
/// `method`. Only active with `VmOptions::check_references`; a violation is fatal.
pub fn check_reference_result(thread: &VMThread, value: &Value, method: &Method) -> Result<(), FatalError> {
    let vm = thread.vm();
    if !vm.options().check_references {
        return Ok(());
    }
    let object = match value.as_object() {
        Some(object) => object,
        None => return Ok(()),
    };

    let return_type = vm.class_loader().load_class(&method.descriptor.ret.class_name())
        .map_err(|e| FatalError::UnresolvableReturnType { method: method.pretty(), reason: e.dump() })?;
    if !object.instance_of(&return_type) {
        error!(method = %method.pretty(), actual = %object.class().pretty_name(), "bad native return value");
        return Err(FatalError::InvalidReturnReference {
            method: method.pretty(),
            actual: object.class().pretty_name(),
        });
    }
    Ok(())
}

/// Releases the monitor of a synchronized native method on its way out. An exception
/// already pending is kept pending across the unlock.
pub fn unlock_jni_synchronized_method(locked: &ObjectRef, thread: &VMThread) -> Result<(), FatalError> {
    let saved_exception = thread.take_exception();

    if let Err(secondary) = locked.monitor().exit(thread.id()) {
        warn!(thread = thread.id(), %secondary, "monitor exit of synchronized native method failed");
        return Err(FatalError::ExceptionDuringUnlock { original: saved_exception, secondary });
    }

    if let Some(e) = saved_exception {
        thread.set_exception(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::vm::class::access::AccessFlagMethod;
    use crate::vm::class_loader::bootstrap::{BootstrapClassLoader, ClassBuilder};
    use crate::vm::error::{Exception, FatalError, ThrowableKind};
    use crate::vm::object::Value;
    use crate::vm::options::VmOptions;
    use crate::vm::runtime_support::guards::{check_reference_result, unlock_jni_synchronized_method};
    use crate::vm::vm::VM;

    const PUBLIC: u16 = AccessFlagMethod::ACC_PUBLIC as u16;

    #[test]
    fn reference_results_are_checked_when_enabled() {
        let loader = Arc::new(BootstrapClassLoader::new().unwrap());
        let class = loader.define_class(ClassBuilder::new("t/Native").flags(PUBLIC)
            .native_method("name", "()Ljava/lang/String;", PUBLIC, |_, _| None)).unwrap();
        let method = class.find_declared_method_by_name("name").unwrap().clone();
        let string_class = loader.find_loaded_class("java/lang/String").unwrap();

        let vm = VM::builder(loader).options(VmOptions::default().check_references(true)).build();
        let thread = vm.attach_current_thread("main");
        let string = vm.string_pool().intern(&string_class, "ok");
        let wrong = vm.heap().alloc_object(&class).unwrap();

        assert_eq!(check_reference_result(&thread, &Value::null(), &method), Ok(()));
        assert_eq!(check_reference_result(&thread, &Value::object(string), &method), Ok(()));
        assert_eq!(check_reference_result(&thread, &Value::object(wrong), &method),
                   Err(FatalError::InvalidReturnReference {
                       method: method.pretty(),
                       actual: "t.Native".to_string(),
                   }));
    }

    #[test]
    fn reference_results_are_ignored_when_disabled() {
        let loader = Arc::new(BootstrapClassLoader::new().unwrap());
        let class = loader.define_class(ClassBuilder::new("t/Native")
            .native_method("name", "()Ljava/lang/String;", PUBLIC, |_, _| None)).unwrap();
        let method = class.find_declared_method_by_name("name").unwrap().clone();

        let vm = VM::builder(loader).build();
        let thread = vm.attach_current_thread("main");
        let wrong = vm.heap().alloc_object(&class).unwrap();
        assert_eq!(check_reference_result(&thread, &Value::object(wrong), &method), Ok(()));
    }

    #[test]
    fn unresolvable_return_type_is_fatal() {
        let loader = Arc::new(BootstrapClassLoader::new().unwrap());
        let class = loader.define_class(ClassBuilder::new("t/Native")
            .native_method("make", "()Lt/Missing;", PUBLIC, |_, _| None)).unwrap();
        let method = class.find_declared_method_by_name("make").unwrap().clone();

        let vm = VM::builder(loader).options(VmOptions::default().check_references(true)).build();
        let thread = vm.attach_current_thread("main");
        let object = vm.heap().alloc_object(&class).unwrap();
        assert!(matches!(check_reference_result(&thread, &Value::object(object), &method),
                         Err(FatalError::UnresolvableReturnType { .. })));
    }

    #[test]
    fn unlock_keeps_the_pending_exception() {
        let loader = Arc::new(BootstrapClassLoader::new().unwrap());
        let class = loader.define_class(ClassBuilder::new("t/Lock")).unwrap();
        let vm = VM::builder(loader).build();
        let thread = vm.attach_current_thread("main");
        let lock = vm.heap().alloc_object(&class).unwrap();

        lock.monitor().enter(&thread);
        let pending = Exception::new(ThrowableKind::ArithmeticException, "/ by zero");
        thread.set_exception(pending.clone());

        assert_eq!(unlock_jni_synchronized_method(&lock, &thread), Ok(()));
        assert_eq!(lock.monitor().owner(), None);
        assert_eq!(thread.exception(), Some(pending));
    }

    #[test]
    fn second_exception_while_unlocking_is_fatal() {
        let loader = Arc::new(BootstrapClassLoader::new().unwrap());
        let class = loader.define_class(ClassBuilder::new("t/Lock")).unwrap();
        let vm = VM::builder(loader).build();
        let thread = vm.attach_current_thread("main");
        let lock = vm.heap().alloc_object(&class).unwrap();

        let pending = Exception::new(ThrowableKind::ArithmeticException, "/ by zero");
        thread.set_exception(pending.clone());

        match unlock_jni_synchronized_method(&lock, &thread) {
            Err(FatalError::ExceptionDuringUnlock { original, secondary }) => {
                assert_eq!(original, Some(pending));
                assert_eq!(secondary.kind, ThrowableKind::IllegalMonitorStateException);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
