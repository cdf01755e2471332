use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use jvm_runtime_support::vm::class::access::{AccessFlagField, AccessFlagMethod};
use jvm_runtime_support::vm::class::constant_pool::CPEntry;
use jvm_runtime_support::vm::class_loader::bootstrap::{BootstrapClassLoader, ClassBuilder};
use jvm_runtime_support::vm::class_loader::ClassLoader;
use jvm_runtime_support::vm::runtime_support::{
    alloc_array_from_code, check_suspend, find_field_fast, find_field_from_code, find_method_fast,
    find_method_from_code, resolve_verify_and_clinit, unlock_jni_synchronized_method, FindFieldType,
};
use jvm_runtime_support::vm::thread::thread::ThreadState;
use jvm_runtime_support::{ClassRef, Exception, FatalError, InitState, InvokeType, ThrowableKind, Value, VM};

const PUBLIC: u16 = AccessFlagMethod::ACC_PUBLIC as u16;
const STATIC: u16 = AccessFlagField::ACC_STATIC as u16;
const FINAL: u16 = AccessFlagField::ACC_FINAL as u16;

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[test]
fn concurrent_initialization_runs_the_initializer_once() {
    let loader = Arc::new(BootstrapClassLoader::new().unwrap());
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let class = loader.define_class(ClassBuilder::new("t/Slow")
        .field("VALUE", "I", STATIC)
        .static_initializer(move |thread, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            if let Ok(class) = thread.vm().class_loader().load_class("t/Slow") {
                class.set_static(0, Value::int(42));
            }
            None
        })).unwrap();

    let vm = VM::builder(loader).build();
    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8).map(|i| {
        let vm = vm.clone();
        let class = class.clone();
        let barrier = barrier.clone();
        std::thread::spawn(move || {
            let thread = vm.attach_current_thread(&format!("worker-{}", i));
            barrier.wait();
            let result = vm.ensure_initialized(&thread, &class, true);
            (result, class.init_state(), class.get_static(0))
        })
    }).collect();

    for handle in handles {
        let (result, state, value) = handle.join().unwrap();
        assert_eq!(result, Ok(true));
        assert_eq!(state, InitState::Initialized);
        // waiters only return once the initializer's writes are visible
        assert_eq!(value, Some(Value::int(42)));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_initialization_shares_the_failure() {
    let loader = Arc::new(BootstrapClassLoader::new().unwrap());
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let class = loader.define_class(ClassBuilder::new("t/Broken").static_initializer(move |thread, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        thread.throw_new(ThrowableKind::ArithmeticException, "/ by zero");
        None
    })).unwrap();

    let vm = VM::builder(loader).build();
    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4).map(|_| {
        let vm = vm.clone();
        let class = class.clone();
        let barrier = barrier.clone();
        std::thread::spawn(move || {
            let thread = vm.attach_current_thread("worker");
            barrier.wait();
            vm.ensure_initialized(&thread, &class, true)
        })
    }).collect();

    let failures: Vec<Exception> = handles.into_iter()
        .map(|handle| handle.join().unwrap().unwrap_err())
        .collect();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(class.is_erroneous());
    for failure in &failures {
        assert_eq!(failure, &failures[0]);
        assert_eq!(failure.kind, ThrowableKind::ExceptionInInitializerError);
        assert_eq!(failure.cause().unwrap().kind, ThrowableKind::ArithmeticException);
    }
}

#[test]
fn suspend_all_parks_running_threads() {
    let vm = VM::builder(Arc::new(BootstrapClassLoader::new().unwrap())).build();
    let progress = Arc::new(AtomicUsize::new(0));
    let stop = Arc::new(AtomicBool::new(false));
    let ready = Arc::new(Barrier::new(2));

    let worker = {
        let vm = vm.clone();
        let progress = progress.clone();
        let stop = stop.clone();
        let ready = ready.clone();
        std::thread::spawn(move || {
            let thread = vm.attach_current_thread("mutator");
            ready.wait();
            while !stop.load(Ordering::SeqCst) {
                progress.fetch_add(1, Ordering::SeqCst);
                check_suspend(&thread);
            }
        })
    };

    let main = vm.attach_current_thread("main");
    ready.wait();
    {
        let guard = vm.thread_list().suspend_all(&main);
        assert_eq!(guard.suspended_threads().len(), 1);
        let worker_control = guard.suspended_threads()[0].clone();
        assert!(worker_control.wait_for_suspension(Duration::from_secs(5)));
        assert_eq!(worker_control.state(), ThreadState::Suspended);

        let before = progress.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(progress.load(Ordering::SeqCst), before);
    }

    let resumed_at = progress.load(Ordering::SeqCst);
    assert!(wait_until(Duration::from_secs(5), || progress.load(Ordering::SeqCst) > resumed_at));
    stop.store(true, Ordering::SeqCst);
    worker.join().unwrap();
}

#[test]
fn checkpoints_run_on_every_thread() {
    let vm = VM::builder(Arc::new(BootstrapClassLoader::new().unwrap())).build();
    let stop = Arc::new(AtomicBool::new(false));
    let ready = Arc::new(Barrier::new(2));

    let worker = {
        let vm = vm.clone();
        let stop = stop.clone();
        let ready = ready.clone();
        std::thread::spawn(move || {
            let thread = vm.attach_current_thread("mutator");
            ready.wait();
            while !stop.load(Ordering::SeqCst) {
                check_suspend(&thread);
                std::thread::yield_now();
            }
            thread.id()
        })
    };

    let main = vm.attach_current_thread("main");
    ready.wait();
    let visited = Arc::new(Mutex::new(Vec::new()));
    let log = visited.clone();
    let accepted = vm.thread_list().run_checkpoint(&main, move |thread| log.lock().push(thread.id()));
    assert_eq!(accepted, 2);
    assert!(wait_until(Duration::from_secs(5), || visited.lock().len() == 2));

    stop.store(true, Ordering::SeqCst);
    let worker_id = worker.join().unwrap();
    let mut visited = visited.lock().clone();
    visited.sort_unstable();
    let mut expected = vec![main.id(), worker_id];
    expected.sort_unstable();
    assert_eq!(visited, expected);
}

struct CountingLoader {
    inner: Arc<BootstrapClassLoader>,
    loads: AtomicUsize,
}

impl ClassLoader for CountingLoader {
    fn load_class(&self, name: &str) -> Result<ClassRef, Exception> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load_class(name)
    }
}

#[test]
fn negative_array_size_is_checked_before_loading() {
    let bootstrap = Arc::new(BootstrapClassLoader::new().unwrap());
    let user = bootstrap.define_class(ClassBuilder::new("t/User")
        .cp(CPEntry::class("[I"))
        .native_method("run", "()V", PUBLIC, |_, _| None)).unwrap();
    let referrer = user.find_declared_method_by_name("run").unwrap();
    let loader = Arc::new(CountingLoader { inner: bootstrap, loads: AtomicUsize::new(0) });

    let vm = VM::builder(loader.clone()).build();
    let thread = vm.attach_current_thread("main");

    assert!(alloc_array_from_code(0, referrer, -5, &thread, true).is_err());
    let e = thread.take_exception().unwrap();
    assert_eq!(e.kind, ThrowableKind::NegativeArraySizeException);
    assert_eq!(e.message.as_deref(), Some("-5"));
    assert_eq!(loader.loads.load(Ordering::SeqCst), 0);

    let array = alloc_array_from_code(0, referrer, 0, &thread, true).unwrap();
    assert_eq!(array.array_length(), Some(0));
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
}

#[test]
fn slow_path_resolution_feeds_the_fast_path() {
    let loader = Arc::new(BootstrapClassLoader::new().unwrap());
    loader.define_class(ClassBuilder::new("t/Counter")
        .field("value", "J", PUBLIC)
        .native_method("increment", "()V", PUBLIC, |_, _| None)).unwrap();
    let user = loader.define_class(ClassBuilder::new("t/User")
        .cp(CPEntry::class("t/Counter"))
        .cp(CPEntry::field(0, "value", "J"))
        .cp(CPEntry::method(0, "increment", "()V"))
        .native_method("run", "()V", PUBLIC, |_, _| None)).unwrap();
    let referrer = user.find_declared_method_by_name("run").unwrap();

    let vm = VM::builder(loader).build();
    let thread = vm.attach_current_thread("main");

    assert!(find_field_fast(1, referrer, FindFieldType::InstancePrimitiveRead, 8).is_none());
    let slow = find_field_from_code(1, referrer, &thread, FindFieldType::InstancePrimitiveRead, 8).unwrap();
    let fast = find_field_fast(1, referrer, FindFieldType::InstancePrimitiveRead, 8).unwrap();
    assert!(Arc::ptr_eq(&slow, &fast));

    let counter = resolve_verify_and_clinit(0, referrer, &thread, true, true).unwrap();
    let receiver = vm.heap().alloc_object(&counter).unwrap();
    let slow = find_method_from_code(2, Some(&receiver), referrer, &thread, true, InvokeType::Virtual).unwrap();
    let fast = find_method_fast(2, Some(&receiver), referrer, true, InvokeType::Virtual).unwrap();
    assert!(Arc::ptr_eq(&slow, &fast));
    assert!(!thread.is_exception_pending());
}

#[test]
fn final_fields_are_only_written_by_their_class() {
    let loader = Arc::new(BootstrapClassLoader::new().unwrap());
    let owner = loader.define_class(ClassBuilder::new("t/Limits")
        .field("MAX", "I", PUBLIC | STATIC | FINAL)
        .cp(CPEntry::class("t/Limits"))
        .cp(CPEntry::field(0, "MAX", "I"))
        .native_method("reset", "()V", PUBLIC | STATIC, |_, _| None)).unwrap();
    let other = loader.define_class(ClassBuilder::new("t/Other")
        .cp(CPEntry::class("t/Limits"))
        .cp(CPEntry::field(0, "MAX", "I"))
        .native_method("run", "()V", PUBLIC, |_, _| None)).unwrap();
    let owner_method = owner.find_declared_method_by_name("reset").unwrap();
    let other_method = other.find_declared_method_by_name("run").unwrap();

    let vm = VM::builder(loader).build();
    let thread = vm.attach_current_thread("main");

    assert!(find_field_from_code(1, owner_method, &thread, FindFieldType::StaticPrimitiveWrite, 4).is_ok());
    assert!(find_field_from_code(1, other_method, &thread, FindFieldType::StaticPrimitiveRead, 4).is_ok());
    assert!(find_field_from_code(1, other_method, &thread, FindFieldType::StaticPrimitiveWrite, 4).is_err());
    assert_eq!(thread.take_exception().unwrap().kind, ThrowableKind::IllegalAccessError);
    assert!(find_field_fast(1, other_method, FindFieldType::StaticPrimitiveWrite, 4).is_none());
}

#[test]
fn synchronized_native_exit_preserves_or_reports_exceptions() {
    let loader = Arc::new(BootstrapClassLoader::new().unwrap());
    let class = loader.define_class(ClassBuilder::new("t/Resource")).unwrap();
    let vm = VM::builder(loader).build();
    let thread = vm.attach_current_thread("main");
    let lock = vm.heap().alloc_object(&class).unwrap();

    lock.monitor().enter(&thread);
    lock.monitor().enter(&thread);
    let pending = Exception::new(ThrowableKind::NullPointerException, "boom");
    thread.set_exception(pending.clone());
    assert_eq!(unlock_jni_synchronized_method(&lock, &thread), Ok(()));
    assert_eq!(lock.monitor().owner(), Some(thread.id()));
    assert_eq!(unlock_jni_synchronized_method(&lock, &thread), Ok(()));
    assert_eq!(lock.monitor().owner(), None);
    assert_eq!(thread.take_exception(), Some(pending));

    match unlock_jni_synchronized_method(&lock, &thread) {
        Err(FatalError::ExceptionDuringUnlock { original: None, secondary }) => {
            assert_eq!(secondary.kind, ThrowableKind::IllegalMonitorStateException);
        }
        other => panic!("unexpected result {:?}", other),
    }
}
