use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tracing::error;
use crate::vm::class::method::{Method, MethodRepr};
use crate::vm::class_loader::ClassLoader;
use crate::vm::error::{FatalError, ThrowableKind};
use crate::vm::object::Value;
use crate::vm::options::VmOptions;
use crate::vm::pool::object::ObjectArena;
use crate::vm::pool::string::StringPool;
use crate::vm::pool::HeapAllocator;
use crate::vm::stats::RuntimeStats;
use crate::vm::thread::list::ThreadList;
use crate::vm::thread::mutator::MutatorLock;
use crate::vm::thread::thread::VMThread;

/// Executes bytecode method bodies. Plugged in by the embedder; without one only native
/// methods can run.
pub trait Interpreter: Send + Sync {
    /// Runs `method` on `thread`. Returns `None` for void methods, or with an exception
    /// left pending on the thread.
    fn execute(&self, thread: &VMThread, method: &Method, args: &[Value]) -> Option<Value>;
}

pub struct VM {
    options: VmOptions,
    class_loader: Arc<dyn ClassLoader>,
    heap: Arc<dyn HeapAllocator>,
    interpreter: Option<Arc<dyn Interpreter>>,
    string_pool: StringPool,
    thread_list: ThreadList,
    mutator_lock: MutatorLock,
    stats: RuntimeStats,
}

impl Debug for VM {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VM")
            .field("options", &self.options)
            .field("threads", &self.thread_list.len())
            .field("interpreter", &self.interpreter.is_some())
            .finish()
    }
}

pub struct VMBuilder {
    options: VmOptions,
    class_loader: Arc<dyn ClassLoader>,
    heap: Option<Arc<dyn HeapAllocator>>,
    interpreter: Option<Arc<dyn Interpreter>>,
}

impl VMBuilder {
    pub fn options(mut self, options: VmOptions) -> Self {
        self.options = options;
        self
    }

    pub fn heap(mut self, heap: Arc<dyn HeapAllocator>) -> Self {
        self.heap = Some(heap);
        self
    }

    pub fn interpreter(mut self, interpreter: Arc<dyn Interpreter>) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    pub fn build(self) -> Arc<VM> {
        let heap = match self.heap {
            Some(heap) => heap,
            None => Arc::new(ObjectArena::new(self.options.heap_limit)),
        };

        Arc::new(VM {
            options: self.options,
            class_loader: self.class_loader,
            heap,
            interpreter: self.interpreter,
            string_pool: StringPool::new(),
            thread_list: ThreadList::new(),
            mutator_lock: MutatorLock::new(),
            stats: RuntimeStats::new(),
        })
    }
}

impl VM {
    pub fn builder(class_loader: Arc<dyn ClassLoader>) -> VMBuilder {
        VMBuilder {
            options: VmOptions::default(),
            class_loader,
            heap: None,
            interpreter: None,
        }
    }

    /// Attaches the calling OS thread. The returned handle must stay on this thread;
    /// dropping it detaches.
    pub fn attach_current_thread(self: &Arc<Self>, name: &str) -> VMThread {
        VMThread::attach(self.clone(), name)
    }

    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    pub fn class_loader(&self) -> &Arc<dyn ClassLoader> {
        &self.class_loader
    }

    pub fn heap(&self) -> &Arc<dyn HeapAllocator> {
        &self.heap
    }

    pub fn string_pool(&self) -> &StringPool {
        &self.string_pool
    }

    pub fn thread_list(&self) -> &ThreadList {
        &self.thread_list
    }

    pub fn mutator_lock(&self) -> &MutatorLock {
        &self.mutator_lock
    }

    pub fn stats(&self) -> &RuntimeStats {
        &self.stats
    }

    /// Calls `method` with `args` (receiver first for instance methods).
    pub fn invoke(&self, thread: &VMThread, method: &Method, args: &[Value]) -> Option<Value> {
        match &method.repr {
            MethodRepr::Native(native) => native(thread, args),
            MethodRepr::Bytecode(_) => match &self.interpreter {
                Some(interpreter) => interpreter.execute(thread, method, args),
                None => {
                    thread.throw_new(ThrowableKind::InternalError,
                        format!("no interpreter attached to execute {}", method.pretty()));
                    None
                }
            },
            MethodRepr::Abstract => {
                thread.throw_new(ThrowableKind::AbstractMethodError, method.pretty());
                None
            }
        }
    }

    /// Reports a broken runtime invariant and terminates the process.
    pub fn abort(&self, fatal: FatalError) -> ! {
        error!("{}", fatal);
        eprintln!("Runtime aborting: {}", fatal);
        std::process::abort()
    }
}
