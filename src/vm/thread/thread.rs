use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use parking_lot::{Condvar, Mutex};
use tracing::trace;
use crate::vm::error::{Exception, PendingException, ThrowableKind};
use crate::vm::vm::VM;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1); // 0 marks "no thread"

/// Requests other threads leave for a thread at its next safe point.
#[derive(IntoPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ThreadFlag {
    SuspendRequest = 0x1,
    CheckpointRequest = 0x2,
}

#[derive(TryFromPrimitive, IntoPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    /// Executing managed code, holding a share of the mutator lock.
    Runnable = 0,
    /// Waiting on a monitor or another thread's class initializer.
    Blocked = 1,
    /// Parked at a safe point on request.
    Suspended = 2,
    Terminated = 3,
}

/// Work one thread asks another to run at its next safe point.
pub type Checkpoint = Box<dyn FnOnce(&VMThread) + Send>;

/// The part of a thread other threads may touch: its execution flags, suspend count,
/// state and checkpoint slot.
pub struct ThreadControl {
    id: u64,
    name: String,
    flags: AtomicU32,
    state: AtomicU8,
    suspend_count: Mutex<u32>,
    /// Signalled on resume (owner waits) and on state changes (requesters wait).
    suspend_cond: Condvar,
    checkpoint: Mutex<Option<Checkpoint>>,
}

impl Debug for ThreadControl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadControl")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flags", &self.flags.load(Ordering::Relaxed))
            .field("state", &self.state())
            .finish()
    }
}

impl ThreadControl {
    pub(crate) fn new(name: &str) -> Self {
        ThreadControl {
            id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            flags: AtomicU32::new(0),
            state: AtomicU8::new(ThreadState::Runnable.into()),
            suspend_count: Mutex::new(0),
            suspend_cond: Condvar::new(),
            checkpoint: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn read_flag(&self, flag: ThreadFlag) -> bool {
        self.flags.load(Ordering::Acquire) & u32::from(flag) != 0
    }

    fn atomic_set_flag(&self, flag: ThreadFlag) {
        self.flags.fetch_or(flag.into(), Ordering::Release);
    }

    fn atomic_clear_flag(&self, flag: ThreadFlag) {
        self.flags.fetch_and(!u32::from(flag), Ordering::Release);
    }

    pub fn state(&self) -> ThreadState {
        ThreadState::try_from(self.state.load(Ordering::Acquire)).unwrap_or(ThreadState::Terminated)
    }

    pub(crate) fn set_state(&self, state: ThreadState) {
        let _count = self.suspend_count.lock();
        self.state.store(state.into(), Ordering::Release);
        self.suspend_cond.notify_all();
    }

    pub fn suspend_count(&self) -> u32 {
        *self.suspend_count.lock()
    }

    /// Asks the thread to park at its next safe point. Requests nest; each one needs a
    /// matching `resume`.
    pub fn request_suspend(&self) {
        let mut count = self.suspend_count.lock();
        *count += 1;
        self.atomic_set_flag(ThreadFlag::SuspendRequest);
    }

    /// Drops one suspend request. Returns false if there was none. The flag itself is
    /// cleared by the thread once it leaves its parked state.
    pub fn resume(&self) -> bool {
        let mut count = self.suspend_count.lock();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        if *count == 0 {
            self.suspend_cond.notify_all();
        }
        true
    }

    /// Installs `checkpoint` to run on the thread at its next safe point. Refused while
    /// an earlier checkpoint has not run yet.
    pub fn request_checkpoint(&self, checkpoint: Checkpoint) -> bool {
        let mut slot = self.checkpoint.lock();
        if slot.is_some() || self.read_flag(ThreadFlag::CheckpointRequest) {
            return false;
        }
        *slot = Some(checkpoint);
        self.atomic_set_flag(ThreadFlag::CheckpointRequest);
        true
    }

    /// Waits until the thread is parked at a safe point. Returns false on timeout.
    pub fn wait_for_suspension(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.suspend_count.lock();
        loop {
            match self.state() {
                ThreadState::Suspended => return true,
                ThreadState::Terminated => return false,
                _ => {}
            }
            if self.suspend_cond.wait_until(&mut count, deadline).timed_out() {
                return self.state() == ThreadState::Suspended;
            }
        }
    }

    fn take_checkpoint(&self) -> Option<Checkpoint> {
        self.checkpoint.lock().take()
    }

    fn finish_checkpoint(&self) {
        let _slot = self.checkpoint.lock();
        self.atomic_clear_flag(ThreadFlag::CheckpointRequest);
    }

    /// Parks the calling (owning) thread until its suspend count drops to zero.
    fn park_while_suspended(&self) {
        let mut count = self.suspend_count.lock();
        while *count > 0 {
            self.suspend_cond.wait(&mut count);
        }
        // Cleared under the count lock so a concurrent request_suspend is never lost.
        self.atomic_clear_flag(ThreadFlag::SuspendRequest);
    }
}

/// A thread attached to the VM. Owned by the OS thread it represents; other threads
/// reach it only through its `ThreadControl`.
pub struct VMThread {
    vm: Arc<VM>,
    control: Arc<ThreadControl>,
    exception: RefCell<Option<Exception>>,
    holds_mutator: Cell<bool>,
}

impl Debug for VMThread {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VMThread")
            .field("control", &self.control)
            .field("exception", &self.exception.borrow())
            .finish()
    }
}

impl VMThread {
    /// Registers a new thread with `vm` and makes it runnable.
    pub(crate) fn attach(vm: Arc<VM>, name: &str) -> VMThread {
        let control = Arc::new(ThreadControl::new(name));
        vm.thread_list().register(control.clone());
        vm.mutator_lock().acquire_shared();

        VMThread {
            vm,
            control,
            exception: RefCell::new(None),
            holds_mutator: Cell::new(true),
        }
    }

    pub fn id(&self) -> u64 {
        self.control.id
    }

    pub fn vm(&self) -> &Arc<VM> {
        &self.vm
    }

    pub fn control(&self) -> &Arc<ThreadControl> {
        &self.control
    }

    pub fn state(&self) -> ThreadState {
        self.control.state()
    }

    // Pending exception

    pub fn is_exception_pending(&self) -> bool {
        self.exception.borrow().is_some()
    }

    pub fn exception(&self) -> Option<Exception> {
        self.exception.borrow().clone()
    }

    /// Detaches the pending exception, leaving none pending.
    pub fn take_exception(&self) -> Option<Exception> {
        self.exception.borrow_mut().take()
    }

    /// Makes `exception` pending, replacing whatever was pending before.
    pub fn set_exception(&self, exception: Exception) {
        *self.exception.borrow_mut() = Some(exception);
    }

    pub fn clear_exception(&self) {
        self.exception.borrow_mut().take();
    }

    pub fn throw(&self, exception: Exception) -> PendingException {
        trace!(thread = self.id(), %exception, "throwing");
        self.set_exception(exception);
        PendingException
    }

    pub fn throw_new(&self, kind: ThrowableKind, message: impl Into<String>) -> PendingException {
        self.throw(Exception::new(kind, message))
    }

    // Suspension

    /// Safe point check. Runs a requested checkpoint, parks while suspension is
    /// requested, and loops until neither flag is set.
    pub fn check_suspend(&self) {
        loop {
            if self.control.read_flag(ThreadFlag::CheckpointRequest) {
                self.run_checkpoint_function();
            } else if self.control.read_flag(ThreadFlag::SuspendRequest) {
                self.full_suspend_check();
            } else {
                break;
            }
        }
    }

    fn run_checkpoint_function(&self) {
        if let Some(checkpoint) = self.control.take_checkpoint() {
            trace!(thread = self.id(), "running checkpoint");
            checkpoint(self);
        }
        self.control.finish_checkpoint();
    }

    fn full_suspend_check(&self) {
        self.change_state(ThreadState::Suspended, || self.control.park_while_suspended());
    }

    /// Runs `f`, which may block, with the mutator lock released, then checks for
    /// suspension before returning to managed code.
    pub fn in_blocked_state<R>(&self, f: impl FnOnce() -> R) -> R {
        let result = self.change_state(ThreadState::Blocked, f);
        self.check_suspend();
        result
    }

    fn change_state<R>(&self, state: ThreadState, f: impl FnOnce() -> R) -> R {
        let held = self.release_mutator_share();
        self.control.set_state(state);

        let result = f();

        if held {
            self.acquire_mutator_share();
        }
        self.control.set_state(ThreadState::Runnable);
        result
    }

    /// Returns whether a share was held.
    pub(crate) fn release_mutator_share(&self) -> bool {
        let held = self.holds_mutator.replace(false);
        if held {
            self.vm.mutator_lock().release_shared();
        }
        held
    }

    pub(crate) fn acquire_mutator_share(&self) {
        if !self.holds_mutator.replace(true) {
            self.vm.mutator_lock().acquire_shared();
        }
    }
}

impl Drop for VMThread {
    fn drop(&mut self) {
        self.release_mutator_share();
        self.control.set_state(ThreadState::Terminated);
        self.vm.thread_list().unregister(self.control.id);
    }
}
