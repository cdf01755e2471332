use std::sync::Arc;
use parking_lot::Mutex;
use tracing::debug;
use crate::vm::thread::mutator::ExclusiveMutatorGuard;
use crate::vm::thread::thread::{ThreadControl, VMThread};

/// Threads currently attached to a VM.
#[derive(Debug, Default)]
pub struct ThreadList {
    threads: Mutex<Vec<Arc<ThreadControl>>>,
}

impl ThreadList {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, thread: Arc<ThreadControl>) {
        debug!(thread = thread.id(), name = thread.name(), "thread attached");
        self.threads.lock().push(thread);
    }

    pub(crate) fn unregister(&self, id: u64) {
        let mut threads = self.threads.lock();
        if let Some(pos) = threads.iter().position(|t| t.id() == id) {
            let thread = threads.swap_remove(pos);
            debug!(thread = id, name = thread.name(), "thread detached");
        }
    }

    pub fn get(&self, id: u64) -> Option<Arc<ThreadControl>> {
        self.threads.lock().iter().find(|t| t.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot_except(&self, id: u64) -> Vec<Arc<ThreadControl>> {
        self.threads.lock().iter().filter(|t| t.id() != id).cloned().collect()
    }

    /// Stops every thread but `requester` at a safe point and takes the mutator lock
    /// exclusively. Everything is resumed when the guard is dropped.
    pub fn suspend_all<'a>(&self, requester: &'a VMThread) -> SuspendAllGuard<'a> {
        let suspended = self.snapshot_except(requester.id());
        for thread in &suspended {
            thread.request_suspend();
        }

        let held_share = requester.release_mutator_share();
        let vm = requester.vm();
        let exclusive = vm.mutator_lock().acquire_exclusive(vm.options().suspend_warn_after);
        debug!(requester = requester.id(), threads = suspended.len(), "all threads suspended");

        SuspendAllGuard { requester, suspended, held_share, exclusive: Some(exclusive) }
    }

    /// Installs `checkpoint` on every attached thread, the caller's own included, and
    /// runs the caller's copy right away. Returns how many threads accepted it.
    pub fn run_checkpoint<F>(&self, requester: &VMThread, checkpoint: F) -> usize
    where
        F: Fn(&VMThread) + Send + Sync + 'static,
    {
        let checkpoint = Arc::new(checkpoint);
        let mut accepted = 0;
        for thread in self.snapshot_except(requester.id()) {
            let checkpoint = checkpoint.clone();
            if thread.request_checkpoint(Box::new(move |t| checkpoint(t))) {
                accepted += 1;
            }
        }
        checkpoint(requester);
        accepted + 1
    }
}

/// Holds every other thread suspended and the mutator lock exclusively.
pub struct SuspendAllGuard<'a> {
    requester: &'a VMThread,
    suspended: Vec<Arc<ThreadControl>>,
    held_share: bool,
    exclusive: Option<ExclusiveMutatorGuard<'a>>,
}

impl SuspendAllGuard<'_> {
    pub fn suspended_threads(&self) -> &[Arc<ThreadControl>] {
        &self.suspended
    }

    /// Resumes every suspended thread. Same as dropping the guard.
    pub fn resume_all(self) {}
}

impl Drop for SuspendAllGuard<'_> {
    fn drop(&mut self) {
        for thread in &self.suspended {
            thread.resume();
        }
        self.exclusive.take();
        if self.held_share {
            self.requester.acquire_mutator_share();
        }
        debug!(requester = self.requester.id(), "all threads resumed");
    }
}
