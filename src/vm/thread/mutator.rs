use std::time::{Duration, Instant};
use parking_lot::{Condvar, Mutex};
use tracing::warn;

#[derive(Debug, Default)]
struct MutatorState {
    shared: usize,
    exclusive: bool,
    exclusive_waiters: usize,
}

/// Separates threads that may observe heap objects (shared holders, one per runnable
/// thread) from a thread that needs them all stopped (exclusive holder). Waiting
/// exclusive requests block new shared acquisitions so a stop-the-world cannot starve.
#[derive(Debug, Default)]
pub struct MutatorLock {
    state: Mutex<MutatorState>,
    cond: Condvar,
}

impl MutatorLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire_shared(&self) {
        let mut state = self.state.lock();
        while state.exclusive || state.exclusive_waiters > 0 {
            self.cond.wait(&mut state);
        }
        state.shared += 1;
    }

    pub fn release_shared(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.shared > 0, "releasing an unheld mutator share");
        state.shared = state.shared.saturating_sub(1);
        if state.shared == 0 {
            self.cond.notify_all();
        }
    }

    /// Waits until no thread holds the lock shared. Logs once if that takes longer
    /// than `warn_after`.
    pub fn acquire_exclusive(&self, warn_after: Duration) -> ExclusiveMutatorGuard<'_> {
        let start = Instant::now();
        let mut warned = false;

        let mut state = self.state.lock();
        state.exclusive_waiters += 1;
        while state.exclusive || state.shared > 0 {
            if !warned && start.elapsed() > warn_after {
                warn!(shared_holders = state.shared, "stop-the-world is taking longer than expected");
                warned = true;
            }
            self.cond.wait_for(&mut state, warn_after);
        }
        state.exclusive_waiters -= 1;
        state.exclusive = true;

        if warned {
            warn!("stop-the-world completed after {} ms", start.elapsed().as_millis());
        }
        ExclusiveMutatorGuard { lock: self }
    }

    pub fn shared_holders(&self) -> usize {
        self.state.lock().shared
    }

    pub fn is_exclusively_held(&self) -> bool {
        self.state.lock().exclusive
    }

    fn release_exclusive(&self) {
        let mut state = self.state.lock();
        state.exclusive = false;
        self.cond.notify_all();
    }
}

pub struct ExclusiveMutatorGuard<'a> {
    lock: &'a MutatorLock,
}

impl Drop for ExclusiveMutatorGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_exclusive();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use crate::vm::thread::mutator::MutatorLock;

    #[test]
    fn exclusive_waits_for_shared_holders() {
        let lock = Arc::new(MutatorLock::new());
        lock.acquire_shared();

        let acquired = Arc::new(AtomicBool::new(false));
        let handle = {
            let lock = lock.clone();
            let acquired = acquired.clone();
            std::thread::spawn(move || {
                let _guard = lock.acquire_exclusive(Duration::from_secs(5));
                acquired.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));

        lock.release_shared();
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
        assert!(!lock.is_exclusively_held());
        assert_eq!(lock.shared_holders(), 0);
    }
}
