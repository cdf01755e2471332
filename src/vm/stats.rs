//! Resolution counters, compiled in with the `statistics` feature.

#[cfg(feature = "statistics")]
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    FastFieldHit,
    FastFieldMiss,
    FastMethodHit,
    FastMethodMiss,
    SlowResolution,
    ClassInitialization,
}

#[cfg(feature = "statistics")]
#[derive(Debug, Default)]
pub struct RuntimeStats {
    counters: [AtomicU64; 6],
}

#[cfg(feature = "statistics")]
impl RuntimeStats {
    pub fn record(&self, counter: Counter) {
        self.counters[counter as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter as usize].load(Ordering::Relaxed)
    }
}

#[cfg(not(feature = "statistics"))]
#[derive(Debug, Default)]
pub struct RuntimeStats;

#[cfg(not(feature = "statistics"))]
impl RuntimeStats {
    #[inline(always)]
    pub fn record(&self, _counter: Counter) {}

    pub fn get(&self, _counter: Counter) -> u64 {
        0
    }
}

impl RuntimeStats {
    #[cfg(feature = "statistics")]
    pub const fn new() -> Self {
        RuntimeStats {
            counters: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0),
                AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
        }
    }

    #[cfg(not(feature = "statistics"))]
    pub const fn new() -> Self {
        RuntimeStats
    }
}
