//! Entry points called by compiled and interpreted code.
//!
//! The fast path only consults what the referrer's class has already resolved and
//! answers `None` whenever it cannot decide on its own. The slow path does the full
//! work (loading, initialization, allocation) and reports failures as the pending
//! exception of the calling thread.

pub mod conversions;
pub mod fast_path;
pub mod guards;
pub mod slow_path;

pub use conversions::{d2i, d2l, f2i, f2l, l2d, l2f};
pub use fast_path::{find_field_fast, find_method_fast, FindFieldType};
pub use guards::{check_reference_result, unlock_jni_synchronized_method};
pub use slow_path::{
    alloc_array_from_code, alloc_object_from_code, check_and_alloc_array_from_code,
    find_field_from_code, find_method_from_code, resolve_string_from_code,
    resolve_verify_and_clinit, throw_stack_overflow_error,
};

use crate::vm::thread::thread::VMThread;

/// Safe point check, called on method entry and loop back edges.
#[inline]
pub fn check_suspend(thread: &VMThread) {
    thread.check_suspend();
}
