use crate::vm::class::class::ClassRef;
use crate::vm::error::Exception;
use crate::vm::object::ObjectRef;

pub mod object;
pub mod string;

/// Hands out heap objects. The class passed in is already resolved, checked and
/// initialized; the allocator only has to produce storage for it.
pub trait HeapAllocator: Send + Sync {
    fn alloc_object(&self, class: &ClassRef) -> Result<ObjectRef, Exception>;

    /// `class` is the array class, `length` has been checked to be non-negative.
    fn alloc_array(&self, class: &ClassRef, length: usize) -> Result<ObjectRef, Exception>;
}
