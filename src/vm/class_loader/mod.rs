use crate::vm::class::class::ClassRef;
use crate::vm::error::Exception;

pub mod array;
pub mod bootstrap;
pub mod resolve;

/// Source of classes for the resolver. Implementations return the same `ClassRef` for
/// every request of the same name.
pub trait ClassLoader: Send + Sync {
    /// Loads and links the class or array class called `name`. A missing class is
    /// reported as `ClassNotFoundException`.
    fn load_class(&self, name: &str) -> Result<ClassRef, Exception>;
}
