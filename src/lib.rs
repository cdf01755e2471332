//! Runtime support layer of a JVM-style execution engine: fast and slow path symbol
//! resolution, method dispatch, class initialization, and the cooperative suspension
//! protocol used to bring executing threads to a safe point.

pub mod helper;
pub mod vm;

pub use vm::class::class::{Class, ClassRef, InitState};
pub use vm::class::field::{Field, FieldRef, FieldType};
pub use vm::class::method::{InvokeType, Method, MethodDescriptor, MethodRef, MethodRepr};
pub use vm::error::{Exception, FatalError, PendingException, ThrowableKind};
pub use vm::object::{Object, ObjectRef, Value};
pub use vm::options::VmOptions;
pub use vm::thread::thread::VMThread;
pub use vm::vm::VM;
