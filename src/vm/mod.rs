pub mod vm;
pub mod options;
pub mod error;
pub mod stats;
pub mod thread;
pub mod class;
pub mod object;
pub mod class_loader;
pub mod pool;
pub mod runtime_support;
