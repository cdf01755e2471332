pub mod thread;
pub mod mutator;
pub mod list;
