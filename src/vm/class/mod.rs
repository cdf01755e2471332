pub mod class;
pub mod access;
pub mod cache;
pub mod constant_pool;
pub mod field;
pub mod method;
pub mod name_parsers;
