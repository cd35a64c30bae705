pub mod config;
pub mod memory;
pub mod problems;
pub mod redis;
pub mod store;
pub mod types;
