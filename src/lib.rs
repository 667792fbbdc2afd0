// src/lib.rs

pub mod config;
pub mod connection;
pub mod core;

// Re-export
pub use crate::core::{CacheError, CacheOptions, ConnCache};
