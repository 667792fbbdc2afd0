// src/core/mod.rs

//! The central module containing the connection cache and the cell resolver.

pub mod cache;
pub mod errors;
pub mod resolver;

pub use cache::{CacheOptions, ConnCache};
pub use errors::CacheError;
pub use resolver::{CellId, CellResolver, StaticResolver};
