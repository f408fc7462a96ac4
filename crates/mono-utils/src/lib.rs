//! # mono-utils
//!
//! Shared utilities for the mono-rs bridge: raw memory access at native
//! addresses, a bounded LRU cache, the [`NativePtr`] newtype and lock
//! primitives that switch between single- and multi-threaded builds.
pub mod lru;
pub mod memory;
pub mod newtypes;
pub mod sync;

pub use lru::{Capacity, LruCache};
pub use newtypes::NativePtr;
