//! Storage tiers for computed and input arrays.
//!
//! A holder keeps one array per period. Arrays live in memory by default and
//! move to a disk tier of `.npy` files when the injected [`MemoryPressure`]
//! policy says so.

mod disk;
mod memory;
pub mod npy;
mod pressure;
mod traits;

pub use disk::OnDiskStorage;
pub use memory::InMemoryStorage;
pub use pressure::{FixedPressure, MemoryPressure, SystemMemoryPressure};
pub use traits::{ArrayStorage, StorageError, StorageUsage};
