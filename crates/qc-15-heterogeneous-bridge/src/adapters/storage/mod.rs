//! Key-value store adapters.

mod memory;
#[cfg(feature = "rocksdb")]
mod rocks;

pub use memory::InMemoryKVStore;
#[cfg(feature = "rocksdb")]
pub use rocks::{RocksDbConfig, RocksDbStore};
