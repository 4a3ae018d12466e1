//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements the outbound ports: key-value stores, quorum persistence,
//! token registry and the EVM docking adapter.

mod evm_docking;
mod quorum_store;
mod storage;
mod token_registry;

pub use evm_docking::EvmDockingAdapter;
pub use quorum_store::KvQuorumStore;
pub use storage::InMemoryKVStore;
#[cfg(feature = "rocksdb")]
pub use storage::{RocksDbConfig, RocksDbStore};
pub use token_registry::InMemoryTokenRegistry;
