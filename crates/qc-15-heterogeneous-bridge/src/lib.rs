//! # QC-15 Heterogeneous Chain Bridge
//!
//! Core of the bridge between the platform and external EVM chains.
//!
//! **Subsystem ID:** 15
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! - Track recently scanned external blocks with shallow reorg tolerance
//! - Classify external transactions and decode bridge calldata and events
//! - Validate deposits, withdrawals and quorum authorizations against receipts
//! - Hold one docking adapter per chain and switch versions atomically
//!
//! ## Validation Rules
//!
//! | Path | Accepted when |
//! |------|---------------|
//! | Withdrawal | First payout log has a positive amount |
//! | Legacy native deposit | `DepositFunds` matches sender and value |
//! | Legacy token deposit | Transfer of the token to the bridge, minter check if bound |
//! | Cross-out | Calldata, transfer and `CrossOutFunds` agree exactly |
//!
//! Anything else is "not found", never an error.
//!
//! ## Module Structure
//!
//! ```text
//! qc-15-heterogeneous-bridge/
//! ├── domain/          # Records, config, errors, signing identity
//! ├── algorithms/      # Calldata and event decoding
//! ├── ports/           # HeterogeneousBridgeApi, DockingAdapter, stores, RPC
//! ├── adapters/        # KV stores, quorum store, token registry, EVM adapter
//! ├── service/         # Ledger, parser, block analysis, scanner
//! └── registry/        # Docking registry and version switch
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod domain;
pub mod ports;
pub mod registry;
pub mod service;
pub mod test_utils;

// Re-exports
pub use adapters::{EvmDockingAdapter, InMemoryKVStore, InMemoryTokenRegistry, KvQuorumStore};
#[cfg(feature = "rocksdb")]
pub use adapters::{RocksDbConfig, RocksDbStore};
pub use algorithms::{BridgeEvent, BridgeMethod, EventDecoder, MethodTable};
pub use domain::{
    Address, BlockHeaderRecord, BridgeAsset, BridgeConfig, BridgeError, BridgeTransaction,
    DecodedCallIntent, ExternalBlock, ExternalChainId, ExternalTransaction, Hash, LogEntry,
    QuorumMember, QuorumParams, SecureKey, SigningIdentity, TokenInfo, TransactionReceipt,
    TxKind, U256,
};
pub use ports::{
    BatchOperation, DockingAdapter, ExternalChainRpc, HeterogeneousBridgeApi, KeyValueStore,
    QuorumStore, TokenRegistry,
};
pub use registry::{DockingRegistry, RegistrySnapshot, UpgradeOutcome};
pub use service::{
    BlockAnalyzer, BlockScanner, BridgeTxParser, ClassifyingAnalyzer, LocalBlockLedger,
    ScanOutcome, TransactionAnalyzer,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    #[allow(clippy::const_is_empty)]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
