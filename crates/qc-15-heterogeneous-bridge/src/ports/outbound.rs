//! # Outbound Ports
//!
//! Traits for external dependencies: per-chain docking adapters, the external
//! chain node, the local key-value store, quorum persistence and the
//! platform's token registry.

use super::inbound::HeterogeneousBridgeApi;
use crate::domain::{
    Address, BridgeError, ExternalBlock, ExternalChainId, ExternalTransaction, Hash, QuorumMember,
    SigningIdentity, TokenInfo, TransactionReceipt,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Per-chain docking adapter - outbound port.
///
/// One implementation per external chain family. The registry owns adapters;
/// callers receive an `Arc` valid for the current operation only and must
/// look the adapter up again after any suspension point.
#[async_trait]
pub trait DockingAdapter: Send + Sync {
    /// External chain served.
    fn chain_id(&self) -> ExternalChainId;

    /// Bridge contract protocol version.
    fn version(&self) -> u32;

    /// Parser/validator for this chain's bridge contract.
    fn bridge(&self) -> Arc<dyn HeterogeneousBridgeApi>;

    /// External address of the imported signing identity, if any.
    fn current_sign_address(&self) -> Option<Address>;

    /// Import the node's signing identity.
    async fn import_signing_identity(&self, identity: &SigningIdentity) -> Result<(), BridgeError>;

    /// External chain head height.
    async fn latest_height(&self) -> Result<u64, BridgeError>;

    /// Has the platform transaction been executed by the bridge contract.
    async fn is_completed(&self, platform_tx_hash: &str) -> Result<bool, BridgeError>;

    /// Broadcast a signed transaction.
    async fn submit_raw(&self, raw: Vec<u8>) -> Result<Hash, BridgeError>;
}

/// External EVM chain RPC client - outbound port.
///
/// Every call is network I/O. Callers bound it with a timeout and never hold
/// a ledger or registry lock across it.
#[async_trait]
pub trait ExternalChainRpc: Send + Sync {
    /// Current chain head height.
    async fn get_block_number(&self) -> Result<u64, BridgeError>;

    /// Block with transactions at `height`, `None` if not yet produced.
    async fn get_block_by_height(&self, height: u64) -> Result<Option<ExternalBlock>, BridgeError>;

    /// Block with transactions by hash.
    async fn get_block_by_hash(&self, hash: Hash) -> Result<Option<ExternalBlock>, BridgeError>;

    /// Transaction by hash.
    async fn get_transaction(&self, hash: Hash)
        -> Result<Option<ExternalTransaction>, BridgeError>;

    /// Receipt by transaction hash, `None` while pending.
    async fn get_transaction_receipt(
        &self,
        hash: Hash,
    ) -> Result<Option<TransactionReceipt>, BridgeError>;

    /// Read-only contract call. `use_latest` selects the latest state over
    /// the last confirmed one.
    async fn call_view(
        &self,
        contract: Address,
        data: Vec<u8>,
        use_latest: bool,
    ) -> Result<Vec<u8>, BridgeError>;

    /// Broadcast a signed raw transaction, returning its hash.
    async fn send_raw_transaction(&self, raw: Vec<u8>) -> Result<Hash, BridgeError>;
}

/// Key-value store - outbound port.
///
/// Keys are table-prefixed byte strings. Writes take `&mut self`; shared
/// owners wrap the store in a lock.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BridgeError>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), BridgeError>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&mut self, key: &[u8]) -> Result<(), BridgeError>;

    /// Apply all operations or none.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), BridgeError>;

    /// All entries under `prefix`, in ascending key order.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BridgeError>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put {
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// Delete a key.
    Delete {
        /// Key
        key: Vec<u8>,
    },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// Durable quorum membership - outbound port.
pub trait QuorumStore: Send + Sync {
    /// Insert or replace a member.
    fn save_member(&self, member: &QuorumMember) -> Result<(), BridgeError>;

    /// Remove a member by platform signing address.
    fn remove_member(&self, sign_address: &str) -> Result<(), BridgeError>;

    /// All persisted members.
    fn load_members(&self) -> Result<Vec<QuorumMember>, BridgeError>;
}

/// Platform token registry - outbound port.
pub trait TokenRegistry: Send + Sync {
    /// Registered token info for a contract address.
    fn lookup(&self, contract: &Address) -> Option<TokenInfo>;

    /// Whether the platform asset is bound to a bridge-minted token.
    fn is_bound_asset(&self, asset_id: u32) -> bool;
}
