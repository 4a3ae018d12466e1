//! # Domain Entities
//!
//! Records observed on the external chain and the bridge records derived
//! from them.

use super::value_objects::{Address, Hash, TxKind, U256};
use serde::{Deserialize, Serialize};

// =============================================================================
// EXTERNAL CHAIN RECORDS
// =============================================================================

/// Locally retained header of an external-chain block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeaderRecord {
    /// Block hash (identity).
    pub hash: Hash,
    /// Parent block hash.
    pub parent_hash: Hash,
    /// Block height.
    pub height: u64,
    /// Wall-clock time the block was scanned, in milliseconds.
    pub observed_at: u64,
}

/// A transaction as returned by the external chain node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTransaction {
    /// Transaction hash.
    pub hash: Hash,
    /// Containing block, if mined.
    pub block_height: Option<u64>,
    /// Sender.
    pub from: Address,
    /// Recipient. `None` for contract creation.
    pub to: Option<Address>,
    /// Native value transferred.
    pub value: U256,
    /// Calldata.
    pub input: Vec<u8>,
}

/// A full external-chain block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalBlock {
    /// Block hash.
    pub hash: Hash,
    /// Parent block hash.
    pub parent_hash: Hash,
    /// Block height.
    pub height: u64,
    /// Block timestamp in seconds.
    pub timestamp: u64,
    /// Transactions in block order.
    pub transactions: Vec<ExternalTransaction>,
}

/// An emitted event log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Emitting contract.
    pub address: Address,
    /// Indexed topics; `topics[0]` is the event signature hash.
    pub topics: Vec<Hash>,
    /// Non-indexed ABI-encoded data.
    pub data: Vec<u8>,
}

/// Transaction receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// Transaction hash.
    pub tx_hash: Hash,
    /// Execution succeeded.
    pub status: bool,
    /// Logs in emission order.
    pub logs: Vec<LogEntry>,
}

/// Token contract known to the platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Token contract address.
    pub contract: Address,
    /// Platform asset id.
    pub asset_id: u32,
    /// Token decimals.
    pub decimals: u8,
    /// Token symbol.
    pub symbol: String,
}

// =============================================================================
// BRIDGE RECORDS
// =============================================================================

/// Asset moved by a bridge transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeAsset {
    /// The chain's native coin.
    Native {
        /// Platform asset id.
        asset_id: u32,
        /// Decimals.
        decimals: u8,
    },
    /// A token contract.
    Token {
        /// Token contract address.
        contract: Address,
        /// Platform asset id.
        asset_id: u32,
        /// Decimals.
        decimals: u8,
    },
}

impl BridgeAsset {
    /// Build from registry info.
    pub fn token(info: &TokenInfo) -> Self {
        Self::Token {
            contract: info.contract,
            asset_id: info.asset_id,
            decimals: info.decimals,
        }
    }

    /// True for token-contract assets.
    pub fn is_token(&self) -> bool {
        matches!(self, Self::Token { .. })
    }

    /// Token contract, present iff this is a token asset.
    pub fn token_contract(&self) -> Option<Address> {
        match self {
            Self::Token { contract, .. } => Some(*contract),
            Self::Native { .. } => None,
        }
    }

    /// Platform asset id.
    pub fn asset_id(&self) -> u32 {
        match self {
            Self::Native { asset_id, .. } | Self::Token { asset_id, .. } => *asset_id,
        }
    }

    /// Decimals.
    pub fn decimals(&self) -> u8 {
        match self {
            Self::Native { decimals, .. } | Self::Token { decimals, .. } => *decimals,
        }
    }
}

/// A validated bridge transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeTransaction {
    /// External transaction hash.
    pub tx_hash: Hash,
    /// Containing block height.
    pub block_height: u64,
    /// Bridge intent.
    pub kind: TxKind,
    /// External sender.
    pub from: Address,
    /// External recipient.
    pub to: Address,
    /// Amount moved (zero for membership changes and upgrades).
    pub value: U256,
    /// Asset moved.
    pub asset: BridgeAsset,
    /// Platform-side destination of a deposit.
    pub counterpart_address: Option<String>,
    /// External addresses that co-signed the on-chain action, insertion ordered.
    pub signers: Vec<Address>,
    /// Platform transaction this on-chain action completes.
    pub platform_tx_hash: Option<String>,
    /// Members added by a membership change.
    pub added_members: Vec<Address>,
    /// Members removed by a membership change.
    pub removed_members: Vec<Address>,
}

impl BridgeTransaction {
    /// Signer metadata is attached only when the completion event was found.
    pub fn has_signers(&self) -> bool {
        !self.signers.is_empty()
    }
}

/// Mutable candidate filled in by the validators. Only `finish` turns it into
/// a [`BridgeTransaction`].
#[derive(Clone, Debug)]
pub(crate) struct BridgeTransactionDraft {
    tx_hash: Hash,
    block_height: u64,
    from: Address,
    to: Address,
    value: U256,
    asset: BridgeAsset,
    counterpart_address: Option<String>,
    signers: Vec<Address>,
    platform_tx_hash: Option<String>,
    added_members: Vec<Address>,
    removed_members: Vec<Address>,
}

impl BridgeTransactionDraft {
    /// Start from the raw transaction; asset defaults to the native coin.
    pub(crate) fn new(tx: &ExternalTransaction, native: BridgeAsset) -> Self {
        Self {
            tx_hash: tx.hash,
            block_height: tx.block_height.unwrap_or_default(),
            from: tx.from,
            to: tx.to.unwrap_or_default(),
            value: tx.value,
            asset: native,
            counterpart_address: None,
            signers: Vec::new(),
            platform_tx_hash: None,
            added_members: Vec::new(),
            removed_members: Vec::new(),
        }
    }

    pub(crate) fn from(&self) -> Address {
        self.from
    }

    pub(crate) fn set_from(&mut self, from: Address) {
        self.from = from;
    }

    pub(crate) fn set_to(&mut self, to: Address) {
        self.to = to;
    }

    pub(crate) fn set_value(&mut self, value: U256) {
        self.value = value;
    }

    pub(crate) fn set_asset(&mut self, asset: BridgeAsset) {
        self.asset = asset;
    }

    pub(crate) fn set_counterpart(&mut self, counterpart: String) {
        self.counterpart_address = Some(counterpart);
    }

    pub(crate) fn set_members(&mut self, added: Vec<Address>, removed: Vec<Address>) {
        self.added_members = added;
        self.removed_members = removed;
    }

    pub(crate) fn set_platform_tx_hash(&mut self, hash: String) {
        self.platform_tx_hash = Some(hash);
    }

    /// Insert keeping first-seen order.
    pub(crate) fn add_signer(&mut self, signer: Address) {
        if !self.signers.contains(&signer) {
            self.signers.push(signer);
        }
    }

    /// Seal the record. The kind is assigned here and nowhere else.
    pub(crate) fn finish(self, kind: TxKind) -> BridgeTransaction {
        BridgeTransaction {
            tx_hash: self.tx_hash,
            block_height: self.block_height,
            kind,
            from: self.from,
            to: self.to,
            value: self.value,
            asset: self.asset,
            counterpart_address: self.counterpart_address,
            signers: self.signers,
            platform_tx_hash: self.platform_tx_hash,
            added_members: self.added_members,
            removed_members: self.removed_members,
        }
    }
}

/// First-pass classification derived purely from calldata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedCallIntent {
    /// `createOrSignWithdraw`.
    Withdrawal {
        /// Platform transaction being completed.
        platform_tx_hash: String,
    },
    /// `createOrSignManagerChange`.
    MembershipChange {
        /// Platform transaction being completed.
        platform_tx_hash: String,
    },
    /// `createOrSignUpgrade`.
    UpgradeAuthorization {
        /// Platform transaction being completed.
        platform_tx_hash: String,
    },
    /// `crossOut`.
    CrossOut,
    /// Anything else, including calldata shorter than a selector.
    Unrecognized,
}

impl DecodedCallIntent {
    /// True for any of the four bridge methods.
    pub fn is_bridge_call(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }

    /// Bridge intent, if any.
    pub fn kind(&self) -> Option<TxKind> {
        match self {
            Self::Withdrawal { .. } => Some(TxKind::Withdrawal),
            Self::MembershipChange { .. } => Some(TxKind::MembershipChange),
            Self::UpgradeAuthorization { .. } => Some(TxKind::UpgradeAuthorization),
            Self::CrossOut => Some(TxKind::Deposit),
            Self::Unrecognized => None,
        }
    }

    /// Platform transaction hash carried in the first ABI parameter.
    pub fn platform_tx_hash(&self) -> Option<&str> {
        match self {
            Self::Withdrawal { platform_tx_hash }
            | Self::MembershipChange { platform_tx_hash }
            | Self::UpgradeAuthorization { platform_tx_hash } => Some(platform_tx_hash),
            Self::CrossOut | Self::Unrecognized => None,
        }
    }
}

// =============================================================================
// QUORUM
// =============================================================================

/// A virtual bank director: one seat in the bridge signing quorum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumMember {
    /// Platform signing address (membership key).
    pub sign_address: String,
    /// Address the member signs with on the external chain.
    pub external_sign_address: Address,
    /// Hex-encoded signing public key.
    pub signing_public_key: String,
    /// Protocol-configured seed member.
    pub is_seed: bool,
    /// 1-based position in the quorum.
    pub order: u32,
}
