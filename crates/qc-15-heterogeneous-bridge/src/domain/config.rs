//! # Bridge Configuration
//!
//! Everything the bridge core consumes from the platform's configuration:
//! contract address, method selectors, event topics, native asset, activation
//! heights, ledger retention and quorum parameters.
//!
//! Values have working defaults; `from_env` applies `QC_BRIDGE_*` overrides.

use super::errors::BridgeError;
use super::value_objects::{Address, ExternalChainId, Hash};
use sha3::{Digest, Keccak256};
use std::time::Duration;
use tracing::{info, warn};

/// Default number of recent headers kept for reorg handling.
pub const DEFAULT_HEADER_RETENTION: u64 = 3;

/// Default bound for a single external-chain fetch.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Keccak-256 of a canonical Solidity signature.
pub fn signature_hash(signature: &str) -> Hash {
    Hash(Keccak256::digest(signature.as_bytes()).into())
}

/// First four bytes of the signature hash.
pub fn method_selector(signature: &str) -> [u8; 4] {
    let hash = signature_hash(signature);
    [hash.0[0], hash.0[1], hash.0[2], hash.0[3]]
}

/// Canonical signatures of the bridge contract surface.
pub mod signatures {
    /// Withdrawal authorization.
    pub const CREATE_OR_SIGN_WITHDRAW: &str =
        "createOrSignWithdraw(string,address,uint256,bool,address,bytes)";
    /// Membership change authorization.
    pub const CREATE_OR_SIGN_MANAGER_CHANGE: &str =
        "createOrSignManagerChange(string,address[],address[],uint8,bytes)";
    /// Contract upgrade authorization.
    pub const CREATE_OR_SIGN_UPGRADE: &str = "createOrSignUpgrade(string,address,bytes)";
    /// Current-generation deposit.
    pub const CROSS_OUT: &str = "crossOut(string,uint256,address)";
    /// View: has the platform transaction been executed on-chain.
    pub const IS_COMPLETED_TRANSACTION: &str = "isCompletedTransaction(string)";
    /// View: is the token registered as bridge-minted.
    pub const IS_MINTER_ERC20: &str = "isMinterERC20(address)";

    /// Legacy native deposit event.
    pub const EVENT_DEPOSIT_FUNDS: &str = "DepositFunds(address,uint256)";
    /// Cross-out deposit event.
    pub const EVENT_CROSS_OUT_FUNDS: &str = "CrossOutFunds(address,string,uint256,address)";
    /// ERC20 transfer.
    pub const EVENT_ERC20_TRANSFER: &str = "Transfer(address,address,uint256)";
    /// Native payout.
    pub const EVENT_TRANSFER_FUNDS: &str = "TransferFunds(address,uint256)";
    /// Withdrawal completed.
    pub const EVENT_WITHDRAW_COMPLETED: &str = "TxWithdrawCompleted(string)";
    /// Membership change completed.
    pub const EVENT_MANAGER_CHANGE_COMPLETED: &str = "TxManagerChangeCompleted(string)";
    /// Upgrade completed.
    pub const EVENT_UPGRADE_COMPLETED: &str = "TxUpgradeCompleted(string)";
}

/// Method selectors and event topics of the bridge contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractSignatures {
    /// `createOrSignWithdraw` selector.
    pub withdraw: [u8; 4],
    /// `createOrSignManagerChange` selector.
    pub manager_change: [u8; 4],
    /// `createOrSignUpgrade` selector.
    pub upgrade: [u8; 4],
    /// `crossOut` selector.
    pub cross_out: [u8; 4],
    /// `isCompletedTransaction` selector.
    pub is_completed: [u8; 4],
    /// `isMinterERC20` selector.
    pub is_minter: [u8; 4],
    /// `DepositFunds` topic.
    pub deposit_funds_topic: Hash,
    /// `CrossOutFunds` topic.
    pub cross_out_funds_topic: Hash,
    /// ERC20 `Transfer` topic.
    pub erc20_transfer_topic: Hash,
    /// `TransferFunds` topic.
    pub transfer_funds_topic: Hash,
    /// `TxWithdrawCompleted` topic.
    pub withdraw_completed_topic: Hash,
    /// `TxManagerChangeCompleted` topic.
    pub manager_change_completed_topic: Hash,
    /// `TxUpgradeCompleted` topic.
    pub upgrade_completed_topic: Hash,
}

impl Default for ContractSignatures {
    fn default() -> Self {
        use signatures::*;
        Self {
            withdraw: method_selector(CREATE_OR_SIGN_WITHDRAW),
            manager_change: method_selector(CREATE_OR_SIGN_MANAGER_CHANGE),
            upgrade: method_selector(CREATE_OR_SIGN_UPGRADE),
            cross_out: method_selector(CROSS_OUT),
            is_completed: method_selector(IS_COMPLETED_TRANSACTION),
            is_minter: method_selector(IS_MINTER_ERC20),
            deposit_funds_topic: signature_hash(EVENT_DEPOSIT_FUNDS),
            cross_out_funds_topic: signature_hash(EVENT_CROSS_OUT_FUNDS),
            erc20_transfer_topic: signature_hash(EVENT_ERC20_TRANSFER),
            transfer_funds_topic: signature_hash(EVENT_TRANSFER_FUNDS),
            withdraw_completed_topic: signature_hash(EVENT_WITHDRAW_COMPLETED),
            manager_change_completed_topic: signature_hash(EVENT_MANAGER_CHANGE_COMPLETED),
            upgrade_completed_topic: signature_hash(EVENT_UPGRADE_COMPLETED),
        }
    }
}

/// Quorum ("virtual bank") parameters consumed from the platform.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct QuorumParams {
    /// Hex public keys of the protocol-configured seed members.
    pub seed_public_keys: Vec<String>,
    /// Total authorized seats, seed and non-seed.
    pub total_seats: usize,
    /// Byzantine threshold percentage. Consumed, never computed here.
    pub byzantine_ratio: u8,
}

impl QuorumParams {
    /// Number of seed seats.
    pub fn seed_count(&self) -> usize {
        self.seed_public_keys.len()
    }

    /// Seats left for externally elected members.
    pub fn non_seed_count(&self) -> usize {
        self.total_seats.saturating_sub(self.seed_count())
    }

    /// Is this public key in the configured seed list.
    pub fn is_seed_key(&self, public_key: &str) -> bool {
        self.seed_public_keys
            .iter()
            .any(|k| k.eq_ignore_ascii_case(public_key))
    }
}

/// Bridge configuration for one external EVM chain.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// External chain id.
    pub chain_id: ExternalChainId,
    /// Multisig bridge contract (the listening address).
    pub bridge_contract: Address,
    /// Selectors and topics.
    pub signatures: ContractSignatures,
    /// Platform asset id of the native coin.
    pub native_asset_id: u32,
    /// Native coin decimals.
    pub native_decimals: u8,
    /// Platform height from which this chain is visible.
    pub chain_activation_height: u64,
    /// External height from which `crossOut` deposits are accepted.
    pub cross_out_activation_height: u64,
    /// Headers retained below the tip.
    pub header_retention: u64,
    /// Bound for each external fetch.
    pub rpc_timeout: Duration,
    /// Quorum parameters.
    pub quorum: QuorumParams,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            chain_id: ExternalChainId(103),
            bridge_contract: Address::ZERO,
            signatures: ContractSignatures::default(),
            native_asset_id: 1,
            native_decimals: 18,
            chain_activation_height: 0,
            cross_out_activation_height: 0,
            header_retention: DEFAULT_HEADER_RETENTION,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            quorum: QuorumParams {
                seed_public_keys: Vec::new(),
                total_seats: 15,
                byzantine_ratio: 66,
            },
        }
    }
}

impl BridgeConfig {
    /// Create a configuration for a chain and bridge contract.
    pub fn new(chain_id: ExternalChainId, bridge_contract: Address) -> Self {
        Self {
            chain_id,
            bridge_contract,
            ..Self::default()
        }
    }

    /// Set the native asset.
    pub fn with_native_asset(mut self, asset_id: u32, decimals: u8) -> Self {
        self.native_asset_id = asset_id;
        self.native_decimals = decimals;
        self
    }

    /// Set the chain activation height.
    pub fn with_chain_activation_height(mut self, height: u64) -> Self {
        self.chain_activation_height = height;
        self
    }

    /// Set the cross-out activation height.
    pub fn with_cross_out_activation_height(mut self, height: u64) -> Self {
        self.cross_out_activation_height = height;
        self
    }

    /// Set the RPC timeout.
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Set the header retention window.
    pub fn with_header_retention(mut self, retention: u64) -> Self {
        self.header_retention = retention;
        self
    }

    /// Set the quorum parameters.
    pub fn with_quorum(mut self, quorum: QuorumParams) -> Self {
        self.quorum = quorum;
        self
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.bridge_contract.is_zero() {
            return Err(BridgeError::Config("bridge contract address not set".into()));
        }
        if self.header_retention == 0 {
            return Err(BridgeError::Config("header retention must be at least 1".into()));
        }
        if self.quorum.seed_count() > self.quorum.total_seats {
            return Err(BridgeError::Config(format!(
                "{} seed keys exceed {} total seats",
                self.quorum.seed_count(),
                self.quorum.total_seats
            )));
        }
        if self.quorum.byzantine_ratio > 100 {
            return Err(BridgeError::Config("byzantine ratio is a percentage".into()));
        }
        Ok(())
    }

    /// Apply `QC_BRIDGE_*` environment overrides. Unparseable values are
    /// logged and ignored.
    pub fn from_env(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("QC_BRIDGE_CONTRACT") {
            match raw.parse() {
                Ok(addr) => {
                    self.bridge_contract = addr;
                    info!("[qc-15] Loaded bridge contract from environment");
                }
                Err(_) => warn!("[qc-15] QC_BRIDGE_CONTRACT must be a 20-byte hex address"),
            }
        }
        if let Some(id) = lookup("QC_BRIDGE_CHAIN_ID").and_then(|v| v.parse().ok()) {
            self.chain_id = ExternalChainId(id);
        }
        if let Some(h) = lookup("QC_BRIDGE_ACTIVATION_HEIGHT").and_then(|v| v.parse().ok()) {
            self.chain_activation_height = h;
        }
        if let Some(h) = lookup("QC_BRIDGE_CROSS_OUT_HEIGHT").and_then(|v| v.parse().ok()) {
            self.cross_out_activation_height = h;
        }
        if let Some(ms) = lookup("QC_BRIDGE_RPC_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.rpc_timeout = Duration::from_millis(ms);
        }
        if let Some(keys) = lookup("QC_BRIDGE_SEED_PUBKEYS") {
            self.quorum.seed_public_keys = keys
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
        }
        if let Some(seats) = lookup("QC_BRIDGE_TOTAL_SEATS").and_then(|v| v.parse().ok()) {
            self.quorum.total_seats = seats;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_transfer_topic_matches_erc20_standard() {
        let topic = signature_hash(signatures::EVENT_ERC20_TRANSFER);
        assert_eq!(
            hex::encode(topic.0),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_selectors_are_distinct() {
        let s = ContractSignatures::default();
        let all = [s.withdraw, s.manager_change, s.upgrade, s.cross_out];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_quorum_counts() {
        let q = QuorumParams {
            seed_public_keys: vec!["aa".into(), "bb".into()],
            total_seats: 15,
            byzantine_ratio: 66,
        };
        assert_eq!(q.seed_count(), 2);
        assert_eq!(q.non_seed_count(), 13);
        assert!(q.is_seed_key("AA"));
        assert!(!q.is_seed_key("cc"));
    }

    #[test]
    fn test_validate_requires_contract() {
        assert!(BridgeConfig::default().validate().is_err());
        let cfg = BridgeConfig::new(ExternalChainId(103), Address([1; 20]));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_too_many_seeds() {
        let cfg = BridgeConfig::new(ExternalChainId(103), Address([1; 20])).with_quorum(
            QuorumParams {
                seed_public_keys: vec!["a".into(), "b".into()],
                total_seats: 1,
                byzantine_ratio: 66,
            },
        );
        assert!(matches!(cfg.validate(), Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_overrides_applied() {
        let vars: HashMap<&str, &str> = [
            ("QC_BRIDGE_CONTRACT", "0x00000000000000000000000000000000000000aa"),
            ("QC_BRIDGE_CHAIN_ID", "101"),
            ("QC_BRIDGE_RPC_TIMEOUT_MS", "250"),
            ("QC_BRIDGE_SEED_PUBKEYS", "k1, k2,,k3"),
        ]
        .into_iter()
        .collect();

        let mut cfg = BridgeConfig::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.bridge_contract.0[19], 0xaa);
        assert_eq!(cfg.chain_id, ExternalChainId(101));
        assert_eq!(cfg.rpc_timeout, Duration::from_millis(250));
        assert_eq!(cfg.quorum.seed_public_keys, vec!["k1", "k2", "k3"]);
    }

    #[test]
    fn test_bad_override_ignored() {
        let mut cfg = BridgeConfig::default();
        cfg.apply_overrides(|k| (k == "QC_BRIDGE_CONTRACT").then(|| "zz".to_string()));
        assert!(cfg.bridge_contract.is_zero());
    }
}
