//! Test helpers: an in-memory external chain and ABI fixture builders.
//!
//! Fixtures use the default contract signatures and the fixed addresses
//! below so unit and scenario tests read the same.

use crate::adapters::{EvmDockingAdapter, InMemoryTokenRegistry};
use crate::algorithms::calldata::{to_abi_address, to_abi_uint};
use crate::algorithms::encode_call;
use crate::domain::{
    Address, BridgeConfig, BridgeError, ContractSignatures, ExternalBlock, ExternalChainId,
    ExternalTransaction, Hash, LogEntry, QuorumMember, SecureKey, SigningIdentity,
    TransactionReceipt, TxKind, U256,
};
use crate::ports::outbound::ExternalChainRpc;
use crate::service::BridgeTxParser;
use async_trait::async_trait;
use ethabi::Token;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Bridge contract used by fixtures.
pub const BRIDGE: Address = Address([0xB0; 20]);
/// Depositing user.
pub const USER: Address = Address([0x11; 20]);
/// Quorum member relaying authorizations.
pub const RELAYER: Address = Address([0x22; 20]);
/// Registered token contract.
pub const TOKEN: Address = Address([0xC0; 20]);

/// Install a `tracing` subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Bridge configuration pointing at [`BRIDGE`].
pub fn test_config() -> BridgeConfig {
    BridgeConfig::new(ExternalChainId(103), BRIDGE)
}

// =============================================================================
// MOCK CHAIN
// =============================================================================

/// In-memory external chain.
#[derive(Default)]
pub struct MockChainRpc {
    blocks: RwLock<BTreeMap<u64, ExternalBlock>>,
    transactions: RwLock<HashMap<Hash, ExternalTransaction>>,
    receipts: RwLock<HashMap<Hash, TransactionReceipt>>,
    views: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    sent: Mutex<Vec<Vec<u8>>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    receipt_fetches: AtomicUsize,
}

impl MockChainRpc {
    /// Empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block and index its transactions.
    pub fn add_block(&self, block: ExternalBlock) {
        let mut txs = self.transactions.write();
        for tx in &block.transactions {
            txs.insert(tx.hash, tx.clone());
        }
        self.blocks.write().insert(block.height, block);
    }

    /// Add a transaction with an optional receipt.
    pub fn add_transaction(&self, tx: ExternalTransaction, receipt: Option<TransactionReceipt>) {
        if let Some(receipt) = receipt {
            self.receipts.write().insert(tx.hash, receipt);
        }
        self.transactions.write().insert(tx.hash, tx);
    }

    /// Attach a receipt to an already known transaction.
    pub fn add_receipt(&self, receipt: TransactionReceipt) {
        self.receipts.write().insert(receipt.tx_hash, receipt);
    }

    /// Answer `isMinterERC20(token)` with `value`.
    pub fn set_minter(&self, token: Address, value: bool) {
        let call = encode_call(
            ContractSignatures::default().is_minter,
            &[Token::Address(to_abi_address(token))],
        );
        self.views
            .write()
            .insert(call, ethabi::encode(&[Token::Bool(value)]));
    }

    /// Answer `isCompletedTransaction(hash)` with `value`.
    pub fn set_completed(&self, platform_tx_hash: &str, value: bool) {
        let call = encode_call(
            ContractSignatures::default().is_completed,
            &[Token::String(platform_tx_hash.to_string())],
        );
        self.views
            .write()
            .insert(call, ethabi::encode(&[Token::Bool(value)]));
    }

    /// Make every call fail with `UpstreamUnavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of receipt fetches served.
    pub fn receipt_fetches(&self) -> usize {
        self.receipt_fetches.load(Ordering::SeqCst)
    }

    /// Raw transactions broadcast so far.
    pub fn sent_transactions(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    async fn enter(&self) -> Result<(), BridgeError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(BridgeError::UpstreamUnavailable("mock node down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExternalChainRpc for MockChainRpc {
    async fn get_block_number(&self) -> Result<u64, BridgeError> {
        self.enter().await?;
        Ok(self.blocks.read().keys().next_back().copied().unwrap_or(0))
    }

    async fn get_block_by_height(&self, height: u64) -> Result<Option<ExternalBlock>, BridgeError> {
        self.enter().await?;
        Ok(self.blocks.read().get(&height).cloned())
    }

    async fn get_block_by_hash(&self, hash: Hash) -> Result<Option<ExternalBlock>, BridgeError> {
        self.enter().await?;
        Ok(self
            .blocks
            .read()
            .values()
            .find(|b| b.hash == hash)
            .cloned())
    }

    async fn get_transaction(
        &self,
        hash: Hash,
    ) -> Result<Option<ExternalTransaction>, BridgeError> {
        self.enter().await?;
        Ok(self.transactions.read().get(&hash).cloned())
    }

    async fn get_transaction_receipt(
        &self,
        hash: Hash,
    ) -> Result<Option<TransactionReceipt>, BridgeError> {
        self.enter().await?;
        self.receipt_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.receipts.read().get(&hash).cloned())
    }

    async fn call_view(
        &self,
        _contract: Address,
        data: Vec<u8>,
        _use_latest: bool,
    ) -> Result<Vec<u8>, BridgeError> {
        self.enter().await?;
        Ok(self
            .views
            .read()
            .get(&data)
            .cloned()
            .unwrap_or_else(|| ethabi::encode(&[Token::Bool(false)])))
    }

    async fn send_raw_transaction(&self, raw: Vec<u8>) -> Result<Hash, BridgeError> {
        self.enter().await?;
        let hash = crate::domain::config::signature_hash(&hex::encode(&raw));
        self.sent.lock().push(raw);
        Ok(hash)
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

/// A mined transaction at height 100.
pub fn make_tx(
    hash: Hash,
    from: Address,
    to: Address,
    value: U256,
    input: Vec<u8>,
) -> ExternalTransaction {
    ExternalTransaction {
        hash,
        block_height: Some(100),
        from,
        to: Some(to),
        value,
        input,
    }
}

/// A successful receipt.
pub fn make_receipt(tx_hash: Hash, logs: Vec<LogEntry>) -> TransactionReceipt {
    TransactionReceipt {
        tx_hash,
        status: true,
        logs,
    }
}

/// A block whose hash is derived from its height and parent.
pub fn make_block(height: u64, parent_hash: Hash, transactions: Vec<ExternalTransaction>) -> ExternalBlock {
    let mut hash = [0u8; 32];
    hash[..8].copy_from_slice(&height.to_be_bytes());
    hash[8..16].copy_from_slice(&parent_hash.0[..8]);
    ExternalBlock {
        hash: Hash(hash),
        parent_hash,
        height,
        timestamp: 1_700_000_000 + height * 3,
        transactions,
    }
}

fn word(value: U256) -> [u8; 32] {
    let mut w = [0u8; 32];
    value.to_big_endian(&mut w);
    w
}

fn sigs() -> ContractSignatures {
    ContractSignatures::default()
}

/// ERC20 `Transfer` emitted by `contract`, amount in data.
pub fn transfer_log(contract: Address, from: Address, to: Address, amount: U256) -> LogEntry {
    LogEntry {
        address: contract,
        topics: vec![
            sigs().erc20_transfer_topic,
            Hash(from.to_word()),
            Hash(to.to_word()),
        ],
        data: word(amount).to_vec(),
    }
}

/// `TransferFunds` emitted by the bridge.
pub fn transfer_funds_log(to: Address, amount: U256) -> LogEntry {
    let mut data = to.to_word().to_vec();
    data.extend_from_slice(&word(amount));
    LogEntry {
        address: BRIDGE,
        topics: vec![sigs().transfer_funds_topic],
        data,
    }
}

/// Legacy `DepositFunds` emitted by the bridge.
pub fn deposit_funds_log(from: Address, amount: U256) -> LogEntry {
    LogEntry {
        address: BRIDGE,
        topics: vec![sigs().deposit_funds_topic],
        data: ethabi::encode(&[
            Token::Address(to_abi_address(from)),
            Token::Uint(to_abi_uint(amount)),
        ]),
    }
}

/// `CrossOutFunds` emitted by the bridge.
pub fn cross_out_log(from: Address, to: &str, amount: U256, token: Address) -> LogEntry {
    LogEntry {
        address: BRIDGE,
        topics: vec![sigs().cross_out_funds_topic],
        data: ethabi::encode(&[
            Token::Address(to_abi_address(from)),
            Token::String(to.to_string()),
            Token::Uint(to_abi_uint(amount)),
            Token::Address(to_abi_address(token)),
        ]),
    }
}

/// Completion event for an authorization of `kind`.
pub fn completed_log(kind: TxKind, platform_tx_hash: &str) -> LogEntry {
    let s = sigs();
    let topic = match kind {
        TxKind::MembershipChange => s.manager_change_completed_topic,
        TxKind::UpgradeAuthorization => s.upgrade_completed_topic,
        TxKind::Withdrawal | TxKind::Deposit => s.withdraw_completed_topic,
    };
    LogEntry {
        address: BRIDGE,
        topics: vec![topic],
        data: ethabi::encode(&[Token::String(platform_tx_hash.to_string())]),
    }
}

/// `createOrSignWithdraw` calldata.
pub fn withdraw_calldata(platform_tx_hash: &str) -> Vec<u8> {
    encode_call(
        sigs().withdraw,
        &[
            Token::String(platform_tx_hash.to_string()),
            Token::Address(to_abi_address(USER)),
            Token::Uint(to_abi_uint(U256::from(1))),
            Token::Bool(false),
            Token::Address(to_abi_address(Address::ZERO)),
            Token::Bytes(vec![0x5A; 65]),
        ],
    )
}

/// `crossOut` calldata.
pub fn cross_out_calldata(to: &str, amount: U256, token: Address) -> Vec<u8> {
    encode_call(
        sigs().cross_out,
        &[
            Token::String(to.to_string()),
            Token::Uint(to_abi_uint(amount)),
            Token::Address(to_abi_address(token)),
        ],
    )
}

/// `createOrSignManagerChange` calldata.
pub fn manager_change_calldata(
    platform_tx_hash: &str,
    added: &[Address],
    removed: &[Address],
) -> Vec<u8> {
    let list = |addrs: &[Address]| {
        Token::Array(
            addrs
                .iter()
                .map(|a| Token::Address(to_abi_address(*a)))
                .collect(),
        )
    };
    encode_call(
        sigs().manager_change,
        &[
            Token::String(platform_tx_hash.to_string()),
            list(added),
            list(removed),
            Token::Uint(ethabi::Uint::from(1u8)),
            Token::Bytes(vec![]),
        ],
    )
}

/// `createOrSignUpgrade` calldata.
pub fn upgrade_calldata(platform_tx_hash: &str, new_contract: Address) -> Vec<u8> {
    encode_call(
        sigs().upgrade,
        &[
            Token::String(platform_tx_hash.to_string()),
            Token::Address(to_abi_address(new_contract)),
            Token::Bytes(vec![]),
        ],
    )
}

// =============================================================================
// DOCKING FIXTURES
// =============================================================================

/// EVM adapter for `chain` at `version`, backed by its own mock chain.
pub fn test_adapter(chain: ExternalChainId, version: u32) -> Arc<EvmDockingAdapter> {
    let rpc = Arc::new(MockChainRpc::new());
    let config = BridgeConfig::new(chain, BRIDGE);
    let parser = Arc::new(
        BridgeTxParser::new(config, rpc.clone(), Arc::new(InMemoryTokenRegistry::new()))
            .expect("fixture config is valid"),
    );
    Arc::new(EvmDockingAdapter::new(version, parser, rpc))
}

/// Signing identity of the local node, external address [`RELAYER`].
pub fn test_identity() -> SigningIdentity {
    SigningIdentity {
        platform_address: "local".into(),
        external_address: RELAYER,
        public_key: "02aa".into(),
        private_key: SecureKey::new([7; 32]),
    }
}

/// Quorum member whose external address is derived from `order`.
pub fn quorum_member(sign_address: &str, public_key: &str, is_seed: bool, order: u32) -> QuorumMember {
    let mut external = [0u8; 20];
    external[16..].copy_from_slice(&order.to_be_bytes());
    QuorumMember {
        sign_address: sign_address.into(),
        external_sign_address: Address(external),
        signing_public_key: public_key.into(),
        is_seed,
        order,
    }
}
