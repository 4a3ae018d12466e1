//! # Block Analysis
//!
//! Runs every transaction of a fetched block through an analyzer, caches the
//! bridge transactions it finds, then commits the header to the ledger and
//! prunes it to the retention window. A block only counts as scanned once its
//! header is recorded, and its bridge transactions are forwarded only after
//! that commit. A failed block is retried from scratch without duplicates
//! reaching the receiver.

use super::ledger::LocalBlockLedger;
use super::parser::BridgeTxParser;
use crate::domain::{BlockHeaderRecord, BridgeError, BridgeTransaction, ExternalBlock, ExternalTransaction, TxKind};
use crate::ports::inbound::HeterogeneousBridgeApi;
use crate::ports::outbound::KeyValueStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Per-transaction hook invoked for every transaction of a scanned block.
#[async_trait]
pub trait TransactionAnalyzer: Send + Sync {
    /// Inspect one transaction, returning it as a bridge transaction if it is
    /// one. An error aborts the block; it is retried. Must not have side
    /// effects: the same transaction is analyzed again on retry.
    async fn analyze(
        &self,
        tx: &ExternalTransaction,
        block_timestamp: u64,
    ) -> Result<Option<BridgeTransaction>, BridgeError>;
}

/// Drives a block through an analyzer and the ledger.
pub struct BlockAnalyzer<S: KeyValueStore> {
    ledger: Arc<LocalBlockLedger<S>>,
    analyzer: Arc<dyn TransactionAnalyzer>,
    retention: u64,
    sink: Option<mpsc::Sender<BridgeTransaction>>,
}

impl<S: KeyValueStore> BlockAnalyzer<S> {
    /// Create a driver keeping `retention` headers below the tip.
    pub fn new(
        ledger: Arc<LocalBlockLedger<S>>,
        analyzer: Arc<dyn TransactionAnalyzer>,
        retention: u64,
    ) -> Self {
        Self {
            ledger,
            analyzer,
            retention,
            sink: None,
        }
    }

    /// Classifying driver for `parser`'s chain, keeping the configured
    /// header retention and forwarding committed records to `sink`.
    pub fn for_parser(
        ledger: Arc<LocalBlockLedger<S>>,
        parser: Arc<BridgeTxParser>,
        sink: mpsc::Sender<BridgeTransaction>,
    ) -> Self {
        let retention = parser.config().header_retention;
        Self::new(ledger, Arc::new(ClassifyingAnalyzer::new(parser)), retention).with_sink(sink)
    }

    /// Forward bridge transactions of each committed block to `sink`.
    pub fn with_sink(mut self, sink: mpsc::Sender<BridgeTransaction>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Headers kept below the tip.
    pub fn retention(&self) -> u64 {
        self.retention
    }

    /// Analyze all transactions, record the header, prune old headers.
    /// Returns the number of bridge transactions found.
    pub async fn analyze_block(&self, block: &ExternalBlock) -> Result<usize, BridgeError> {
        let mut found = Vec::new();
        for tx in &block.transactions {
            if let Some(record) = self.analyzer.analyze(tx, block.timestamp).await? {
                found.push(record);
            }
        }
        for record in &found {
            self.ledger.cache_transaction(record)?;
        }

        self.ledger.record_block(BlockHeaderRecord {
            hash: block.hash,
            parent_hash: block.parent_hash,
            height: block.height,
            observed_at: now_millis(),
        })?;

        if let Some(sink) = &self.sink {
            for record in &found {
                if sink.send(record.clone()).await.is_err() {
                    warn!("[qc-15] Bridge transaction receiver dropped");
                    break;
                }
            }
        }

        if block.height >= self.retention {
            self.ledger.prune(block.height - self.retention)?;
        }

        debug!(
            "[qc-15] Scanned block {}: {} transactions, {} bridge",
            block.height,
            block.transactions.len(),
            found.len()
        );
        Ok(found.len())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Analyzer that classifies each transaction and validates it against the
/// chain.
pub struct ClassifyingAnalyzer {
    parser: Arc<BridgeTxParser>,
}

impl ClassifyingAnalyzer {
    /// Analyzer over `parser`'s chain and bridge contract.
    pub fn new(parser: Arc<BridgeTxParser>) -> Self {
        Self { parser }
    }

    /// Legacy deposits carry no bridge selector: bare value to the bridge, or
    /// a call on a registered token.
    fn may_be_legacy_deposit(&self, tx: &ExternalTransaction) -> bool {
        let Some(to) = tx.to else {
            return false;
        };
        let config = self.parser.config();
        (to == config.bridge_contract && tx.input.is_empty() && !tx.value.is_zero())
            || self.parser.token_registry().lookup(&to).is_some()
    }
}

#[async_trait]
impl TransactionAnalyzer for ClassifyingAnalyzer {
    async fn analyze(
        &self,
        tx: &ExternalTransaction,
        _block_timestamp: u64,
    ) -> Result<Option<BridgeTransaction>, BridgeError> {
        let record = match self.parser.classify_calldata(&tx.input).kind() {
            Some(TxKind::Withdrawal) => self.parser.parse_withdrawal(tx, None).await?,
            Some(TxKind::MembershipChange) => self.parser.parse_membership_change(tx, None).await?,
            Some(TxKind::UpgradeAuthorization) => {
                self.parser.parse_upgrade_authorization(tx, None).await?
            }
            Some(TxKind::Deposit) => self.parser.parse_deposit(tx, None).await?,
            None if self.may_be_legacy_deposit(tx) => self.parser.parse_deposit(tx, None).await?,
            None => None,
        };

        if let Some(record) = &record {
            debug!("[qc-15] Found {} {}", record.kind, record.tx_hash);
        }
        Ok(record)
    }
}
