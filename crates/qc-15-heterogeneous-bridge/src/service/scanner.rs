//! Height-by-height scanner with shallow reorg detection.

use super::block_analysis::BlockAnalyzer;
use super::bounded;
use super::ledger::LocalBlockLedger;
use crate::domain::BridgeError;
use crate::ports::outbound::{ExternalChainRpc, KeyValueStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Result of one scanner step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The block at this height was analyzed and recorded.
    Advanced(u64),
    /// Parent mismatch: the header at this height was dropped.
    Rewound(u64),
    /// The next height is not produced yet.
    UpToDate,
}

/// Advances the ledger one external block at a time.
pub struct BlockScanner<S: KeyValueStore> {
    rpc: Arc<dyn ExternalChainRpc>,
    ledger: Arc<LocalBlockLedger<S>>,
    analyzer: BlockAnalyzer<S>,
    rpc_timeout: Duration,
    start_height: u64,
}

impl<S: KeyValueStore> BlockScanner<S> {
    /// Scanner that starts at `start_height` when the ledger is empty.
    pub fn new(
        rpc: Arc<dyn ExternalChainRpc>,
        ledger: Arc<LocalBlockLedger<S>>,
        analyzer: BlockAnalyzer<S>,
        rpc_timeout: Duration,
        start_height: u64,
    ) -> Self {
        Self {
            rpc,
            ledger,
            analyzer,
            rpc_timeout,
            start_height,
        }
    }

    /// Scan the height after the ledger's latest.
    ///
    /// On error nothing is recorded and the same height is attempted again
    /// by the next call.
    pub async fn sync_next(&self) -> Result<ScanOutcome, BridgeError> {
        let latest = self.ledger.get_latest()?;
        let next = latest
            .as_ref()
            .map_or(self.start_height, |h| h.height + 1);

        let block = bounded(
            self.rpc_timeout,
            "get_block_by_height",
            self.rpc.get_block_by_height(next),
        )
        .await?;
        let Some(block) = block else {
            return Ok(ScanOutcome::UpToDate);
        };

        if let Some(prev) = latest {
            if block.parent_hash != prev.hash {
                warn!(
                    "[qc-15] Reorg at {}: parent {} does not extend {}",
                    next, block.parent_hash, prev.hash
                );
                self.ledger.rewind_to_height(prev.height)?;
                return Ok(ScanOutcome::Rewound(prev.height));
            }
        }

        self.analyzer.analyze_block(&block).await?;
        Ok(ScanOutcome::Advanced(next))
    }
}
