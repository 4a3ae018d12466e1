//! # Service Layer
//!
//! Ledger, transaction parser/validator and the block scanning drivers built
//! on top of them.

pub mod block_analysis;
pub mod ledger;
pub mod parser;
pub mod scanner;

pub use block_analysis::{BlockAnalyzer, ClassifyingAnalyzer, TransactionAnalyzer};
pub use ledger::LocalBlockLedger;
pub use parser::BridgeTxParser;
pub use scanner::{BlockScanner, ScanOutcome};

use crate::domain::BridgeError;
use std::future::Future;
use std::time::Duration;

/// Run an external fetch under `limit`. Expiry maps to [`BridgeError::Timeout`]
/// and drops the fetch without side effects.
pub(crate) async fn bounded<T, F>(
    limit: Duration,
    operation: &'static str,
    fetch: F,
) -> Result<T, BridgeError>
where
    F: Future<Output = Result<T, BridgeError>>,
{
    match tokio::time::timeout(limit, fetch).await {
        Ok(result) => result,
        Err(_) => Err(BridgeError::Timeout {
            operation,
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
