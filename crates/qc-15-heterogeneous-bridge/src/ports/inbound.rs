//! # Inbound Ports
//!
//! API trait defining what the heterogeneous bridge exposes to the platform.

use crate::domain::{
    Address, BridgeError, BridgeTransaction, DecodedCallIntent, ExternalTransaction, Hash,
    TransactionReceipt,
};
use async_trait::async_trait;

/// Heterogeneous bridge API - inbound port.
///
/// Parse operations return `Ok(None)` for transactions that are not of the
/// requested kind or fail validation. `Err` is reserved for upstream and
/// timeout failures, which callers retry.
#[async_trait]
pub trait HeterogeneousBridgeApi: Send + Sync {
    /// First-pass classification from calldata alone.
    fn classify_calldata(&self, input: &[u8]) -> DecodedCallIntent;

    /// Withdrawal executed by the bridge contract.
    async fn parse_withdrawal(
        &self,
        tx: &ExternalTransaction,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<Option<BridgeTransaction>, BridgeError>;

    /// Deposit into the bridge contract (legacy or cross-out).
    async fn parse_deposit(
        &self,
        tx: &ExternalTransaction,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<Option<BridgeTransaction>, BridgeError>;

    /// Quorum membership change executed by the bridge contract.
    async fn parse_membership_change(
        &self,
        tx: &ExternalTransaction,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<Option<BridgeTransaction>, BridgeError>;

    /// Contract upgrade authorization executed by the bridge contract.
    async fn parse_upgrade_authorization(
        &self,
        tx: &ExternalTransaction,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<Option<BridgeTransaction>, BridgeError>;

    /// [`parse_withdrawal`](Self::parse_withdrawal) after fetching the transaction.
    async fn parse_withdrawal_by_hash(
        &self,
        tx_hash: Hash,
    ) -> Result<Option<BridgeTransaction>, BridgeError>;

    /// [`parse_deposit`](Self::parse_deposit) after fetching the transaction.
    async fn parse_deposit_by_hash(
        &self,
        tx_hash: Hash,
    ) -> Result<Option<BridgeTransaction>, BridgeError>;

    /// [`parse_membership_change`](Self::parse_membership_change) after fetching
    /// the transaction.
    async fn parse_membership_change_by_hash(
        &self,
        tx_hash: Hash,
    ) -> Result<Option<BridgeTransaction>, BridgeError>;

    /// [`parse_upgrade_authorization`](Self::parse_upgrade_authorization) after
    /// fetching the transaction.
    async fn parse_upgrade_authorization_by_hash(
        &self,
        tx_hash: Hash,
    ) -> Result<Option<BridgeTransaction>, BridgeError>;

    /// Co-signers recorded by the trailing completion event, `None` when the
    /// receipt carries no completion event.
    fn parse_signers(&self, receipt: &TransactionReceipt, tx_from: Address)
        -> Option<Vec<Address>>;

    /// `isCompletedTransaction` view on the bridge contract.
    async fn is_bridge_transaction_completed(
        &self,
        platform_tx_hash: &str,
        use_latest: bool,
    ) -> Result<bool, BridgeError>;

    /// `isMinterERC20` view on the bridge contract.
    async fn is_token_registered_as_minter(
        &self,
        token: Address,
        use_latest: bool,
    ) -> Result<bool, BridgeError>;
}
