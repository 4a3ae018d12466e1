//! # Bridge Transaction Parser
//!
//! Classifies external transactions and cross-validates calldata, receipt
//! status and event logs before producing a [`BridgeTransaction`].
//!
//! ## Acceptance Paths
//!
//! | Kind | Requires |
//! |------|----------|
//! | Withdrawal | bridge target, withdraw selector, successful receipt, first payout log with non-zero amount |
//! | Deposit (legacy native) | bridge target, value > 0, empty calldata, matching `DepositFunds` |
//! | Deposit (legacy token) | registered token target, `Transfer` to the bridge, minter check when bound |
//! | Deposit (cross-out) | bridge target, activation height, calldata + `Transfer` + `CrossOutFunds` agree |
//! | Membership change | bridge target, manager-change selector, decodable member lists |
//! | Upgrade authorization | bridge target, upgrade selector |
//!
//! Anything that fails a check is `Ok(None)` with a log line. Only fetch
//! failures are `Err`.

use super::bounded;
use crate::algorithms::{
    decode_bool_return, decode_cross_out, decode_manager_change, encode_call, BridgeEvent,
    CrossOutArgs, EventDecoder, MethodTable,
};
use crate::algorithms::calldata::{to_abi_address, BridgeMethod};
use crate::domain::entities::BridgeTransactionDraft;
use crate::domain::{
    Address, BridgeAsset, BridgeConfig, BridgeError, BridgeTransaction, DecodedCallIntent,
    ExternalTransaction, Hash, TransactionReceipt, TxKind, U256,
};
use crate::ports::inbound::HeterogeneousBridgeApi;
use crate::ports::outbound::{ExternalChainRpc, TokenRegistry};
use async_trait::async_trait;
use ethabi::Token;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, warn};

/// Parser and validator for one external chain.
pub struct BridgeTxParser {
    config: BridgeConfig,
    rpc: Arc<dyn ExternalChainRpc>,
    tokens: Arc<dyn TokenRegistry>,
    methods: MethodTable,
    events: EventDecoder,
}

impl BridgeTxParser {
    /// Create a parser for `config.bridge_contract`. Fails on a
    /// configuration that [`BridgeConfig::validate`] rejects.
    pub fn new(
        config: BridgeConfig,
        rpc: Arc<dyn ExternalChainRpc>,
        tokens: Arc<dyn TokenRegistry>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let methods = MethodTable::new(&config.signatures);
        let events = EventDecoder::new(&config.signatures);
        Ok(Self {
            config,
            rpc,
            tokens,
            methods,
            events,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Token registry consulted by the deposit paths.
    pub fn token_registry(&self) -> &Arc<dyn TokenRegistry> {
        &self.tokens
    }

    fn native_asset(&self) -> BridgeAsset {
        BridgeAsset::Native {
            asset_id: self.config.native_asset_id,
            decimals: self.config.native_decimals,
        }
    }

    fn targets_bridge(&self, tx: &ExternalTransaction) -> bool {
        tx.to == Some(self.config.bridge_contract)
    }

    // =========================================================================
    // FETCHING
    // =========================================================================

    async fn fetch_transaction(&self, hash: Hash) -> Result<Option<ExternalTransaction>, BridgeError> {
        let tx = bounded(
            self.config.rpc_timeout,
            "get_transaction",
            self.rpc.get_transaction(hash),
        )
        .await?;
        match tx {
            Some(tx) if tx.to.is_some() => Ok(Some(tx)),
            Some(_) => {
                debug!("[qc-15] {} is a contract creation", hash);
                Ok(None)
            }
            None => {
                debug!("[qc-15] Transaction {} not found", hash);
                Ok(None)
            }
        }
    }

    /// The supplied receipt, or a fetched one. `None` while pending.
    async fn receipt_for<'a>(
        &self,
        tx: &ExternalTransaction,
        supplied: Option<&'a TransactionReceipt>,
    ) -> Result<Option<Cow<'a, TransactionReceipt>>, BridgeError> {
        if let Some(receipt) = supplied {
            return Ok(Some(Cow::Borrowed(receipt)));
        }
        let fetched = bounded(
            self.config.rpc_timeout,
            "get_transaction_receipt",
            self.rpc.get_transaction_receipt(tx.hash),
        )
        .await?;
        Ok(fetched.map(Cow::Owned))
    }

    async fn call_bool_view(&self, data: Vec<u8>, use_latest: bool) -> Result<bool, BridgeError> {
        let output = bounded(
            self.config.rpc_timeout,
            "call_view",
            self.rpc
                .call_view(self.config.bridge_contract, data, use_latest),
        )
        .await?;
        decode_bool_return(&output)
    }

    // =========================================================================
    // COMPLETION METADATA
    // =========================================================================

    /// Platform hash from the trailing completion event, if the last log is one.
    fn completion_hash(&self, receipt: &TransactionReceipt) -> Option<String> {
        let last = receipt.logs.last()?;
        match self.events.decode(last) {
            Ok(BridgeEvent::Completed {
                platform_tx_hash, ..
            }) => Some(platform_tx_hash),
            Ok(_) => None,
            Err(e) => {
                warn!("[qc-15] Undecodable completion event in {}: {}", receipt.tx_hash, e);
                None
            }
        }
    }

    fn attach_signers(&self, draft: &mut BridgeTransactionDraft, receipt: Option<&TransactionReceipt>) {
        let Some(hash) = receipt.and_then(|r| self.completion_hash(r)) else {
            return;
        };
        draft.set_platform_tx_hash(hash);
        let sender = draft.from();
        draft.add_signer(sender);
    }

    // =========================================================================
    // WITHDRAWAL
    // =========================================================================

    async fn withdrawal(
        &self,
        tx: &ExternalTransaction,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<Option<BridgeTransaction>, BridgeError> {
        if !self.targets_bridge(tx) {
            debug!("[qc-15] {} does not target the bridge", tx.hash);
            return Ok(None);
        }
        let DecodedCallIntent::Withdrawal { platform_tx_hash } = self.methods.classify(&tx.input)
        else {
            debug!("[qc-15] {} is not a withdrawal call", tx.hash);
            return Ok(None);
        };
        let Some(receipt) = self.receipt_for(tx, receipt).await? else {
            debug!("[qc-15] No receipt yet for withdrawal {}", tx.hash);
            return Ok(None);
        };
        if !receipt.status {
            debug!("[qc-15] Withdrawal {} reverted", tx.hash);
            return Ok(None);
        }

        let mut draft = BridgeTransactionDraft::new(tx, self.native_asset());
        draft.set_platform_tx_hash(platform_tx_hash);
        if !self.apply_payout(&mut draft, &receipt) {
            return Ok(None);
        }
        self.attach_signers(&mut draft, Some(&*receipt));
        Ok(Some(draft.finish(TxKind::Withdrawal)))
    }

    /// Fill asset, recipient and amount from the first payout log.
    fn apply_payout(&self, draft: &mut BridgeTransactionDraft, receipt: &TransactionReceipt) -> bool {
        for log in &receipt.logs {
            let (to, amount) = match self.events.decode(log) {
                Ok(BridgeEvent::Erc20Transfer {
                    contract, to, amount, ..
                }) => {
                    let Some(info) = self.tokens.lookup(&contract) else {
                        warn!(
                            "[qc-15] Withdrawal {} pays out unregistered token {}",
                            receipt.tx_hash, contract
                        );
                        return false;
                    };
                    draft.set_asset(BridgeAsset::token(&info));
                    (to, amount)
                }
                Ok(BridgeEvent::TransferFunds { to, amount }) => (to, amount),
                Ok(_) => continue,
                Err(e) => {
                    warn!("[qc-15] Malformed payout log in {}: {}", receipt.tx_hash, e);
                    return false;
                }
            };
            if amount.is_zero() {
                warn!("[qc-15] Withdrawal {} pays out zero", receipt.tx_hash);
                return false;
            }
            draft.set_to(to);
            draft.set_value(amount);
            return true;
        }
        warn!("[qc-15] Withdrawal {} has no payout log", receipt.tx_hash);
        false
    }

    // =========================================================================
    // DEPOSIT
    // =========================================================================

    async fn deposit(
        &self,
        tx: &ExternalTransaction,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<Option<BridgeTransaction>, BridgeError> {
        let Some(to) = tx.to else {
            return Ok(None);
        };
        if self.methods.method_of(&tx.input) == Some(BridgeMethod::CrossOut) {
            return self.cross_out_deposit(tx, receipt).await;
        }

        if to == self.config.bridge_contract && !tx.value.is_zero() && tx.input.is_empty() {
            return self.legacy_native_deposit(tx, receipt).await;
        }
        if let Some(info) = self.tokens.lookup(&to) {
            return self
                .legacy_token_deposit(tx, receipt, BridgeAsset::token(&info))
                .await;
        }
        debug!("[qc-15] {} is not a deposit", tx.hash);
        Ok(None)
    }

    async fn legacy_native_deposit(
        &self,
        tx: &ExternalTransaction,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<Option<BridgeTransaction>, BridgeError> {
        let Some(receipt) = self.receipt_for(tx, receipt).await? else {
            return Ok(None);
        };
        if !receipt.status {
            return Ok(None);
        }

        let topic = self.config.signatures.deposit_funds_topic;
        for log in receipt.logs.iter().filter(|l| l.topics.first() == Some(&topic)) {
            match self.events.decode(log) {
                Ok(BridgeEvent::DepositFunds { from, amount }) => {
                    if from == tx.from && amount == tx.value {
                        let draft = BridgeTransactionDraft::new(tx, self.native_asset());
                        return Ok(Some(draft.finish(TxKind::Deposit)));
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("[qc-15] Malformed DepositFunds in {}: {}", tx.hash, e);
                    return Ok(None);
                }
            }
        }
        warn!("[qc-15] {} sent value to the bridge without a matching DepositFunds", tx.hash);
        Ok(None)
    }

    async fn legacy_token_deposit(
        &self,
        tx: &ExternalTransaction,
        receipt: Option<&TransactionReceipt>,
        asset: BridgeAsset,
    ) -> Result<Option<BridgeTransaction>, BridgeError> {
        let Some(contract) = asset.token_contract() else {
            return Ok(None);
        };
        let Some(receipt) = self.receipt_for(tx, receipt).await? else {
            return Ok(None);
        };
        if !receipt.status {
            return Ok(None);
        }

        let bridge = self.config.bridge_contract;
        let transfer = receipt.logs.iter().find_map(|log| match self.events.decode(log) {
            Ok(BridgeEvent::Erc20Transfer {
                contract: c,
                from,
                to,
                amount,
            }) if c == contract && to == bridge => Some((from, amount)),
            _ => None,
        });
        let Some((from, amount)) = transfer else {
            debug!("[qc-15] Token call {} moved nothing to the bridge", tx.hash);
            return Ok(None);
        };
        if amount.is_zero() {
            return Ok(None);
        }

        if self.tokens.is_bound_asset(asset.asset_id())
            && !self.is_token_registered_as_minter(contract, false).await?
        {
            warn!(
                "[qc-15] Deposit {} of bound token {} not registered as minter",
                tx.hash, contract
            );
            return Ok(None);
        }

        let mut draft = BridgeTransactionDraft::new(tx, asset);
        draft.set_from(from);
        draft.set_to(bridge);
        draft.set_value(amount);
        Ok(Some(draft.finish(TxKind::Deposit)))
    }

    async fn cross_out_deposit(
        &self,
        tx: &ExternalTransaction,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<Option<BridgeTransaction>, BridgeError> {
        if !self.targets_bridge(tx) {
            return Ok(None);
        }
        let height = tx.block_height.unwrap_or_default();
        if height < self.config.cross_out_activation_height {
            debug!(
                "[qc-15] crossOut {} at {} before activation {}",
                tx.hash, height, self.config.cross_out_activation_height
            );
            return Ok(None);
        }
        let args = match decode_cross_out(&tx.input) {
            Ok(args) => args,
            Err(e) => {
                warn!("[qc-15] Malformed crossOut calldata in {}: {}", tx.hash, e);
                return Ok(None);
            }
        };
        let Some(receipt) = self.receipt_for(tx, receipt).await? else {
            return Ok(None);
        };
        if !receipt.status || receipt.logs.is_empty() {
            warn!("[qc-15] crossOut {} has no events", tx.hash);
            return Ok(None);
        }

        let draft = if args.token.is_zero() {
            self.native_cross_out(tx, &receipt)
        } else {
            self.token_cross_out(tx, &receipt, &args)
        };
        Ok(draft.map(|d| d.finish(TxKind::Deposit)))
    }

    /// Native coin: no transfer event exists, the cross-out event must match
    /// the transaction's own sender and value.
    fn native_cross_out(
        &self,
        tx: &ExternalTransaction,
        receipt: &TransactionReceipt,
    ) -> Option<BridgeTransactionDraft> {
        let topic = self.config.signatures.cross_out_funds_topic;
        let log = receipt.logs.iter().find(|l| l.topics.first() == Some(&topic))?;
        let (from, to, amount, token) = match self.events.decode(log) {
            Ok(BridgeEvent::CrossOutFunds {
                from,
                to,
                amount,
                token,
            }) => (from, to, amount, token),
            Ok(_) => return None,
            Err(e) => {
                warn!("[qc-15] Malformed CrossOutFunds in {}: {}", tx.hash, e);
                return None;
            }
        };
        if from != tx.from || amount != tx.value || !token.is_zero() || amount.is_zero() {
            warn!("[qc-15] Native crossOut {} disagrees with its event", tx.hash);
            return None;
        }

        let mut draft = BridgeTransactionDraft::new(tx, self.native_asset());
        draft.set_value(amount);
        draft.set_counterpart(to);
        Some(draft)
    }

    /// Token: calldata, every `Transfer` and the `CrossOutFunds` event must agree.
    fn token_cross_out(
        &self,
        tx: &ExternalTransaction,
        receipt: &TransactionReceipt,
        args: &CrossOutArgs,
    ) -> Option<BridgeTransactionDraft> {
        let Some(info) = self.tokens.lookup(&args.token) else {
            warn!("[qc-15] crossOut {} names unregistered token {}", tx.hash, args.token);
            return None;
        };
        let bridge = self.config.bridge_contract;

        let mut transfer_seen = false;
        let mut burn_ok = true;
        let mut cross_out_seen = false;

        for log in &receipt.logs {
            match self.events.decode(log) {
                Ok(BridgeEvent::Erc20Transfer {
                    contract,
                    from,
                    to,
                    amount,
                }) => {
                    if contract != args.token {
                        warn!("[qc-15] crossOut {} transfer from foreign contract", tx.hash);
                        return None;
                    }
                    if to.is_zero() {
                        if from != bridge || amount != args.amount {
                            warn!("[qc-15] crossOut {} burn mismatch", tx.hash);
                            burn_ok = false;
                            break;
                        }
                    } else {
                        if from != tx.from || to != bridge || amount != args.amount {
                            warn!("[qc-15] crossOut {} transfer mismatch", tx.hash);
                            return None;
                        }
                        transfer_seen = true;
                    }
                }
                Ok(BridgeEvent::CrossOutFunds {
                    from,
                    to,
                    amount,
                    token,
                }) => {
                    if from != tx.from || to != args.to || amount != args.amount || token != args.token
                    {
                        warn!("[qc-15] crossOut {} event disagrees with calldata", tx.hash);
                        return None;
                    }
                    cross_out_seen = true;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("[qc-15] Malformed log in crossOut {}: {}", tx.hash, e);
                    return None;
                }
            }
        }

        if !(transfer_seen && burn_ok && cross_out_seen) || args.amount.is_zero() {
            warn!("[qc-15] crossOut {} incomplete", tx.hash);
            return None;
        }

        let mut draft = BridgeTransactionDraft::new(tx, BridgeAsset::token(&info));
        draft.set_value(args.amount);
        draft.set_counterpart(args.to.clone());
        Some(draft)
    }

    // =========================================================================
    // AUTHORIZATIONS
    // =========================================================================

    async fn authorization(
        &self,
        tx: &ExternalTransaction,
        receipt: Option<&TransactionReceipt>,
        kind: TxKind,
    ) -> Result<Option<BridgeTransaction>, BridgeError> {
        if !self.targets_bridge(tx) {
            return Ok(None);
        }
        let intent = self.methods.classify(&tx.input);
        if intent.kind() != Some(kind) {
            debug!("[qc-15] {} is not a {} call", tx.hash, kind);
            return Ok(None);
        }

        let mut draft = BridgeTransactionDraft::new(tx, self.native_asset());
        draft.set_value(U256::zero());
        if let Some(hash) = intent.platform_tx_hash() {
            draft.set_platform_tx_hash(hash.to_string());
        }
        if kind == TxKind::MembershipChange {
            match decode_manager_change(&tx.input) {
                Ok(args) => draft.set_members(args.added, args.removed),
                Err(e) => {
                    warn!("[qc-15] Malformed manager change {}: {}", tx.hash, e);
                    return Ok(None);
                }
            }
        }

        let receipt = self.receipt_for(tx, receipt).await?;
        self.attach_signers(&mut draft, receipt.as_deref());
        Ok(Some(draft.finish(kind)))
    }
}

#[async_trait]
impl HeterogeneousBridgeApi for BridgeTxParser {
    fn classify_calldata(&self, input: &[u8]) -> DecodedCallIntent {
        self.methods.classify(input)
    }

    async fn parse_withdrawal(
        &self,
        tx: &ExternalTransaction,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<Option<BridgeTransaction>, BridgeError> {
        self.withdrawal(tx, receipt).await
    }

    async fn parse_deposit(
        &self,
        tx: &ExternalTransaction,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<Option<BridgeTransaction>, BridgeError> {
        self.deposit(tx, receipt).await
    }

    async fn parse_membership_change(
        &self,
        tx: &ExternalTransaction,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<Option<BridgeTransaction>, BridgeError> {
        self.authorization(tx, receipt, TxKind::MembershipChange)
            .await
    }

    async fn parse_upgrade_authorization(
        &self,
        tx: &ExternalTransaction,
        receipt: Option<&TransactionReceipt>,
    ) -> Result<Option<BridgeTransaction>, BridgeError> {
        self.authorization(tx, receipt, TxKind::UpgradeAuthorization)
            .await
    }

    async fn parse_withdrawal_by_hash(
        &self,
        tx_hash: Hash,
    ) -> Result<Option<BridgeTransaction>, BridgeError> {
        match self.fetch_transaction(tx_hash).await? {
            Some(tx) => self.withdrawal(&tx, None).await,
            None => Ok(None),
        }
    }

    async fn parse_deposit_by_hash(
        &self,
        tx_hash: Hash,
    ) -> Result<Option<BridgeTransaction>, BridgeError> {
        match self.fetch_transaction(tx_hash).await? {
            Some(tx) => self.deposit(&tx, None).await,
            None => Ok(None),
        }
    }

    async fn parse_membership_change_by_hash(
        &self,
        tx_hash: Hash,
    ) -> Result<Option<BridgeTransaction>, BridgeError> {
        match self.fetch_transaction(tx_hash).await? {
            Some(tx) => {
                self.authorization(&tx, None, TxKind::MembershipChange)
                    .await
            }
            None => Ok(None),
        }
    }

    async fn parse_upgrade_authorization_by_hash(
        &self,
        tx_hash: Hash,
    ) -> Result<Option<BridgeTransaction>, BridgeError> {
        match self.fetch_transaction(tx_hash).await? {
            Some(tx) => {
                self.authorization(&tx, None, TxKind::UpgradeAuthorization)
                    .await
            }
            None => Ok(None),
        }
    }

    fn parse_signers(
        &self,
        receipt: &TransactionReceipt,
        tx_from: Address,
    ) -> Option<Vec<Address>> {
        self.completion_hash(receipt).map(|_| vec![tx_from])
    }

    async fn is_bridge_transaction_completed(
        &self,
        platform_tx_hash: &str,
        use_latest: bool,
    ) -> Result<bool, BridgeError> {
        let data = encode_call(
            self.config.signatures.is_completed,
            &[Token::String(platform_tx_hash.to_string())],
        );
        self.call_bool_view(data, use_latest).await
    }

    async fn is_token_registered_as_minter(
        &self,
        token: Address,
        use_latest: bool,
    ) -> Result<bool, BridgeError> {
        let data = encode_call(
            self.config.signatures.is_minter,
            &[Token::Address(to_abi_address(token))],
        );
        self.call_bool_view(data, use_latest).await
    }
}
