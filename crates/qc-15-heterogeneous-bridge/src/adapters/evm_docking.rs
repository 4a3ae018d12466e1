//! EVM docking adapter: one bridge contract version on one EVM chain.

use crate::domain::{Address, BridgeError, ExternalChainId, Hash, SigningIdentity};
use crate::ports::inbound::HeterogeneousBridgeApi;
use crate::ports::outbound::{DockingAdapter, ExternalChainRpc};
use crate::service::BridgeTxParser;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// [`DockingAdapter`] for EVM-compatible chains.
pub struct EvmDockingAdapter {
    version: u32,
    parser: Arc<BridgeTxParser>,
    rpc: Arc<dyn ExternalChainRpc>,
    identity: RwLock<Option<SigningIdentity>>,
}

impl EvmDockingAdapter {
    /// Adapter for the parser's chain and contract at protocol `version`.
    pub fn new(version: u32, parser: Arc<BridgeTxParser>, rpc: Arc<dyn ExternalChainRpc>) -> Self {
        Self {
            version,
            parser,
            rpc,
            identity: RwLock::new(None),
        }
    }

    fn rpc_timeout(&self) -> Duration {
        self.parser.config().rpc_timeout
    }
}

#[async_trait]
impl DockingAdapter for EvmDockingAdapter {
    fn chain_id(&self) -> ExternalChainId {
        self.parser.config().chain_id
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn bridge(&self) -> Arc<dyn HeterogeneousBridgeApi> {
        self.parser.clone()
    }

    fn current_sign_address(&self) -> Option<Address> {
        self.identity.read().as_ref().map(|i| i.external_address)
    }

    async fn import_signing_identity(&self, identity: &SigningIdentity) -> Result<(), BridgeError> {
        if identity.public_key.is_empty() {
            return Err(BridgeError::Config("signing identity without public key".into()));
        }
        *self.identity.write() = Some(identity.clone());
        info!(
            "[qc-15] Imported signing address {} for chain {}",
            identity.external_address,
            self.chain_id()
        );
        Ok(())
    }

    async fn latest_height(&self) -> Result<u64, BridgeError> {
        crate::service::bounded(self.rpc_timeout(), "get_block_number", self.rpc.get_block_number())
            .await
    }

    async fn is_completed(&self, platform_tx_hash: &str) -> Result<bool, BridgeError> {
        self.parser
            .is_bridge_transaction_completed(platform_tx_hash, false)
            .await
    }

    async fn submit_raw(&self, raw: Vec<u8>) -> Result<Hash, BridgeError> {
        crate::service::bounded(
            self.rpc_timeout(),
            "send_raw_transaction",
            self.rpc.send_raw_transaction(raw),
        )
        .await
    }
}
