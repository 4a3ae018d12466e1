//! # Docking Registry
//!
//! One live [`DockingAdapter`] per external chain, gated by activation
//! height, plus the quorum membership that a contract upgrade recomputes.
//!
//! ## Version switch
//!
//! Every writer holds `switch_lock` for the whole transition, builds the next
//! state on a clone, persists membership changes, then publishes the clone
//! with a single write-lock swap. Readers copy what they need under the read
//! lock and see either the state before a switch or after it.
//!
//! Adapters handed out are snapshots for the current operation. Callers look
//! the adapter up again after any `.await`.

use crate::domain::{
    BridgeConfig, BridgeError, ExternalChainId, QuorumMember, QuorumParams, SigningIdentity,
};
use crate::ports::outbound::{DockingAdapter, QuorumStore};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone, Default)]
struct RegistryState {
    adapters: HashMap<ExternalChainId, Arc<dyn DockingAdapter>>,
    versions: HashMap<ExternalChainId, u32>,
    activation_heights: HashMap<ExternalChainId, u64>,
    quorum: QuorumParams,
    seed_count: usize,
    non_seed_count: usize,
    /// Keyed by platform signing address.
    members: BTreeMap<String, QuorumMember>,
    local_sign_address: Option<String>,
    local_is_member: bool,
}

impl RegistryState {
    fn refresh_local_membership(&mut self) {
        self.local_is_member = self
            .local_sign_address
            .as_ref()
            .is_some_and(|a| self.members.contains_key(a));
    }

    fn ordered_members(&self) -> Vec<QuorumMember> {
        let mut members: Vec<_> = self.members.values().cloned().collect();
        members.sort_by(|a, b| a.order.cmp(&b.order).then(a.sign_address.cmp(&b.sign_address)));
        members
    }
}

/// Consistent copy of the registry taken under one read lock.
#[derive(Clone, Debug)]
pub struct RegistrySnapshot {
    /// Recorded protocol version per chain, ascending chain id.
    pub versions: Vec<(ExternalChainId, u32)>,
    /// Version reported by each registered adapter, ascending chain id.
    pub adapter_versions: Vec<(ExternalChainId, u32)>,
    /// Seed seats.
    pub seed_count: usize,
    /// Non-seed seats.
    pub non_seed_count: usize,
    /// Members in quorum order.
    pub members: Vec<QuorumMember>,
    /// Whether the local node is a quorum member.
    pub local_is_member: bool,
}

impl RegistrySnapshot {
    /// Recorded version of `chain`.
    pub fn version_of(&self, chain: ExternalChainId) -> Option<u32> {
        self.versions
            .iter()
            .find(|(c, _)| *c == chain)
            .map(|(_, v)| *v)
    }

    /// Whether a member with this signing address is present.
    pub fn has_member(&self, sign_address: &str) -> bool {
        self.members.iter().any(|m| m.sign_address == sign_address)
    }
}

/// What a version switch changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgradeOutcome {
    /// New protocol version.
    pub version: u32,
    /// Seed members dropped because their key left the configured list.
    pub removed: Vec<QuorumMember>,
    /// The local node was among `removed`.
    pub local_removed: bool,
    /// Seed seats after the switch.
    pub seed_count: usize,
    /// Non-seed seats after the switch.
    pub non_seed_count: usize,
}

/// Registry of docking adapters and quorum membership.
pub struct DockingRegistry {
    state: RwLock<RegistryState>,
    switch_lock: Mutex<()>,
    network_height: AtomicU64,
    quorum_store: Arc<dyn QuorumStore>,
    signing_latch: tokio::sync::Mutex<HashSet<ExternalChainId>>,
}

impl DockingRegistry {
    /// Empty registry with the configured quorum parameters.
    pub fn new(quorum: QuorumParams, quorum_store: Arc<dyn QuorumStore>) -> Self {
        let state = RegistryState {
            seed_count: quorum.seed_count(),
            non_seed_count: quorum.non_seed_count(),
            quorum,
            ..RegistryState::default()
        };
        Self {
            state: RwLock::new(state),
            switch_lock: Mutex::new(()),
            network_height: AtomicU64::new(0),
            quorum_store,
            signing_latch: tokio::sync::Mutex::new(HashSet::new()),
        }
    }

    /// Registry for the chain described by `config`: its quorum parameters,
    /// and its activation height as the gate for adapters registered later.
    pub fn from_config(
        config: &BridgeConfig,
        quorum_store: Arc<dyn QuorumStore>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let registry = Self::new(config.quorum.clone(), quorum_store);
        registry.set_activation_height(config.chain_id, config.chain_activation_height);
        Ok(registry)
    }

    /// Apply `change` to a copy of the state and publish it if it succeeds.
    fn transition<R>(
        &self,
        change: impl FnOnce(&mut RegistryState) -> Result<R, BridgeError>,
    ) -> Result<R, BridgeError> {
        let _guard = self.switch_lock.lock();
        let mut next = self.state.read().clone();
        let result = change(&mut next)?;
        *self.state.write() = next;
        Ok(result)
    }

    /// Apply an infallible `change` under the switch lock.
    fn publish(&self, change: impl FnOnce(&mut RegistryState)) {
        let _guard = self.switch_lock.lock();
        let mut next = self.state.read().clone();
        change(&mut next);
        *self.state.write() = next;
    }

    /// Load persisted membership, replacing the in-memory set.
    pub fn load_members(&self) -> Result<usize, BridgeError> {
        self.transition(|s| {
            let members = self.quorum_store.load_members()?;
            s.members = members
                .into_iter()
                .map(|m| (m.sign_address.clone(), m))
                .collect();
            s.refresh_local_membership();
            Ok(s.members.len())
        })
    }

    /// Persist and add (or replace) a member.
    pub fn add_member(&self, member: QuorumMember) -> Result<(), BridgeError> {
        self.transition(|s| {
            self.quorum_store.save_member(&member)?;
            s.members.insert(member.sign_address.clone(), member);
            s.refresh_local_membership();
            Ok(())
        })
    }

    /// Set the local node's platform signing address.
    pub fn set_local_sign_address(&self, sign_address: Option<String>) {
        self.publish(|s| {
            s.local_sign_address = sign_address;
            s.refresh_local_membership();
        });
    }

    /// Replace the configured seed list and seat count. Seat counts are
    /// recomputed by the next version switch.
    pub fn set_quorum_params(&self, quorum: QuorumParams) {
        self.publish(|s| s.quorum = quorum);
    }

    /// Gate `chain` until the network reaches `height`.
    pub fn set_activation_height(&self, chain: ExternalChainId, height: u64) {
        self.publish(|s| {
            s.activation_heights.insert(chain, height);
        });
    }

    /// Register `adapter` for its chain, replacing any previous one.
    pub fn register(&self, adapter: Arc<dyn DockingAdapter>) {
        let chain = adapter.chain_id();
        let version = adapter.version();
        self.publish(|s| {
            s.adapters.insert(chain, adapter);
            s.versions.insert(chain, version);
        });
        info!("[qc-15] Registered adapter for chain {} (v{})", chain, version);
    }

    /// Adapter for `chain`.
    pub fn get(&self, chain: ExternalChainId) -> Result<Arc<dyn DockingAdapter>, BridgeError> {
        self.state
            .read()
            .adapters
            .get(&chain)
            .cloned()
            .ok_or(BridgeError::UnknownChain(chain))
    }

    /// Adapters whose chain is active at `as_of`, ascending chain id.
    pub fn get_all_active(&self, as_of: u64) -> Vec<Arc<dyn DockingAdapter>> {
        let state = self.state.read();
        let mut active: Vec<_> = state
            .adapters
            .iter()
            .filter(|(chain, _)| {
                state
                    .activation_heights
                    .get(chain)
                    .map_or(true, |activation| as_of >= *activation)
            })
            .map(|(chain, adapter)| (*chain, adapter.clone()))
            .collect();
        drop(state);
        active.sort_by_key(|(chain, _)| *chain);
        active.into_iter().map(|(_, adapter)| adapter).collect()
    }

    /// Recorded protocol version of `chain`.
    pub fn version(&self, chain: ExternalChainId) -> Result<u32, BridgeError> {
        self.state
            .read()
            .versions
            .get(&chain)
            .copied()
            .ok_or(BridgeError::UnknownChain(chain))
    }

    /// Switch `chain` to `adapter` at `version` and recompute membership
    /// against the configured seed list, as one transition. A chain seen for
    /// the first time is registered by its first switch.
    ///
    /// If persisting membership fails nothing is published and the call can
    /// be retried with the same arguments.
    pub fn on_adapter_upgraded(
        &self,
        chain: ExternalChainId,
        adapter: Arc<dyn DockingAdapter>,
        version: u32,
    ) -> Result<UpgradeOutcome, BridgeError> {
        if adapter.chain_id() != chain {
            return Err(BridgeError::Config(format!(
                "adapter for chain {} registered under {}",
                adapter.chain_id(),
                chain
            )));
        }

        let outcome = self.transition(|s| {
            if s.adapters.insert(chain, adapter).is_none() {
                debug!("[qc-15] Chain {} registered by its first switch", chain);
            }
            s.versions.insert(chain, version);
            s.seed_count = s.quorum.seed_count();
            s.non_seed_count = s.quorum.non_seed_count();

            let removed: Vec<QuorumMember> = s
                .ordered_members()
                .into_iter()
                .filter(|m| m.is_seed && !s.quorum.is_seed_key(&m.signing_public_key))
                .collect();
            for member in &removed {
                s.members.remove(&member.sign_address);
            }
            let local_removed = s
                .local_sign_address
                .as_ref()
                .is_some_and(|local| removed.iter().any(|m| &m.sign_address == local));
            if local_removed {
                s.local_is_member = false;
            }

            let mut renumbered = s.ordered_members();
            for (position, member) in renumbered.iter_mut().enumerate() {
                member.order = u32::try_from(position + 1).unwrap_or(u32::MAX);
            }

            for member in &removed {
                self.quorum_store.remove_member(&member.sign_address)?;
            }
            for member in &renumbered {
                self.quorum_store.save_member(member)?;
            }
            s.members = renumbered
                .into_iter()
                .map(|m| (m.sign_address.clone(), m))
                .collect();

            Ok(UpgradeOutcome {
                version,
                removed,
                local_removed,
                seed_count: s.seed_count,
                non_seed_count: s.non_seed_count,
            })
        })?;

        info!(
            "[qc-15] Chain {} switched to v{}: {} seed members removed, seats {}+{}",
            chain,
            version,
            outcome.removed.len(),
            outcome.seed_count,
            outcome.non_seed_count
        );
        if outcome.local_removed {
            warn!("[qc-15] Local node left the quorum on chain {} upgrade", chain);
        }
        Ok(outcome)
    }

    /// Record an observed network height. Never moves backwards.
    pub fn observe_network_height(&self, height: u64) {
        self.network_height.fetch_max(height, Ordering::AcqRel);
    }

    /// Latest observed network height.
    pub fn network_height(&self) -> u64 {
        self.network_height.load(Ordering::Acquire)
    }

    /// Consistent view of versions, seats and membership.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.read();
        let mut versions: Vec<_> = state.versions.iter().map(|(c, v)| (*c, *v)).collect();
        versions.sort();
        let mut adapter_versions: Vec<_> = state
            .adapters
            .iter()
            .map(|(c, a)| (*c, a.version()))
            .collect();
        adapter_versions.sort();
        RegistrySnapshot {
            versions,
            adapter_versions,
            seed_count: state.seed_count,
            non_seed_count: state.non_seed_count,
            members: state.ordered_members(),
            local_is_member: state.local_is_member,
        }
    }

    /// Import the local signing identity into `chain`'s adapter once the
    /// network has reached the chain's activation height.
    ///
    /// Returns `true` once the latch is set for `chain`. A failed import is
    /// logged and leaves the latch open for the next call.
    pub async fn ensure_signing_identity_registered(
        &self,
        chain: ExternalChainId,
        identity: Option<&SigningIdentity>,
    ) -> Result<bool, BridgeError> {
        let mut latched = self.signing_latch.lock().await;
        if latched.contains(&chain) {
            return Ok(true);
        }

        let (adapter, activation) = {
            let state = self.state.read();
            let adapter = state
                .adapters
                .get(&chain)
                .cloned()
                .ok_or(BridgeError::UnknownChain(chain))?;
            let activation = state.activation_heights.get(&chain).copied().unwrap_or(0);
            (adapter, activation)
        };

        let height = self.network_height();
        if height < activation {
            debug!(
                "[qc-15] Chain {} inactive at {} (activates at {})",
                chain, height, activation
            );
            return Ok(false);
        }

        if let Some(identity) = identity {
            if adapter.current_sign_address().is_none() {
                if let Err(e) = adapter.import_signing_identity(identity).await {
                    warn!("[qc-15] Signing identity import on chain {} failed: {}", chain, e);
                    return Ok(false);
                }
            }
        }

        latched.insert(chain);
        Ok(true)
    }
}
