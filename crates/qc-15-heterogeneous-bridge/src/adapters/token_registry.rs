//! In-memory token registry.

use crate::domain::{Address, TokenInfo};
use crate::ports::outbound::TokenRegistry;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Token registry kept in memory, fed by the platform's asset module.
#[derive(Default)]
pub struct InMemoryTokenRegistry {
    tokens: RwLock<HashMap<Address, TokenInfo>>,
    bound_assets: RwLock<HashSet<u32>>,
}

impl InMemoryTokenRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token contract.
    pub fn register(&self, info: TokenInfo) {
        self.tokens.write().insert(info.contract, info);
    }

    /// Mark a platform asset as bound to a bridge-minted token.
    pub fn bind_asset(&self, asset_id: u32) {
        self.bound_assets.write().insert(asset_id);
    }
}

impl TokenRegistry for InMemoryTokenRegistry {
    fn lookup(&self, contract: &Address) -> Option<TokenInfo> {
        self.tokens.read().get(contract).cloned()
    }

    fn is_bound_asset(&self, asset_id: u32) -> bool {
        self.bound_assets.read().contains(&asset_id)
    }
}
