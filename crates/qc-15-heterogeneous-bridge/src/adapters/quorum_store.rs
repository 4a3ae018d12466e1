//! Quorum membership persisted in the key-value store.

use crate::domain::{BridgeError, QuorumMember};
use crate::ports::outbound::{KeyValueStore, QuorumStore};
use parking_lot::Mutex;

const MEMBER_PREFIX: &[u8] = b"qm:";

/// [`QuorumStore`] over any [`KeyValueStore`], one bincode record per member.
pub struct KvQuorumStore<S: KeyValueStore> {
    store: Mutex<S>,
}

impl<S: KeyValueStore> KvQuorumStore<S> {
    /// Wrap a store.
    pub fn new(store: S) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    fn member_key(sign_address: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(MEMBER_PREFIX.len() + sign_address.len());
        key.extend_from_slice(MEMBER_PREFIX);
        key.extend_from_slice(sign_address.as_bytes());
        key
    }
}

impl<S: KeyValueStore> QuorumStore for KvQuorumStore<S> {
    fn save_member(&self, member: &QuorumMember) -> Result<(), BridgeError> {
        let value = bincode::serialize(member)?;
        self.store
            .lock()
            .put(&Self::member_key(&member.sign_address), &value)
    }

    fn remove_member(&self, sign_address: &str) -> Result<(), BridgeError> {
        self.store.lock().delete(&Self::member_key(sign_address))
    }

    fn load_members(&self) -> Result<Vec<QuorumMember>, BridgeError> {
        let rows = self.store.lock().prefix_scan(MEMBER_PREFIX)?;
        let mut members = rows
            .iter()
            .map(|(_, v)| bincode::deserialize::<QuorumMember>(v).map_err(BridgeError::from))
            .collect::<Result<Vec<_>, _>>()?;
        members.sort_by_key(|m| m.order);
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryKVStore;
    use crate::domain::Address;

    fn member(name: &str, order: u32) -> QuorumMember {
        QuorumMember {
            sign_address: name.into(),
            external_sign_address: Address([order as u8; 20]),
            signing_public_key: format!("pk-{}", name),
            is_seed: order == 1,
            order,
        }
    }

    #[test]
    fn test_save_load_remove() {
        let store = KvQuorumStore::new(InMemoryKVStore::new());
        store.save_member(&member("b", 2)).unwrap();
        store.save_member(&member("a", 1)).unwrap();

        let loaded = store.load_members().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].sign_address, "a");

        store.remove_member("a").unwrap();
        assert_eq!(store.load_members().unwrap(), vec![member("b", 2)]);
    }

    #[test]
    fn test_save_replaces_existing() {
        let store = KvQuorumStore::new(InMemoryKVStore::new());
        store.save_member(&member("a", 1)).unwrap();
        store.save_member(&member("a", 4)).unwrap();
        let loaded = store.load_members().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].order, 4);
    }
}
