//! # Local Block Ledger
//!
//! Bounded, height-indexed record of recently scanned external-chain headers.
//!
//! ## Storage Layout
//!
//! Headers are bincode records under `hdr:` + big-endian height, so a prefix
//! scan returns them in height order and the last row is the newest.
//! Validated bridge transactions found while scanning live under `btx:` +
//! transaction hash. They share the header retention window: pruning below a
//! height drops both the headers and the transactions found in those blocks.
//!
//! ## Locking
//!
//! A single `latest` slot caches the newest header. Writers take the store
//! mutex first and the slot second; the fast read path takes only the slot.

use crate::domain::{BlockHeaderRecord, BridgeError, BridgeTransaction, Hash};
use crate::ports::outbound::{BatchOperation, KeyValueStore};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

const HEADER_PREFIX: &[u8] = b"hdr:";
const TX_PREFIX: &[u8] = b"btx:";

fn header_key(height: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(HEADER_PREFIX.len() + 8);
    key.extend_from_slice(HEADER_PREFIX);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

fn tx_key(hash: &Hash) -> Vec<u8> {
    [TX_PREFIX, &hash.as_bytes()[..]].concat()
}

fn height_of_key(key: &[u8]) -> Option<u64> {
    let raw = key.strip_prefix(HEADER_PREFIX)?;
    Some(u64::from_be_bytes(raw.try_into().ok()?))
}

/// Local ledger of external-chain block headers.
pub struct LocalBlockLedger<S: KeyValueStore> {
    store: Mutex<S>,
    latest: RwLock<Option<BlockHeaderRecord>>,
}

impl<S: KeyValueStore> LocalBlockLedger<S> {
    /// Ledger over a store. The cache starts empty and is filled on first read.
    pub fn new(store: S) -> Self {
        Self {
            store: Mutex::new(store),
            latest: RwLock::new(None),
        }
    }

    /// Persist `header` and make it the latest.
    ///
    /// Last writer wins: callers feed heights in increasing order. If the
    /// store write fails the cache is left untouched and the height must be
    /// retried.
    pub fn record_block(&self, header: BlockHeaderRecord) -> Result<(), BridgeError> {
        let value = bincode::serialize(&header)?;
        let mut store = self.store.lock();
        store.put(&header_key(header.height), &value)?;
        *self.latest.write() = Some(header);
        Ok(())
    }

    /// Delete every persisted header, and every cached bridge transaction,
    /// strictly below `below_height` in one batch. Returns the number of
    /// headers pruned.
    pub fn prune(&self, below_height: u64) -> Result<usize, BridgeError> {
        let mut store = self.store.lock();
        let mut stale: Vec<BatchOperation> = store
            .prefix_scan(HEADER_PREFIX)?
            .into_iter()
            .filter(|(key, _)| height_of_key(key).is_some_and(|h| h < below_height))
            .map(|(key, _)| BatchOperation::delete(key))
            .collect();
        let pruned = stale.len();

        for (key, value) in store.prefix_scan(TX_PREFIX)? {
            let record: BridgeTransaction = bincode::deserialize(&value)?;
            if record.block_height < below_height {
                stale.push(BatchOperation::delete(key));
            }
        }

        if !stale.is_empty() {
            let evicted = stale.len() - pruned;
            store.atomic_batch_write(stale)?;
            debug!(
                "[qc-15] Pruned {} headers and {} transactions below {}",
                pruned, evicted, below_height
            );
        }
        Ok(pruned)
    }

    /// Cached latest header, falling back to the newest persisted one.
    pub fn get_latest(&self) -> Result<Option<BlockHeaderRecord>, BridgeError> {
        if let Some(header) = self.latest.read().clone() {
            return Ok(Some(header));
        }

        let store = self.store.lock();
        let newest = match store.prefix_scan(HEADER_PREFIX)?.pop() {
            Some((_, value)) => bincode::deserialize::<BlockHeaderRecord>(&value)?,
            None => return Ok(None),
        };

        let mut slot = self.latest.write();
        if slot.is_none() {
            *slot = Some(newest);
        }
        Ok(slot.clone())
    }

    /// Persisted header at `height`.
    pub fn get_by_height(&self, height: u64) -> Result<Option<BlockHeaderRecord>, BridgeError> {
        let raw = self.store.lock().get(&header_key(height))?;
        raw.map(|v| bincode::deserialize(&v).map_err(BridgeError::from))
            .transpose()
    }

    /// Delete the persisted header at `height`. The cache is not touched.
    pub fn delete_by_height(&self, height: u64) -> Result<(), BridgeError> {
        self.store.lock().delete(&header_key(height))
    }

    /// Drop the header at `height` and make `height - 1` the latest.
    ///
    /// A missing previous header leaves the cache empty; the next
    /// [`get_latest`](Self::get_latest) falls through to the store.
    pub fn rewind_to_height(&self, height: u64) -> Result<Option<BlockHeaderRecord>, BridgeError> {
        let mut store = self.store.lock();
        store.delete(&header_key(height))?;

        let previous = match height.checked_sub(1) {
            Some(prev) => store
                .get(&header_key(prev))?
                .map(|v| bincode::deserialize::<BlockHeaderRecord>(&v))
                .transpose()?,
            None => None,
        };

        *self.latest.write() = previous.clone();
        info!(
            "[qc-15] Ledger rewound from {} to {:?}",
            height,
            previous.as_ref().map(|h| h.height)
        );
        Ok(previous)
    }

    /// Store a validated bridge transaction by its hash. Re-storing the same
    /// record is harmless.
    pub fn cache_transaction(&self, record: &BridgeTransaction) -> Result<(), BridgeError> {
        let value = bincode::serialize(record)?;
        self.store.lock().put(&tx_key(&record.tx_hash), &value)
    }

    /// Cached bridge transaction by hash.
    pub fn cached_transaction(&self, hash: &Hash) -> Result<Option<BridgeTransaction>, BridgeError> {
        let raw = self.store.lock().get(&tx_key(hash))?;
        raw.map(|v| bincode::deserialize(&v).map_err(BridgeError::from))
            .transpose()
    }

    /// Drop a cached bridge transaction once the platform has handled it.
    pub fn evict_transaction(&self, hash: &Hash) -> Result<(), BridgeError> {
        self.store.lock().delete(&tx_key(hash))
    }

    /// Rewind until nothing is left. Returns the number of rewinds.
    pub fn purge_all(&self) -> Result<usize, BridgeError> {
        let mut rewinds = 0;
        while let Some(latest) = self.get_latest()? {
            self.rewind_to_height(latest.height)?;
            rewinds += 1;
        }
        info!("[qc-15] Ledger purged after {} rewinds", rewinds);
        Ok(rewinds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryKVStore;
    use crate::domain::Hash;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Store that counts reads and can be told to fail writes.
    struct CountingStore {
        inner: InMemoryKVStore,
        reads: Arc<AtomicUsize>,
        fail_writes: bool,
    }

    impl CountingStore {
        fn new(reads: Arc<AtomicUsize>) -> Self {
            Self {
                inner: InMemoryKVStore::new(),
                reads,
                fail_writes: false,
            }
        }
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BridgeError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key)
        }
        fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), BridgeError> {
            if self.fail_writes {
                return Err(BridgeError::Storage("disk full".into()));
            }
            self.inner.put(key, value)
        }
        fn delete(&mut self, key: &[u8]) -> Result<(), BridgeError> {
            self.inner.delete(key)
        }
        fn atomic_batch_write(&mut self, ops: Vec<BatchOperation>) -> Result<(), BridgeError> {
            self.inner.atomic_batch_write(ops)
        }
        fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BridgeError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.prefix_scan(prefix)
        }
    }

    fn header(height: u64) -> BlockHeaderRecord {
        BlockHeaderRecord {
            hash: Hash([height as u8; 32]),
            parent_hash: Hash([height.saturating_sub(1) as u8; 32]),
            height,
            observed_at: 1_700_000_000_000 + height,
        }
    }

    fn ledger_with(heights: impl IntoIterator<Item = u64>) -> LocalBlockLedger<InMemoryKVStore> {
        let ledger = LocalBlockLedger::new(InMemoryKVStore::new());
        for h in heights {
            ledger.record_block(header(h)).unwrap();
        }
        ledger
    }

    #[test]
    fn test_record_then_latest_skips_store() {
        let reads = Arc::new(AtomicUsize::new(0));
        let ledger = LocalBlockLedger::new(CountingStore::new(reads.clone()));

        ledger.record_block(header(10)).unwrap();
        assert_eq!(ledger.get_latest().unwrap(), Some(header(10)));
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_write_leaves_cache_untouched() {
        let reads = Arc::new(AtomicUsize::new(0));
        let mut store = CountingStore::new(reads);
        store.fail_writes = true;
        let ledger = LocalBlockLedger::new(store);

        assert!(ledger.record_block(header(1)).unwrap_err().is_retryable());
        assert_eq!(ledger.get_latest().unwrap(), None);
    }

    #[test]
    fn test_lower_height_is_last_writer_wins() {
        let ledger = ledger_with([5, 3]);
        assert_eq!(ledger.get_latest().unwrap().unwrap().height, 3);
    }

    #[test]
    fn test_prune_keeps_window() {
        let ledger = ledger_with(1..=10);
        assert_eq!(ledger.prune(10 - 3).unwrap(), 6);

        for h in 1..7 {
            assert!(ledger.get_by_height(h).unwrap().is_none());
        }
        for h in 7..=10 {
            assert_eq!(ledger.get_by_height(h).unwrap(), Some(header(h)));
        }
    }

    #[test]
    fn test_get_latest_reads_through_after_restart() {
        let mut store = InMemoryKVStore::new();
        for h in [254u64, 255, 256] {
            store
                .put(&header_key(h), &bincode::serialize(&header(h)).unwrap())
                .unwrap();
        }
        let ledger = LocalBlockLedger::new(store);
        assert_eq!(ledger.get_latest().unwrap().unwrap().height, 256);
    }

    #[test]
    fn test_rewind_reseeds_previous() {
        let ledger = ledger_with([7, 8, 9]);
        let previous = ledger.rewind_to_height(9).unwrap();
        assert_eq!(previous, Some(header(8)));
        assert_eq!(ledger.get_latest().unwrap(), Some(header(8)));
        assert!(ledger.get_by_height(9).unwrap().is_none());
    }

    #[test]
    fn test_rewind_without_previous_falls_through() {
        let ledger = ledger_with([9]);
        assert_eq!(ledger.rewind_to_height(9).unwrap(), None);
        assert_eq!(ledger.get_latest().unwrap(), None);
    }

    #[test]
    fn test_rewind_with_gap_then_latest_finds_older() {
        let ledger = ledger_with([4, 9]);
        ledger.rewind_to_height(9).unwrap();
        assert_eq!(ledger.get_latest().unwrap(), Some(header(4)));
    }

    #[test]
    fn test_delete_by_height_keeps_cache() {
        let ledger = ledger_with([1, 2]);
        ledger.delete_by_height(2).unwrap();
        assert!(ledger.get_by_height(2).unwrap().is_none());
        assert_eq!(ledger.get_latest().unwrap().unwrap().height, 2);
    }

    #[test]
    fn test_purge_all_empties_ledger() {
        let ledger = ledger_with([0, 1, 2, 5, 6]);
        assert_eq!(ledger.purge_all().unwrap(), 5);
        assert_eq!(ledger.get_latest().unwrap(), None);
        assert!(ledger.get_by_height(0).unwrap().is_none());
    }

    fn bridge_tx(hash: u8, block_height: u64) -> BridgeTransaction {
        use crate::domain::{Address, BridgeAsset, TxKind, U256};

        BridgeTransaction {
            tx_hash: Hash([hash; 32]),
            block_height,
            kind: TxKind::Deposit,
            from: Address([1; 20]),
            to: Address([2; 20]),
            value: U256::from(9),
            asset: BridgeAsset::Native {
                asset_id: 1,
                decimals: 18,
            },
            counterpart_address: Some("TNVTdTSP".into()),
            signers: vec![],
            platform_tx_hash: None,
            added_members: vec![],
            removed_members: vec![],
        }
    }

    #[test]
    fn test_transaction_cache_follows_header_retention() {
        let ledger = ledger_with(1..=6);
        let old = bridge_tx(0x5A, 2);
        let recent = bridge_tx(0x5B, 5);
        ledger.cache_transaction(&old).unwrap();
        ledger.cache_transaction(&recent).unwrap();

        assert_eq!(ledger.prune(3).unwrap(), 2);

        assert_eq!(ledger.cached_transaction(&old.tx_hash).unwrap(), None);
        assert_eq!(ledger.cached_transaction(&recent.tx_hash).unwrap(), Some(recent.clone()));
        assert_eq!(ledger.get_latest().unwrap().unwrap().height, 6);
        ledger.evict_transaction(&recent.tx_hash).unwrap();
        assert_eq!(ledger.cached_transaction(&recent.tx_hash).unwrap(), None);
    }

    #[test]
    fn test_prune_with_only_stale_transactions() {
        let ledger = ledger_with(5..=6);
        let old = bridge_tx(0x5C, 1);
        ledger.cache_transaction(&old).unwrap();

        assert_eq!(ledger.prune(4).unwrap(), 0);
        assert_eq!(ledger.cached_transaction(&old.tx_hash).unwrap(), None);
        assert!(ledger.get_by_height(5).unwrap().is_some());
    }

    #[test]
    fn test_key_height_roundtrip() {
        assert_eq!(height_of_key(&header_key(u64::MAX)), Some(u64::MAX));
        assert_eq!(height_of_key(b"qm:abc"), None);
    }
}
