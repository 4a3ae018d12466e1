//! # RocksDB Storage Adapter
//!
//! Durable [`KeyValueStore`] for the bridge ledger and quorum tables.
//!
//! Tables share the default column family and are separated by key prefix
//! (`hdr:`, `qm:`), so a forward iterator from the prefix yields one table in
//! key order.

use crate::domain::BridgeError;
use crate::ports::outbound::{BatchOperation, KeyValueStore};
use parking_lot::RwLock;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use std::sync::Arc;

/// RocksDB configuration
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory
    pub path: String,
    /// Block cache size in bytes (default: 32MB)
    pub block_cache_size: usize,
    /// Enable fsync after each write (default: true)
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "./data/bridge".to_string(),
            block_cache_size: 32 * 1024 * 1024,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Small cache, no fsync.
    pub fn for_testing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            sync_writes: false,
        }
    }
}

/// RocksDB-backed key-value store
pub struct RocksDbStore {
    db: Arc<RwLock<DB>>,
    config: RocksDbConfig,
}

impl RocksDbStore {
    /// Open or create the database
    pub fn open(config: RocksDbConfig) -> Result<Self, BridgeError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, &config.path)
            .map_err(|e| BridgeError::Storage(format!("Failed to open RocksDB: {}", e)))?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            config,
        })
    }

    fn write_options(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BridgeError> {
        let db = self.db.read();
        db.get(key)
            .map_err(|e| BridgeError::Storage(format!("RocksDB get failed: {}", e)))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), BridgeError> {
        let db = self.db.write();
        db.put_opt(key, value, &self.write_options())
            .map_err(|e| BridgeError::Storage(format!("RocksDB put failed: {}", e)))
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), BridgeError> {
        let db = self.db.write();
        db.delete_opt(key, &self.write_options())
            .map_err(|e| BridgeError::Storage(format!("RocksDB delete failed: {}", e)))
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), BridgeError> {
        let db = self.db.write();
        let mut batch = WriteBatch::default();

        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put(&key, &value),
                BatchOperation::Delete { key } => batch.delete(&key),
            }
        }

        db.write_opt(batch, &self.write_options())
            .map_err(|e| BridgeError::Storage(format!("RocksDB batch write failed: {}", e)))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BridgeError> {
        let db = self.db.read();
        let mut results = Vec::new();

        for item in db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) =
                item.map_err(|e| BridgeError::Storage(format!("RocksDB scan failed: {}", e)))?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (RocksDbStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();
        let store = RocksDbStore::open(RocksDbConfig::for_testing(path)).unwrap();
        (store, dir)
    }

    #[test]
    fn test_put_get_delete() {
        let (mut store, _dir) = open_temp();
        store.put(b"hdr:1", b"a").unwrap();
        assert_eq!(store.get(b"hdr:1").unwrap(), Some(b"a".to_vec()));
        store.delete(b"hdr:1").unwrap();
        assert_eq!(store.get(b"hdr:1").unwrap(), None);
    }

    #[test]
    fn test_prefix_scan_stops_at_table_boundary() {
        let (mut store, _dir) = open_temp();
        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"hdr:1".to_vec(), b"a".to_vec()),
                BatchOperation::put(b"hdr:2".to_vec(), b"b".to_vec()),
                BatchOperation::put(b"qm:1".to_vec(), b"m".to_vec()),
            ])
            .unwrap();

        let rows = store.prefix_scan(b"hdr:").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, b"hdr:1".to_vec());
    }
}
