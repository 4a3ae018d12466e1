//! End-to-end bridge scenarios through the public API.

use qc_15_heterogeneous_bridge::test_utils::*;
use qc_15_heterogeneous_bridge::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const HECO: ExternalChainId = ExternalChainId(103);
const ETH: ExternalChainId = ExternalChainId(101);

fn u(v: u64) -> U256 {
    U256::from(v)
}

fn header(height: u64) -> BlockHeaderRecord {
    let block = make_block(height, Hash([height as u8; 32]), vec![]);
    BlockHeaderRecord {
        hash: block.hash,
        parent_hash: block.parent_hash,
        height,
        observed_at: 1_700_000_000_000,
    }
}

/// Key-value store counting reads.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryKVStore,
    reads: Arc<AtomicUsize>,
}

impl KeyValueStore for CountingStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BridgeError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), BridgeError> {
        self.inner.put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), BridgeError> {
        self.inner.delete(key)
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), BridgeError> {
        self.inner.atomic_batch_write(operations)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BridgeError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.prefix_scan(prefix)
    }
}

fn token_parser(rpc: Arc<MockChainRpc>) -> Arc<BridgeTxParser> {
    let tokens = Arc::new(InMemoryTokenRegistry::new());
    tokens.register(TokenInfo {
        contract: TOKEN,
        asset_id: 7,
        decimals: 6,
        symbol: "USDX".into(),
    });
    Arc::new(BridgeTxParser::new(test_config(), rpc, tokens).unwrap())
}

// =============================================================================
// LEDGER
// =============================================================================

#[test]
fn record_then_get_latest_is_cache_first() {
    let store = CountingStore::default();
    let reads = store.reads.clone();
    let ledger = LocalBlockLedger::new(store);

    ledger.record_block(header(42)).unwrap();
    let before = reads.load(Ordering::SeqCst);
    assert_eq!(ledger.get_latest().unwrap(), Some(header(42)));
    assert_eq!(reads.load(Ordering::SeqCst), before);
}

#[test]
fn prune_keeps_retention_window() {
    let ledger = LocalBlockLedger::new(InMemoryKVStore::new());
    for h in 1..=10 {
        ledger.record_block(header(h)).unwrap();
    }
    ledger.prune(10 - 3).unwrap();

    for h in 1..7 {
        assert!(ledger.get_by_height(h).unwrap().is_none(), "height {h}");
    }
    for h in 7..=10 {
        assert!(ledger.get_by_height(h).unwrap().is_some(), "height {h}");
    }
}

#[test]
fn rewind_reseeds_or_empties_the_cache() {
    let ledger = LocalBlockLedger::new(InMemoryKVStore::new());
    ledger.record_block(header(5)).unwrap();
    ledger.record_block(header(6)).unwrap();

    ledger.rewind_to_height(6).unwrap();
    assert_eq!(ledger.get_latest().unwrap().map(|h| h.height), Some(5));

    ledger.rewind_to_height(5).unwrap();
    assert_eq!(ledger.get_latest().unwrap(), None);
}

#[test]
fn purge_all_empties_the_ledger() {
    let ledger = LocalBlockLedger::new(InMemoryKVStore::new());
    for h in 20..=23 {
        ledger.record_block(header(h)).unwrap();
    }
    assert_eq!(ledger.purge_all().unwrap(), 4);
    assert_eq!(ledger.get_latest().unwrap(), None);
}

// =============================================================================
// CLASSIFICATION AND VALIDATION
// =============================================================================

#[test]
fn unknown_selector_is_not_a_bridge_call() {
    let parser = token_parser(Arc::new(MockChainRpc::new()));
    for len in [4usize, 36, 68, 260] {
        let mut input = vec![0xde, 0xad, 0xbe, 0xef];
        input.resize(len, 0x01);
        assert!(!parser.classify_calldata(&input).is_bridge_call(), "len {len}");
    }
    assert!(!parser.classify_calldata(&[0xde, 0xad]).is_bridge_call());
}

#[tokio::test]
async fn token_cross_out_amount_matches_calldata_and_event() {
    let rpc = Arc::new(MockChainRpc::new());
    let parser = token_parser(rpc.clone());
    let tx = make_tx(
        Hash([0x31; 32]),
        USER,
        BRIDGE,
        U256::zero(),
        cross_out_calldata("TNVTdTSPaddr", u(1_000), TOKEN),
    );
    rpc.add_transaction(
        tx.clone(),
        Some(make_receipt(
            tx.hash,
            vec![
                transfer_log(TOKEN, USER, BRIDGE, u(1_000)),
                cross_out_log(USER, "TNVTdTSPaddr", u(1_000), TOKEN),
            ],
        )),
    );

    let record = parser.parse_deposit_by_hash(tx.hash).await.unwrap().unwrap();
    assert_eq!(record.kind, TxKind::Deposit);
    assert_eq!(record.value, u(1_000));
    assert_eq!(record.asset.token_contract(), Some(TOKEN));
    assert_eq!(record.counterpart_address.as_deref(), Some("TNVTdTSPaddr"));
}

#[tokio::test]
async fn cross_out_with_mismatched_event_amount_is_absent() {
    let parser = token_parser(Arc::new(MockChainRpc::new()));
    let tx = make_tx(
        Hash([0x32; 32]),
        USER,
        BRIDGE,
        U256::zero(),
        cross_out_calldata("TNVTdTSPaddr", u(1_000), TOKEN),
    );
    let receipt = make_receipt(
        tx.hash,
        vec![
            transfer_log(TOKEN, USER, BRIDGE, u(1_000)),
            cross_out_log(USER, "TNVTdTSPaddr", u(999), TOKEN),
        ],
    );
    assert_eq!(parser.parse_deposit(&tx, Some(&receipt)).await.unwrap(), None);
}

#[tokio::test]
async fn cross_out_with_mismatched_burn_is_absent() {
    let parser = token_parser(Arc::new(MockChainRpc::new()));
    let tx = make_tx(
        Hash([0x33; 32]),
        USER,
        BRIDGE,
        U256::zero(),
        cross_out_calldata("TNVTdTSPaddr", u(1_000), TOKEN),
    );
    let receipt = make_receipt(
        tx.hash,
        vec![
            transfer_log(TOKEN, USER, BRIDGE, u(1_000)),
            transfer_log(TOKEN, BRIDGE, Address::ZERO, u(10)),
            cross_out_log(USER, "TNVTdTSPaddr", u(1_000), TOKEN),
        ],
    );
    assert_eq!(parser.parse_deposit(&tx, Some(&receipt)).await.unwrap(), None);
}

#[tokio::test]
async fn zero_amount_token_withdrawal_is_absent() {
    let parser = token_parser(Arc::new(MockChainRpc::new()));
    let tx = make_tx(
        Hash([0x34; 32]),
        RELAYER,
        BRIDGE,
        U256::zero(),
        withdraw_calldata("p-zero"),
    );
    let receipt = make_receipt(
        tx.hash,
        vec![
            transfer_log(TOKEN, BRIDGE, USER, U256::zero()),
            completed_log(TxKind::Withdrawal, "p-zero"),
        ],
    );
    assert_eq!(parser.parse_withdrawal(&tx, Some(&receipt)).await.unwrap(), None);
}

// =============================================================================
// SCAN PIPELINE
// =============================================================================

#[tokio::test]
async fn scanner_forwards_bridge_transactions_and_advances() {
    init_test_tracing();
    let rpc = Arc::new(MockChainRpc::new());
    let parser = token_parser(rpc.clone());

    let withdraw = make_tx(
        Hash([0x41; 32]),
        RELAYER,
        BRIDGE,
        U256::zero(),
        withdraw_calldata("p-7"),
    );
    rpc.add_receipt(make_receipt(
        withdraw.hash,
        vec![
            transfer_funds_log(USER, u(3_000)),
            completed_log(TxKind::Withdrawal, "p-7"),
        ],
    ));
    let noise = make_tx(Hash([0x42; 32]), USER, RELAYER, u(1), vec![]);
    let b1 = make_block(1, Hash::ZERO, vec![withdraw, noise]);
    let b2 = make_block(2, b1.hash, vec![]);
    rpc.add_block(b1);
    rpc.add_block(b2);

    let (sink, mut found) = mpsc::channel(8);
    let ledger = Arc::new(LocalBlockLedger::new(InMemoryKVStore::new()));
    let analyzer = BlockAnalyzer::for_parser(ledger.clone(), parser, sink);
    let scanner = BlockScanner::new(rpc, ledger.clone(), analyzer, Duration::from_secs(5), 1);

    assert_eq!(scanner.sync_next().await.unwrap(), ScanOutcome::Advanced(1));
    assert_eq!(scanner.sync_next().await.unwrap(), ScanOutcome::Advanced(2));
    assert_eq!(scanner.sync_next().await.unwrap(), ScanOutcome::UpToDate);

    let record = found.try_recv().unwrap();
    assert_eq!(record.kind, TxKind::Withdrawal);
    assert_eq!(record.value, u(3_000));
    assert_eq!(record.to, USER);
    assert_eq!(record.platform_tx_hash.as_deref(), Some("p-7"));
    assert_eq!(record.signers, vec![RELAYER]);
    assert!(found.try_recv().is_err());
    assert_eq!(ledger.cached_transaction(&record.tx_hash).unwrap(), Some(record));
    assert_eq!(ledger.get_latest().unwrap().map(|h| h.height), Some(2));
}

#[tokio::test(start_paused = true)]
async fn timed_out_fetch_leaves_ledger_untouched() {
    let rpc = Arc::new(MockChainRpc::new());
    rpc.add_block(make_block(1, Hash::ZERO, vec![]));
    rpc.set_delay(Duration::from_secs(60));

    let (sink, _found) = mpsc::channel(1);
    let ledger = Arc::new(LocalBlockLedger::new(InMemoryKVStore::new()));
    let analyzer = BlockAnalyzer::for_parser(ledger.clone(), token_parser(rpc.clone()), sink);
    let scanner = BlockScanner::new(
        rpc.clone(),
        ledger.clone(),
        analyzer,
        Duration::from_secs(1),
        1,
    );

    assert!(matches!(
        scanner.sync_next().await,
        Err(BridgeError::Timeout { .. })
    ));
    assert_eq!(ledger.get_latest().unwrap(), None);

    rpc.set_delay(Duration::ZERO);
    assert_eq!(scanner.sync_next().await.unwrap(), ScanOutcome::Advanced(1));
}

// =============================================================================
// REGISTRY
// =============================================================================

fn seeded_registry() -> DockingRegistry {
    let quorum = QuorumParams {
        seed_public_keys: vec!["k1".into(), "k2".into(), "k3".into()],
        total_seats: 10,
        byzantine_ratio: 66,
    };
    let registry = DockingRegistry::new(
        quorum,
        Arc::new(KvQuorumStore::new(InMemoryKVStore::new())),
    );
    registry.register(test_adapter(HECO, 1));
    for (i, key) in ["k1", "k2", "k3"].iter().enumerate() {
        let order = i as u32 + 1;
        registry
            .add_member(quorum_member(&format!("seed{order}"), key, true, order))
            .unwrap();
    }
    registry
        .add_member(quorum_member("elected", "k9", false, 4))
        .unwrap();
    registry
}

#[test]
fn activation_height_gates_visibility() {
    let registry = seeded_registry();
    registry.register(test_adapter(ETH, 1));
    registry.set_activation_height(ETH, 1_000);

    let chains = |h| -> Vec<ExternalChainId> {
        registry.get_all_active(h).iter().map(|a| a.chain_id()).collect()
    };
    assert_eq!(chains(999), vec![HECO]);
    assert_eq!(chains(1_000), vec![ETH, HECO]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn readers_never_see_half_applied_upgrade() {
    let registry = Arc::new(seeded_registry());
    registry.set_quorum_params(QuorumParams {
        seed_public_keys: vec!["k1".into()],
        total_seats: 10,
        byzantine_ratio: 66,
    });

    let reader = {
        let registry = registry.clone();
        tokio::spawn(async move {
            for _ in 0..2_000 {
                let snap = registry.snapshot();
                match snap.version_of(HECO) {
                    Some(1) => {
                        assert_eq!(snap.seed_count, 3);
                        assert_eq!(snap.members.len(), 4);
                    }
                    Some(2) => {
                        assert_eq!(snap.seed_count, 1);
                        assert_eq!(snap.non_seed_count, 9);
                        assert_eq!(snap.members.len(), 2);
                    }
                    other => panic!("unexpected version {other:?}"),
                }
                tokio::task::yield_now().await;
            }
        })
    };

    tokio::task::yield_now().await;
    let outcome = registry
        .on_adapter_upgraded(HECO, test_adapter(HECO, 2), 2)
        .unwrap();
    reader.await.unwrap();

    assert_eq!(outcome.removed.len(), 2);
    let active = registry.get_all_active(0);
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].version(), 2);
}

#[tokio::test]
async fn upgraded_adapter_serves_parsing_and_signing() {
    let registry = seeded_registry();
    registry.on_adapter_upgraded(HECO, test_adapter(HECO, 2), 2).unwrap();
    registry.observe_network_height(10);

    assert!(registry
        .ensure_signing_identity_registered(HECO, Some(&test_identity()))
        .await
        .unwrap());

    let adapter = registry.get(HECO).unwrap();
    assert_eq!(adapter.current_sign_address(), Some(RELAYER));
    let intent = adapter
        .bridge()
        .classify_calldata(&upgrade_calldata("p-up", Address([0xEE; 20])));
    assert_eq!(intent.kind(), Some(TxKind::UpgradeAuthorization));
    assert!(matches!(
        registry.get(ETH),
        Err(BridgeError::UnknownChain(_))
    ));
}
