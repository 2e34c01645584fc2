//! Full-pipeline tests: stream message in, acks and snapshots out, with the
//! chain stubbed at the executor seam.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use async_trait::async_trait;
use snapshot_core::rpc::{CallData, CallMethod, CallResult};
use snapshot_core::{
    Ack, CallExecutor, EngineConfig, InMemoryTokenCache, IntervalStore, KeyedLock,
    LocalKeyedLock, SnapshotError, SnapshotService, StreamMessage, Token, TokenCache, TokenStore,
    TokenType, OPEN_END_BLOCK,
};
use snapshot_store_sqlite::SqliteStore;
use tokio::sync::mpsc;

const FROM: &str = "0xef1c6e67703c7bd7107eed8303fbe6ec2554bf6b";
const TO: &str = "0xea639dfb59d652ab056a2194ff3d9d7ad9744d07";
const CONTRACT: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";

/// Chain stub: an ERC-20 with 2 decimals, balances fixed per owner.
struct StubChain {
    from_balance: u64,
    to_balance: u64,
}

#[async_trait]
impl CallExecutor for StubChain {
    async fn execute(&self, calls: &mut [CallData]) -> Result<(), SnapshotError> {
        for call in calls {
            call.result = match &call.method {
                CallMethod::SupportsInterface { .. } => Some(CallResult::Supports(false)),
                CallMethod::Decimals => Some(CallResult::Decimals(2)),
                CallMethod::Name => Some(CallResult::Text("Stub Token".into())),
                CallMethod::Symbol => Some(CallResult::Text("STUB".into())),
                CallMethod::TotalSupply => Some(CallResult::Amount(U256::from(1_000_000u64))),
                CallMethod::BalanceOf { owner } => {
                    let balance = if owner == FROM {
                        self.from_balance
                    } else {
                        self.to_balance
                    };
                    Some(CallResult::Amount(U256::from(balance)))
                }
                _ => None,
            };
        }
        Ok(())
    }
}

/// Chain stub that answers nothing, leaving every probe inconclusive.
struct DeadChain;

#[async_trait]
impl CallExecutor for DeadChain {
    async fn execute(&self, _calls: &mut [CallData]) -> Result<(), SnapshotError> {
        Ok(())
    }
}

struct Fixture {
    service: SnapshotService,
    store: Arc<SqliteStore>,
}

fn fixture_with(executor: Arc<dyn CallExecutor>, backfill_end: Option<u64>) -> Fixture {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let cache: Arc<dyn TokenCache> = Arc::new(InMemoryTokenCache::new());
    let lock: Arc<dyn KeyedLock> = Arc::new(LocalKeyedLock::new(Duration::from_secs(2)));
    let config = EngineConfig::new("1").unwrap().with_backfill_end(backfill_end);
    let service = SnapshotService::new(
        config,
        cache,
        store.clone() as Arc<dyn TokenStore>,
        store.clone() as Arc<dyn IntervalStore>,
        lock,
        executor,
    );
    Fixture { service, store }
}

fn transfer_event(block: u64) -> String {
    format!(
        r#"{{
            "event": "TOKEN_TRANSFERRED",
            "batch_id": 1,
            "batch_index": {block},
            "value": {{
                "transaction_hash": "0xtx{block}",
                "chain_id": "1",
                "token_address": "{CONTRACT}",
                "from": "{FROM}",
                "to": "{TO}",
                "amount": "100",
                "token_type": "UNKNOWN",
                "block_number": {block},
                "block_timestamp": 1685784803
            }}
        }}"#
    )
}

async fn deliver(service: &SnapshotService, raw: &str) -> Ack {
    let (tx, mut rx) = mpsc::channel(1);
    let message = StreamMessage::parse(raw, 0).unwrap();
    service.handle_message(message, &tx).await;
    rx.recv().await.expect("exactly one ack per message")
}

#[tokio::test]
async fn test_transfer_end_to_end() {
    let fixture = fixture_with(
        Arc::new(StubChain {
            from_balance: 300,
            to_balance: 500,
        }),
        None,
    );

    let ack = deliver(&fixture.service, &transfer_event(100)).await;
    assert_eq!(ack.batch_id, 1);
    assert_eq!(ack.batch_index, 100);
    assert!(ack.error.is_none(), "unexpected error: {:?}", ack.error);

    let all = fixture.store.all_snapshots().unwrap();
    assert_eq!(all.len(), 2);
    for snapshot in &all {
        assert_eq!(snapshot.start_block_number, 100);
        assert_eq!(snapshot.end_block_number, OPEN_END_BLOCK);
        assert_eq!(snapshot.token_type, TokenType::Erc20);
        assert_eq!(snapshot.token_id, None);
    }
    // The probe classified by decimals() and formatted with them.
    let to_snapshot = all.iter().find(|s| s.owner == TO).unwrap();
    assert_eq!(to_snapshot.amount, "500");
    assert_eq!(to_snapshot.formatted_amount, Some(5.0));
}

#[tokio::test]
async fn test_second_transfer_extends_chain() {
    let fixture = fixture_with(
        Arc::new(StubChain {
            from_balance: 300,
            to_balance: 500,
        }),
        None,
    );
    deliver(&fixture.service, &transfer_event(100)).await;
    let ack = deliver(&fixture.service, &transfer_event(150)).await;
    assert!(ack.error.is_none());

    let all = fixture.store.all_snapshots().unwrap();
    // Two owners, two intervals each.
    assert_eq!(all.len(), 4);
    let to_chain: Vec<_> = all.iter().filter(|s| s.owner == TO).collect();
    assert_eq!(to_chain[0].end_block_number, 150);
    assert_eq!(to_chain[1].start_block_number, 150);
}

#[tokio::test]
async fn test_unsupported_event_is_final() {
    let fixture = fixture_with(Arc::new(DeadChain), None);
    let ack = deliver(
        &fixture.service,
        r#"{"event": "TOKEN_MINTED", "batch_id": 3, "batch_index": 9, "value": {}}"#,
    )
    .await;
    let error = ack.error.expect("unsupported event must error");
    assert!(matches!(error, SnapshotError::UnsupportedEvent(_)));
    assert!(!error.is_retryable());
    assert!(fixture.store.all_snapshots().unwrap().is_empty());
}

#[tokio::test]
async fn test_inconclusive_probe_rejects_transfer() {
    let fixture = fixture_with(Arc::new(DeadChain), None);
    let ack = deliver(&fixture.service, &transfer_event(100)).await;
    let error = ack.error.expect("unknown token must error");
    assert!(matches!(error, SnapshotError::UnknownToken(_)));
    assert!(!error.is_retryable());
    assert!(fixture.store.all_snapshots().unwrap().is_empty());
}

#[tokio::test]
async fn test_backfill_bound_skips_and_acks() {
    let fixture = fixture_with(
        Arc::new(StubChain {
            from_balance: 300,
            to_balance: 500,
        }),
        Some(100),
    );

    // At the bound: skipped but still committed.
    let ack = deliver(&fixture.service, &transfer_event(100)).await;
    assert!(ack.error.is_none());
    assert!(fixture.store.all_snapshots().unwrap().is_empty());

    // Above the bound: processed.
    let ack = deliver(&fixture.service, &transfer_event(101)).await;
    assert!(ack.error.is_none());
    assert_eq!(fixture.store.all_snapshots().unwrap().len(), 2);
}

#[tokio::test]
async fn test_stored_token_skips_probe() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    // The token is already known as an ERC-20 with 18 decimals; the dead
    // chain would fail any probe.
    store
        .create_token(&Token {
            id: Token::id_for("1", CONTRACT),
            blockchain: "ethereum".into(),
            chain_id: "1".into(),
            address: CONTRACT.into(),
            token_type: TokenType::Erc20,
            decimals: Some(18),
            ..Default::default()
        })
        .await
        .unwrap();

    struct BalancesOnly;
    #[async_trait]
    impl CallExecutor for BalancesOnly {
        async fn execute(&self, calls: &mut [CallData]) -> Result<(), SnapshotError> {
            for call in calls {
                call.result = match &call.method {
                    CallMethod::BalanceOf { .. } => {
                        Some(CallResult::Amount(U256::from(2_500_000_000_000_000_000u64)))
                    }
                    _ => None,
                };
            }
            Ok(())
        }
    }

    let cache: Arc<dyn TokenCache> = Arc::new(InMemoryTokenCache::new());
    let lock: Arc<dyn KeyedLock> = Arc::new(LocalKeyedLock::new(Duration::from_secs(2)));
    let service = SnapshotService::new(
        EngineConfig::new("1").unwrap(),
        cache,
        store.clone() as Arc<dyn TokenStore>,
        store.clone() as Arc<dyn IntervalStore>,
        lock,
        Arc::new(BalancesOnly),
    );

    let ack = deliver(&service, &transfer_event(100)).await;
    assert!(ack.error.is_none(), "unexpected error: {:?}", ack.error);
    let all = store.all_snapshots().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].amount, "2500000000000000000");
    assert_eq!(all[0].formatted_amount, Some(2.5));
}
