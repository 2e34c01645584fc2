//! Contract tests for the SQLite interval and token stores.

use chrono::{TimeZone, Utc};
use snapshot_core::{
    open_end_timestamp, BalanceSnapshot, IntervalStore, SnapshotKey, SnapshotUpdate, Token,
    TokenStore, TokenType, WriteOp, OPEN_END_BLOCK,
};
use snapshot_store_sqlite::SqliteStore;

const OWNER: &str = "0xea639dfb59d652ab056a2194ff3d9d7ad9744d07";
const CONTRACT: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";

fn key(token_id: Option<&str>) -> SnapshotKey {
    SnapshotKey {
        chain_id: "1".into(),
        token_address: CONTRACT.into(),
        owner: OWNER.into(),
        token_id: token_id.map(str::to_string),
    }
}

fn snapshot(id: &str, token_id: Option<&str>, start: i64, end: i64, amount: &str) -> BalanceSnapshot {
    let now = Utc.timestamp_opt(1_685_784_803, 0).unwrap();
    BalanceSnapshot {
        id: id.into(),
        owner: OWNER.into(),
        blockchain: "ethereum".into(),
        chain_id: "1".into(),
        token_address: CONTRACT.into(),
        token_id: token_id.map(str::to_string),
        token_type: if token_id.is_some() {
            TokenType::Erc721
        } else {
            TokenType::Erc20
        },
        start_block_number: start,
        end_block_number: end,
        start_block_timestamp: now,
        end_block_timestamp: if end == OPEN_END_BLOCK {
            open_end_timestamp()
        } else {
            now
        },
        amount: amount.into(),
        formatted_amount: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_find_covering() {
    let store = SqliteStore::in_memory().unwrap();
    store.insert(&snapshot("a", None, 100, 150, "500")).await.unwrap();
    store
        .insert(&snapshot("b", None, 150, OPEN_END_BLOCK, "700"))
        .await
        .unwrap();

    let covering = store.find_covering(&key(None), 120).await.unwrap().unwrap();
    assert_eq!(covering.id, "a");
    // The end block is exclusive.
    let covering = store.find_covering(&key(None), 150).await.unwrap().unwrap();
    assert_eq!(covering.id, "b");
    // Blocks before the first interval are uncovered.
    assert!(store.find_covering(&key(None), 99).await.unwrap().is_none());
    // The open tail covers any later block.
    let covering = store
        .find_covering(&key(None), 9_000_000)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(covering.id, "b");
}

#[tokio::test]
async fn test_find_nearest_higher() {
    let store = SqliteStore::in_memory().unwrap();
    store.insert(&snapshot("a", None, 100, 150, "500")).await.unwrap();
    store
        .insert(&snapshot("b", None, 150, OPEN_END_BLOCK, "700"))
        .await
        .unwrap();

    let next = store
        .find_nearest_higher(&key(None), 50)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.id, "a");
    let next = store
        .find_nearest_higher(&key(None), 100)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.id, "b");
    assert!(store
        .find_nearest_higher(&key(None), 150)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_token_id_discriminates_keys() {
    let store = SqliteStore::in_memory().unwrap();
    store
        .insert(&snapshot("nft", Some("42"), 10, OPEN_END_BLOCK, "1"))
        .await
        .unwrap();

    assert!(store.find_covering(&key(None), 20).await.unwrap().is_none());
    assert!(store
        .find_covering(&key(Some("7")), 20)
        .await
        .unwrap()
        .is_none());
    let covering = store
        .find_covering(&key(Some("42")), 20)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(covering.id, "nft");
}

#[tokio::test]
async fn test_bulk_write_is_atomic() {
    let store = SqliteStore::in_memory().unwrap();
    store
        .insert(&snapshot("a", None, 100, OPEN_END_BLOCK, "500"))
        .await
        .unwrap();

    // Second op collides on the primary key; the first op must not survive.
    let ops = [
        WriteOp::UpdateEnd {
            id: "a".into(),
            update: SnapshotUpdate {
                end_block_number: 150,
                end_block_timestamp: Utc.timestamp_opt(1_686_000_000, 0).unwrap(),
            },
        },
        WriteOp::Insert(snapshot("a", None, 150, OPEN_END_BLOCK, "700")),
    ];
    assert!(store.bulk_write(&ops).await.is_err());

    let unchanged = store.find_covering(&key(None), 200).await.unwrap().unwrap();
    assert_eq!(unchanged.end_block_number, OPEN_END_BLOCK);
    assert_eq!(store.all_snapshots().unwrap().len(), 1);
}

#[tokio::test]
async fn test_bulk_write_applies_in_order() {
    let store = SqliteStore::in_memory().unwrap();
    store
        .insert(&snapshot("a", None, 100, OPEN_END_BLOCK, "500"))
        .await
        .unwrap();

    let ops = [
        WriteOp::UpdateEnd {
            id: "a".into(),
            update: SnapshotUpdate {
                end_block_number: 150,
                end_block_timestamp: Utc.timestamp_opt(1_686_000_000, 0).unwrap(),
            },
        },
        WriteOp::Insert(snapshot("b", None, 150, OPEN_END_BLOCK, "700")),
    ];
    store.bulk_write(&ops).await.unwrap();

    let all = store.all_snapshots().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].end_block_number, 150);
    assert_eq!(all[1].start_block_number, 150);
}

#[tokio::test]
async fn test_update_by_id_stamps_updated_at() {
    let store = SqliteStore::in_memory().unwrap();
    let original = snapshot("a", None, 100, OPEN_END_BLOCK, "500");
    store.insert(&original).await.unwrap();

    let modified = store
        .update_by_id(
            "a",
            &SnapshotUpdate {
                end_block_number: 120,
                end_block_timestamp: Utc.timestamp_opt(1_686_000_000, 0).unwrap(),
            },
        )
        .await
        .unwrap();
    assert_eq!(modified, 1);

    let updated = store.find_covering(&key(None), 110).await.unwrap().unwrap();
    assert_eq!(updated.end_block_number, 120);
    assert!(updated.updated_at > original.updated_at);

    // Unknown id modifies nothing.
    let modified = store
        .update_by_id(
            "missing",
            &SnapshotUpdate {
                end_block_number: 1,
                end_block_timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            },
        )
        .await
        .unwrap();
    assert_eq!(modified, 0);
}

#[tokio::test]
async fn test_token_store_round_trip() {
    let store = SqliteStore::in_memory().unwrap();
    let token = Token {
        id: Token::id_for("1", CONTRACT),
        blockchain: "ethereum".into(),
        chain_id: "1".into(),
        address: CONTRACT.into(),
        token_type: TokenType::Erc20,
        decimals: Some(18),
        name: Some("Wrapped Ether".into()),
        symbol: Some("WETH".into()),
        ..Default::default()
    };
    store.create_token(&token).await.unwrap();

    let loaded = store.get_token(&token.id).await.unwrap().unwrap();
    assert_eq!(loaded.symbol.as_deref(), Some("WETH"));
    assert_eq!(loaded.decimals, Some(18));
    assert_eq!(loaded.token_type, TokenType::Erc20);

    assert!(store.get_token("absent").await.unwrap().is_none());
    assert!(store.get_token("").await.is_err());
}
