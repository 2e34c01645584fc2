//! SQLite-backed stores for balance snapshots and token records.
//!
//! Uses WAL mode with relaxed fsync; readers don't block writers and the
//! ordered bulk write runs as a single transaction, which is what gives the
//! engine its all-or-nothing split.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use snapshot_core::{
    BalanceSnapshot, IntervalStore, SnapshotKey, SnapshotUpdate, StoreError, Token, TokenStore,
    TokenType, WriteOp,
};

/// Shared SQLite database holding both collections.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create or open the database at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        let store = Self::initialize(conn)?;
        tracing::info!(
            target: "snapshot_store::sqlite",
            db_path = %path,
            "database initialized"
        );
        Ok(store)
    }

    /// Fresh in-memory database, used by tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self, StoreError> {
        // WAL + NORMAL sync: readers don't block writers, fsync relaxed to
        // WAL checkpoints. busy_timeout covers concurrent handler tasks.
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA cache_size=-64000;
             PRAGMA temp_store=MEMORY;
             PRAGMA busy_timeout=5000;",
        )
        .map_err(db_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS balance_snapshots (
                id TEXT PRIMARY KEY,
                chain_id TEXT NOT NULL,
                blockchain TEXT NOT NULL,
                token_address TEXT NOT NULL,
                owner TEXT NOT NULL,
                token_type TEXT NOT NULL,
                token_id TEXT,
                start_block INTEGER NOT NULL,
                end_block INTEGER NOT NULL,
                start_timestamp INTEGER NOT NULL,
                end_timestamp INTEGER NOT NULL,
                amount TEXT NOT NULL,
                formatted_amount REAL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(db_err)?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_key_start
             ON balance_snapshots(chain_id, token_address, owner, token_id, start_block)",
            [],
        )
        .map_err(db_err)?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_key_end
             ON balance_snapshots(chain_id, token_address, owner, token_id, end_block)",
            [],
        )
        .map_err(db_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tokens (
                id TEXT PRIMARY KEY,
                body TEXT NOT NULL
            )",
            [],
        )
        .map_err(db_err)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".into()))
    }

    /// Dump every snapshot, ordered by key and start block. Test support.
    pub fn all_snapshots(&self) -> Result<Vec<BalanceSnapshot>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, chain_id, blockchain, token_address, owner, token_type, token_id,
                        start_block, end_block, start_timestamp, end_timestamp, amount,
                        formatted_amount, created_at, updated_at
                 FROM balance_snapshots
                 ORDER BY chain_id, token_address, owner, token_id, start_block",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], row_to_snapshot)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn timestamp_from_secs(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default()
}

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<BalanceSnapshot> {
    let token_type: String = row.get(5)?;
    Ok(BalanceSnapshot {
        id: row.get(0)?,
        chain_id: row.get(1)?,
        blockchain: row.get(2)?,
        token_address: row.get(3)?,
        owner: row.get(4)?,
        token_type: TokenType::parse(&token_type),
        token_id: row.get(6)?,
        start_block_number: row.get(7)?,
        end_block_number: row.get(8)?,
        start_block_timestamp: timestamp_from_secs(row.get(9)?),
        end_block_timestamp: timestamp_from_secs(row.get(10)?),
        amount: row.get(11)?,
        formatted_amount: row.get(12)?,
        created_at: timestamp_from_secs(row.get(13)?),
        updated_at: timestamp_from_secs(row.get(14)?),
    })
}

const SNAPSHOT_COLUMNS: &str = "id, chain_id, blockchain, token_address, owner, token_type, \
     token_id, start_block, end_block, start_timestamp, end_timestamp, amount, \
     formatted_amount, created_at, updated_at";

fn insert_snapshot(conn: &Connection, snapshot: &BalanceSnapshot) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO balance_snapshots (id, chain_id, blockchain, token_address, owner,
            token_type, token_id, start_block, end_block, start_timestamp, end_timestamp,
            amount, formatted_amount, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            snapshot.id,
            snapshot.chain_id,
            snapshot.blockchain,
            snapshot.token_address,
            snapshot.owner,
            snapshot.token_type.as_str(),
            snapshot.token_id,
            snapshot.start_block_number,
            snapshot.end_block_number,
            snapshot.start_block_timestamp.timestamp(),
            snapshot.end_block_timestamp.timestamp(),
            snapshot.amount,
            snapshot.formatted_amount,
            snapshot.created_at.timestamp(),
            snapshot.updated_at.timestamp(),
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

fn update_snapshot_end(
    conn: &Connection,
    id: &str,
    update: &SnapshotUpdate,
) -> Result<u64, StoreError> {
    let modified = conn
        .execute(
            "UPDATE balance_snapshots
             SET end_block = ?1, end_timestamp = ?2, updated_at = ?3
             WHERE id = ?4",
            params![
                update.end_block_number,
                update.end_block_timestamp.timestamp(),
                Utc::now().timestamp(),
                id
            ],
        )
        .map_err(db_err)?;
    Ok(modified as u64)
}

/// Build the key predicate and its parameters. ERC-20 chains are keyed by
/// the absence of a token id, so `None` matches `token_id IS NULL` rather
/// than any row.
fn key_predicate(key: &SnapshotKey) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
    let mut sql = String::from("chain_id = ? AND token_address = ? AND owner = ?");
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![
        Box::new(key.chain_id.clone()),
        Box::new(key.token_address.clone()),
        Box::new(key.owner.clone()),
    ];
    match &key.token_id {
        Some(token_id) => {
            sql.push_str(" AND token_id = ?");
            params_vec.push(Box::new(token_id.clone()));
        }
        None => sql.push_str(" AND token_id IS NULL"),
    }
    (sql, params_vec)
}

#[async_trait]
impl IntervalStore for SqliteStore {
    async fn find_covering(
        &self,
        key: &SnapshotKey,
        block: i64,
    ) -> Result<Option<BalanceSnapshot>, StoreError> {
        let (predicate, mut params_vec) = key_predicate(key);
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM balance_snapshots
             WHERE {predicate} AND start_block <= ? AND end_block > ?
             LIMIT 1"
        );
        params_vec.push(Box::new(block));
        params_vec.push(Box::new(block));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        stmt.query_row(params_refs.as_slice(), row_to_snapshot)
            .optional()
            .map_err(db_err)
    }

    async fn find_nearest_higher(
        &self,
        key: &SnapshotKey,
        block: i64,
    ) -> Result<Option<BalanceSnapshot>, StoreError> {
        let (predicate, mut params_vec) = key_predicate(key);
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM balance_snapshots
             WHERE {predicate} AND start_block > ?
             ORDER BY start_block ASC
             LIMIT 1"
        );
        params_vec.push(Box::new(block));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        stmt.query_row(params_refs.as_slice(), row_to_snapshot)
            .optional()
            .map_err(db_err)
    }

    async fn insert(&self, snapshot: &BalanceSnapshot) -> Result<(), StoreError> {
        let conn = self.lock()?;
        insert_snapshot(&conn, snapshot)
    }

    async fn bulk_write(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;
        for op in ops {
            match op {
                WriteOp::UpdateEnd { id, update } => {
                    update_snapshot_end(&tx, id, update)?;
                }
                WriteOp::Insert(snapshot) => {
                    insert_snapshot(&tx, snapshot)?;
                }
            }
        }
        tx.commit().map_err(db_err)
    }

    async fn update_by_id(&self, id: &str, update: &SnapshotUpdate) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        update_snapshot_end(&conn, id, update)
    }
}

#[async_trait]
impl TokenStore for SqliteStore {
    async fn get_token(&self, id: &str) -> Result<Option<Token>, StoreError> {
        if id.is_empty() {
            return Err(StoreError::InvalidArgument("token id can't be empty".into()));
        }
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row("SELECT body FROM tokens WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(db_err)?;
        match body {
            Some(body) => serde_json::from_str(&body)
                .map(Some)
                .map_err(|e| StoreError::Database(format!("corrupt token record {id}: {e}"))),
            None => Ok(None),
        }
    }

    async fn create_token(&self, token: &Token) -> Result<(), StoreError> {
        let body = serde_json::to_string(token)
            .map_err(|e| StoreError::InvalidArgument(e.to_string()))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO tokens (id, body) VALUES (?1, ?2)",
            params![token.id, body],
        )
        .map_err(db_err)?;
        Ok(())
    }
}
