//! Aggregate persistence over SQLite
//!
//! The store contract is atomic per call: a daily snapshot or a totals
//! flush either lands completely or not at all (single transaction), and
//! the contract resync update touches exactly one column of one row.

use super::resync::Contract;
use super::types::{to_date_string, AggregateMetrics, AggregateSnapshot, TotalAggregationSnapshot};
use async_trait::async_trait;
use rusqlite::{params, Connection, Transaction};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Database(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "IO error: {}", e),
            StoreError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persistence contract the sinker writes through
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Save all three daily aggregation maps in one transaction
    async fn save_aggregate_snapshot(&self, snapshot: &AggregateSnapshot) -> Result<(), StoreError>;

    /// Overwrite the running totals for all three aggregation kinds
    async fn save_total_aggregation_snapshot(
        &self,
        snapshot: &TotalAggregationSnapshot,
    ) -> Result<(), StoreError>;

    /// Partial update: set only the resync status column for one contract
    async fn update_contract_resync_status(&self, contract: &Contract) -> Result<(), StoreError>;
}

/// SQLite-backed aggregate store
pub struct SqliteAggregateStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAggregateStore {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS daily_aggregates (
                date TEXT NOT NULL,
                kind TEXT NOT NULL,
                aggregate_key TEXT NOT NULL,
                tx_count INTEGER NOT NULL,
                volume REAL NOT NULL,
                fee_sum REAL NOT NULL,
                PRIMARY KEY (date, kind, aggregate_key)
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS total_aggregates (
                kind TEXT NOT NULL,
                aggregate_key TEXT NOT NULL,
                tx_count INTEGER NOT NULL,
                volume REAL NOT NULL,
                fee_sum REAL NOT NULL,
                PRIMARY KEY (kind, aggregate_key)
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS contracts (
                contract_hash TEXT PRIMARY KEY,
                resync_status INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_daily_aggregates_date ON daily_aggregates(date)",
            [],
        )?;

        log::info!("✅ SQLite aggregate store initialized with WAL mode");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Seed a contract row; existing rows are left untouched
    pub fn register_contract(&self, contract: &Contract) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO contracts (contract_hash, resync_status) VALUES (?1, ?2)",
            params![contract.contract_hash, contract.resync_status],
        )?;
        Ok(())
    }

    fn upsert_daily(
        tx: &Transaction<'_>,
        date: &str,
        kind: &str,
        aggregations: &HashMap<String, AggregateMetrics>,
    ) -> Result<(), rusqlite::Error> {
        for (key, metrics) in aggregations {
            tx.execute(
                "INSERT INTO daily_aggregates
                     (date, kind, aggregate_key, tx_count, volume, fee_sum)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(date, kind, aggregate_key) DO UPDATE SET
                     tx_count = excluded.tx_count,
                     volume = excluded.volume,
                     fee_sum = excluded.fee_sum",
                params![date, kind, key, metrics.tx_count, metrics.volume, metrics.fee_sum],
            )?;
        }
        Ok(())
    }

    fn upsert_totals(
        tx: &Transaction<'_>,
        kind: &str,
        aggregations: &HashMap<String, AggregateMetrics>,
    ) -> Result<(), rusqlite::Error> {
        for (key, metrics) in aggregations {
            tx.execute(
                "INSERT INTO total_aggregates
                     (kind, aggregate_key, tx_count, volume, fee_sum)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(kind, aggregate_key) DO UPDATE SET
                     tx_count = excluded.tx_count,
                     volume = excluded.volume,
                     fee_sum = excluded.fee_sum",
                params![kind, key, metrics.tx_count, metrics.volume, metrics.fee_sum],
            )?;
        }
        Ok(())
    }
}

#[async_trait]
impl AggregateStore for SqliteAggregateStore {
    async fn save_aggregate_snapshot(&self, snapshot: &AggregateSnapshot) -> Result<(), StoreError> {
        let date = to_date_string(snapshot.date_id());
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        Self::upsert_daily(&tx, &date, "address", snapshot.address_aggregations())?;
        Self::upsert_daily(&tx, &date, "token", snapshot.token_aggregations())?;
        Self::upsert_daily(&tx, &date, "contract", snapshot.contract_aggregations())?;

        tx.commit()?;
        Ok(())
    }

    async fn save_total_aggregation_snapshot(
        &self,
        snapshot: &TotalAggregationSnapshot,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        Self::upsert_totals(&tx, "address", snapshot.address_aggregations())?;
        Self::upsert_totals(&tx, "token", snapshot.token_aggregations())?;
        Self::upsert_totals(&tx, "contract", snapshot.contract_aggregations())?;

        tx.commit()?;
        Ok(())
    }

    async fn update_contract_resync_status(&self, contract: &Contract) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE contracts SET resync_status = ?1 WHERE contract_hash = ?2",
            params![contract.resync_status, contract.contract_hash],
        )?;
        if updated == 0 {
            return Err(StoreError::Database(format!(
                "contract not found: {}",
                contract.contract_hash
            )));
        }
        Ok(())
    }
}
