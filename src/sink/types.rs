//! Core value objects for the aggregation sink
//!
//! Snapshots are immutable once built: upstream computes the metrics,
//! the sink only persists them. The touched-key set of a daily snapshot
//! is derived from the maps at construction so it always matches exactly
//! what will be written.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Identifier under which aggregate metrics are grouped
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateKey {
    Address(String),
    Token(String),
    Contract(String),
}

impl AggregateKey {
    pub fn kind(&self) -> &'static str {
        match self {
            AggregateKey::Address(_) => "address",
            AggregateKey::Token(_) => "token",
            AggregateKey::Contract(_) => "contract",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            AggregateKey::Address(id) => id,
            AggregateKey::Token(id) => id,
            AggregateKey::Contract(id) => id,
        }
    }
}

/// Computed statistics for one aggregate key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub tx_count: i64,
    pub volume: f64,
    pub fee_sum: f64,
}

/// One calendar day of aggregation results, ready to persist
///
/// `date_id` is the Unix timestamp of the UTC day start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    date_id: i64,
    address_aggregations: HashMap<String, AggregateMetrics>,
    token_aggregations: HashMap<String, AggregateMetrics>,
    contract_aggregations: HashMap<String, AggregateMetrics>,
    aggregate_keys: HashSet<AggregateKey>,
}

impl AggregateSnapshot {
    pub fn new(
        date_id: i64,
        address_aggregations: HashMap<String, AggregateMetrics>,
        token_aggregations: HashMap<String, AggregateMetrics>,
        contract_aggregations: HashMap<String, AggregateMetrics>,
    ) -> Self {
        let aggregate_keys = address_aggregations
            .keys()
            .map(|id| AggregateKey::Address(id.clone()))
            .chain(
                token_aggregations
                    .keys()
                    .map(|id| AggregateKey::Token(id.clone())),
            )
            .chain(
                contract_aggregations
                    .keys()
                    .map(|id| AggregateKey::Contract(id.clone())),
            )
            .collect();

        Self {
            date_id,
            address_aggregations,
            token_aggregations,
            contract_aggregations,
            aggregate_keys,
        }
    }

    pub fn date_id(&self) -> i64 {
        self.date_id
    }

    pub fn address_aggregations(&self) -> &HashMap<String, AggregateMetrics> {
        &self.address_aggregations
    }

    pub fn token_aggregations(&self) -> &HashMap<String, AggregateMetrics> {
        &self.token_aggregations
    }

    pub fn contract_aggregations(&self) -> &HashMap<String, AggregateMetrics> {
        &self.contract_aggregations
    }

    /// Set of keys touched by this snapshot, for downstream staging
    pub fn aggregate_keys(&self) -> &HashSet<AggregateKey> {
        &self.aggregate_keys
    }
}

/// Running all-time totals across the full history
///
/// Same shape as the daily snapshot minus the date identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotalAggregationSnapshot {
    address_aggregations: HashMap<String, AggregateMetrics>,
    token_aggregations: HashMap<String, AggregateMetrics>,
    contract_aggregations: HashMap<String, AggregateMetrics>,
}

impl TotalAggregationSnapshot {
    pub fn new(
        address_aggregations: HashMap<String, AggregateMetrics>,
        token_aggregations: HashMap<String, AggregateMetrics>,
        contract_aggregations: HashMap<String, AggregateMetrics>,
    ) -> Self {
        Self {
            address_aggregations,
            token_aggregations,
            contract_aggregations,
        }
    }

    pub fn address_aggregations(&self) -> &HashMap<String, AggregateMetrics> {
        &self.address_aggregations
    }

    pub fn token_aggregations(&self) -> &HashMap<String, AggregateMetrics> {
        &self.token_aggregations
    }

    pub fn contract_aggregations(&self) -> &HashMap<String, AggregateMetrics> {
        &self.contract_aggregations
    }
}

/// Notification payload sent downstream after a daily snapshot persists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingAggregateKeys {
    keys: HashSet<AggregateKey>,
}

impl StagingAggregateKeys {
    pub fn new(keys: HashSet<AggregateKey>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &HashSet<AggregateKey> {
        &self.keys
    }

    pub fn into_keys(self) -> HashSet<AggregateKey> {
        self.keys
    }
}

/// Resolve a date id to its canonical `YYYY-MM-DD` form (UTC)
pub fn to_date_string(date_id: i64) -> String {
    match Utc.timestamp_opt(date_id, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => format!("invalid_date_id_{}", date_id),
    }
}

/// Floor an arbitrary Unix timestamp to its UTC day start
pub fn date_id_of(timestamp: i64) -> i64 {
    timestamp - timestamp.rem_euclid(SECONDS_PER_DAY)
}
