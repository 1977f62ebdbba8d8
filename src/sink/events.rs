//! Event payloads flowing through the aggregation ring
//!
//! A closed sum type over the four kinds the sinker accepts - dispatch is
//! an exhaustive match, so there is no fallthrough for unknown payloads.

use super::resync::ReSync;
use super::types::{AggregateSnapshot, TotalAggregationSnapshot};
use std::sync::Arc;

pub enum AggregationEvent {
    /// Incremental aggregation results for one calendar day
    Snapshot(AggregateSnapshot),
    /// Flushed running totals across all history
    TotalSnapshot(TotalAggregationSnapshot),
    /// Resync bracket open for one contract
    ResyncBegin(Arc<ReSync>),
    /// Resync bracket close for the same contract handle
    ResyncEnd(Arc<ReSync>),
}

impl AggregationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AggregationEvent::Snapshot(_) => "snapshot",
            AggregationEvent::TotalSnapshot(_) => "total_snapshot",
            AggregationEvent::ResyncBegin(_) => "resync_begin",
            AggregationEvent::ResyncEnd(_) => "resync_end",
        }
    }
}
