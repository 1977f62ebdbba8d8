//! Aggregation sink - single-writer ordered persistence pipeline
//!
//! Persists upstream-computed aggregation results (per-address, per-token,
//! per-contract statistics) through one bounded, ordered event channel and
//! one consumer, so database writes are serialized and never interleaved.
//!
//! # Architecture
//!
//! ```text
//! upstream producers → RingPublisher::publish()
//!     ↓ (bounded slot ring, global FIFO, backpressure when full)
//! AggregationSinker (single consumer)
//!     ├─ Snapshot       → AggregateStore::save_aggregate_snapshot
//!     │                   → StagingDispatcher (touched keys, fire-and-forget)
//!     ├─ TotalSnapshot  → AggregateStore::save_total_aggregation_snapshot
//!     ├─ ResyncBegin    → ReSync::ready_to_begin
//!     └─ ResyncEnd      → contract status update → ReSync::ready_to_end
//! ```
//!
//! Resyncs for a contract are bracketed by Begin/End markers flowing
//! through the same ring as snapshots, so the resync body runs strictly
//! between the pipeline's acknowledgment of the two markers.

pub mod events;
pub mod resync;
pub mod ring;
pub mod sinker;
pub mod staging;
pub mod store;
pub mod types;

pub use events::AggregationEvent;
pub use resync::{Contract, ReSync, ResyncState, ResyncTimeout, RESYNC_COMPLETE};
pub use ring::{bounded, ClaimedEvent, RingConsumer, RingError, RingPublisher};
pub use sinker::AggregationSinker;
pub use staging::{ChannelStagingDispatcher, StagingDispatcher};
pub use store::{AggregateStore, SqliteAggregateStore, StoreError};
pub use types::{
    date_id_of, to_date_string, AggregateKey, AggregateMetrics, AggregateSnapshot,
    StagingAggregateKeys, TotalAggregationSnapshot, SECONDS_PER_DAY,
};
