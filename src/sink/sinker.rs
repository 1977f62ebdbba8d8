//! Aggregation sinker - the ring's single consumer
//!
//! Drains events strictly in ring order and dispatches each by kind.
//! Nothing thrown while handling an event escapes the drain loop: a
//! failed persistence is logged with its sequence context and dropped,
//! and the next event is processed normally. At-most-once, best-effort -
//! there is no retry and no dead-letter inside this component.

use super::events::AggregationEvent;
use super::resync::{ReSync, RESYNC_COMPLETE};
use super::ring::RingConsumer;
use super::staging::StagingDispatcher;
use super::store::{AggregateStore, StoreError};
use super::types::{to_date_string, AggregateSnapshot, StagingAggregateKeys, TotalAggregationSnapshot};
use std::sync::Arc;

pub struct AggregationSinker {
    store: Arc<dyn AggregateStore>,
    staging: Arc<dyn StagingDispatcher>,
}

impl AggregationSinker {
    pub fn new(store: Arc<dyn AggregateStore>, staging: Arc<dyn StagingDispatcher>) -> Self {
        Self { store, staging }
    }

    /// Drain the ring until every publisher handle is dropped
    pub async fn run(self, mut consumer: RingConsumer<AggregationEvent>) {
        log::info!("🚀 Aggregation sinker started");

        while let Some(claimed) = consumer.recv().await {
            self.handle(claimed.event(), claimed.sequence(), claimed.end_of_batch())
                .await;
            claimed.release();
        }

        log::info!("✅ Publishers closed, aggregation sinker stopped");
    }

    /// Handle one event; never lets an error escape to the drain loop
    pub async fn handle(&self, event: &AggregationEvent, sequence: u64, _end_of_batch: bool) {
        let outcome = match event {
            AggregationEvent::Snapshot(snapshot) => self.persist_aggregations(snapshot).await,
            AggregationEvent::TotalSnapshot(snapshot) => {
                self.flush_total_aggregations(snapshot).await
            }
            AggregationEvent::ResyncBegin(resync) => {
                resync.ready_to_begin();
                Ok(())
            }
            AggregationEvent::ResyncEnd(resync) => self.complete_resync(resync).await,
        };

        if let Err(e) = outcome {
            log::error!(
                "❌ Error saving/flushing aggregations ({} event, seq {}): {}",
                event.kind(),
                sequence,
                e
            );
        }
    }

    async fn persist_aggregations(&self, snapshot: &AggregateSnapshot) -> Result<(), StoreError> {
        let date = to_date_string(snapshot.date_id());
        log::info!("saving aggregations of date {}", date);

        self.store.save_aggregate_snapshot(snapshot).await?;

        self.staging
            .dispatch(StagingAggregateKeys::new(snapshot.aggregate_keys().clone()));

        log::info!(
            "✅ saved {} address aggregations, {} token aggregations, {} contract aggregations of date {}",
            snapshot.address_aggregations().len(),
            snapshot.token_aggregations().len(),
            snapshot.contract_aggregations().len(),
            date
        );
        Ok(())
    }

    async fn flush_total_aggregations(
        &self,
        snapshot: &TotalAggregationSnapshot,
    ) -> Result<(), StoreError> {
        log::info!("flushing current total aggregations");

        self.store.save_total_aggregation_snapshot(snapshot).await?;

        log::info!(
            "✅ flushed {} total address aggregations, {} total token aggregations, {} total contract aggregations",
            snapshot.address_aggregations().len(),
            snapshot.token_aggregations().len(),
            snapshot.contract_aggregations().len()
        );
        Ok(())
    }

    async fn complete_resync(&self, resync: &ReSync) -> Result<(), StoreError> {
        let mut contract = resync.contract_for_update();
        contract.resync_status = RESYNC_COMPLETE;

        self.store.update_contract_resync_status(&contract).await?;

        // Release the producer only after the status is durably recorded
        resync.ready_to_end();

        log::info!("✅ Resync complete for contract {}", contract.contract_hash);
        Ok(())
    }
}
