//! Integration tests for the aggregation sink pipeline
//!
//! Exercises the real ring + sinker + store assembly end-to-end:
//! - ordered delivery and backpressure under producer load
//! - serialized (never concurrent) event handling
//! - persistence resilience when one event's save fails
//! - the resync Begin/End round-trip against SQLite

#[cfg(test)]
mod sinker_pipeline_tests {
    use aggflow::sink::{
        ring, AggregateKey, AggregateMetrics, AggregateSnapshot, AggregateStore,
        AggregationEvent, AggregationSinker, ChannelStagingDispatcher, Contract, ReSync,
        ResyncState, SqliteAggregateStore, StoreError, TotalAggregationSnapshot,
        RESYNC_COMPLETE, SECONDS_PER_DAY,
    };
    use async_trait::async_trait;
    use rusqlite::Connection;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn metrics(tx_count: i64) -> AggregateMetrics {
        AggregateMetrics {
            tx_count,
            volume: tx_count as f64,
            fee_sum: 0.001,
        }
    }

    fn snapshot_for_day(day: i64) -> AggregateSnapshot {
        let mut addresses = HashMap::new();
        addresses.insert(format!("addr_{}", day), metrics(day + 1));

        let mut tokens = HashMap::new();
        tokens.insert(format!("tok_{}", day), metrics(day + 2));

        AggregateSnapshot::new(day * SECONDS_PER_DAY, addresses, tokens, HashMap::new())
    }

    /// Spawns the sinker drain task over a fresh ring
    fn start_pipeline(
        store: Arc<dyn AggregateStore>,
        staging_buffer: usize,
    ) -> (
        ring::RingPublisher<AggregationEvent>,
        tokio::task::JoinHandle<()>,
        tokio::sync::mpsc::Receiver<aggflow::sink::StagingAggregateKeys>,
    ) {
        let (staging, staging_rx) = ChannelStagingDispatcher::new(staging_buffer);
        let (publisher, consumer) = ring::bounded(8).unwrap();
        let sinker = AggregationSinker::new(store, Arc::new(staging));
        let drain = tokio::spawn(async move {
            sinker.run(consumer).await;
        });
        (publisher, drain, staging_rx)
    }

    #[tokio::test]
    async fn test_end_to_end_snapshots_persist_and_stage() {
        // Test: daily snapshots and a totals flush land in SQLite,
        // staging fires once per daily snapshot
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("pipeline.db");
        let store = Arc::new(SqliteAggregateStore::new(&db_path).unwrap());

        let (publisher, drain, mut staging_rx) = start_pipeline(store, 16);

        publisher
            .publish(AggregationEvent::Snapshot(snapshot_for_day(19600)))
            .await;
        publisher
            .publish(AggregationEvent::Snapshot(snapshot_for_day(19601)))
            .await;

        let mut totals_tokens = HashMap::new();
        totals_tokens.insert("tok_total".to_string(), metrics(500));
        publisher
            .publish(AggregationEvent::TotalSnapshot(TotalAggregationSnapshot::new(
                HashMap::new(),
                totals_tokens,
                HashMap::new(),
            )))
            .await;

        drop(publisher);
        drain.await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let daily_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM daily_aggregates", [], |row| row.get(0))
            .unwrap();
        let total_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM total_aggregates", [], |row| row.get(0))
            .unwrap();

        // Two snapshots x (1 address + 1 token) rows, one totals row
        assert_eq!(daily_count, 4);
        assert_eq!(total_count, 1);

        let first = staging_rx.recv().await.unwrap();
        assert!(first
            .keys()
            .contains(&AggregateKey::Address("addr_19600".to_string())));
        let second = staging_rx.recv().await.unwrap();
        assert!(second
            .keys()
            .contains(&AggregateKey::Token("tok_19601".to_string())));
        assert!(staging_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_backpressure_under_producer_load() {
        // Test: 100 snapshots through an 8-slot ring, nothing dropped
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("load.db");
        let store = Arc::new(SqliteAggregateStore::new(&db_path).unwrap());

        let (publisher, drain, _staging_rx) = start_pipeline(store, 256);

        for day in 0..100i64 {
            publisher
                .publish(AggregationEvent::Snapshot(snapshot_for_day(day)))
                .await;
        }

        drop(publisher);
        drain.await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let distinct_dates: i64 = conn
            .query_row(
                "SELECT COUNT(DISTINCT date) FROM daily_aggregates",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(distinct_dates, 100);
    }

    /// Store that detects overlapping save calls
    struct SerializationProbe {
        in_flight: AtomicBool,
        overlap_detected: AtomicBool,
        handled: AtomicUsize,
    }

    impl SerializationProbe {
        fn new() -> Self {
            Self {
                in_flight: AtomicBool::new(false),
                overlap_detected: AtomicBool::new(false),
                handled: AtomicUsize::new(0),
            }
        }

        async fn probe(&self) {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlap_detected.store(true, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.store(false, Ordering::SeqCst);
            self.handled.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl AggregateStore for SerializationProbe {
        async fn save_aggregate_snapshot(
            &self,
            _snapshot: &AggregateSnapshot,
        ) -> Result<(), StoreError> {
            self.probe().await;
            Ok(())
        }

        async fn save_total_aggregation_snapshot(
            &self,
            _snapshot: &TotalAggregationSnapshot,
        ) -> Result<(), StoreError> {
            self.probe().await;
            Ok(())
        }

        async fn update_contract_resync_status(
            &self,
            _contract: &Contract,
        ) -> Result<(), StoreError> {
            self.probe().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_events_are_handled_serially() {
        // Test: with a deliberately slow store and 4 concurrent producers,
        // no two events are ever handled at the same time
        let probe = Arc::new(SerializationProbe::new());
        let (publisher, drain, _staging_rx) = start_pipeline(
            Arc::clone(&probe) as Arc<dyn AggregateStore>,
            16,
        );

        for producer in 0..4i64 {
            let publisher = publisher.clone();
            tokio::spawn(async move {
                for i in 0..5i64 {
                    publisher
                        .publish(AggregationEvent::Snapshot(snapshot_for_day(
                            producer * 100 + i,
                        )))
                        .await;
                }
            });
        }
        drop(publisher);

        drain.await.unwrap();

        assert_eq!(probe.handled.load(Ordering::SeqCst), 20);
        assert!(!probe.overlap_detected.load(Ordering::SeqCst));
    }

    /// Store that fails exactly one designated save, passing others through
    struct FlakyStore {
        fail_on_call: usize,
        calls: AtomicUsize,
        persisted: AtomicUsize,
    }

    impl FlakyStore {
        fn new(fail_on_call: usize) -> Self {
            Self {
                fail_on_call,
                calls: AtomicUsize::new(0),
                persisted: AtomicUsize::new(0),
            }
        }

        fn record(&self) -> Result<(), StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == self.fail_on_call {
                return Err(StoreError::Database("injected failure".to_string()));
            }
            self.persisted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl AggregateStore for FlakyStore {
        async fn save_aggregate_snapshot(
            &self,
            _snapshot: &AggregateSnapshot,
        ) -> Result<(), StoreError> {
            self.record()
        }

        async fn save_total_aggregation_snapshot(
            &self,
            _snapshot: &TotalAggregationSnapshot,
        ) -> Result<(), StoreError> {
            self.record()
        }

        async fn update_contract_resync_status(
            &self,
            _contract: &Contract,
        ) -> Result<(), StoreError> {
            self.record()
        }
    }

    #[tokio::test]
    async fn test_one_failed_save_does_not_stall_the_stream() {
        // Test: event k fails, events k+1.. still persist
        let store = Arc::new(FlakyStore::new(1));
        let (publisher, drain, _staging_rx) =
            start_pipeline(Arc::clone(&store) as Arc<dyn AggregateStore>, 16);

        publisher
            .publish(AggregationEvent::Snapshot(snapshot_for_day(1)))
            .await;
        // This one fails inside the store
        publisher
            .publish(AggregationEvent::Snapshot(snapshot_for_day(2)))
            .await;
        publisher
            .publish(AggregationEvent::TotalSnapshot(TotalAggregationSnapshot::new(
                HashMap::new(),
                HashMap::new(),
                HashMap::new(),
            )))
            .await;

        drop(publisher);
        drain.await.unwrap();

        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.persisted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resync_round_trip() {
        // Test: Begin acknowledged before End, contract marked complete,
        // resync body bracketed between the two acknowledgments
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("resync.db");
        let store = Arc::new(SqliteAggregateStore::new(&db_path).unwrap());
        store.register_contract(&Contract::new("con_resync")).unwrap();

        let (publisher, drain, _staging_rx) =
            start_pipeline(Arc::clone(&store) as Arc<dyn AggregateStore>, 16);

        let resync = Arc::new(ReSync::new(Contract::new("con_resync")));
        let wait_timeout = Duration::from_secs(5);

        let producer = {
            let publisher = publisher.clone();
            let resync = Arc::clone(&resync);
            tokio::spawn(async move {
                publisher
                    .publish(AggregationEvent::ResyncBegin(Arc::clone(&resync)))
                    .await;
                resync.wait_begun(wait_timeout).await.unwrap();
                assert_eq!(resync.state(), ResyncState::Begun);

                // Resync body: recompute and re-persist the contract's history
                publisher
                    .publish(AggregationEvent::Snapshot(snapshot_for_day(42)))
                    .await;

                publisher
                    .publish(AggregationEvent::ResyncEnd(Arc::clone(&resync)))
                    .await;
                resync.wait_ended(wait_timeout).await.unwrap();
            })
        };

        producer.await.unwrap();
        assert_eq!(resync.state(), ResyncState::Ended);

        drop(publisher);
        drain.await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let status: i32 = conn
            .query_row(
                "SELECT resync_status FROM contracts WHERE contract_hash = 'con_resync'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, RESYNC_COMPLETE);

        // The bracketed snapshot landed as well
        let daily: i64 = conn
            .query_row("SELECT COUNT(*) FROM daily_aggregates", [], |row| row.get(0))
            .unwrap();
        assert_eq!(daily, 2);
    }
}
