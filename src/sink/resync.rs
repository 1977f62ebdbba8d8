//! Per-contract resynchronization coordination
//!
//! A resync recomputes one contract's historical aggregates from scratch.
//! The producer brackets the work with Begin/End marker events flowing
//! through the same ordered ring as regular snapshots, so the resync body
//! can never interleave with conflicting writes for that contract:
//!
//! 1. enqueue `ResyncBegin`, await `wait_begun`
//! 2. perform the resync work
//! 3. enqueue `ResyncEnd`, await `wait_ended`
//!
//! The sinker releases each gate when it processes the matching marker.
//! Producer obligation: Begin must be enqueued before End on the same
//! ring - the handler does not validate cross-event ordering. The waits
//! are bounded by a timeout so a handler failure before a gate release
//! surfaces as [`ResyncTimeout`] instead of a stuck producer.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;

/// Terminal resync status written to the contract row on End
pub const RESYNC_COMPLETE: i32 = 3;

/// Contract row owning the resync status column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub contract_hash: String,
    pub resync_status: i32,
}

impl Contract {
    pub fn new(contract_hash: impl Into<String>) -> Self {
        Self {
            contract_hash: contract_hash.into(),
            resync_status: 0,
        }
    }
}

/// Lifecycle of one contract's resynchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncState {
    NotStarted,
    Begun,
    Ended,
}

#[derive(Debug)]
pub struct ResyncTimeout;

impl std::fmt::Display for ResyncTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timed out waiting for the pipeline to acknowledge a resync marker")
    }
}

impl std::error::Error for ResyncTimeout {}

/// Coordination handle bound to exactly one contract's resync
///
/// Shared (via `Arc`) between the Begin and End events and the producer
/// that enqueued them. Each gate is a one-shot signal: released exactly
/// once by the sinker, releasing again is a no-op, and a wait after
/// release returns immediately.
pub struct ReSync {
    contract: Contract,
    begin_gate: watch::Sender<bool>,
    end_gate: watch::Sender<bool>,
}

impl ReSync {
    pub fn new(contract: Contract) -> Self {
        let (begin_gate, _) = watch::channel(false);
        let (end_gate, _) = watch::channel(false);
        Self {
            contract,
            begin_gate,
            end_gate,
        }
    }

    /// The contract row to mark when the End marker is processed
    pub fn contract_for_update(&self) -> Contract {
        self.contract.clone()
    }

    /// Release the producer waiting on Begin acknowledgment
    pub fn ready_to_begin(&self) {
        self.begin_gate.send_replace(true);
    }

    /// Release the producer waiting on End acknowledgment
    pub fn ready_to_end(&self) {
        self.end_gate.send_replace(true);
    }

    pub fn state(&self) -> ResyncState {
        if *self.end_gate.borrow() {
            ResyncState::Ended
        } else if *self.begin_gate.borrow() {
            ResyncState::Begun
        } else {
            ResyncState::NotStarted
        }
    }

    /// Wait until the pipeline has processed the Begin marker
    pub async fn wait_begun(&self, wait_timeout: Duration) -> Result<(), ResyncTimeout> {
        Self::wait_released(&self.begin_gate, wait_timeout).await
    }

    /// Wait until the pipeline has processed the End marker
    pub async fn wait_ended(&self, wait_timeout: Duration) -> Result<(), ResyncTimeout> {
        Self::wait_released(&self.end_gate, wait_timeout).await
    }

    async fn wait_released(
        gate: &watch::Sender<bool>,
        wait_timeout: Duration,
    ) -> Result<(), ResyncTimeout> {
        let mut released = gate.subscribe();
        let result = match tokio::time::timeout(wait_timeout, released.wait_for(|open| *open)).await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) | Err(_) => Err(ResyncTimeout),
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_state_progression() {
        let resync = ReSync::new(Contract::new("contract_a"));

        assert_eq!(resync.state(), ResyncState::NotStarted);

        resync.ready_to_begin();
        assert_eq!(resync.state(), ResyncState::Begun);

        resync.ready_to_end();
        assert_eq!(resync.state(), ResyncState::Ended);
    }

    #[tokio::test]
    async fn test_wait_returns_after_release() {
        let resync = Arc::new(ReSync::new(Contract::new("contract_b")));

        let waiter = {
            let resync = Arc::clone(&resync);
            tokio::spawn(async move { resync.wait_begun(Duration::from_secs(5)).await })
        };

        resync.ready_to_begin();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_wait_after_release_returns_immediately() {
        let resync = ReSync::new(Contract::new("contract_c"));

        resync.ready_to_end();
        resync
            .wait_ended(Duration::from_millis(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_times_out_when_never_released() {
        // A gate the handler never reaches must not hang the producer
        let resync = ReSync::new(Contract::new("contract_d"));

        let result = resync.wait_begun(Duration::from_millis(50)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let resync = ReSync::new(Contract::new("contract_e"));

        resync.ready_to_begin();
        resync.ready_to_begin();
        assert_eq!(resync.state(), ResyncState::Begun);

        resync.wait_begun(Duration::from_millis(10)).await.unwrap();
    }

    #[test]
    fn test_contract_for_update_carries_hash() {
        let resync = ReSync::new(Contract::new("contract_f"));
        let contract = resync.contract_for_update();
        assert_eq!(contract.contract_hash, "contract_f");
        assert_eq!(contract.resync_status, 0);
    }
}
