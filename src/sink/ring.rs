//! Ordered ring channel - bounded FIFO pipeline with a single consumer
//!
//! A fixed arena of slots indexed by sequence number. Producers claim the
//! next sequence under the ring lock and commit their event into the slot;
//! the consumer drains sequences strictly in increasing order. Capacity is
//! a power of two so slot lookup is a sequence-AND-mask.
//!
//! Slot lifecycle runs in two stages:
//! 1. `recv()` moves the event out of its slot and hands it to the caller
//!    as a [`ClaimedEvent`] - the slot no longer references the payload.
//! 2. Releasing the claim (explicit `release()` or drop) frees the slot
//!    for producers and signals waiting publishers.
//!
//! A slot is never rewritten until its previous event has been fully
//! handled and released, and a full ring blocks publishers instead of
//! dropping events.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug)]
pub enum RingError {
    /// Capacity must be a nonzero power of two for mask indexing
    InvalidCapacity(usize),
}

impl std::fmt::Display for RingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RingError::InvalidCapacity(capacity) => {
                write!(f, "ring capacity must be a nonzero power of two, got {}", capacity)
            }
        }
    }
}

impl std::error::Error for RingError {}

struct RingState<T> {
    slots: Box<[Option<T>]>,
    /// Next sequence a producer will write
    claimed: u64,
    /// Next sequence the consumer will take
    consumed: u64,
    /// Sequences whose slots are free for rewrite
    released: u64,
}

struct Shared<T> {
    state: Mutex<RingState<T>>,
    capacity: u64,
    mask: u64,
    publishers: AtomicUsize,
    not_full: Notify,
    not_empty: Notify,
}

/// Create a bounded ordered ring of the given power-of-two capacity
///
/// Returns a cloneable publisher handle and the single consumer handle.
/// The consumer is not cloneable - one drain loop per ring, by type.
pub fn bounded<T>(capacity: usize) -> Result<(RingPublisher<T>, RingConsumer<T>), RingError> {
    if capacity == 0 || !capacity.is_power_of_two() {
        return Err(RingError::InvalidCapacity(capacity));
    }

    let mut slots = Vec::with_capacity(capacity);
    slots.resize_with(capacity, || None);

    let shared = Arc::new(Shared {
        state: Mutex::new(RingState {
            slots: slots.into_boxed_slice(),
            claimed: 0,
            consumed: 0,
            released: 0,
        }),
        capacity: capacity as u64,
        mask: (capacity - 1) as u64,
        publishers: AtomicUsize::new(1),
        not_full: Notify::new(),
        not_empty: Notify::new(),
    });

    let publisher = RingPublisher {
        shared: Arc::clone(&shared),
    };
    let consumer = RingConsumer { shared };

    Ok((publisher, consumer))
}

/// Producer-side handle; cheap to clone across tasks
pub struct RingPublisher<T> {
    shared: Arc<Shared<T>>,
}

impl<T> RingPublisher<T> {
    /// Submit an event to the ring, in global claim order
    ///
    /// Suspends while the ring is full; never drops or reorders. The
    /// event is visible to the consumer as soon as this call returns.
    pub async fn publish(&self, event: T) {
        let mut event = Some(event);
        loop {
            let not_full = self.shared.not_full.notified();
            {
                let mut state = self.shared.state.lock().unwrap();
                if state.claimed - state.released < self.shared.capacity {
                    let idx = (state.claimed & self.shared.mask) as usize;
                    state.slots[idx] = event.take();
                    state.claimed += 1;
                    drop(state);
                    self.shared.not_empty.notify_one();
                    return;
                }
            }
            not_full.await;
        }
    }
}

impl<T> Clone for RingPublisher<T> {
    fn clone(&self) -> Self {
        self.shared.publishers.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for RingPublisher<T> {
    fn drop(&mut self) {
        if self.shared.publishers.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Last publisher gone - wake the consumer so it can observe closure
            self.shared.not_empty.notify_one();
        }
    }
}

/// Consumer-side handle; exactly one exists per ring
pub struct RingConsumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> RingConsumer<T> {
    /// Take the next event in sequence order
    ///
    /// Suspends while the ring is empty. Returns `None` once every
    /// publisher handle has been dropped and the ring is drained.
    pub async fn recv(&mut self) -> Option<ClaimedEvent<T>> {
        loop {
            let not_empty = self.shared.not_empty.notified();
            {
                let mut state = self.shared.state.lock().unwrap();
                if state.consumed < state.claimed {
                    let idx = (state.consumed & self.shared.mask) as usize;
                    if let Some(event) = state.slots[idx].take() {
                        let sequence = state.consumed;
                        state.consumed += 1;
                        let end_of_batch = state.consumed == state.claimed;
                        return Some(ClaimedEvent {
                            event,
                            sequence,
                            end_of_batch,
                            shared: Arc::clone(&self.shared),
                        });
                    }
                } else if self.shared.publishers.load(Ordering::Acquire) == 0 {
                    return None;
                }
            }
            not_empty.await;
        }
    }
}

/// An event taken off the ring, holding its slot until released
///
/// The payload has already been moved out of the slot; releasing the
/// claim (explicitly or on drop) frees the slot for reuse. Release runs
/// exactly once per claim.
pub struct ClaimedEvent<T> {
    event: T,
    sequence: u64,
    end_of_batch: bool,
    shared: Arc<Shared<T>>,
}

impl<T> ClaimedEvent<T> {
    pub fn event(&self) -> &T {
        &self.event
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// True when the ring drained to empty at claim time
    pub fn end_of_batch(&self) -> bool {
        self.end_of_batch
    }

    /// Free the slot for producers - the trailing pipeline stage
    pub fn release(self) {
        // Drop impl performs the release
    }
}

impl<T> Drop for ClaimedEvent<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.released += 1;
        drop(state);
        self.shared.not_full.notify_one();
    }
}
