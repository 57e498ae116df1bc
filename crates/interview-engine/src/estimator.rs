//! # Wait-Time Estimation
//!
//! Predicts how long a session will wait for a call slot by replaying the
//! live state as a small discrete-event simulation over
//! `max_concurrent_calls` servers:
//!
//! 1. Every slot is seeded with the time it becomes free: the scheduled end
//!    of the call occupying it, or "now" for an idle slot.
//! 2. Waiting sessions are walked in FIFO order. Each takes the earliest free
//!    slot and holds it for a full session duration.
//! 3. The target's wait is the time until the slot it would take frees up,
//!    rounded up to whole minutes and never negative.
//!
//! A session that is not on the waiting list yet is treated as the next
//! arrival and takes the slot after everyone currently waiting.
//!
//! Estimation only reads the store. State that changes mid-read can give an
//! inconsistent answer; that is accepted.

use std::sync::Arc;

use tracing::debug;

use crate::clock::Clock;
use crate::config::AdmissionConfig;
use crate::error::{QueueError, Result};
use crate::heap::MinHeap;
use crate::session::SessionId;
use crate::store::SessionStore;

const MILLIS_PER_MINUTE: i64 = 60_000;

/// Live snapshot the simulation replays, all timestamps in epoch milliseconds
#[derive(Debug, Clone)]
pub struct SlotSnapshot<'a> {
    pub now_ms: i64,
    /// When each occupied slot frees up, in any order
    pub busy_until_ms: Vec<i64>,
    /// Waiting sessions in FIFO order
    pub waiting: &'a [SessionId],
    pub max_slots: usize,
    pub session_duration_ms: i64,
}

/// Simulate the wait for `target`, or for a new arrival when `target` is
/// `None` or not on the waiting list. Returns milliseconds, never negative.
pub fn simulate_wait(snapshot: &SlotSnapshot<'_>, target: Option<&SessionId>) -> Result<i64> {
    let now = snapshot.now_ms;
    if snapshot.busy_until_ms.len() < snapshot.max_slots {
        return Ok(0);
    }

    // With more calls than slots, a slot only opens once the surplus calls
    // have ended, so only the latest `max_slots` end times matter.
    let mut busy = snapshot.busy_until_ms.clone();
    busy.sort_unstable();
    let surplus = busy.len() - snapshot.max_slots;

    let mut slots: MinHeap<i64> = MinHeap::with_capacity(snapshot.max_slots);
    for free_at in busy.into_iter().skip(surplus) {
        slots.push(free_at);
    }
    while slots.len() < snapshot.max_slots {
        slots.push(now);
    }

    for id in snapshot.waiting {
        let free_at = slots
            .pop()
            .ok_or_else(|| QueueError::invariant("slot heap drained during wait simulation"))?;
        if Some(id) == target {
            return Ok((free_at - now).max(0));
        }
        slots.push(free_at + snapshot.session_duration_ms);
    }

    let free_at = slots
        .pop()
        .ok_or_else(|| QueueError::invariant("slot heap empty after wait simulation"))?;
    Ok((free_at - now).max(0))
}

/// Round a millisecond wait up to whole minutes
pub fn minutes_rounded_up(wait_ms: i64) -> u64 {
    let wait_ms = wait_ms.max(0);
    ((wait_ms + MILLIS_PER_MINUTE - 1) / MILLIS_PER_MINUTE) as u64
}

/// Read-only wait-time estimator over the live session store
pub struct WaitTimeEstimator {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    config: AdmissionConfig,
}

impl WaitTimeEstimator {
    pub fn new(config: AdmissionConfig, store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Predicted wait in whole minutes for an existing session.
    ///
    /// Sessions in a call, and any session while a slot is free, wait 0.
    pub async fn estimate_wait(&self, id: &SessionId) -> Result<u64> {
        let session = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| QueueError::not_found(id))?;
        if session.in_call {
            return Ok(0);
        }

        let minutes = self.estimate(Some(id)).await?;
        debug!("Estimated wait for {}: {} min", id, minutes);
        Ok(minutes)
    }

    /// Predicted wait in whole minutes for someone joining right now
    pub async fn estimate_new_arrival(&self) -> Result<u64> {
        self.estimate(None).await
    }

    async fn estimate(&self, target: Option<&SessionId>) -> Result<u64> {
        let in_call = self.store.list_in_call().await?;
        let waiting = self.store.list_waiting().await?;
        let now = self.clock.now();

        let waiting_ids: Vec<SessionId> = waiting.into_iter().map(|s| s.id).collect();
        let snapshot = SlotSnapshot {
            now_ms: now.timestamp_millis(),
            busy_until_ms: in_call
                .iter()
                .map(|s| s.scheduled_end_time.unwrap_or(now).timestamp_millis())
                .collect(),
            waiting: &waiting_ids,
            max_slots: self.config.max_concurrent_calls,
            session_duration_ms: self.config.max_session_duration_secs as i64 * 1000,
        };

        Ok(minutes_rounded_up(simulate_wait(&snapshot, target)?))
    }
}
