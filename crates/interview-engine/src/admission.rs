//! # Admission Control
//!
//! [`AdmissionController`] owns every transition between the idle, waiting and
//! in-call states:
//!
//! - **join**: enqueue behind anyone already waiting and retry advancement,
//!   otherwise try to take a call slot directly.
//! - **admit**: schedule the forced end, provision the call URL and persist
//!   the in-call fields. A provisioning or persistence failure cancels the
//!   eviction it just scheduled before the error is returned.
//! - **leave / forced end**: clear the session, cancel the pending eviction
//!   (explicit leave only) and advance the waiting list into the freed slot.
//!
//! Transitions are serialized through a single admission gate so that the
//! in-call count and the FIFO head are always read from a consistent
//! snapshot. Capacity is re-checked on every admission; when all slots are
//! taken the session is queued instead.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::AdmissionConfig;
use crate::error::{QueueError, Result};
use crate::provisioner::CallProvisioner;
use crate::scheduler::EvictionScheduler;
use crate::session::{EvictionHandle, Session, SessionId, SessionPatch};
use crate::store::SessionStore;

/// Result of a join (or an explicit admission request)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The session took a call slot
    InCall { call_url: String },
    /// The session is waiting at this 1-based FIFO position
    Queued { position: usize },
}

/// Result of a leave or a forced end
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// Whether the session had queue or call state that was cleared
    pub cleared: bool,
    /// Sessions promoted from the waiting list into freed slots
    pub admitted: Vec<SessionId>,
}

/// Point-in-time queue statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub in_call: usize,
    pub waiting: usize,
    pub capacity: usize,
    pub free_slots: usize,
    pub longest_wait_secs: u64,
}

enum Admission {
    Admitted(String),
    AtCapacity,
}

/// Bounded-concurrency admission controller for interview call slots
pub struct AdmissionController {
    store: Arc<dyn SessionStore>,
    scheduler: Arc<dyn EvictionScheduler>,
    provisioner: Arc<dyn CallProvisioner>,
    clock: Arc<dyn Clock>,
    config: AdmissionConfig,
    gate: Mutex<()>,
}

impl AdmissionController {
    pub fn new(
        config: AdmissionConfig,
        store: Arc<dyn SessionStore>,
        scheduler: Arc<dyn EvictionScheduler>,
        provisioner: Arc<dyn CallProvisioner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            "🎯 Admission controller ready: {} call slots, {}s per call",
            config.max_concurrent_calls, config.max_session_duration_secs
        );
        Self {
            store,
            scheduler,
            provisioner,
            clock,
            config,
            gate: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Request a call slot for a session.
    ///
    /// A session never goes straight into a call while anyone is waiting,
    /// even if a slot happens to be free: it is queued and the waiting list
    /// is advanced from its head. Joining again while already waiting keeps
    /// the original queue position.
    pub async fn join(&self, id: &SessionId) -> Result<JoinOutcome> {
        let _gate = self.gate.lock().await;

        let session = self.fetch(id).await?;
        if session.in_call {
            return Err(QueueError::AlreadyInCall(id.clone()));
        }
        if session.call_url.is_some() {
            return Err(QueueError::AlreadyHasUrl(id.clone()));
        }
        if session.waiting {
            debug!("Session {} is already waiting", id);
            let position = self.position_locked(id).await?.unwrap_or(0);
            return Ok(JoinOutcome::Queued { position });
        }

        let waiting = self.store.list_waiting().await?;
        if !waiting.is_empty() {
            self.enqueue_locked(&session).await?;
            return self.settle_after_enqueue(id).await;
        }

        match self.admit_locked(&session).await? {
            Admission::Admitted(call_url) => Ok(JoinOutcome::InCall { call_url }),
            Admission::AtCapacity => {
                let position = self.enqueue_locked(&session).await?;
                Ok(JoinOutcome::Queued { position })
            }
        }
    }

    /// Move a session into a call slot now, queueing it if every slot is taken.
    ///
    /// Intended for the session whose turn it is; ordinary arrivals go
    /// through [`join`](Self::join).
    pub async fn admit_to_call(&self, id: &SessionId) -> Result<JoinOutcome> {
        let _gate = self.gate.lock().await;

        let session = self.fetch(id).await?;
        match self.admit_locked(&session).await? {
            Admission::Admitted(call_url) => Ok(JoinOutcome::InCall { call_url }),
            Admission::AtCapacity => {
                let position = if session.waiting {
                    self.position_locked(id).await?.unwrap_or(0)
                } else {
                    self.enqueue_locked(&session).await?
                };
                Ok(JoinOutcome::Queued { position })
            }
        }
    }

    /// Leave the queue or end the call, then hand freed capacity to the
    /// longest-waiting sessions.
    ///
    /// Leaving a session that is neither waiting nor in a call clears
    /// nothing, but advancement is still attempted; it can only admit into
    /// slots that are actually free.
    pub async fn leave(&self, id: &SessionId) -> Result<LeaveOutcome> {
        let _gate = self.gate.lock().await;

        let session = self.fetch(id).await?;
        let cleared = if session.waiting || session.in_call {
            // Cancel only once the clear is stored; an eviction firing in
            // between finds a stale handle and clears nothing.
            self.store.patch(id, SessionPatch::clear()).await?;
            if let Some(handle) = session.eviction_handle {
                self.scheduler.cancel(&handle);
            }
            info!("👋 Session {} left ({:?})", id, session.state());
            true
        } else {
            debug!("Session {} already left", id);
            false
        };

        let admitted = self.advance_locked().await?;
        Ok(LeaveOutcome { cleared, admitted })
    }

    /// Forced end of a call whose scheduled duration expired.
    ///
    /// Called with the firing handle, which is not cancelled again. The
    /// session is only cleared if `handle` is still its current eviction;
    /// a stale handle from an earlier call clears nothing. Advancement is
    /// attempted even if clearing failed.
    pub async fn forced_end(&self, id: &SessionId, handle: &EvictionHandle) -> Result<LeaveOutcome> {
        let _gate = self.gate.lock().await;

        let cleared = match self.store.get(id).await {
            Ok(Some(session)) if session.eviction_handle.as_ref() == Some(handle) => self
                .store
                .patch(id, SessionPatch::clear())
                .await
                .map(|()| {
                    info!("⏰ Session {} evicted after its call duration", id);
                    true
                }),
            Ok(Some(_)) => {
                warn!("Ignoring stale eviction {} for session {}", handle, id);
                Ok(false)
            }
            Ok(None) => Err(QueueError::not_found(id)),
            Err(e) => Err(e),
        };

        let advanced = self.advance_locked().await;

        match (cleared, advanced) {
            (Ok(cleared), Ok(admitted)) => Ok(LeaveOutcome { cleared, admitted }),
            (Err(e), advanced) => {
                error!("❌ Failed to clear evicted session {}: {}", id, e);
                if let Ok(admitted) = advanced {
                    if !admitted.is_empty() {
                        info!("Advanced {:?} despite the failed eviction", admitted);
                    }
                }
                Err(e)
            }
            (Ok(_), Err(e)) => Err(e),
        }
    }

    /// Fill any free slots from the head of the waiting list.
    pub async fn advance(&self) -> Result<Vec<SessionId>> {
        let _gate = self.gate.lock().await;
        self.advance_locked().await
    }

    /// Whether every call slot is taken
    pub async fn capacity_check(&self) -> Result<bool> {
        Ok(self.store.count_in_call().await? >= self.config.max_concurrent_calls)
    }

    /// 1-based FIFO position of a waiting session
    pub async fn queue_position(&self, id: &SessionId) -> Result<Option<usize>> {
        self.position_locked(id).await
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let in_call = self.store.count_in_call().await?;
        let waiting = self.store.list_waiting().await?;
        let now = self.clock.now();

        let longest_wait_secs = waiting
            .first()
            .and_then(|s| s.queued_at)
            .map(|at| (now - at).num_seconds().max(0) as u64)
            .unwrap_or(0);

        Ok(QueueStats {
            in_call,
            waiting: waiting.len(),
            capacity: self.config.max_concurrent_calls,
            free_slots: self.config.max_concurrent_calls.saturating_sub(in_call),
            longest_wait_secs,
        })
    }

    /// Retry advancement behind a fresh enqueue. A slot can stay free with
    /// sessions waiting after an earlier advance failed; the head is served
    /// first, so the new arrival only gets in if its own turn comes up.
    async fn settle_after_enqueue(&self, id: &SessionId) -> Result<JoinOutcome> {
        match self.advance_locked().await {
            Ok(admitted) if !admitted.is_empty() => {
                info!("Join of {} unblocked {:?}", id, admitted);
            }
            Ok(_) => {}
            Err(e) => warn!("Advance after queueing {} failed: {}", id, e),
        }

        let session = self.fetch(id).await?;
        if session.in_call {
            let call_url = session.call_url.ok_or_else(|| {
                QueueError::invariant(format!("{} is in a call without a url", id))
            })?;
            return Ok(JoinOutcome::InCall { call_url });
        }
        let position = self.position_locked(id).await?.ok_or_else(|| {
            QueueError::invariant(format!("{} missing from waiting list after enqueue", id))
        })?;
        Ok(JoinOutcome::Queued { position })
    }

    async fn fetch(&self, id: &SessionId) -> Result<Session> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| QueueError::not_found(id))
    }

    async fn position_locked(&self, id: &SessionId) -> Result<Option<usize>> {
        let waiting = self.store.list_waiting().await?;
        Ok(waiting.iter().position(|s| &s.id == id).map(|i| i + 1))
    }

    /// Put a session on the waiting list, keeping its first enqueue time
    async fn enqueue_locked(&self, session: &Session) -> Result<usize> {
        let queued_at = session.queued_at.unwrap_or_else(|| self.clock.now());
        self.store
            .patch(&session.id, SessionPatch::enqueue(queued_at))
            .await?;

        let position = self.position_locked(&session.id).await?.ok_or_else(|| {
            QueueError::invariant(format!("{} missing from waiting list after enqueue", session.id))
        })?;
        info!("📋 Session {} queued at position {}", session.id, position);
        Ok(position)
    }

    async fn admit_locked(&self, session: &Session) -> Result<Admission> {
        if session.in_call {
            return Err(QueueError::AlreadyInCall(session.id.clone()));
        }
        if session.call_url.is_some() {
            return Err(QueueError::AlreadyHasUrl(session.id.clone()));
        }

        let in_call = self.store.count_in_call().await?;
        if in_call >= self.config.max_concurrent_calls {
            warn!(
                "🚫 No free call slot for {} ({}/{} in use)",
                session.id, in_call, self.config.max_concurrent_calls
            );
            return Ok(Admission::AtCapacity);
        }

        let admitted_at = self.clock.now();
        let ends_at = admitted_at + self.config.session_duration();
        let handle = self.scheduler.run_at(ends_at, &session.id)?;

        let call_url = match self.provisioner.generate_url(session).await {
            Ok(url) => url,
            Err(e) => {
                error!("❌ Call provisioning failed for {}: {}", session.id, e);
                self.scheduler.cancel(&handle);
                return Err(e);
            }
        };

        let patch = SessionPatch::enter_call(call_url.clone(), admitted_at, ends_at, handle);
        if let Err(e) = self.store.patch(&session.id, patch).await {
            error!("❌ Failed to persist call for {}: {}", session.id, e);
            self.scheduler.cancel(&handle);
            return Err(e);
        }

        info!(
            "📞 Session {} admitted to call (ends at {}, slot {}/{})",
            session.id,
            ends_at.format("%H:%M:%S"),
            in_call + 1,
            self.config.max_concurrent_calls
        );
        Ok(Admission::Admitted(call_url))
    }

    async fn advance_locked(&self) -> Result<Vec<SessionId>> {
        let mut admitted = Vec::new();
        loop {
            if self.store.count_in_call().await? >= self.config.max_concurrent_calls {
                break;
            }
            let waiting = self.store.list_waiting().await?;
            let Some(head) = waiting.into_iter().next() else {
                break;
            };
            match self.admit_locked(&head).await? {
                Admission::Admitted(_) => {
                    info!("📤 Advanced {} from the waiting list", head.id);
                    admitted.push(head.id);
                }
                Admission::AtCapacity => break,
            }
        }
        Ok(admitted)
    }
}
