use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Eviction, EvictionScheduler};
use crate::clock::Clock;
use crate::error::{QueueError, Result};
use crate::session::{EvictionHandle, SessionId};

/// Pending timers. The value is `None` only between arming and spawning.
type PendingTimers = DashMap<EvictionHandle, Option<JoinHandle<()>>>;

/// Eviction scheduler backed by tokio timers
///
/// A timer delivers its eviction only if it can still remove its own entry
/// from the pending map; `cancel` removes the same entry, so exactly one of
/// the two wins.
pub struct TokioEvictionScheduler {
    clock: Arc<dyn Clock>,
    pending: Arc<PendingTimers>,
    tx: mpsc::UnboundedSender<Eviction>,
}

impl TokioEvictionScheduler {
    /// Create a scheduler and the receiver its due evictions are delivered on
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<Eviction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            clock,
            pending: Arc::new(DashMap::new()),
            tx,
        };
        (scheduler, rx)
    }

    /// Number of armed timers that have neither fired nor been cancelled
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl EvictionScheduler for TokioEvictionScheduler {
    fn run_at(&self, at: DateTime<Utc>, session_id: &SessionId) -> Result<EvictionHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| QueueError::scheduler(format!("no tokio runtime: {}", e)))?;

        let handle = EvictionHandle::new();
        let delay = (at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);

        self.pending.insert(handle, None);

        let pending = self.pending.clone();
        let tx = self.tx.clone();
        let session_id = session_id.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if pending.remove(&handle).is_some() {
                debug!("⏰ Eviction {} due for session {}", handle, session_id);
                if tx.send(Eviction { session_id, handle }).is_err() {
                    warn!("Eviction {} dropped: dispatcher is gone", handle);
                }
            }
        });

        // If the timer already fired the entry is gone and the task is simply detached.
        if let Some(mut entry) = self.pending.get_mut(&handle) {
            *entry = Some(task);
        }

        debug!("Scheduled eviction {} in {:?}", handle, delay);
        Ok(handle)
    }

    fn cancel(&self, handle: &EvictionHandle) {
        if let Some((_, task)) = self.pending.remove(handle) {
            if let Some(task) = task {
                task.abort();
            }
            debug!("Cancelled eviction {}", handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_deadline() {
        let clock = Arc::new(SystemClock);
        let (scheduler, mut rx) = TokioEvictionScheduler::new(clock.clone());
        let id = SessionId::from("a");

        let handle = scheduler
            .run_at(clock.now() + chrono::Duration::seconds(30), &id)
            .unwrap();
        assert_eq!(scheduler.pending_count(), 1);

        let eviction = rx.recv().await.unwrap();
        assert_eq!(eviction, Eviction { session_id: id, handle });
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_delivery() {
        let clock = Arc::new(SystemClock);
        let (scheduler, mut rx) = TokioEvictionScheduler::new(clock.clone());

        let handle = scheduler
            .run_at(clock.now() + chrono::Duration::seconds(30), &"a".into())
            .unwrap();
        scheduler.cancel(&handle);
        scheduler.cancel(&handle);
        assert_eq!(scheduler.pending_count(), 0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_run_at_outside_runtime_fails() {
        let (scheduler, _rx) = TokioEvictionScheduler::new(Arc::new(SystemClock));
        let err = scheduler.run_at(Utc::now(), &"a".into()).unwrap_err();
        assert!(matches!(err, QueueError::Scheduler(_)));
    }
}
