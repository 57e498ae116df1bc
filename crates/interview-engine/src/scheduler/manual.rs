use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{Eviction, EvictionScheduler};
use crate::error::{QueueError, Result};
use crate::session::{EvictionHandle, SessionId};

#[derive(Debug, Clone)]
struct ScheduledEviction {
    handle: EvictionHandle,
    at: DateTime<Utc>,
    session_id: SessionId,
    cancelled: bool,
    fired: bool,
}

/// Scheduler that never fires on its own.
///
/// Pair it with a [`ManualClock`](crate::clock::ManualClock): advance the
/// clock, then call [`take_due`](Self::take_due) and feed the evictions to
/// the controller.
#[derive(Debug, Default)]
pub struct ManualEvictionScheduler {
    entries: Mutex<Vec<ScheduledEviction>>,
    cancel_calls: AtomicUsize,
    failing: AtomicBool,
}

impl ManualEvictionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `run_at` calls fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Remove and return every live eviction due at or before `now`, earliest first
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<Eviction> {
        let mut entries = self.entries.lock();
        let mut due: Vec<&mut ScheduledEviction> = entries
            .iter_mut()
            .filter(|e| !e.cancelled && !e.fired && e.at <= now)
            .collect();
        due.sort_by_key(|e| e.at);

        due.into_iter()
            .map(|e| {
                e.fired = true;
                Eviction {
                    session_id: e.session_id.clone(),
                    handle: e.handle,
                }
            })
            .collect()
    }

    /// Total number of `run_at` calls that succeeded
    pub fn scheduled_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Number of `cancel` calls, including no-op ones
    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Scheduled evictions that have neither fired nor been cancelled
    pub fn pending_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| !e.cancelled && !e.fired)
            .count()
    }

    pub fn is_cancelled(&self, handle: &EvictionHandle) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|e| &e.handle == handle && e.cancelled)
    }

    /// The deadline a handle was scheduled for
    pub fn deadline(&self, handle: &EvictionHandle) -> Option<DateTime<Utc>> {
        self.entries
            .lock()
            .iter()
            .find(|e| &e.handle == handle)
            .map(|e| e.at)
    }
}

impl EvictionScheduler for ManualEvictionScheduler {
    fn run_at(&self, at: DateTime<Utc>, session_id: &SessionId) -> Result<EvictionHandle> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(QueueError::scheduler("manual scheduler set to fail"));
        }
        let handle = EvictionHandle::new();
        self.entries.lock().push(ScheduledEviction {
            handle,
            at,
            session_id: session_id.clone(),
            cancelled: false,
            fired: false,
        });
        Ok(handle)
    }

    fn cancel(&self, handle: &EvictionHandle) {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.iter_mut().find(|e| &e.handle == handle && !e.fired) {
            entry.cancelled = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_take_due_respects_deadline_and_cancel() {
        let scheduler = ManualEvictionScheduler::new();
        let now = Utc::now();

        let early = scheduler.run_at(now + Duration::minutes(1), &"a".into()).unwrap();
        let late = scheduler.run_at(now + Duration::minutes(5), &"b".into()).unwrap();
        let cancelled = scheduler.run_at(now + Duration::minutes(2), &"c".into()).unwrap();
        scheduler.cancel(&cancelled);

        assert!(scheduler.take_due(now).is_empty());

        let due = scheduler.take_due(now + Duration::minutes(3));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].handle, early);

        // Already fired entries are not returned twice.
        assert!(scheduler.take_due(now + Duration::minutes(3)).is_empty());

        let due = scheduler.take_due(now + Duration::minutes(10));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].handle, late);
        assert_eq!(scheduler.pending_count(), 0);
        assert!(scheduler.is_cancelled(&cancelled));
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let scheduler = ManualEvictionScheduler::new();
        let now = Utc::now();
        let handle = scheduler.run_at(now, &"a".into()).unwrap();

        assert_eq!(scheduler.take_due(now).len(), 1);
        scheduler.cancel(&handle);
        assert!(!scheduler.is_cancelled(&handle));
        assert_eq!(scheduler.cancel_calls(), 1);
    }

    #[test]
    fn test_failing_scheduler() {
        let scheduler = ManualEvictionScheduler::new();
        scheduler.set_failing(true);
        assert!(scheduler.run_at(Utc::now(), &"a".into()).is_err());
        assert_eq!(scheduler.scheduled_count(), 0);
    }
}
