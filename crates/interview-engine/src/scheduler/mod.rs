//! # Eviction Scheduling
//!
//! Every admitted session gets a forced-end callback scheduled at
//! `admitted_at + max_session_duration`. The scheduler is an external
//! collaborator behind [`EvictionScheduler`]:
//!
//! - [`TokioEvictionScheduler`] arms one sleeping tokio task per handle and
//!   delivers due evictions over an mpsc channel, which the engine's dispatch
//!   loop turns into `forced_end` calls.
//! - [`ManualEvictionScheduler`] only records what was scheduled; tests move a
//!   manual clock and pull due evictions out explicitly.
//!
//! Cancelling a handle that has not fired yet guarantees it never fires.
//! Cancelling an already fired or already cancelled handle is a no-op.

pub mod manual;
pub mod tokio_timer;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::session::{EvictionHandle, SessionId};

pub use manual::ManualEvictionScheduler;
pub use tokio_timer::TokioEvictionScheduler;

/// A forced-end callback that has come due
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    pub session_id: SessionId,
    pub handle: EvictionHandle,
}

/// Delayed-callback contract used for call eviction
pub trait EvictionScheduler: Send + Sync + 'static {
    /// Schedule a forced end of `session_id`'s call at `at`
    fn run_at(&self, at: DateTime<Utc>, session_id: &SessionId) -> Result<EvictionHandle>;

    /// Cancel a scheduled eviction. Never fails.
    fn cancel(&self, handle: &EvictionHandle);
}
