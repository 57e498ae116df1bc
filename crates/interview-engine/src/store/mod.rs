//! # Session Store
//!
//! The persistent session store is an external collaborator. The admission
//! controller and the estimator only talk to it through [`SessionStore`]:
//! point reads by id, the two ordered secondary listings, and partial
//! updates.
//!
//! [`MemorySessionStore`] is an in-process implementation used by the engine
//! binary and the test suites. It keeps the records in an arena with two
//! ordered indexes that are updated in the same critical section as the
//! record itself, so every `patch` is applied atomically.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::session::{Session, SessionId, SessionPatch};

pub use memory::MemorySessionStore;

/// Storage contract consumed by the queue engine
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Insert a new session record
    async fn insert(&self, session: Session) -> Result<()>;

    /// Fetch a session by id
    async fn get(&self, id: &SessionId) -> Result<Option<Session>>;

    /// All sessions occupying a call slot, ordered by slot entry ascending
    async fn list_in_call(&self) -> Result<Vec<Session>>;

    /// All waiting sessions, ordered by `queued_at` ascending
    async fn list_waiting(&self) -> Result<Vec<Session>>;

    /// Apply a partial update to an existing session
    async fn patch(&self, id: &SessionId, patch: SessionPatch) -> Result<()>;

    /// Number of sessions currently in a call
    async fn count_in_call(&self) -> Result<usize> {
        Ok(self.list_in_call().await?.len())
    }
}
