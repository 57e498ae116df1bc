use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use super::SessionStore;
use crate::error::{QueueError, Result};
use crate::session::{Session, SessionId, SessionPatch};

/// Waiting-index key: `queued_at`, then the order the enqueue was applied
type WaitingKey = (DateTime<Utc>, u64);

struct StoredSession {
    session: Session,
    waiting_key: Option<WaitingKey>,
    call_key: Option<u64>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, StoredSession>,
    waiting: BTreeMap<WaitingKey, SessionId>,
    in_call: BTreeMap<u64, SessionId>,
    next_seq: u64,
}

impl Inner {
    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Bring both indexes in line with the (already updated) record for `id`.
    fn reindex(&mut self, id: &SessionId) {
        let Some((waiting, queued_at, in_call, waiting_key, call_key)) =
            self.sessions.get(id).map(|stored| {
                (
                    stored.session.waiting,
                    stored.session.queued_at,
                    stored.session.in_call,
                    stored.waiting_key,
                    stored.call_key,
                )
            })
        else {
            return;
        };

        let new_waiting_key = match (waiting, queued_at, waiting_key) {
            (true, Some(at), Some(key)) if key.0 == at => Some(key),
            (true, Some(at), _) => Some((at, self.next_seq())),
            _ => None,
        };
        let new_call_key = match (in_call, call_key) {
            (true, Some(key)) => Some(key),
            (true, None) => Some(self.next_seq()),
            (false, _) => None,
        };

        if waiting_key != new_waiting_key {
            if let Some(old) = waiting_key {
                self.waiting.remove(&old);
            }
            if let Some(new) = new_waiting_key {
                self.waiting.insert(new, id.clone());
            }
        }
        if call_key != new_call_key {
            if let Some(old) = call_key {
                self.in_call.remove(&old);
            }
            if let Some(new) = new_call_key {
                self.in_call.insert(new, id.clone());
            }
        }

        if let Some(stored) = self.sessions.get_mut(id) {
            stored.waiting_key = new_waiting_key;
            stored.call_key = new_call_key;
        }
    }

    fn collect<'a>(&self, ids: impl Iterator<Item = &'a SessionId>) -> Vec<Session> {
        ids.filter_map(|id| self.sessions.get(id))
            .map(|stored| stored.session.clone())
            .collect()
    }
}

/// In-memory session store: an arena of records plus ordered waiting and
/// in-call indexes, all guarded by one lock.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: RwLock<Inner>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored session, in no particular order
    pub fn all(&self) -> Vec<Session> {
        self.inner
            .read()
            .sessions
            .values()
            .map(|stored| stored.session.clone())
            .collect()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: Session) -> Result<()> {
        session.check_invariants().map_err(QueueError::invariant)?;

        let mut inner = self.inner.write();
        if inner.sessions.contains_key(&session.id) {
            return Err(QueueError::store(format!(
                "session {} already exists",
                session.id
            )));
        }

        let id = session.id.clone();
        debug!("Inserting session {}", id);
        inner.sessions.insert(
            id.clone(),
            StoredSession {
                session,
                waiting_key: None,
                call_key: None,
            },
        );
        inner.reindex(&id);
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        Ok(self
            .inner
            .read()
            .sessions
            .get(id)
            .map(|stored| stored.session.clone()))
    }

    async fn list_in_call(&self) -> Result<Vec<Session>> {
        let inner = self.inner.read();
        Ok(inner.collect(inner.in_call.values()))
    }

    async fn list_waiting(&self) -> Result<Vec<Session>> {
        let inner = self.inner.read();
        Ok(inner.collect(inner.waiting.values()))
    }

    async fn patch(&self, id: &SessionId, patch: SessionPatch) -> Result<()> {
        let mut inner = self.inner.write();
        let stored = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| QueueError::not_found(id))?;

        let mut updated = stored.session.clone();
        patch.apply(&mut updated);
        updated.check_invariants().map_err(QueueError::invariant)?;
        stored.session = updated;

        inner.reindex(id);
        Ok(())
    }

    async fn count_in_call(&self) -> Result<usize> {
        Ok(self.inner.read().in_call.len())
    }
}
