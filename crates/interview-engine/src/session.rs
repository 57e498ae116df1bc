//! Interview session records and the partial updates applied to them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an interview session
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(format!("session-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Cancelable handle for a scheduled forced-end callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvictionHandle(pub Uuid);

impl EvictionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EvictionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EvictionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eviction-{}", self.0)
    }
}

/// Where a session currently sits in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Neither queued nor in a call
    Idle,
    /// FIFO-queued for a call slot
    Waiting,
    /// Occupying one of the concurrent call slots
    InCall,
}

/// A single applicant interview session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub waiting: bool,
    pub in_call: bool,
    /// First time the session entered the waiting state
    pub queued_at: Option<DateTime<Utc>>,
    pub call_url: Option<String>,
    /// When the call will be forcibly ended
    pub scheduled_end_time: Option<DateTime<Utc>>,
    pub eviction_handle: Option<EvictionHandle>,
    /// When the session took its call slot
    pub admitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a fresh session in the idle state
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            waiting: false,
            in_call: false,
            queued_at: None,
            call_url: None,
            scheduled_end_time: None,
            eviction_handle: None,
            admitted_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.in_call {
            SessionState::InCall
        } else if self.waiting {
            SessionState::Waiting
        } else {
            SessionState::Idle
        }
    }

    /// Check the record-level invariants every reachable state must satisfy.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.waiting && self.in_call {
            return Err(format!("{} is both waiting and in a call", self.id));
        }
        if self.in_call
            && (self.call_url.is_none()
                || self.scheduled_end_time.is_none()
                || self.eviction_handle.is_none())
        {
            return Err(format!(
                "{} is in a call without url, end time and eviction handle",
                self.id
            ));
        }
        if self.waiting && self.queued_at.is_none() {
            return Err(format!("{} is waiting without queued_at", self.id));
        }
        Ok(())
    }
}

/// Partial update applied to a stored session.
///
/// `None` leaves a field untouched; for nullable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub waiting: Option<bool>,
    pub in_call: Option<bool>,
    pub queued_at: Option<Option<DateTime<Utc>>>,
    pub call_url: Option<Option<String>>,
    pub scheduled_end_time: Option<Option<DateTime<Utc>>>,
    pub eviction_handle: Option<Option<EvictionHandle>>,
    pub admitted_at: Option<Option<DateTime<Utc>>>,
}

impl SessionPatch {
    /// Put the session on the waiting list at `queued_at`
    pub fn enqueue(queued_at: DateTime<Utc>) -> Self {
        Self {
            waiting: Some(true),
            in_call: Some(false),
            queued_at: Some(Some(queued_at)),
            ..Default::default()
        }
    }

    /// Move the session into a call slot. `queued_at` is left as is.
    pub fn enter_call(
        call_url: String,
        admitted_at: DateTime<Utc>,
        scheduled_end_time: DateTime<Utc>,
        eviction_handle: EvictionHandle,
    ) -> Self {
        Self {
            waiting: Some(false),
            in_call: Some(true),
            call_url: Some(Some(call_url)),
            scheduled_end_time: Some(Some(scheduled_end_time)),
            eviction_handle: Some(Some(eviction_handle)),
            admitted_at: Some(Some(admitted_at)),
            ..Default::default()
        }
    }

    /// Return the session to the idle state, clearing every call and queue field
    pub fn clear() -> Self {
        Self {
            waiting: Some(false),
            in_call: Some(false),
            queued_at: Some(None),
            call_url: Some(None),
            scheduled_end_time: Some(None),
            eviction_handle: Some(None),
            admitted_at: Some(None),
        }
    }

    pub fn apply(&self, session: &mut Session) {
        if let Some(waiting) = self.waiting {
            session.waiting = waiting;
        }
        if let Some(in_call) = self.in_call {
            session.in_call = in_call;
        }
        if let Some(queued_at) = self.queued_at {
            session.queued_at = queued_at;
        }
        if let Some(call_url) = &self.call_url {
            session.call_url = call_url.clone();
        }
        if let Some(end) = self.scheduled_end_time {
            session.scheduled_end_time = end;
        }
        if let Some(handle) = self.eviction_handle {
            session.eviction_handle = handle;
        }
        if let Some(admitted_at) = self.admitted_at {
            session.admitted_at = admitted_at;
        }
    }
}
