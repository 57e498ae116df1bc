use thiserror::Error;

use crate::session::SessionId;

/// Interview queue engine errors
#[derive(Error, Debug)]
pub enum QueueError {
    /// The session id is unknown to the store
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    /// Join was called for a session that already occupies a call slot
    #[error("Session {0} is already in a call")]
    AlreadyInCall(SessionId),

    /// Join was called for a session that already had a call URL assigned
    #[error("Session {0} already has a call URL")]
    AlreadyHasUrl(SessionId),

    /// The call provisioning service failed
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    /// The eviction scheduler could not schedule a callback
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// The session store rejected a read or write
    #[error("Store error: {0}")]
    Store(String),

    /// Internal state was observed in a shape that should be unreachable
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueueError {
    /// Create a new NotFound error
    pub fn not_found(id: &SessionId) -> Self {
        Self::NotFound(id.clone())
    }

    /// Create a new Provisioning error
    pub fn provisioning<S: Into<String>>(msg: S) -> Self {
        Self::Provisioning(msg.into())
    }

    /// Create a new Scheduler error
    pub fn scheduler<S: Into<String>>(msg: S) -> Self {
        Self::Scheduler(msg.into())
    }

    /// Create a new Store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new InvariantViolation error
    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Create a new Config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error signals caller misuse of `join` rather than a failure
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::AlreadyInCall(_) | Self::AlreadyHasUrl(_))
    }
}

impl From<config::ConfigError> for QueueError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for interview queue operations
pub type Result<T> = std::result::Result<T, QueueError>;
