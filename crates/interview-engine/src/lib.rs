//! # Interview Queue Engine
//!
//! Admission control for live applicant interviews. Applicants join a FIFO
//! queue, are matched to a fixed number of concurrent call slots, and are
//! evicted once their call has run for the configured duration.
//!
//! ## Features
//!
//! - **Admission Control**: bounded call slots with strict FIFO advancement
//! - **Scheduled Eviction**: cancelable forced-end timers per call
//! - **Wait Estimation**: discrete-event simulation over the live slot state
//! - **Pluggable Collaborators**: session store, scheduler, call provisioner
//!   and clock are traits, with in-memory and manual implementations for tests
//!
//! ## Architecture
//!
//! - [`admission`]: join / leave / forced end and FIFO advancement
//! - [`estimator`]: wait-time prediction
//! - [`heap`]: the min-heap behind the simulation
//! - [`store`]: session storage contract and in-memory store
//! - [`scheduler`]: eviction timers
//! - [`provisioner`]: call URL provisioning
//! - [`engine`]: wires everything together and dispatches evictions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use interview_engine::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut engine = InterviewQueueEngine::in_memory(InterviewQueueConfig::default())?;
//!     engine.start().await?;
//!
//!     let id = engine.create_session().await?;
//!     match engine.join(&id).await? {
//!         JoinOutcome::InCall { call_url } => println!("join the call at {}", call_url),
//!         JoinOutcome::Queued { position } => {
//!             let minutes = engine.estimate_wait(&id).await?;
//!             println!("#{} in line, about {} min", position, minutes);
//!         }
//!     }
//!
//!     engine.leave(&id).await?;
//!     engine.stop().await;
//!     Ok(())
//! }
//! ```

// Core modules
pub mod error;
pub mod config;
pub mod logging;

// Scheduling core
pub mod heap;
pub mod session;
pub mod admission;
pub mod estimator;

// Collaborators
pub mod clock;
pub mod store;
pub mod scheduler;
pub mod provisioner;

pub mod engine;

// Re-exports for convenience
pub use admission::{AdmissionController, JoinOutcome, LeaveOutcome, QueueStats};
pub use config::InterviewQueueConfig;
pub use engine::InterviewQueueEngine;
pub use error::{QueueError, Result};
pub use estimator::WaitTimeEstimator;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        AdmissionController, InterviewQueueConfig, InterviewQueueEngine, JoinOutcome,
        LeaveOutcome, QueueError, QueueStats, Result, WaitTimeEstimator,
    };

    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::{AdmissionConfig, LoggingSettings, ProvisioningConfig};
    pub use crate::provisioner::{CallProvisioner, RoomUrlProvisioner};
    pub use crate::scheduler::{
        Eviction, EvictionScheduler, ManualEvictionScheduler, TokioEvictionScheduler,
    };
    pub use crate::session::{EvictionHandle, Session, SessionId, SessionPatch, SessionState};
    pub use crate::store::{MemorySessionStore, SessionStore};

    pub use chrono::{DateTime, Utc};
}
