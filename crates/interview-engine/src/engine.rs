//! Top-level engine that wires the admission controller, the estimator and a
//! tokio eviction scheduler together and runs the eviction dispatch loop.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::admission::{AdmissionController, JoinOutcome, LeaveOutcome, QueueStats};
use crate::clock::{Clock, SystemClock};
use crate::config::InterviewQueueConfig;
use crate::error::{QueueError, Result};
use crate::estimator::WaitTimeEstimator;
use crate::provisioner::{CallProvisioner, RoomUrlProvisioner};
use crate::scheduler::{Eviction, TokioEvictionScheduler};
use crate::session::{Session, SessionId};
use crate::store::{MemorySessionStore, SessionStore};

/// Interview queue engine
///
/// Owns the collaborators and the background task that turns due evictions
/// into forced ends. Evictions that come due while the engine is stopped
/// stay buffered and are handled once it is started again.
pub struct InterviewQueueEngine {
    config: InterviewQueueConfig,
    store: Arc<dyn SessionStore>,
    controller: Arc<AdmissionController>,
    estimator: WaitTimeEstimator,
    scheduler: Arc<TokioEvictionScheduler>,
    evictions: Arc<Mutex<mpsc::UnboundedReceiver<Eviction>>>,
    dispatch_handle: Option<JoinHandle<()>>,
}

impl InterviewQueueEngine {
    /// Create an engine over the given store, provisioner and clock
    pub fn new(
        config: InterviewQueueConfig,
        store: Arc<dyn SessionStore>,
        provisioner: Arc<dyn CallProvisioner>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let (scheduler, evictions) = TokioEvictionScheduler::new(clock.clone());
        let scheduler = Arc::new(scheduler);

        let controller = Arc::new(AdmissionController::new(
            config.admission.clone(),
            store.clone(),
            scheduler.clone(),
            provisioner,
            clock.clone(),
        ));
        let estimator = WaitTimeEstimator::new(config.admission.clone(), store.clone(), clock);

        Ok(Self {
            config,
            store,
            controller,
            estimator,
            scheduler,
            evictions: Arc::new(Mutex::new(evictions)),
            dispatch_handle: None,
        })
    }

    /// Create an engine with an in-memory store and room URLs from the config
    pub fn in_memory(config: InterviewQueueConfig) -> Result<Self> {
        let provisioner = RoomUrlProvisioner::from_config(&config.provisioning)?;
        Self::new(
            config,
            Arc::new(MemorySessionStore::new()),
            Arc::new(provisioner),
            Arc::new(SystemClock),
        )
    }

    /// Start dispatching due evictions, including any that came due while
    /// the engine was stopped
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(QueueError::invariant("engine already started"));
        }

        let evictions = self.evictions.clone();
        let controller = self.controller.clone();
        self.dispatch_handle = Some(tokio::spawn(async move {
            Self::eviction_loop(controller, evictions).await;
        }));

        info!("✅ Interview queue engine started");
        Ok(())
    }

    /// Stop the dispatch loop. Timers keep running; their evictions are
    /// held until the next `start`.
    pub async fn stop(&mut self) {
        info!("🛑 Stopping interview queue engine...");
        if let Some(handle) = self.dispatch_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        info!("✅ Interview queue engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.dispatch_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    async fn eviction_loop(
        controller: Arc<AdmissionController>,
        evictions: Arc<Mutex<mpsc::UnboundedReceiver<Eviction>>>,
    ) {
        let mut evictions = evictions.lock().await;
        while let Some(eviction) = evictions.recv().await {
            match controller
                .forced_end(&eviction.session_id, &eviction.handle)
                .await
            {
                Ok(outcome) => debug!(
                    "Eviction {} handled: cleared={}, admitted={:?}",
                    eviction.handle, outcome.cleared, outcome.admitted
                ),
                Err(e) => error!(
                    "❌ Eviction {} for {} failed: {}",
                    eviction.handle, eviction.session_id, e
                ),
            }
        }
        debug!("Eviction channel closed");
    }

    pub fn config(&self) -> &InterviewQueueConfig {
        &self.config
    }

    pub fn controller(&self) -> &Arc<AdmissionController> {
        &self.controller
    }

    pub fn estimator(&self) -> &WaitTimeEstimator {
        &self.estimator
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Number of evictions armed and not yet fired or cancelled
    pub fn pending_evictions(&self) -> usize {
        self.scheduler.pending_count()
    }

    /// Register a new idle session
    pub async fn create_session(&self) -> Result<SessionId> {
        let session = Session::new(SessionId::new());
        let id = session.id.clone();
        self.store.insert(session).await?;
        Ok(id)
    }

    pub async fn session(&self, id: &SessionId) -> Result<Session> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| QueueError::not_found(id))
    }

    pub async fn join(&self, id: &SessionId) -> Result<JoinOutcome> {
        self.controller.join(id).await
    }

    pub async fn leave(&self, id: &SessionId) -> Result<LeaveOutcome> {
        self.controller.leave(id).await
    }

    /// Predicted wait in whole minutes
    pub async fn estimate_wait(&self, id: &SessionId) -> Result<u64> {
        self.estimator.estimate_wait(id).await
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        self.controller.stats().await
    }
}
