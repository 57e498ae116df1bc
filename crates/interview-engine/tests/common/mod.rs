//! Shared helpers for the interview engine integration tests.
//!
//! Everything runs against a manual clock and a manual eviction scheduler, so
//! tests decide exactly when time passes and when evictions fire.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use interview_engine::prelude::*;

/// Provisioner that hands out numbered URLs and can be told to fail
#[derive(Debug, Default)]
pub struct FakeProvisioner {
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl FakeProvisioner {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `generate_url` calls, failed ones included
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallProvisioner for FakeProvisioner {
    async fn generate_url(&self, session: &Session) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(QueueError::provisioning("upstream video service unavailable"));
        }
        Ok(format!("https://calls.test/{}/{}", session.id, n))
    }
}

/// Memory store whose writes can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MemorySessionStore,
    failing_patches: AtomicBool,
}

impl FlakyStore {
    /// Make subsequent `patch` calls fail without touching any record
    pub fn set_failing_patches(&self, failing: bool) {
        self.failing_patches.store(failing, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<Session> {
        self.inner.all()
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn insert(&self, session: Session) -> Result<()> {
        self.inner.insert(session).await
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        self.inner.get(id).await
    }

    async fn list_in_call(&self) -> Result<Vec<Session>> {
        self.inner.list_in_call().await
    }

    async fn list_waiting(&self) -> Result<Vec<Session>> {
        self.inner.list_waiting().await
    }

    async fn patch(&self, id: &SessionId, patch: SessionPatch) -> Result<()> {
        if self.failing_patches.load(Ordering::SeqCst) {
            return Err(QueueError::store("session store unavailable"));
        }
        self.inner.patch(id, patch).await
    }

    async fn count_in_call(&self) -> Result<usize> {
        self.inner.count_in_call().await
    }
}

/// Controller, estimator and every collaborator, wired to a manual clock
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<FlakyStore>,
    pub scheduler: Arc<ManualEvictionScheduler>,
    pub provisioner: Arc<FakeProvisioner>,
    pub controller: AdmissionController,
    pub estimator: WaitTimeEstimator,
    pub config: AdmissionConfig,
}

impl Harness {
    pub fn new(max_concurrent_calls: usize, session_minutes: u64) -> Self {
        let config = AdmissionConfig {
            max_concurrent_calls,
            max_session_duration_secs: session_minutes * 60,
        };
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(FlakyStore::default());
        let scheduler = Arc::new(ManualEvictionScheduler::new());
        let provisioner = Arc::new(FakeProvisioner::default());

        let controller = AdmissionController::new(
            config.clone(),
            store.clone(),
            scheduler.clone(),
            provisioner.clone(),
            clock.clone(),
        );
        let estimator = WaitTimeEstimator::new(config.clone(), store.clone(), clock.clone());

        Self {
            clock,
            store,
            scheduler,
            provisioner,
            controller,
            estimator,
            config,
        }
    }

    /// Insert idle sessions with the given ids
    pub async fn sessions(&self, names: &[&str]) -> Vec<SessionId> {
        let mut ids = Vec::new();
        for name in names {
            let id = SessionId::from(*name);
            self.store.insert(Session::new(id.clone())).await.unwrap();
            ids.push(id);
        }
        ids
    }

    pub async fn get(&self, id: &SessionId) -> Session {
        self.store.get(id).await.unwrap().unwrap()
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.clock.advance(Duration::minutes(minutes));
    }

    /// Fire every eviction due at the current manual time
    pub async fn fire_due(&self) -> Vec<LeaveOutcome> {
        let mut outcomes = Vec::new();
        for eviction in self.scheduler.take_due(self.clock.now()) {
            outcomes.push(
                self.controller
                    .forced_end(&eviction.session_id, &eviction.handle)
                    .await
                    .unwrap(),
            );
        }
        outcomes
    }

    pub async fn in_call_ids(&self) -> Vec<SessionId> {
        self.store
            .list_in_call()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect()
    }

    pub async fn waiting_ids(&self) -> Vec<SessionId> {
        self.store
            .list_waiting()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect()
    }

    /// Check the global and per-record invariants over the whole store
    pub async fn assert_invariants(&self) {
        let all = self.store.all();
        for session in &all {
            session.check_invariants().unwrap();
        }
        let in_call = all.iter().filter(|s| s.in_call).count();
        assert!(
            in_call <= self.config.max_concurrent_calls,
            "{} sessions in call with {} slots",
            in_call,
            self.config.max_concurrent_calls
        );
        assert_eq!(in_call, self.store.count_in_call().await.unwrap());
        assert_eq!(
            all.iter().filter(|s| s.waiting).count(),
            self.store.list_waiting().await.unwrap().len()
        );
    }
}
