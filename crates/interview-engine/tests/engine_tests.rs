//! End-to-end engine tests on paused tokio time with real eviction timers.

use std::time::Duration;

use interview_engine::prelude::*;

fn one_minute_calls(max_concurrent_calls: usize) -> InterviewQueueConfig {
    let mut config = InterviewQueueConfig::default();
    config.admission.max_concurrent_calls = max_concurrent_calls;
    config.admission.max_session_duration_secs = 60;
    config
}

async fn started(max_concurrent_calls: usize) -> InterviewQueueEngine {
    let mut engine = InterviewQueueEngine::in_memory(one_minute_calls(max_concurrent_calls)).unwrap();
    engine.start().await.unwrap();
    engine
}

#[tokio::test(start_paused = true)]
async fn test_call_is_evicted_and_next_admitted() {
    let mut engine = started(1).await;
    let a = engine.create_session().await.unwrap();
    let b = engine.create_session().await.unwrap();

    assert!(matches!(engine.join(&a).await.unwrap(), JoinOutcome::InCall { .. }));
    assert_eq!(
        engine.join(&b).await.unwrap(),
        JoinOutcome::Queued { position: 1 }
    );
    assert_eq!(engine.pending_evictions(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;

    let a_after = engine.session(&a).await.unwrap();
    assert_eq!(a_after.state(), SessionState::Idle);
    assert!(a_after.call_url.is_none());

    let b_after = engine.session(&b).await.unwrap();
    assert_eq!(b_after.state(), SessionState::InCall);
    assert!(b_after.call_url.unwrap().starts_with("https://calls.localhost/rooms/"));
    assert_eq!(engine.pending_evictions(), 1);

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_leave_cancels_pending_eviction() {
    let mut engine = started(1).await;
    let a = engine.create_session().await.unwrap();
    let b = engine.create_session().await.unwrap();
    engine.join(&a).await.unwrap();
    engine.join(&b).await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    let outcome = engine.leave(&a).await.unwrap();
    assert_eq!(outcome.admitted, vec![b.clone()]);
    assert_eq!(engine.pending_evictions(), 1);

    // Past a's original deadline: b keeps its slot.
    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(engine.session(&b).await.unwrap().state(), SessionState::InCall);

    // Past b's own deadline.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(engine.session(&b).await.unwrap().state(), SessionState::Idle);
    assert_eq!(engine.pending_evictions(), 0);

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_queue_drains_through_evictions() {
    let mut engine = started(2).await;
    let mut ids = Vec::new();
    for _ in 0..5 {
        let id = engine.create_session().await.unwrap();
        engine.join(&id).await.unwrap();
        ids.push(id);
    }
    assert_eq!(engine.stats().await.unwrap().waiting, 3);

    tokio::time::sleep(Duration::from_secs(61)).await;
    let stats = engine.stats().await.unwrap();
    assert_eq!((stats.in_call, stats.waiting), (2, 1));
    assert_eq!(engine.session(&ids[2]).await.unwrap().state(), SessionState::InCall);
    assert_eq!(engine.session(&ids[3]).await.unwrap().state(), SessionState::InCall);

    tokio::time::sleep(Duration::from_secs(60)).await;
    let stats = engine.stats().await.unwrap();
    assert_eq!((stats.in_call, stats.waiting), (1, 0));
    assert_eq!(engine.session(&ids[4]).await.unwrap().state(), SessionState::InCall);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(engine.stats().await.unwrap().in_call, 0);

    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_evictions_due_while_stopped_run_on_restart() {
    let mut engine = started(1).await;
    let a = engine.create_session().await.unwrap();
    let b = engine.create_session().await.unwrap();
    engine.join(&a).await.unwrap();
    engine.join(&b).await.unwrap();

    engine.stop().await;
    assert!(!engine.is_running());

    // a's timer fires while nobody dispatches it.
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(engine.pending_evictions(), 0);
    assert_eq!(engine.session(&a).await.unwrap().state(), SessionState::InCall);

    engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(engine.session(&a).await.unwrap().state(), SessionState::Idle);
    assert_eq!(engine.session(&b).await.unwrap().state(), SessionState::InCall);
    assert_eq!(engine.pending_evictions(), 1);

    engine.stop().await;
}

#[tokio::test]
async fn test_engine_restarts() {
    let mut engine = started(1).await;
    engine.stop().await;
    engine.stop().await;

    engine.start().await.unwrap();
    assert!(engine.is_running());
    engine.stop().await;
}

#[tokio::test]
async fn test_start_twice_fails() {
    let mut engine = started(1).await;
    assert!(engine.is_running());

    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, QueueError::InvariantViolation(_)));

    engine.stop().await;
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = InterviewQueueConfig::default();
    config.admission.max_concurrent_calls = 0;

    let err = InterviewQueueEngine::in_memory(config).err().unwrap();
    assert!(matches!(err, QueueError::Config(_)));
}

#[tokio::test]
async fn test_unknown_session_lookup() {
    let engine = InterviewQueueEngine::in_memory(InterviewQueueConfig::default()).unwrap();
    let err = engine.session(&SessionId::from("ghost")).await.unwrap_err();
    assert!(matches!(err, QueueError::NotFound(_)));
}
