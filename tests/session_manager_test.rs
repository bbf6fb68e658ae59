//! Session restoration, heartbeat self-healing, and teardown tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ggwifi_portal::api::{
    AuthTokens, HeartbeatAck, OtpChallenge, PortalApi, PortalError, PortalResult, ReconnectGrant,
    SessionRecord, SessionStatus,
};
use ggwifi_portal::config::MonitorSettings;
use ggwifi_portal::session::{SessionEvent, SessionManager, SessionStore};

/// Portal mock with per-endpoint canned results that tests can swap while
/// virtual time is stopped.
struct MockPortal {
    token_result: Mutex<PortalResult<ReconnectGrant>>,
    voucher_result: Mutex<PortalResult<ReconnectGrant>>,
    heartbeat_result: Mutex<PortalResult<HeartbeatAck>>,
    status_result: Mutex<PortalResult<SessionStatus>>,
    token_calls: AtomicUsize,
    voucher_calls: AtomicUsize,
    heartbeat_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl MockPortal {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            token_result: Mutex::new(Ok(grant("tok-from-token"))),
            voucher_result: Mutex::new(Ok(grant("tok-from-voucher"))),
            heartbeat_result: Mutex::new(Ok(HeartbeatAck {
                remaining_seconds: Some(3600),
            })),
            status_result: Mutex::new(Ok(SessionStatus {
                connected: true,
                remaining_seconds: Some(3600),
            })),
            token_calls: AtomicUsize::new(0),
            voucher_calls: AtomicUsize::new(0),
            heartbeat_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        })
    }

    fn set_token_result(&self, result: PortalResult<ReconnectGrant>) {
        *self.token_result.lock().unwrap() = result;
    }

    fn set_voucher_result(&self, result: PortalResult<ReconnectGrant>) {
        *self.voucher_result.lock().unwrap() = result;
    }

    fn set_heartbeat_result(&self, result: PortalResult<HeartbeatAck>) {
        *self.heartbeat_result.lock().unwrap() = result;
    }

    fn set_status_result(&self, result: PortalResult<SessionStatus>) {
        *self.status_result.lock().unwrap() = result;
    }
}

fn grant(token: &str) -> ReconnectGrant {
    ReconnectGrant {
        session_token: token.to_string(),
        remaining_seconds: Some(3600),
        heartbeat_interval_secs: None,
    }
}

fn api_error() -> PortalError {
    PortalError::Api {
        status: 500,
        message: "backend unavailable".to_string(),
    }
}

#[async_trait]
impl PortalApi for MockPortal {
    async fn reconnect_with_token(&self, _token: &str) -> PortalResult<ReconnectGrant> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.token_result.lock().unwrap().clone()
    }

    async fn reconnect_with_voucher(&self, _voucher: &str) -> PortalResult<ReconnectGrant> {
        self.voucher_calls.fetch_add(1, Ordering::SeqCst);
        self.voucher_result.lock().unwrap().clone()
    }

    async fn record_heartbeat(&self, _voucher: &str) -> PortalResult<HeartbeatAck> {
        self.heartbeat_calls.fetch_add(1, Ordering::SeqCst);
        self.heartbeat_result.lock().unwrap().clone()
    }

    async fn session_status(&self, _voucher: &str) -> PortalResult<SessionStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.status_result.lock().unwrap().clone()
    }

    async fn request_otp(&self, _phone: &str) -> PortalResult<OtpChallenge> {
        Err(api_error())
    }

    async fn verify_otp(&self, _phone: &str, _code: &str) -> PortalResult<AuthTokens> {
        Err(api_error())
    }

    async fn active_sessions(&self) -> PortalResult<Vec<SessionRecord>> {
        Ok(vec![])
    }

    async fn session_history(&self) -> PortalResult<Vec<SessionRecord>> {
        Ok(vec![])
    }

    async fn disconnect_session(&self, _id: &str) -> PortalResult<()> {
        Ok(())
    }
}

fn settings() -> MonitorSettings {
    MonitorSettings {
        status_interval: Duration::from_secs(30),
        heartbeat_fallback: Duration::from_secs(60),
        heartbeat_failure_threshold: 3,
    }
}

fn seeded_store() -> Arc<SessionStore> {
    let store = SessionStore::in_memory();
    store.set_session("stored-token", "AB12CD34").unwrap();
    Arc::new(store)
}

async fn next_event(
    events: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(300), events.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event channel closed")
}

/// Like [`next_event`] but skips the periodic `StatusUpdated` ticks that
/// interleave with the event under test.
async fn next_transition(
    events: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
) -> SessionEvent {
    loop {
        match next_event(events).await {
            SessionEvent::StatusUpdated { .. } => continue,
            other => return other,
        }
    }
}

const HEARTBEAT: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn token_reconnection_is_preferred() {
    let api = MockPortal::new();
    let store = seeded_store();
    let (manager, mut events) = SessionManager::new(api.clone(), store.clone(), settings());

    assert!(manager.restore_session().await);
    assert_eq!(api.token_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.voucher_calls.load(Ordering::SeqCst), 0);

    match next_event(&mut events).await {
        SessionEvent::Reconnected(state) => {
            assert_eq!(state.voucher_code, "AB12CD34");
            assert_eq!(state.session_token, "tok-from-token");
            assert!(state.connected);
        }
        other => panic!("expected Reconnected, got {other:?}"),
    }

    assert_eq!(store.session_token().as_deref(), Some("tok-from-token"));
    manager.shutdown();
}

#[tokio::test(start_paused = true)]
async fn voucher_fallback_runs_when_token_fails() {
    let api = MockPortal::new();
    api.set_token_result(Err(api_error()));
    let store = seeded_store();
    let (manager, mut events) = SessionManager::new(api.clone(), store.clone(), settings());

    assert!(manager.restore_session().await);
    assert_eq!(api.token_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.voucher_calls.load(Ordering::SeqCst), 1);

    match next_event(&mut events).await {
        SessionEvent::Reconnected(state) => {
            assert_eq!(state.session_token, "tok-from-voucher");
        }
        other => panic!("expected Reconnected, got {other:?}"),
    }

    // Status monitoring began: the activation check plus one interval tick.
    let initial = api.status_calls.load(Ordering::SeqCst);
    assert!(initial >= 1);
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(api.status_calls.load(Ordering::SeqCst) > initial);
    manager.shutdown();
}

#[tokio::test(start_paused = true)]
async fn restore_fails_when_both_paths_fail() {
    let api = MockPortal::new();
    api.set_token_result(Err(api_error()));
    api.set_voucher_result(Err(api_error()));
    let (manager, _events) = SessionManager::new(api.clone(), seeded_store(), settings());

    assert!(!manager.restore_session().await);
    // No monitors were started.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(api.heartbeat_calls.load(Ordering::SeqCst), 0);
    manager.shutdown();
}

#[tokio::test(start_paused = true)]
async fn restore_is_a_no_op_without_stored_voucher() {
    let api = MockPortal::new();
    let (manager, _events) =
        SessionManager::new(api.clone(), Arc::new(SessionStore::in_memory()), settings());

    assert!(!manager.restore_session().await);
    assert_eq!(api.token_calls.load(Ordering::SeqCst), 0);
    assert_eq!(api.voucher_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_failure_self_heals_via_voucher() {
    let api = MockPortal::new();
    let store = seeded_store();
    let (manager, mut events) = SessionManager::new(api.clone(), store.clone(), settings());

    assert!(manager.restore_session().await);
    let SessionEvent::Reconnected(_) = next_event(&mut events).await else {
        panic!("expected initial Reconnected");
    };

    api.set_heartbeat_result(Err(PortalError::Network {
        message: "no route to host".to_string(),
    }));

    tokio::time::sleep(HEARTBEAT + Duration::from_secs(1)).await;
    assert!(api.heartbeat_calls.load(Ordering::SeqCst) >= 1);
    // The failed heartbeat triggered an automatic voucher reconnect.
    assert!(api.voucher_calls.load(Ordering::SeqCst) >= 1);

    match next_transition(&mut events).await {
        SessionEvent::Reconnected(state) => {
            assert_eq!(state.session_token, "tok-from-voucher");
        }
        other => panic!("expected self-heal Reconnected, got {other:?}"),
    }
    assert_eq!(store.session_token().as_deref(), Some("tok-from-voucher"));
    manager.shutdown();
}

#[tokio::test(start_paused = true)]
async fn sustained_heartbeat_failure_surfaces_once() {
    let api = MockPortal::new();
    let (manager, mut events) = SessionManager::new(api.clone(), seeded_store(), settings());

    assert!(manager.restore_session().await);
    let SessionEvent::Reconnected(_) = next_event(&mut events).await else {
        panic!("expected initial Reconnected");
    };

    // Heartbeat and the self-heal reconnect both keep failing.
    api.set_heartbeat_result(Err(PortalError::Network {
        message: "no route to host".to_string(),
    }));
    api.set_voucher_result(Err(api_error()));

    tokio::time::sleep(HEARTBEAT * 3 + Duration::from_secs(1)).await;

    match next_transition(&mut events).await {
        SessionEvent::HeartbeatLost {
            consecutive_failures,
        } => assert_eq!(consecutive_failures, 3),
        other => panic!("expected HeartbeatLost, got {other:?}"),
    }

    // Further failures do not repeat the event.
    tokio::time::sleep(HEARTBEAT * 5).await;
    while let Ok(event) = events.try_recv() {
        assert!(
            matches!(event, SessionEvent::StatusUpdated { .. }),
            "unexpected repeat event: {event:?}"
        );
    }
    manager.shutdown();
}

#[tokio::test(start_paused = true)]
async fn auth_expiry_during_restore_falls_back_to_voucher() {
    let api = MockPortal::new();
    api.set_token_result(Err(PortalError::AuthExpired));
    let (manager, mut events) = SessionManager::new(api.clone(), seeded_store(), settings());

    assert!(manager.restore_session().await);

    let SessionEvent::AuthExpired = next_transition(&mut events).await else {
        panic!("expected AuthExpired");
    };
    let SessionEvent::Reconnected(_) = next_transition(&mut events).await else {
        panic!("expected voucher Reconnected after auth expiry");
    };
    manager.shutdown();
}

#[tokio::test(start_paused = true)]
async fn auth_expiry_stops_both_monitors() {
    let api = MockPortal::new();
    let (manager, mut events) = SessionManager::new(api.clone(), seeded_store(), settings());

    assert!(manager.restore_session().await);
    let SessionEvent::Reconnected(_) = next_event(&mut events).await else {
        panic!("expected initial Reconnected");
    };

    api.set_heartbeat_result(Err(PortalError::AuthExpired));
    tokio::time::sleep(HEARTBEAT + Duration::from_secs(1)).await;

    let SessionEvent::AuthExpired = next_transition(&mut events).await else {
        panic!("expected AuthExpired");
    };

    // The status monitor must die with the heartbeat, not keep ticking.
    let statuses = api.status_calls.load(Ordering::SeqCst);
    let heartbeats = api.heartbeat_calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(api.status_calls.load(Ordering::SeqCst), statuses);
    assert_eq!(api.heartbeat_calls.load(Ordering::SeqCst), heartbeats);
}

#[tokio::test(start_paused = true)]
async fn ended_session_is_cleared_and_reported() {
    let api = MockPortal::new();
    let store = seeded_store();
    let (manager, mut events) = SessionManager::new(api.clone(), store.clone(), settings());

    assert!(manager.restore_session().await);
    let SessionEvent::Reconnected(_) = next_event(&mut events).await else {
        panic!("expected initial Reconnected");
    };

    api.set_status_result(Ok(SessionStatus {
        connected: false,
        remaining_seconds: None,
    }));
    tokio::time::sleep(Duration::from_secs(31)).await;

    loop {
        match next_event(&mut events).await {
            SessionEvent::StatusUpdated { .. } => continue,
            SessionEvent::Disconnected => break,
            other => panic!("expected Disconnected, got {other:?}"),
        }
    }
    assert!(store.session_token().is_none());
    assert!(store.voucher_code().is_none());

    // The heartbeat dies with the ended session.
    let heartbeats = api.heartbeat_calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(api.heartbeat_calls.load(Ordering::SeqCst), heartbeats);
    manager.shutdown();
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_all_timers() {
    let api = MockPortal::new();
    let (manager, mut events) = SessionManager::new(api.clone(), seeded_store(), settings());

    assert!(manager.restore_session().await);
    let SessionEvent::Reconnected(_) = next_event(&mut events).await else {
        panic!("expected initial Reconnected");
    };

    manager.shutdown();
    let heartbeats = api.heartbeat_calls.load(Ordering::SeqCst);
    let statuses = api.status_calls.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(api.heartbeat_calls.load(Ordering::SeqCst), heartbeats);
    assert_eq!(api.status_calls.load(Ordering::SeqCst), statuses);
}

#[tokio::test(start_paused = true)]
async fn disconnect_clears_stored_session() {
    let api = MockPortal::new();
    let store = seeded_store();
    let (manager, mut events) = SessionManager::new(api.clone(), store.clone(), settings());

    assert!(manager.restore_session().await);
    let SessionEvent::Reconnected(_) = next_event(&mut events).await else {
        panic!("expected initial Reconnected");
    };

    manager.disconnect();
    let SessionEvent::Disconnected = next_transition(&mut events).await else {
        panic!("expected Disconnected");
    };
    assert!(store.session_token().is_none());
    assert!(store.voucher_code().is_none());
}
