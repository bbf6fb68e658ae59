//! Session lifecycle manager.
//!
//! Restores a previously active session on startup (token first, voucher
//! fallback), then keeps it alive with a heartbeat and a periodic status
//! check. Heartbeat failures are self-healed by reconnecting with the
//! voucher code; only sustained failure is surfaced as an event.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{PortalApi, PortalError, ReconnectGrant};
use crate::config::MonitorSettings;

use super::fingerprint;
use super::store::SessionStore;
use super::types::{SessionEvent, SessionState};

pub struct SessionManager {
    api: Arc<dyn PortalApi>,
    store: Arc<SessionStore>,
    settings: MonitorSettings,
    events: mpsc::UnboundedSender<SessionEvent>,
    monitors: Mutex<Option<MonitorHandles>>,
}

struct MonitorHandles {
    voucher: String,
    shutdown_tx: Arc<watch::Sender<bool>>,
    heartbeat: JoinHandle<()>,
    status: JoinHandle<()>,
}

impl MonitorHandles {
    fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        self.heartbeat.abort();
        self.status.abort();
    }
}

impl SessionManager {
    pub fn new(
        api: Arc<dyn PortalApi>,
        store: Arc<SessionStore>,
        settings: MonitorSettings,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                api,
                store,
                settings,
                events,
                monitors: Mutex::new(None),
            },
            event_rx,
        )
    }

    /// Attempt to restore a stored session. Token-based reconnection is
    /// tried first; if it fails for any reason the voucher code path is
    /// attempted. Returns whether a session is live afterwards.
    pub async fn restore_session(&self) -> bool {
        if let Err(e) = fingerprint::ensure_fingerprint(&self.store) {
            warn!(error = %e, "could not persist device fingerprint");
        }

        let voucher = match self.store.voucher_code() {
            Some(voucher) => voucher,
            None => {
                debug!("no stored voucher, nothing to restore");
                return false;
            }
        };

        if let Some(token) = self.store.session_token() {
            match self.api.reconnect_with_token(&token).await {
                Ok(grant) => {
                    info!("session restored via token");
                    self.activate(&voucher, grant, true).await;
                    return true;
                }
                Err(PortalError::AuthExpired) => {
                    self.emit(SessionEvent::AuthExpired);
                }
                Err(e) => {
                    warn!(error = %e, "token reconnection failed, trying voucher");
                }
            }
        }

        match self.api.reconnect_with_voucher(&voucher).await {
            Ok(grant) => {
                info!(voucher = %voucher, "session restored via voucher");
                self.activate(&voucher, grant, true).await;
                true
            }
            Err(e) => {
                warn!(error = %e, "voucher reconnection failed");
                false
            }
        }
    }

    /// Begin a session for a freshly activated voucher.
    pub async fn connect(&self, voucher_code: &str, grant: ReconnectGrant) {
        self.activate(voucher_code, grant, false).await;
    }

    /// Tear down monitors and forget the stored session.
    pub fn disconnect(&self) {
        self.stop_monitors();
        if let Err(e) = self.store.clear_session() {
            warn!(error = %e, "failed to clear stored session");
        }
        self.emit(SessionEvent::Disconnected);
        info!("session disconnected");
    }

    /// Stop all timers without touching stored state. Called on shutdown so
    /// the session can be restored on the next start.
    pub fn shutdown(&self) {
        self.stop_monitors();
    }

    async fn activate(&self, voucher: &str, grant: ReconnectGrant, reconnected: bool) {
        if let Err(e) = self.store.set_session(&grant.session_token, voucher) {
            warn!(error = %e, "failed to persist session");
        }

        // Immediate status check so the first remaining-time figure does not
        // wait a full monitor interval.
        let remaining = match self.api.session_status(voucher).await {
            Ok(status) => status.remaining_seconds,
            Err(e) => {
                warn!(error = %e, "initial status check failed");
                grant.remaining_seconds
            }
        };

        let heartbeat_interval = grant
            .heartbeat_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(self.settings.heartbeat_fallback);
        self.start_monitors(voucher, heartbeat_interval);

        let state = SessionState {
            voucher_code: voucher.to_string(),
            session_token: grant.session_token,
            connected: true,
            remaining_seconds: remaining,
            device_fingerprint: self.store.device_fingerprint(),
        };
        self.emit(if reconnected {
            SessionEvent::Reconnected(state)
        } else {
            SessionEvent::Connected(state)
        });
    }

    /// Start (or restart) the heartbeat and status monitor for a voucher.
    /// Any prior monitors are stopped first so timers never multiply.
    fn start_monitors(&self, voucher: &str, heartbeat_interval: Duration) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);

        // Each loop also holds the sender: auth expiry or a backend-reported
        // session end observed by one timer must stop its sibling too.
        let heartbeat = tokio::spawn(heartbeat_loop(
            Arc::clone(&self.api),
            Arc::clone(&self.store),
            self.events.clone(),
            voucher.to_string(),
            heartbeat_interval,
            self.settings.heartbeat_failure_threshold,
            shutdown_rx.clone(),
            Arc::clone(&shutdown_tx),
        ));
        let status = tokio::spawn(status_loop(
            Arc::clone(&self.api),
            Arc::clone(&self.store),
            self.events.clone(),
            voucher.to_string(),
            self.settings.status_interval,
            shutdown_rx,
            Arc::clone(&shutdown_tx),
        ));

        let handles = MonitorHandles {
            voucher: voucher.to_string(),
            shutdown_tx,
            heartbeat,
            status,
        };

        let mut slot = self
            .monitors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(prev) = slot.replace(handles) {
            debug!(voucher = %prev.voucher, "replacing session monitors");
            prev.stop();
        }
    }

    fn stop_monitors(&self) {
        let mut slot = self
            .monitors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handles) = slot.take() {
            handles.stop();
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[allow(clippy::too_many_arguments)]
async fn heartbeat_loop(
    api: Arc<dyn PortalApi>,
    store: Arc<SessionStore>,
    events: mpsc::UnboundedSender<SessionEvent>,
    voucher: String,
    interval: Duration,
    failure_threshold: u32,
    mut shutdown_rx: watch::Receiver<bool>,
    stop_all: Arc<watch::Sender<bool>>,
) {
    info!(voucher = %voucher, interval_secs = interval.as_secs(), "heartbeat started");
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!(voucher = %voucher, "heartbeat stopped");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        match api.record_heartbeat(&voucher).await {
            Ok(_) => {
                failures = 0;
                debug!(voucher = %voucher, "heartbeat recorded");
            }
            Err(PortalError::AuthExpired) => {
                let _ = stop_all.send(true);
                let _ = events.send(SessionEvent::AuthExpired);
                return;
            }
            Err(e) => {
                warn!(voucher = %voucher, error = %e, "heartbeat failed, attempting reconnect");
                match api.reconnect_with_voucher(&voucher).await {
                    Ok(grant) => {
                        failures = 0;
                        if let Err(e) = store.set_session(&grant.session_token, &voucher) {
                            warn!(error = %e, "failed to persist refreshed session");
                        }
                        info!(voucher = %voucher, "session self-healed after heartbeat failure");
                        let _ = events.send(SessionEvent::Reconnected(SessionState {
                            voucher_code: voucher.clone(),
                            session_token: grant.session_token,
                            connected: true,
                            remaining_seconds: grant.remaining_seconds,
                            device_fingerprint: store.device_fingerprint(),
                        }));
                    }
                    Err(reconnect_err) => {
                        failures += 1;
                        warn!(
                            voucher = %voucher,
                            error = %reconnect_err,
                            consecutive_failures = failures,
                            "self-heal reconnect failed"
                        );
                        if failures == failure_threshold {
                            let _ = events.send(SessionEvent::HeartbeatLost {
                                consecutive_failures: failures,
                            });
                        }
                    }
                }
            }
        }
    }
}

async fn status_loop(
    api: Arc<dyn PortalApi>,
    store: Arc<SessionStore>,
    events: mpsc::UnboundedSender<SessionEvent>,
    voucher: String,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    stop_all: Arc<watch::Sender<bool>>,
) {
    info!(voucher = %voucher, interval_secs = interval.as_secs(), "status monitor started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!(voucher = %voucher, "status monitor stopped");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        match api.session_status(&voucher).await {
            Ok(status) if status.connected => {
                let _ = events.send(SessionEvent::StatusUpdated {
                    remaining_seconds: status.remaining_seconds,
                });
            }
            Ok(_) => {
                info!(voucher = %voucher, "backend reports session ended");
                let _ = stop_all.send(true);
                if let Err(e) = store.clear_session() {
                    warn!(error = %e, "failed to clear stored session");
                }
                let _ = events.send(SessionEvent::Disconnected);
                return;
            }
            Err(PortalError::AuthExpired) => {
                let _ = stop_all.send(true);
                let _ = events.send(SessionEvent::AuthExpired);
                return;
            }
            Err(e) => {
                warn!(voucher = %voucher, error = %e, "status check failed");
            }
        }
    }
}
