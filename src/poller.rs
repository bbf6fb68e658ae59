//! Payment status poller.
//!
//! Drives the wait between "payment initiated" and "voucher issued": polls
//! the status endpoint on a fixed cadence, forwards every normalized update
//! to the subscriber, and stops on the first terminal status, on
//! cancellation, or when the attempt budget runs out (in which case a
//! synthetic `TIMEOUT` update is emitted).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::PollerSettings;
use crate::gateway::types::StatusEvent;
use crate::gateway::{PaymentStatus, StatusSource};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 60,
        }
    }
}

impl From<&PollerSettings> for PollerConfig {
    fn from(settings: &PollerSettings) -> Self {
        Self {
            interval: settings.interval,
            max_attempts: settings.max_attempts,
        }
    }
}

/// Subscriber end of one polling watch.
///
/// Receive updates from `events`; call [`PollHandle::cancel`] to stop the
/// watch early. Cancellation is final: no update is delivered after it, not
/// even one already in flight inside the poll loop.
pub struct PollHandle {
    pub events: mpsc::UnboundedReceiver<StatusEvent>,
    cancel_tx: watch::Sender<bool>,
    active: bool,
}

impl PollHandle {
    /// Whether this handle actually started a watch. `false` means a watch
    /// for the same order id was already running and this handle is inert.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Stop the watch. Idempotent; safe on an inert handle.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    fn inert() -> Self {
        let (cancel_tx, _) = watch::channel(false);
        let (_, events) = mpsc::unbounded_channel();
        Self {
            events,
            cancel_tx,
            active: false,
        }
    }
}

/// Registry-owning poller. One watch per order id at a time; a second
/// `watch` call for an in-flight order returns an inert handle instead of
/// spawning a duplicate loop.
#[derive(Clone)]
pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    active: Arc<Mutex<HashSet<String>>>,
    config: PollerConfig,
}

impl StatusPoller {
    pub fn new(source: Arc<dyn StatusSource>, config: PollerConfig) -> Self {
        Self {
            source,
            active: Arc::new(Mutex::new(HashSet::new())),
            config,
        }
    }

    /// Begin watching an order. The first status check happens one interval
    /// after the call, not immediately.
    pub fn watch(&self, order_id: impl Into<String>) -> PollHandle {
        let order_id = order_id.into();

        let guard = match ActiveGuard::acquire(&self.active, &order_id) {
            Some(guard) => guard,
            None => {
                debug!(order_id = %order_id, "watch already in flight, ignoring");
                return PollHandle::inert();
            }
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let source = Arc::clone(&self.source);
        let config = self.config.clone();
        tokio::spawn(async move {
            poll_loop(source, order_id, config, event_tx, cancel_rx, guard).await;
        });

        PollHandle {
            events: event_rx,
            cancel_tx,
            active: true,
        }
    }
}

async fn poll_loop(
    source: Arc<dyn StatusSource>,
    order_id: String,
    config: PollerConfig,
    events: mpsc::UnboundedSender<StatusEvent>,
    mut cancel_rx: watch::Receiver<bool>,
    _guard: ActiveGuard,
) {
    info!(order_id = %order_id, "payment watch started");

    for attempt in 1..=config.max_attempts {
        tokio::select! {
            _ = cancel_rx.changed() => {
                info!(order_id = %order_id, "payment watch cancelled");
                return;
            }
            _ = tokio::time::sleep(config.interval) => {}
        }

        // A failed check never kills the watch; the next tick retries.
        let event = match source.fetch_status(&order_id).await {
            Ok(event) => event,
            Err(err) => {
                warn!(order_id = %order_id, attempt, error = %err, "status check failed, will retry");
                continue;
            }
        };

        // The fetch may have raced a cancellation; never deliver after it.
        if *cancel_rx.borrow() {
            info!(order_id = %order_id, "payment watch cancelled");
            return;
        }

        let terminal = event.status.is_terminal();
        let status = event.status;
        if events.send(event).is_err() {
            debug!(order_id = %order_id, "subscriber dropped, stopping watch");
            return;
        }

        if terminal {
            info!(order_id = %order_id, status = %status, "payment reached terminal status");
            return;
        }
    }

    // Budget exhausted without a terminal status from the gateway.
    if *cancel_rx.borrow() {
        return;
    }
    warn!(order_id = %order_id, attempts = config.max_attempts, "payment watch timed out");
    let mut timeout = StatusEvent::new(
        order_id,
        PaymentStatus::Timeout,
        "Payment confirmation timed out. If you were charged, your voucher will be delivered shortly.",
    );
    timeout.timestamp = Some(chrono::Utc::now().to_rfc3339());
    let _ = events.send(timeout);
}

/// Releases the order id from the in-flight registry exactly once, on every
/// exit path of the poll loop.
struct ActiveGuard {
    registry: Arc<Mutex<HashSet<String>>>,
    order_id: String,
}

impl ActiveGuard {
    fn acquire(registry: &Arc<Mutex<HashSet<String>>>, order_id: &str) -> Option<Self> {
        let mut active = registry.lock().ok()?;
        if !active.insert(order_id.to_string()) {
            return None;
        }
        Some(Self {
            registry: Arc::clone(registry),
            order_id: order_id.to_string(),
        })
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.registry.lock() {
            active.remove(&self.order_id);
        }
    }
}
