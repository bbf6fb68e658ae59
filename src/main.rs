use std::sync::Arc;

use tokio::signal;
use tracing::{info, warn};

use ggwifi_portal::api::PortalClient;
use ggwifi_portal::config::AgentConfig;
use ggwifi_portal::logging::init_tracing;
use ggwifi_portal::session::{SessionEvent, SessionManager, SessionStore};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AgentConfig::from_env()?;
    config.validate()?;
    info!(base_url = %config.portal.base_url, "portal agent starting");

    let store = Arc::new(SessionStore::open(&config.state_path)?);
    let client = Arc::new(PortalClient::new(
        &config.portal.base_url,
        config.portal.request_timeout,
        Arc::clone(&store),
    )?);

    let (manager, mut events) =
        SessionManager::new(client, Arc::clone(&store), config.monitor.clone());
    let manager = Arc::new(manager);

    // Surface session transitions as log lines; transient tick failures stay
    // inside the manager.
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Connected(state) => {
                    info!(voucher = %state.voucher_code, "session connected");
                }
                SessionEvent::Reconnected(state) => {
                    info!(voucher = %state.voucher_code, "session reconnected");
                }
                SessionEvent::StatusUpdated { remaining_seconds } => {
                    info!(?remaining_seconds, "session status updated");
                }
                SessionEvent::HeartbeatLost {
                    consecutive_failures,
                } => {
                    warn!(consecutive_failures, "heartbeat lost, connection may be down");
                }
                SessionEvent::Disconnected => {
                    info!("session disconnected");
                }
                SessionEvent::AuthExpired => {
                    warn!("authentication expired, sign in again");
                }
            }
        }
    });

    if manager.restore_session().await {
        info!("previous session restored");
    } else {
        info!("no session restored, waiting for activation");
    }

    shutdown_signal().await;

    manager.shutdown();
    event_task.abort();
    info!("portal agent stopped");

    Ok(())
}
