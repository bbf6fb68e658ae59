use serde::{Deserialize, Serialize};

/// Live view of a voucher session held by the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub voucher_code: String,
    pub session_token: String,
    pub connected: bool,
    pub remaining_seconds: Option<u64>,
    pub device_fingerprint: Option<String>,
}

/// State transitions of consequence, surfaced to the binary for user-facing
/// notification. Transient per-tick failures never appear here.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Fresh voucher activation.
    Connected(SessionState),
    /// A stored session was restored, or the heartbeat self-healed.
    Reconnected(SessionState),
    /// Periodic status check result while connected.
    StatusUpdated { remaining_seconds: Option<u64> },
    /// Heartbeat failed repeatedly and self-healing did not recover it.
    HeartbeatLost { consecutive_failures: u32 },
    Disconnected,
    /// Backend invalidated the auth token; credentials have been cleared.
    AuthExpired,
}
