//! Portal backend API surface.
//!
//! [`PortalApi`] is the seam the session manager works against; the real
//! [`PortalClient`] implements it over HTTP, tests implement it with
//! scripted responses.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::PortalClient;

pub type PortalResult<T> = Result<T, PortalError>;

#[derive(Debug, Clone, Error)]
pub enum PortalError {
    /// The backend rejected the auth token. Stored credentials have already
    /// been cleared by the time this surfaces.
    #[error("authentication expired")]
    AuthExpired,

    /// The backend answered with a non-success HTTP status.
    #[error("portal API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("invalid portal response: {message}")]
    Decode { message: String },
}

/// Granted session after a successful reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectGrant {
    pub session_token: String,
    #[serde(default)]
    pub remaining_seconds: Option<u64>,
    /// Heartbeat cadence requested by the backend, when it specifies one.
    #[serde(default)]
    pub heartbeat_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatAck {
    #[serde(default)]
    pub remaining_seconds: Option<u64>,
}

/// Point-in-time view of a voucher session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub connected: bool,
    #[serde(default)]
    pub remaining_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpChallenge {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthTokens {
    pub token: String,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}

/// One row of the session history listing.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub voucher_code: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub active: bool,
}

#[async_trait]
pub trait PortalApi: Send + Sync {
    async fn reconnect_with_token(&self, session_token: &str) -> PortalResult<ReconnectGrant>;
    async fn reconnect_with_voucher(&self, voucher_code: &str) -> PortalResult<ReconnectGrant>;
    async fn record_heartbeat(&self, voucher_code: &str) -> PortalResult<HeartbeatAck>;
    async fn session_status(&self, voucher_code: &str) -> PortalResult<SessionStatus>;

    async fn request_otp(&self, phone_number: &str) -> PortalResult<OtpChallenge>;
    async fn verify_otp(&self, phone_number: &str, code: &str) -> PortalResult<AuthTokens>;

    async fn active_sessions(&self) -> PortalResult<Vec<SessionRecord>>;
    async fn session_history(&self) -> PortalResult<Vec<SessionRecord>>;
    async fn disconnect_session(&self, session_id: &str) -> PortalResult<()>;
}
