//! HTTP implementation of [`PortalApi`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use super::{
    AuthTokens, HeartbeatAck, OtpChallenge, PortalApi, PortalError, PortalResult, ReconnectGrant,
    SessionRecord, SessionStatus,
};
use crate::session::store::SessionStore;

#[derive(Clone)]
pub struct PortalClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<SessionStore>,
}

impl PortalClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        store: Arc<SessionStore>,
    ) -> PortalResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortalError::Network {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = self.store.auth_token() {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Send the request and decode the body. HTTP 401 anywhere in the API
    /// clears the stored credentials before surfacing as `AuthExpired`.
    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> PortalResult<T> {
        let response = builder.send().await.map_err(|e| PortalError::Network {
            message: format!("request failed: {e}"),
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("portal rejected credentials, clearing stored auth");
            self.store.clear_credentials().ok();
            return Err(PortalError::AuthExpired);
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());
            return Err(PortalError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response.json().await.map_err(|e| PortalError::Decode {
            message: format!("response was not valid JSON: {e}"),
        })
    }

    fn fingerprint(&self) -> Option<String> {
        self.store.device_fingerprint()
    }
}

#[async_trait]
impl PortalApi for PortalClient {
    async fn reconnect_with_token(&self, session_token: &str) -> PortalResult<ReconnectGrant> {
        debug!("attempting token reconnection");
        let body = json!({
            "sessionToken": session_token,
            "deviceFingerprint": self.fingerprint(),
        });
        self.send_json(
            self.request(Method::POST, "/customer/sessions/reconnect")
                .json(&body),
        )
        .await
    }

    async fn reconnect_with_voucher(&self, voucher_code: &str) -> PortalResult<ReconnectGrant> {
        debug!(voucher = %voucher_code, "attempting voucher reconnection");
        let body = json!({
            "voucherCode": voucher_code,
            "deviceFingerprint": self.fingerprint(),
        });
        self.send_json(
            self.request(Method::POST, "/customer/sessions/reconnect")
                .json(&body),
        )
        .await
    }

    async fn record_heartbeat(&self, voucher_code: &str) -> PortalResult<HeartbeatAck> {
        let body = json!({
            "voucherCode": voucher_code,
            "deviceFingerprint": self.fingerprint(),
        });
        self.send_json(
            self.request(Method::POST, "/customer/sessions/heartbeat")
                .json(&body),
        )
        .await
    }

    async fn session_status(&self, voucher_code: &str) -> PortalResult<SessionStatus> {
        self.send_json(self.request(
            Method::GET,
            &format!("/customer/sessions/status/{voucher_code}"),
        ))
        .await
    }

    async fn request_otp(&self, phone_number: &str) -> PortalResult<OtpChallenge> {
        let body = json!({ "phoneNumber": phone_number });
        self.send_json(
            self.request(Method::POST, "/customer-auth/request-otp")
                .json(&body),
        )
        .await
    }

    async fn verify_otp(&self, phone_number: &str, code: &str) -> PortalResult<AuthTokens> {
        let body = json!({ "phoneNumber": phone_number, "otp": code });
        let tokens: AuthTokens = self
            .send_json(
                self.request(Method::POST, "/customer-auth/verify-otp")
                    .json(&body),
            )
            .await?;
        self.store
            .set_auth(&tokens.token, tokens.user.clone())
            .map_err(|e| PortalError::Decode {
                message: format!("failed to persist credentials: {e}"),
            })?;
        Ok(tokens)
    }

    async fn active_sessions(&self) -> PortalResult<Vec<SessionRecord>> {
        self.send_json(self.request(Method::GET, "/customer/sessions/active"))
            .await
    }

    async fn session_history(&self) -> PortalResult<Vec<SessionRecord>> {
        self.send_json(self.request(Method::GET, "/customer/sessions/history"))
            .await
    }

    async fn disconnect_session(&self, session_id: &str) -> PortalResult<()> {
        let response = self
            .request(
                Method::POST,
                &format!("/customer/sessions/{session_id}/disconnect"),
            )
            .send()
            .await
            .map_err(|e| PortalError::Network {
                message: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.store.clear_credentials().ok();
            return Err(PortalError::AuthExpired);
        }
        if !status.is_success() {
            return Err(PortalError::Api {
                status: status.as_u16(),
                message: format!("disconnect rejected with HTTP {status}"),
            });
        }
        Ok(())
    }
}
