//! HTTP client for the customer-portal payment gateway.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::error::{FieldViolation, GatewayError, GatewayResult};
use super::types::{
    InitiationEnvelope, InitiationReceipt, PaymentRequest, PaymentStatus, StatusEnvelope,
    StatusEvent,
};

/// Anything that can answer "what is the status of this order" for the
/// poller. Split out so poller tests can script responses without a server.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, order_id: &str) -> GatewayResult<StatusEvent>;
}

/// Client for the payment initiation and status endpoints.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Submit a voucher purchase. Validation failures are collected in
    /// aggregate; nothing leaves the process until the request is clean.
    pub async fn initiate(&self, request: &PaymentRequest) -> GatewayResult<InitiationReceipt> {
        let request = normalized(request);
        let violations = validate_request(&request);
        if !violations.is_empty() {
            return Err(GatewayError::validation(violations));
        }

        let url = format!("{}/customer-portal/payment", self.base_url);
        info!(
            package_id = request.package_id,
            amount = request.amount,
            "initiating payment"
        );

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Network {
                message: format!("payment request failed: {e}"),
            })?;

        let envelope: InitiationEnvelope =
            response.json().await.map_err(|e| GatewayError::InvalidResponse {
                message: format!("payment response was not valid JSON: {e}"),
            })?;

        // The discriminator is exact; "Success" or "SUCCESS" is a failure.
        if envelope.status != "success" {
            let message = envelope
                .message
                .unwrap_or_else(|| "Payment initiation failed".to_string());
            warn!(status = %envelope.status, "gateway rejected payment");
            return Err(GatewayError::Gateway { message });
        }

        let order_id = envelope.order_id.ok_or_else(|| GatewayError::InvalidResponse {
            message: "gateway reported success without an order id".to_string(),
        })?;

        info!(order_id = %order_id, "payment initiated");

        Ok(InitiationReceipt {
            order_id,
            voucher_code: envelope.voucher_code,
            gateway_message: envelope
                .message
                .unwrap_or_else(|| "Payment initiated".to_string()),
        })
    }

    /// Relay a raw gateway callback payload to the backend webhook endpoint.
    /// Used by deployments where the mobile-money provider cannot reach the
    /// backend directly.
    pub async fn relay_webhook(&self, payload: &serde_json::Value) -> GatewayResult<()> {
        let url = format!("{}/customer-portal/webhook/zenopay", self.base_url);

        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| GatewayError::Network {
                message: format!("webhook relay failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::Gateway {
                message: format!("webhook relay rejected with HTTP {}", response.status()),
            });
        }

        debug!("webhook payload relayed");
        Ok(())
    }
}

#[async_trait]
impl StatusSource for GatewayClient {
    async fn fetch_status(&self, order_id: &str) -> GatewayResult<StatusEvent> {
        let url = format!(
            "{}/customer-portal/payment/status/{}",
            self.base_url, order_id
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Network {
                message: format!("status request failed: {e}"),
            })?;

        let envelope: StatusEnvelope =
            response.json().await.map_err(|e| GatewayError::InvalidResponse {
                message: format!("status response was not valid JSON: {e}"),
            })?;

        let event = normalize_status(envelope, order_id)?;
        debug!(order_id = %event.order_id, status = %event.status, "status fetched");
        Ok(event)
    }
}

/// Turn a status envelope into a normalized event. The envelope-level
/// discriminator only gates extraction of the nested payment status; it is
/// never itself interpreted as a payment status.
fn normalize_status(envelope: StatusEnvelope, order_id: &str) -> GatewayResult<StatusEvent> {
    if envelope.status != "success" {
        return Err(GatewayError::Gateway {
            message: envelope
                .message
                .unwrap_or_else(|| "status check failed".to_string()),
        });
    }

    let raw_status = envelope
        .payment_status
        .ok_or_else(|| GatewayError::InvalidResponse {
            message: "status response is missing payment_status".to_string(),
        })?;
    let status = PaymentStatus::parse(&raw_status);

    let mut event = StatusEvent::new(
        envelope.order_id.unwrap_or_else(|| order_id.to_string()),
        status,
        envelope
            .message
            .unwrap_or_else(|| status.as_str().to_string()),
    );
    event.voucher_code = envelope.voucher_code;
    event.timestamp = envelope.timestamp;
    Ok(event)
}

fn normalized(request: &PaymentRequest) -> PaymentRequest {
    let mut request = request.clone();
    request.customer_name = request.customer_name.trim().to_string();
    request.phone_number = request.phone_number.trim().to_string();
    request.location = request.location.trim().to_string();
    request
}

/// Run every pre-flight check and return all violations at once.
fn validate_request(request: &PaymentRequest) -> Vec<FieldViolation> {
    let mut violations = Vec::new();

    if request.customer_name.is_empty() {
        violations.push(FieldViolation {
            field: "customerName".to_string(),
            message: "is required".to_string(),
        });
    }
    if request.phone_number.is_empty() {
        violations.push(FieldViolation {
            field: "phoneNumber".to_string(),
            message: "is required".to_string(),
        });
    }
    if request.location.is_empty() {
        violations.push(FieldViolation {
            field: "location".to_string(),
            message: "is required".to_string(),
        });
    }
    if request.package_id <= 0 {
        violations.push(FieldViolation {
            field: "packageId".to_string(),
            message: "must be a positive identifier".to_string(),
        });
    }
    if request.amount == 0 {
        violations.push(FieldViolation {
            field: "amount".to_string(),
            message: "must be positive".to_string(),
        });
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> PaymentRequest {
        PaymentRequest::new(
            "Jane",
            "+255742844024",
            "Dar es Salaam",
            1,
            "Daily Unlimited",
            2000,
        )
    }

    #[test]
    fn valid_request_has_no_violations() {
        assert!(validate_request(&valid_request()).is_empty());
    }

    #[test]
    fn every_missing_field_is_reported_at_once() {
        let mut request = valid_request();
        request.customer_name = String::new();
        request.phone_number = String::new();
        request.location = String::new();
        request.package_id = 0;
        request.amount = 0;

        let violations = validate_request(&request);
        assert_eq!(violations.len(), 5);

        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert!(fields.contains(&"customerName"));
        assert!(fields.contains(&"phoneNumber"));
        assert!(fields.contains(&"location"));
        assert!(fields.contains(&"packageId"));
        assert!(fields.contains(&"amount"));
    }

    #[test]
    fn whitespace_only_fields_are_rejected_after_trimming() {
        let mut request = valid_request();
        request.customer_name = "   ".to_string();
        let request = normalized(&request);
        let violations = validate_request(&request);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "customerName");
    }

    fn envelope(json: &str) -> StatusEnvelope {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn status_requires_nested_payment_status() {
        // A bare acknowledgment must never read as a paid order.
        let err = normalize_status(
            envelope(r#"{"status":"success","message":"status check acknowledged"}"#),
            "ORD1",
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse { .. }));
        // Transient, so the poller retries the tick instead of surfacing it.
        assert!(err.is_transient());
    }

    #[test]
    fn non_success_status_envelope_is_a_failed_tick() {
        let result = normalize_status(
            envelope(r#"{"status":"error","message":"order not found"}"#),
            "ORD1",
        );
        match result {
            Err(GatewayError::Gateway { message }) => assert_eq!(message, "order not found"),
            other => panic!("expected Gateway error, got {other:?}"),
        }
    }

    #[test]
    fn success_envelope_normalizes_nested_payment_status() {
        let event = normalize_status(
            envelope(
                r#"{"status":"success","payment_status":"COMPLETED","message":"Paid","voucher_code":"AB12CD"}"#,
            ),
            "ORD1",
        )
        .unwrap();
        assert_eq!(event.status, PaymentStatus::Completed);
        assert_eq!(event.order_id, "ORD1");
        assert_eq!(event.voucher_code.as_deref(), Some("AB12CD"));
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let client =
            GatewayClient::new("https://api.ggwifi.example/", Duration::from_secs(10)).unwrap();
        assert_eq!(client.base_url, "https://api.ggwifi.example");
    }
}
