use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A voucher purchase request as submitted to the payment endpoint.
///
/// Immutable once submitted; never persisted locally beyond the in-flight
/// call. `voucher_code` is a client-generated placeholder that doubles as an
/// idempotency token until the backend issues the real voucher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub customer_name: String,
    pub phone_number: String,
    pub location: String,
    pub package_id: i64,
    pub package_name: String,
    /// Whole currency units, no minor-unit scaling.
    pub amount: u64,
    pub currency: String,
    pub payment_method: String,
    pub voucher_code: String,
}

impl PaymentRequest {
    pub const DEFAULT_CURRENCY: &'static str = "TZS";
    pub const PAYMENT_METHOD: &'static str = "ZENOPAY";

    pub fn new(
        customer_name: impl Into<String>,
        phone_number: impl Into<String>,
        location: impl Into<String>,
        package_id: i64,
        package_name: impl Into<String>,
        amount: u64,
    ) -> Self {
        Self {
            customer_name: customer_name.into(),
            phone_number: phone_number.into(),
            location: location.into(),
            package_id,
            package_name: package_name.into(),
            amount,
            currency: Self::DEFAULT_CURRENCY.to_string(),
            payment_method: Self::PAYMENT_METHOD.to_string(),
            voucher_code: generate_voucher_placeholder(),
        }
    }
}

/// Generate the client-side voucher placeholder: 8 uppercase alphanumerics.
pub fn generate_voucher_placeholder() -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Closed set of payment statuses reported by the gateway, plus the
/// locally synthesized `Timeout` emitted when the attempt budget runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    /// Raw aliases: `PROCESSING`, `VERIFICATION`.
    Processing,
    /// Raw aliases: `COMPLETED`, `SUCCESS`.
    Completed,
    Failed,
    InsufficientBalance,
    InvalidPin,
    UserCancelled,
    Cancelled,
    Expired,
    Timeout,
    NetworkError,
    Error,
}

impl PaymentStatus {
    /// Parse a raw gateway status string. Case-insensitive; unknown values
    /// collapse to the generic `Error` terminal.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "PENDING" => PaymentStatus::Pending,
            "PROCESSING" | "VERIFICATION" => PaymentStatus::Processing,
            "COMPLETED" | "SUCCESS" => PaymentStatus::Completed,
            "FAILED" => PaymentStatus::Failed,
            "INSUFFICIENT_BALANCE" => PaymentStatus::InsufficientBalance,
            "INVALID_PIN" => PaymentStatus::InvalidPin,
            "USER_CANCELLED" => PaymentStatus::UserCancelled,
            "CANCELLED" => PaymentStatus::Cancelled,
            "EXPIRED" => PaymentStatus::Expired,
            "TIMEOUT" => PaymentStatus::Timeout,
            "NETWORK_ERROR" => PaymentStatus::NetworkError,
            _ => PaymentStatus::Error,
        }
    }

    /// Canonical wire spelling of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::InsufficientBalance => "INSUFFICIENT_BALANCE",
            PaymentStatus::InvalidPin => "INVALID_PIN",
            PaymentStatus::UserCancelled => "USER_CANCELLED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Expired => "EXPIRED",
            PaymentStatus::Timeout => "TIMEOUT",
            PaymentStatus::NetworkError => "NETWORK_ERROR",
            PaymentStatus::Error => "ERROR",
        }
    }

    /// Once a terminal status is observed no further transitions are
    /// expected and polling must stop.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PaymentStatus::Completed)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured reason code for terminal failures, derived from the status
/// itself rather than substring-matching the human message. Guidance text
/// hangs off the code; the message contract stays untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InsufficientBalance,
    InvalidPin,
    Cancelled,
    Expired,
    Timeout,
    Network,
    Declined,
}

impl FailureReason {
    pub fn from_status(status: PaymentStatus) -> Option<Self> {
        match status {
            PaymentStatus::InsufficientBalance => Some(FailureReason::InsufficientBalance),
            PaymentStatus::InvalidPin => Some(FailureReason::InvalidPin),
            PaymentStatus::UserCancelled | PaymentStatus::Cancelled => {
                Some(FailureReason::Cancelled)
            }
            PaymentStatus::Expired => Some(FailureReason::Expired),
            PaymentStatus::Timeout => Some(FailureReason::Timeout),
            PaymentStatus::NetworkError => Some(FailureReason::Network),
            PaymentStatus::Failed | PaymentStatus::Error => Some(FailureReason::Declined),
            _ => None,
        }
    }

    /// Actionable hint surfaced next to the gateway message.
    pub fn guidance(&self) -> &'static str {
        match self {
            FailureReason::InsufficientBalance => {
                "Top up your mobile money balance and try again"
            }
            FailureReason::InvalidPin => "Check your mobile money PIN and retry the payment",
            FailureReason::Cancelled => "The payment was cancelled; start a new purchase to retry",
            FailureReason::Expired => "The payment request expired; start a new purchase",
            FailureReason::Timeout => {
                "We could not confirm the payment in time; if you were charged, contact support"
            }
            FailureReason::Network => "Connection problem; check your signal and retry",
            FailureReason::Declined => "The payment was declined by the mobile money provider",
        }
    }
}

/// Normalized status update forwarded to consumers on every poll tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub order_id: String,
    pub status: PaymentStatus,
    pub message: String,
    pub voucher_code: Option<String>,
    pub timestamp: Option<String>,
    /// Present only for terminal failures.
    pub reason: Option<FailureReason>,
}

impl StatusEvent {
    pub fn new(order_id: impl Into<String>, status: PaymentStatus, message: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            status,
            message: message.into(),
            voucher_code: None,
            timestamp: None,
            reason: if status.is_terminal() && !status.is_success() {
                FailureReason::from_status(status)
            } else {
                None
            },
        }
    }
}

/// Outcome of a successful payment initiation.
#[derive(Debug, Clone)]
pub struct InitiationReceipt {
    pub order_id: String,
    /// Echo of the client placeholder, or the backend-assigned code.
    pub voucher_code: Option<String>,
    pub gateway_message: String,
}

// ---------------------------------------------------------------------------
// Wire envelopes
// ---------------------------------------------------------------------------

/// Body of `POST /customer-portal/payment`.
#[derive(Debug, Deserialize)]
pub(crate) struct InitiationEnvelope {
    pub status: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub voucher_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub zenopay_response: Option<JsonValue>,
}

/// Body of `GET /customer-portal/payment/status/{order_id}`.
#[derive(Debug, Deserialize)]
pub(crate) struct StatusEnvelope {
    pub status: String,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub voucher_code: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub voucher_generated: Option<bool>,
    #[serde(default)]
    pub timestamp: Option<String>,
}
