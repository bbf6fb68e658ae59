use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// One failed pre-flight check on a purchase request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Local pre-flight validation failed. Carries every violated field so
    /// the caller can show all problems at once.
    #[error("validation failed: {}", format_violations(violations))]
    Validation { violations: Vec<FieldViolation> },

    /// The gateway answered with a non-"success" business discriminator.
    #[error("gateway error: {message}")]
    Gateway { message: String },

    /// Transport-level failure (connect, timeout, TLS).
    #[error("network error: {message}")]
    Network { message: String },

    /// The response body could not be interpreted.
    #[error("invalid gateway response: {message}")]
    InvalidResponse { message: String },
}

impl GatewayError {
    pub fn validation(violations: Vec<FieldViolation>) -> Self {
        GatewayError::Validation { violations }
    }

    /// Best-available human message for surfacing to the user.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Validation { violations } => format_violations(violations),
            GatewayError::Gateway { message } => message.clone(),
            GatewayError::Network { .. } => {
                "Payment service is temporarily unreachable".to_string()
            }
            GatewayError::InvalidResponse { .. } => {
                "Payment service returned an unexpected response".to_string()
            }
        }
    }

    /// Transient per-tick failures are tolerated by the poller; everything
    /// else on a one-shot call is surfaced immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Network { .. } | GatewayError::InvalidResponse { .. }
        )
    }
}

fn format_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_every_field() {
        let err = GatewayError::validation(vec![
            FieldViolation {
                field: "customerName".to_string(),
                message: "is required".to_string(),
            },
            FieldViolation {
                field: "amount".to_string(),
                message: "must be positive".to_string(),
            },
        ]);
        let text = err.to_string();
        assert!(text.contains("customerName"));
        assert!(text.contains("amount"));
    }

    #[test]
    fn network_errors_are_transient() {
        assert!(GatewayError::Network {
            message: "timeout".to_string()
        }
        .is_transient());
        assert!(!GatewayError::Gateway {
            message: "declined".to_string()
        }
        .is_transient());
    }
}
