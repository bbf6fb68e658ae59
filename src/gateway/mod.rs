pub mod client;
pub mod error;
pub mod types;

pub use client::{GatewayClient, StatusSource};
pub use error::{FieldViolation, GatewayError, GatewayResult};
pub use types::{FailureReason, InitiationReceipt, PaymentRequest, PaymentStatus, StatusEvent};
