//! Error types for transaction orchestration.

use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::TransportError;

/// Business input rejected before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("amount is required")]
    MissingAmount,

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(String),
}

/// Failure inside the gateway. Never returned from the business
/// operations, which turn it into a system error response instead.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("host communication failed: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("gateway is shutting down")]
    ShuttingDown,
}
