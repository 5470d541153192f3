use std::time::Duration;

use super::model::{Scope, ServiceAction};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to connect to the {scope} service manager: {reason}")]
    ConnectionFailed { scope: Scope, reason: String },

    #[error("lost connection to the service manager: {0}")]
    ConnectionLost(String),

    #[error("unit not found: {0}")]
    NotFound(String),

    #[error("{action} job for {unit} did not finish within {}s", .timeout.as_secs())]
    Timeout {
        action: ServiceAction,
        unit: String,
        timeout: Duration,
    },

    #[error("{action} job for {unit} failed with result: {verdict}")]
    BackendRejected {
        action: ServiceAction,
        unit: String,
        verdict: String,
    },

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
