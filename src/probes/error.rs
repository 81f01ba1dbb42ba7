// src/probes/error.rs

/// Why a single probe reported its dependency as unhealthy.
///
/// Every variant has the same observable outcome: the probe's detail is `0`,
/// the aggregate status drops to `0` and the endpoint answers `500`.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{target} is unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    #[error("{target} is degraded: {reason}")]
    Degraded { target: String, reason: String },

    #[error("malformed configuration: {0}")]
    MalformedConfig(String),

    #[error("could not construct client for {target}: {reason}")]
    ClientConstruction { target: String, reason: String },

    #[error("{target} did not answer within {timeout_ms} ms")]
    Timeout { target: String, timeout_ms: u64 },
}

impl ProbeError {
    pub fn unreachable(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unreachable {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn degraded(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Degraded {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(target: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            target: target.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}
