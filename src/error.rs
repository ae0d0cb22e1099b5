//! Error taxonomy for proxy checks

use crate::proxy::models::CheckStatus;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Proxy connection error: {0}")]
    Connect(String),
    #[error("Connection timeout ({}s)", .0.as_secs_f64())]
    ConnectTimeout(Duration),
    #[error("Proxy authentication failed")]
    Auth,
    #[error("Total timeout ({}s)", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("Stream froze after {bytes} bytes ({}s without data)", .silence.as_secs_f64())]
    Stall { bytes: u64, silence: Duration },
    #[error("HTTP status: {0}")]
    Status(u16),
    #[error("Body error: {0}")]
    Body(String),
    #[error("Malformed proxy line {line:?}: {reason}")]
    MalformedRecord { line: String, reason: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Status a per-proxy failure is reported as.
    pub fn status(&self) -> CheckStatus {
        match self {
            ProbeError::Auth => CheckStatus::AuthFailed,
            ProbeError::ConnectTimeout(_) | ProbeError::Timeout(_) => CheckStatus::Timeout,
            ProbeError::Stall { .. } => CheckStatus::TlsFreeze,
            ProbeError::Connect(_)
            | ProbeError::Status(_)
            | ProbeError::Body(_)
            | ProbeError::MalformedRecord { .. }
            | ProbeError::InvalidConfig(_)
            | ProbeError::Io(_) => CheckStatus::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ProbeError::Auth.status(), CheckStatus::AuthFailed);
        assert_eq!(
            ProbeError::ConnectTimeout(Duration::from_secs(10)).status(),
            CheckStatus::Timeout
        );
        assert_eq!(
            ProbeError::Stall {
                bytes: 18_000,
                silence: Duration::from_secs(5)
            }
            .status(),
            CheckStatus::TlsFreeze
        );
        assert_eq!(
            ProbeError::Connect("refused".to_string()).status(),
            CheckStatus::Error
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ProbeError::Timeout(Duration::from_secs(30)).to_string(),
            "Total timeout (30s)"
        );
        assert_eq!(ProbeError::Status(502).to_string(), "HTTP status: 502");
    }
}
