//! Proxy data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Forward proxy endpoint with optional credentials
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyRecord {
    /// Create an anonymous proxy record
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    /// Create a proxy record with credentials. Empty strings count as absent.
    pub fn with_auth(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };
        Self {
            host: host.into(),
            port,
            username: non_empty(username.into()),
            password: non_empty(password.into()),
        }
    }

    pub fn has_auth(&self) -> bool {
        self.username.is_some() || self.password.is_some()
    }

    /// Proxy URL without credentials; they are sent as basic auth.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Get the proxy string in HOST:PORT format
    pub fn to_simple_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the proxy string in HOST:PORT:USER:PASS format. Anonymous
    /// proxies keep all four fields with empty credentials.
    pub fn to_full_string(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.host,
            self.port,
            self.username.as_deref().unwrap_or_default(),
            self.password.as_deref().unwrap_or_default()
        )
    }
}

impl fmt::Display for ProxyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_simple_string())
    }
}

/// Classification of a single proxy check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Ok,
    TlsFreeze,
    Slow,
    Timeout,
    AuthFailed,
    Error,
}

impl CheckStatus {
    pub const ALL: [CheckStatus; 6] = [
        CheckStatus::Ok,
        CheckStatus::Slow,
        CheckStatus::TlsFreeze,
        CheckStatus::Timeout,
        CheckStatus::AuthFailed,
        CheckStatus::Error,
    ];

    /// Long label used in the console report
    pub fn label(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "OK",
            CheckStatus::TlsFreeze => "TLS_FREEZE (possible DPI)",
            CheckStatus::Slow => "SLOW (possible censorship)",
            CheckStatus::Timeout => "TIMEOUT",
            CheckStatus::AuthFailed => "AUTH_FAILED",
            CheckStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::TlsFreeze => "TLS_FREEZE",
            CheckStatus::Slow => "SLOW",
            CheckStatus::Timeout => "TIMEOUT",
            CheckStatus::AuthFailed => "AUTH_FAILED",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", tag)
    }
}

/// Outcome of checking one proxy. Created once, never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub proxy: ProxyRecord,
    pub status: CheckStatus,
    pub external_ip: Option<String>,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
    pub bytes_transferred: u64,
    /// Bytes per second over the monitored download
    pub download_speed: Option<f64>,
    pub detail_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    pub fn new(proxy: ProxyRecord, status: CheckStatus, elapsed: Duration) -> Self {
        Self {
            proxy,
            status,
            external_ip: None,
            elapsed,
            bytes_transferred: 0,
            download_speed: None,
            detail_message: None,
            checked_at: Utc::now(),
        }
    }

    /// ERROR result with a human readable message
    pub fn error(proxy: ProxyRecord, message: impl Into<String>, elapsed: Duration) -> Self {
        Self::new(proxy, CheckStatus::Error, elapsed).with_detail(message)
    }

    pub fn with_external_ip(mut self, ip: Option<String>) -> Self {
        self.external_ip = ip;
        self
    }

    pub fn with_transfer(mut self, bytes: u64, speed: Option<f64>) -> Self {
        self.bytes_transferred = bytes;
        self.download_speed = speed;
        self
    }

    pub fn with_detail(mut self, message: impl Into<String>) -> Self {
        self.detail_message = Some(message.into());
        self
    }

    /// Fully working, no throttling or interference seen
    pub fn is_working(&self) -> bool {
        self.status == CheckStatus::Ok
    }

    /// Speed in KB/s for display
    pub fn speed_kbps(&self) -> Option<f64> {
        self.download_speed.map(|s| s / 1024.0)
    }
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_creation() {
        let proxy = ProxyRecord::new("127.0.0.1", 8080);
        assert_eq!(proxy.host, "127.0.0.1");
        assert_eq!(proxy.port, 8080);
        assert!(!proxy.has_auth());
    }

    #[test]
    fn test_record_with_auth() {
        let proxy = ProxyRecord::with_auth("127.0.0.1", 8080, "user", "pass");
        assert_eq!(proxy.username.as_deref(), Some("user"));
        assert_eq!(proxy.password.as_deref(), Some("pass"));
        assert_eq!(proxy.url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_empty_credentials_are_anonymous() {
        let proxy = ProxyRecord::with_auth("proxy3.example.com", 1080, "", "");
        assert!(!proxy.has_auth());
        assert_eq!(proxy.to_full_string(), "proxy3.example.com:1080::");
    }

    #[test]
    fn test_full_string() {
        let proxy = ProxyRecord::with_auth("proxy1.example.com", 8080, "user", "pass");
        assert_eq!(proxy.to_full_string(), "proxy1.example.com:8080:user:pass");
        assert_eq!(proxy.to_string(), "proxy1.example.com:8080");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(CheckStatus::TlsFreeze.to_string(), "TLS_FREEZE");
        assert_eq!(CheckStatus::Slow.label(), "SLOW (possible censorship)");
        assert_eq!(
            serde_json::to_string(&CheckStatus::AuthFailed).unwrap(),
            "\"AUTH_FAILED\""
        );
    }

    #[test]
    fn test_check_result() {
        let proxy = ProxyRecord::new("127.0.0.1", 8080);

        let result = CheckResult::new(proxy.clone(), CheckStatus::Ok, Duration::from_millis(900))
            .with_transfer(51_200, Some(102_400.0));
        assert!(result.is_working());
        assert_eq!(result.speed_kbps(), Some(100.0));

        let result = CheckResult::error(proxy, "Connection refused", Duration::ZERO);
        assert!(!result.is_working());
        assert_eq!(result.detail_message.as_deref(), Some("Connection refused"));
    }

    #[test]
    fn test_result_serializes_elapsed_as_seconds() {
        let proxy = ProxyRecord::new("127.0.0.1", 8080);
        let result = CheckResult::new(proxy, CheckStatus::Timeout, Duration::from_millis(1500));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["elapsed_secs"], 1.5);
        assert_eq!(json["status"], "TIMEOUT");
    }
}
