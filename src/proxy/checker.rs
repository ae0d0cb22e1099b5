//! Proxy checker: one end-to-end check per proxy

use crate::error::ProbeError;
use crate::proxy::models::{CheckResult, CheckStatus, ProxyRecord};
use crate::proxy::monitor::{instant_after, StallWindow, StreamMonitor, Verdict};
use crate::proxy::transport::{BodyStream, FetchResponse, ReqwestTransport, Transport};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// Default connect timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default cap on a whole check in seconds
const DEFAULT_TOTAL_TIMEOUT_SECS: u64 = 30;

/// Default number of concurrent checks
const DEFAULT_CONCURRENCY: usize = 5;

/// Byte range in which silence means a mid-transfer freeze
const DEFAULT_STALL_WINDOW: (u64, u64) = (14_000, 25_000);

const DEFAULT_STALL_SILENCE_SECS: u64 = 5;

const DEFAULT_SLOW_TIME_SECS: u64 = 15;

/// Bytes per second
const DEFAULT_SLOW_SPEED: f64 = 50.0 * 1024.0;

/// Endpoints that echo the caller's IP, tried in order
const DEFAULT_IP_URLS: [&str; 2] = [
    "https://httpbin.org/ip",
    "https://api.ipify.org?format=json",
];

/// Downloads large enough to cross the stall window, tried in order
const DEFAULT_PAYLOAD_URLS: [&str; 2] = [
    "https://httpbin.org/bytes/51200",
    "https://www.google.com/",
];

/// Upper bound on an IP echo response
const MAX_IP_BODY: usize = 64 * 1024;

/// Longest accepted timeout, silence or slow-time setting
const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration shared read-only by every check
#[derive(Debug, Clone)]
pub struct CheckConfig {
    pub connect_timeout: Duration,
    /// Hard cap on a whole check, both phases included
    pub total_timeout: Duration,
    pub stall_window: StallWindow,
    pub stall_silence: Duration,
    pub slow_time: Duration,
    /// Bytes per second at or below which a transfer is slow
    pub slow_speed: f64,
    pub concurrency: usize,
    pub ip_urls: Vec<String>,
    pub payload_urls: Vec<String>,
    pub verify_tls: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            total_timeout: Duration::from_secs(DEFAULT_TOTAL_TIMEOUT_SECS),
            stall_window: StallWindow::new(DEFAULT_STALL_WINDOW.0, DEFAULT_STALL_WINDOW.1),
            stall_silence: Duration::from_secs(DEFAULT_STALL_SILENCE_SECS),
            slow_time: Duration::from_secs(DEFAULT_SLOW_TIME_SECS),
            slow_speed: DEFAULT_SLOW_SPEED,
            concurrency: DEFAULT_CONCURRENCY,
            ip_urls: DEFAULT_IP_URLS.iter().map(|u| u.to_string()).collect(),
            payload_urls: DEFAULT_PAYLOAD_URLS.iter().map(|u| u.to_string()).collect(),
            verify_tls: false,
        }
    }
}

impl CheckConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = timeout;
        self
    }

    pub fn with_stall_window(mut self, low: u64, high: u64) -> Self {
        self.stall_window = StallWindow::new(low, high);
        self
    }

    pub fn with_stall_silence(mut self, silence: Duration) -> Self {
        self.stall_silence = silence;
        self
    }

    pub fn with_slow_time(mut self, slow_time: Duration) -> Self {
        self.slow_time = slow_time;
        self
    }

    /// Threshold in bytes per second
    pub fn with_slow_speed(mut self, bytes_per_sec: f64) -> Self {
        self.slow_speed = bytes_per_sec;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_ip_urls(mut self, urls: Vec<String>) -> Self {
        self.ip_urls = urls;
        self
    }

    pub fn with_payload_urls(mut self, urls: Vec<String>) -> Self {
        self.payload_urls = urls;
        self
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Reject settings no check could run with
    pub fn validate(&self) -> Result<(), ProbeError> {
        let invalid = |msg: &str| Err(ProbeError::InvalidConfig(msg.to_string()));

        if self.concurrency == 0 {
            return invalid("concurrency must be at least 1");
        }
        if self.connect_timeout.is_zero() || self.total_timeout.is_zero() {
            return invalid("timeouts must be positive");
        }
        if self.stall_silence.is_zero() {
            return invalid("stall silence must be positive");
        }
        let durations = [
            self.connect_timeout,
            self.total_timeout,
            self.stall_silence,
            self.slow_time,
        ];
        if durations.iter().any(|d| *d > MAX_DURATION) {
            return invalid("durations must not exceed 24h");
        }
        if self.stall_window.low > self.stall_window.high {
            return invalid("stall window low bound exceeds high bound");
        }
        if !self.slow_speed.is_finite() || self.slow_speed < 0.0 {
            return invalid("slow speed must be a non-negative number");
        }
        if self.ip_urls.is_empty() {
            return invalid("at least one IP URL is required");
        }
        Ok(())
    }
}

/// Anything that turns a proxy into exactly one result
#[async_trait]
pub trait ProxyCheck: Send + Sync + 'static {
    async fn check(&self, proxy: &ProxyRecord) -> CheckResult;
}

/// What a check learned before it was classified
struct Findings {
    ip: String,
    verdict: Option<Verdict>,
}

/// Proxy checker for classifying proxies
#[derive(Clone)]
pub struct ProxyChecker {
    config: Arc<CheckConfig>,
    transport: Arc<dyn Transport>,
}

impl ProxyChecker {
    /// Create a checker that goes over the network with reqwest
    pub fn new(config: CheckConfig) -> Self {
        let transport = Arc::new(ReqwestTransport::from_config(&config));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: CheckConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    /// Check a single proxy. Never fails: every error becomes a status.
    pub async fn check_proxy(&self, proxy: &ProxyRecord) -> CheckResult {
        let started = Instant::now();
        let deadline = instant_after(started, self.config.total_timeout);
        debug!("Checking {}", proxy);

        let outcome = self.inspect(proxy, deadline).await;
        let elapsed = started.elapsed();

        let result = match outcome {
            Ok(Findings {
                ip,
                verdict: Some(verdict),
            }) => {
                let mut result = CheckResult::new(proxy.clone(), verdict.status, elapsed)
                    .with_external_ip(Some(ip))
                    .with_transfer(verdict.bytes, verdict.speed);
                result.detail_message = verdict.detail;
                result
            }
            Ok(Findings { ip, verdict: None }) => {
                let status = if elapsed >= self.config.slow_time {
                    CheckStatus::Slow
                } else {
                    CheckStatus::Ok
                };
                CheckResult::new(proxy.clone(), status, elapsed)
                    .with_external_ip(Some(ip))
                    .with_detail("Speed test unavailable")
            }
            Err(e) => {
                CheckResult::new(proxy.clone(), e.status(), elapsed).with_detail(e.to_string())
            }
        };

        debug!("{} -> {}", proxy, result.status);
        result
    }

    async fn inspect(
        &self,
        proxy: &ProxyRecord,
        deadline: Instant,
    ) -> Result<Findings, ProbeError> {
        let ip = self.fetch_external_ip(proxy, deadline).await?;
        let verdict = self.measure_download(proxy, deadline).await?;
        Ok(Findings { ip, verdict })
    }

    /// Open a request, bounded by the check deadline. 407 is an auth failure.
    async fn open(
        &self,
        proxy: &ProxyRecord,
        url: &str,
        deadline: Instant,
    ) -> Result<FetchResponse, ProbeError> {
        let response = timeout_at(deadline, self.transport.fetch(proxy, url))
            .await
            .map_err(|_| ProbeError::Timeout(self.config.total_timeout))??;

        if response.status == 407 {
            return Err(ProbeError::Auth);
        }
        Ok(response)
    }

    /// Connectivity check: the first IP endpoint that answers wins
    async fn fetch_external_ip(
        &self,
        proxy: &ProxyRecord,
        deadline: Instant,
    ) -> Result<String, ProbeError> {
        let mut last_error = None;

        for url in &self.config.ip_urls {
            match self.fetch_ip(proxy, url, deadline).await {
                Ok(ip) => return Ok(ip),
                Err(e @ (ProbeError::Auth | ProbeError::Timeout(_))) => return Err(e),
                Err(e) => {
                    debug!("{}: {} failed: {}", proxy, url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e @ ProbeError::ConnectTimeout(_)) => e,
            Some(e) => ProbeError::Connect(format!("Failed to get IP through proxy ({})", e)),
            None => ProbeError::InvalidConfig("no IP URLs configured".to_string()),
        })
    }

    async fn fetch_ip(
        &self,
        proxy: &ProxyRecord,
        url: &str,
        deadline: Instant,
    ) -> Result<String, ProbeError> {
        let mut response = self.open(proxy, url, deadline).await?;
        if !(200..300).contains(&response.status) {
            return Err(ProbeError::Status(response.status));
        }

        let body = self.read_body(response.body.as_mut(), deadline).await?;
        let json: Value =
            serde_json::from_slice(&body).map_err(|e| ProbeError::Body(e.to_string()))?;

        ["origin", "ip"]
            .iter()
            .find_map(|key| json.get(*key).and_then(Value::as_str))
            .map(|ip| ip.trim().to_string())
            .ok_or_else(|| ProbeError::Body("no IP in response".to_string()))
    }

    async fn read_body(
        &self,
        body: &mut dyn BodyStream,
        deadline: Instant,
    ) -> Result<Vec<u8>, ProbeError> {
        let mut buf = Vec::new();
        loop {
            let chunk = timeout_at(deadline, body.next_chunk())
                .await
                .map_err(|_| ProbeError::Timeout(self.config.total_timeout))??;
            match chunk {
                Some(chunk) if buf.len() + chunk.len() > MAX_IP_BODY => {
                    return Err(ProbeError::Body("IP response too large".to_string()));
                }
                Some(chunk) => buf.extend_from_slice(&chunk),
                None => return Ok(buf),
            }
        }
    }

    /// Speed and freeze test. The first payload URL that opens is final;
    /// `None` when none of them could be opened.
    async fn measure_download(
        &self,
        proxy: &ProxyRecord,
        deadline: Instant,
    ) -> Result<Option<Verdict>, ProbeError> {
        for url in &self.config.payload_urls {
            let started = Instant::now();
            let mut response = match self.open(proxy, url, deadline).await {
                Ok(response) if (200..300).contains(&response.status) => response,
                Ok(response) => {
                    debug!("{}: {} answered {}", proxy, url, response.status);
                    continue;
                }
                Err(e @ (ProbeError::Auth | ProbeError::Timeout(_))) => return Err(e),
                Err(e) => {
                    debug!("{}: {} failed: {}", proxy, url, e);
                    continue;
                }
            };

            let monitor = StreamMonitor::new(&self.config, started);
            return Ok(Some(self.watch(monitor, response.body.as_mut(), deadline).await));
        }
        Ok(None)
    }

    /// Drive the monitor until the body completes, freezes, fails or the
    /// deadline passes, whichever is observed first.
    async fn watch(
        &self,
        mut monitor: StreamMonitor<'_>,
        body: &mut dyn BodyStream,
        deadline: Instant,
    ) -> Verdict {
        loop {
            let wakeup = monitor.next_wakeup(deadline);
            match timeout_at(wakeup, body.next_chunk()).await {
                Ok(Ok(Some(chunk))) => monitor.observe(chunk.len(), Instant::now()),
                Ok(Ok(None)) => return monitor.completed(Instant::now()),
                Ok(Err(e)) => {
                    return Verdict {
                        status: e.status(),
                        bytes: monitor.bytes_received(),
                        speed: None,
                        detail: Some(format!("{} after {} bytes", e, monitor.bytes_received())),
                    }
                }
                Err(_) => {
                    let now = Instant::now();
                    if monitor.is_stalled(now) {
                        return monitor.stalled(now);
                    }
                    if now >= deadline {
                        return monitor.deadline_reached(now, self.config.total_timeout);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ProxyCheck for ProxyChecker {
    async fn check(&self, proxy: &ProxyRecord) -> CheckResult {
        self.check_proxy(proxy).await
    }
}
