//! Byte-stream monitor for a download running through a proxy
//!
//! Tracks how many bytes arrived and when the last one did. A stream that
//! goes silent after delivering a byte count inside the stall window is the
//! freeze signature: DPI middleboxes tend to let the handshake and a first
//! burst through and then stop forwarding. Silence before the window looks
//! like an ordinary hang, and slow transfers that keep moving are throttling.

use crate::error::ProbeError;
use crate::proxy::checker::CheckConfig;
use crate::proxy::models::CheckStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Far enough ahead that a run never reaches it
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + after`, falling back to a far-future instant instead of overflowing
pub fn instant_after(start: Instant, after: Duration) -> Instant {
    start
        .checked_add(after)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Inclusive byte range in which silence is read as a freeze
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StallWindow {
    pub low: u64,
    pub high: u64,
}

impl StallWindow {
    pub fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, bytes: u64) -> bool {
        (self.low..=self.high).contains(&bytes)
    }
}

/// Progress of one in-flight download
#[derive(Debug, Clone, Copy)]
pub struct StreamProgress {
    pub bytes_received: u64,
    pub last_byte_at: Instant,
    pub started_at: Instant,
}

impl StreamProgress {
    pub fn new(now: Instant) -> Self {
        Self {
            bytes_received: 0,
            last_byte_at: now,
            started_at: now,
        }
    }
}

/// Final classification of a monitored transfer
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub status: CheckStatus,
    pub bytes: u64,
    /// Bytes per second, when it can be measured
    pub speed: Option<f64>,
    pub detail: Option<String>,
}

/// Watches a single stream against the thresholds of a [`CheckConfig`]
#[derive(Debug)]
pub struct StreamMonitor<'a> {
    config: &'a CheckConfig,
    progress: StreamProgress,
}

impl<'a> StreamMonitor<'a> {
    pub fn new(config: &'a CheckConfig, now: Instant) -> Self {
        Self {
            config,
            progress: StreamProgress::new(now),
        }
    }

    pub fn bytes_received(&self) -> u64 {
        self.progress.bytes_received
    }

    /// Record one received chunk
    pub fn observe(&mut self, chunk_size: usize, now: Instant) {
        self.progress.bytes_received += chunk_size as u64;
        self.progress.last_byte_at = now;
    }

    /// Time since the last byte (or since the start, before any byte)
    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.progress.last_byte_at)
    }

    /// True iff the stream has been silent for at least the stall duration
    /// while the received byte count sits inside the stall window.
    pub fn is_stalled(&self, now: Instant) -> bool {
        self.silence(now) >= self.config.stall_silence
            && self.config.stall_window.contains(self.progress.bytes_received)
    }

    /// Next instant at which the monitor needs to look at the stream again
    /// if no data arrives. Outside the window only the deadline matters.
    pub fn next_wakeup(&self, deadline: Instant) -> Instant {
        if self.config.stall_window.contains(self.progress.bytes_received) {
            deadline.min(instant_after(self.progress.last_byte_at, self.config.stall_silence))
        } else {
            deadline
        }
    }

    /// Stream closed normally. Stall logic no longer applies.
    pub fn completed(&self, now: Instant) -> Verdict {
        let elapsed = now.saturating_duration_since(self.progress.started_at);
        classify_completion(self.config, elapsed, self.progress.bytes_received)
    }

    /// Freeze signature observed while the stream is still open
    pub fn stalled(&self, now: Instant) -> Verdict {
        let bytes = self.progress.bytes_received;
        Verdict {
            status: CheckStatus::TlsFreeze,
            bytes,
            speed: None,
            detail: Some(
                ProbeError::Stall {
                    bytes,
                    silence: self.silence(now),
                }
                .to_string(),
            ),
        }
    }

    /// Total timeout reached with the stream still open and not stalled.
    /// Below the window this is a plain timeout; past it the transfer was
    /// alive but too slow to finish.
    pub fn deadline_reached(&self, now: Instant, total_timeout: Duration) -> Verdict {
        let bytes = self.progress.bytes_received;
        if bytes < self.config.stall_window.low {
            return Verdict {
                status: CheckStatus::Timeout,
                bytes,
                speed: None,
                detail: Some(format!(
                    "{} after {} bytes",
                    ProbeError::Timeout(total_timeout),
                    bytes
                )),
            };
        }

        let elapsed = now.saturating_duration_since(self.progress.started_at);
        Verdict {
            status: CheckStatus::Slow,
            bytes,
            speed: speed(bytes, elapsed),
            detail: Some(format!(
                "Transfer incomplete after {:.1}s ({} bytes)",
                elapsed.as_secs_f64(),
                bytes
            )),
        }
    }
}

/// Classify a transfer that finished: SLOW when it took at least the slow
/// time threshold or ran at or below the slow speed threshold, OK otherwise.
pub fn classify_completion(config: &CheckConfig, elapsed: Duration, bytes_total: u64) -> Verdict {
    let speed = speed(bytes_total, elapsed);
    let too_long = elapsed >= config.slow_time;
    let too_slow = speed.is_some_and(|s| s <= config.slow_speed);

    let detail = match (too_long, too_slow) {
        (true, _) => Some(format!(
            "Transfer took {:.1}s (threshold {:.1}s)",
            elapsed.as_secs_f64(),
            config.slow_time.as_secs_f64()
        )),
        (false, true) => Some(format!(
            "Speed {:.1} KB/s at or below {:.1} KB/s",
            speed.unwrap_or_default() / 1024.0,
            config.slow_speed / 1024.0
        )),
        (false, false) => None,
    };

    Verdict {
        status: if too_long || too_slow {
            CheckStatus::Slow
        } else {
            CheckStatus::Ok
        },
        bytes: bytes_total,
        speed,
        detail,
    }
}

/// Bytes per second; `None` when no time has passed
fn speed(bytes: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        Some(bytes as f64 / secs)
    } else {
        None
    }
}
