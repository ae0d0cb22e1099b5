//! Proxy Probe - Proxy Checker with Censorship Detection
//!
//! Checks a list of forward proxies concurrently and classifies each one as
//! working, throttled, frozen mid-transfer, timed out, rejected or broken.

pub mod error;
pub mod logging;
pub mod proxy;
pub mod report;

pub use error::ProbeError;
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
