//! Proxy module for parsing and checking proxies
//!
//! This module provides functionality for:
//! - Parsing proxy lists (HOST:PORT:USER:PASS and URL forms)
//! - Checking a proxy end to end: connectivity, external IP, download behaviour
//! - Detecting mid-transfer freezes and throttling from byte-flow timing
//! - Running many checks with a bounded number in flight

pub mod checker;
pub mod coordinator;
pub mod models;
pub mod monitor;
pub mod parser;
pub mod transport;

pub use checker::{CheckConfig, ProxyCheck, ProxyChecker};
pub use coordinator::Coordinator;
pub use models::{CheckResult, CheckStatus, ProxyRecord};
pub use monitor::{classify_completion, StallWindow, StreamMonitor, StreamProgress, Verdict};
pub use parser::ProxyParser;
pub use transport::{BodyStream, FetchResponse, ReqwestTransport, Transport};
