//! Reporting: console output, summary counts and result files

pub mod console;
pub mod summary;

pub use summary::{working_proxies, Summary};

use crate::proxy::models::CheckResult;
use crate::Result;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: chrono::DateTime<chrono::Utc>,
    summary: &'a Summary,
    results: &'a [CheckResult],
}

/// Write every result plus the summary as pretty JSON
pub fn save_json<P: AsRef<Path>>(
    results: &[CheckResult],
    summary: &Summary,
    path: P,
) -> Result<()> {
    let report = JsonReport {
        generated_at: chrono::Utc::now(),
        summary,
        results,
    };
    fs::write(path, serde_json::to_string_pretty(&report)?)?;
    Ok(())
}
