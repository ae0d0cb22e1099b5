use crate::proxy::models::{CheckResult, CheckStatus};
use serde::Serialize;
use std::collections::HashMap;

/// Per-status counts over a finished run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub total: usize,
    counts: HashMap<CheckStatus, usize>,
}

impl Summary {
    pub fn from_results(results: &[CheckResult]) -> Self {
        let mut counts = HashMap::new();
        for result in results {
            *counts.entry(result.status).or_insert(0) += 1;
        }
        Self {
            total: results.len(),
            counts,
        }
    }

    pub fn count(&self, status: CheckStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Proxies that work but look throttled or interfered with
    pub fn flagged(&self) -> usize {
        self.count(CheckStatus::Slow) + self.count(CheckStatus::TlsFreeze)
    }
}

/// Proxies worth keeping: OK, plus SLOW when `include_slow` is set.
/// Input order is preserved.
pub fn working_proxies(results: &[CheckResult], include_slow: bool) -> Vec<crate::ProxyRecord> {
    results
        .iter()
        .filter(|r| r.is_working() || (include_slow && r.status == CheckStatus::Slow))
        .map(|r| r.proxy.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::ProxyRecord;
    use std::time::Duration;

    fn results() -> Vec<CheckResult> {
        [
            CheckStatus::Ok,
            CheckStatus::Slow,
            CheckStatus::TlsFreeze,
            CheckStatus::Ok,
            CheckStatus::Timeout,
            CheckStatus::AuthFailed,
            CheckStatus::Error,
        ]
        .into_iter()
        .enumerate()
        .map(|(i, status)| {
            CheckResult::new(ProxyRecord::new(format!("p{}", i), 8080), status, Duration::ZERO)
        })
        .collect()
    }

    #[test]
    fn test_summary_counts() {
        let summary = Summary::from_results(&results());
        assert_eq!(summary.total, 7);
        assert_eq!(summary.count(CheckStatus::Ok), 2);
        assert_eq!(summary.count(CheckStatus::TlsFreeze), 1);
        assert_eq!(summary.flagged(), 2);
        assert_eq!(
            CheckStatus::ALL.iter().map(|s| summary.count(*s)).sum::<usize>(),
            summary.total
        );
    }

    #[test]
    fn test_working_proxies() {
        let results = results();
        let hosts = |proxies: Vec<ProxyRecord>| {
            proxies.into_iter().map(|p| p.host).collect::<Vec<_>>()
        };

        assert_eq!(hosts(working_proxies(&results, false)), vec!["p0", "p3"]);
        assert_eq!(hosts(working_proxies(&results, true)), vec!["p0", "p1", "p3"]);
    }

    #[test]
    fn test_empty_summary() {
        let summary = Summary::from_results(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.count(CheckStatus::Error), 0);
    }
}
