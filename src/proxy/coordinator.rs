//! Bounded-concurrency runner for proxy checks

use crate::proxy::checker::ProxyCheck;
use crate::proxy::models::{CheckResult, ProxyRecord};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Runs one check per record with at most `concurrency` in flight
pub struct Coordinator<C> {
    checker: Arc<C>,
    concurrency: usize,
}

impl<C: ProxyCheck> Coordinator<C> {
    pub fn new(checker: C, concurrency: usize) -> Self {
        Self {
            checker: Arc::new(checker),
            concurrency: concurrency.max(1),
        }
    }

    /// Start every check and stream `(input index, result)` pairs in
    /// completion order. The channel closes after the last result.
    ///
    /// Each check runs in its own task behind a shared semaphore, so a
    /// stalled check only holds its own permit. A panicking check is
    /// reported as an ERROR result for its record.
    pub fn run_stream(
        &self,
        records: Vec<ProxyRecord>,
    ) -> mpsc::UnboundedReceiver<(usize, CheckResult)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Semaphore::new(self.concurrency));

        info!(
            "Checking {} proxies, concurrency {}",
            records.len(),
            self.concurrency
        );

        for (index, record) in records.into_iter().enumerate() {
            let gate = Arc::clone(&gate);
            let checker = Arc::clone(&self.checker);
            let tx = tx.clone();

            tokio::spawn(async move {
                let _permit = match gate.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let result = CheckResult::error(record, e.to_string(), Default::default());
                        let _ = tx.send((index, result));
                        return;
                    }
                };

                let started = Instant::now();
                let proxy = record.clone();
                let task = tokio::spawn(async move { checker.check(&proxy).await });

                let result = match task.await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("Check of {} failed: {}", record, e);
                        CheckResult::error(
                            record,
                            format!("Internal error: {}", e),
                            started.elapsed(),
                        )
                    }
                };

                debug!("Finished {} [{}]", result.proxy, result.status);
                // receiver gone means nobody wants the result anymore
                let _ = tx.send((index, result));
            });
        }

        rx
    }

    /// Run every check and return results in input order
    pub async fn run_all(&self, records: Vec<ProxyRecord>) -> Vec<CheckResult> {
        self.run_all_with(records, |_| {}).await
    }

    /// Like [`run_all`](Self::run_all), calling `on_result` as each check completes
    pub async fn run_all_with<F>(
        &self,
        records: Vec<ProxyRecord>,
        mut on_result: F,
    ) -> Vec<CheckResult>
    where
        F: FnMut(&CheckResult),
    {
        let total = records.len();
        let mut slots: Vec<Option<CheckResult>> = vec![None; total];
        let mut rx = self.run_stream(records);

        while let Some((index, result)) = rx.recv().await {
            on_result(&result);
            slots[index] = Some(result);
        }

        let results: Vec<CheckResult> = slots.into_iter().flatten().collect();
        info!("Checked {}/{} proxies", results.len(), total);
        results
    }
}
