//! Pre-populates a [`ProtectedCache`] from a list of keys, batch by batch.

use futures::future::join_all;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::metrics_consts::WARM_UP_KEYS_COUNTER;
use crate::{Fetcher, GetOptions, ProtectedCache};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmUpFailure {
    pub key: String,
    pub error: String,
}

/// Outcome of one warm-up run. Every attempted key lands in exactly one of
/// `cached`, `absent` or `failures`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmUpReport {
    pub attempted: usize,
    pub cached: usize,
    pub absent: usize,
    pub failures: Vec<WarmUpFailure>,
}

impl WarmUpReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct WarmUpRunner {
    cache: Arc<ProtectedCache>,
}

impl WarmUpRunner {
    pub fn new(cache: Arc<ProtectedCache>) -> Self {
        Self { cache }
    }

    /// Run `get_or_fetch` for every key, `batch_size` keys at a time.
    ///
    /// Keys within a batch are fetched concurrently and the whole batch is
    /// awaited before the next one starts, so at most `batch_size` fetches are
    /// in flight. Failures are logged and collected in the report; they never
    /// stop the run. A `batch_size` of zero is treated as one.
    pub async fn warm_up<F>(
        &self,
        keys: &[String],
        fetcher: &F,
        ttl: Duration,
        batch_size: usize,
    ) -> WarmUpReport
    where
        F: Fetcher + ?Sized,
        F::Error: Display,
    {
        let batch_size = batch_size.max(1);
        // warming is what populates the filter, so it must not gate the fetches
        let opts = GetOptions::default()
            .without_membership_filter()
            .ttl(ttl);

        let mut report = WarmUpReport::default();
        let total_batches = keys.len().div_ceil(batch_size);

        for (batch_index, batch) in keys.chunks(batch_size).enumerate() {
            let results = join_all(
                batch
                    .iter()
                    .map(|key| self.cache.get_or_fetch(key, fetcher, opts.clone())),
            )
            .await;

            for (key, result) in batch.iter().zip(results) {
                report.attempted += 1;
                let outcome = match result {
                    Ok(result) if result.value.is_some() => {
                        report.cached += 1;
                        "cached"
                    }
                    Ok(_) => {
                        report.absent += 1;
                        "absent"
                    }
                    Err(e) => {
                        error!(key = %key, error = %e, "failed to warm key");
                        report.failures.push(WarmUpFailure {
                            key: key.clone(),
                            error: e.to_string(),
                        });
                        "failed"
                    }
                };
                metrics::counter!(WARM_UP_KEYS_COUNTER, "outcome" => outcome).increment(1);
            }

            debug!(
                batch = batch_index + 1,
                total_batches,
                attempted = report.attempted,
                "warm-up batch complete"
            );
        }

        info!(
            attempted = report.attempted,
            cached = report.cached,
            absent = report.absent,
            failed = report.failures.len(),
            "cache warm-up finished"
        );
        report
    }
}
