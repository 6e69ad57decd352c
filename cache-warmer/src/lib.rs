use anyhow::Context;
use common_cache::{Fetcher, WarmUpReport, WarmUpRunner};
use std::fmt::Display;
use tracing::{info, warn};

pub mod config;
pub mod keys;
pub mod origin;

use config::Config;

/// Read the key file and warm every key it lists through `runner`.
///
/// Individual key failures end up in the report; only a missing or
/// unreadable key file is an error.
pub async fn warm_once<F>(
    config: &Config,
    runner: &WarmUpRunner,
    fetcher: &F,
) -> anyhow::Result<WarmUpReport>
where
    F: Fetcher + ?Sized,
    F::Error: Display,
{
    let keys = keys::load_keys(&config.keys_file)
        .await
        .with_context(|| format!("failed to read keys from {}", config.keys_file.display()))?;
    info!(keys = keys.len(), file = %config.keys_file.display(), "starting warm-up pass");

    let report = runner
        .warm_up(&keys, fetcher, config.warm_ttl(), config.batch_size)
        .await;

    if !report.is_complete() {
        warn!(
            failed = report.failures.len(),
            attempted = report.attempted,
            "warm-up pass finished with failures"
        );
    }
    Ok(report)
}
