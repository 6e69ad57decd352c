use std::sync::Arc;

use anyhow::Context;
use envconfig::Envconfig;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use cache_warmer::config::Config;
use cache_warmer::origin::HttpOriginFetcher;
use cache_warmer::warm_once;
use common_cache::{BloomMembershipFilter, ProtectedCache, WarmUpRunner};
use common_store::RedisStore;

async fn shutdown() -> std::io::Result<()> {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    info!("Shutting down gracefully...");
    Ok(())
}

fn init_logging(debug: bool) {
    let base_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true);

    let log_layer = if debug {
        // Development: pretty colored output
        base_layer
            .with_ansi(true)
            .with_filter(EnvFilter::from_default_env())
            .boxed()
    } else {
        // Production: JSON format
        base_layer
            .json()
            .with_filter(EnvFilter::from_default_env())
            .boxed()
    };

    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init_from_env().context("Invalid configuration")?;
    init_logging(*config.debug);

    let store = RedisStore::with_config(
        config.redis_url.clone(),
        config.compression(),
        config.redis_response_timeout(),
        config.redis_connection_timeout(),
    )
    .await
    .context("failed to connect to redis")?;

    let cache = Arc::new(ProtectedCache::new(
        Arc::new(store),
        Arc::new(BloomMembershipFilter::new(
            config.bloom_expected_keys,
            config.bloom_bits_per_key,
        )),
        config.cache_config(),
    ));
    let runner = WarmUpRunner::new(cache);
    let fetcher = HttpOriginFetcher::new(&config.origin_url, config.origin_timeout())?;

    let Some(interval) = config.warm_interval() else {
        let report = warm_once(&config, &runner, &fetcher).await?;
        info!(
            cached = report.cached,
            absent = report.absent,
            failed = report.failures.len(),
            "single warm-up pass complete"
        );
        return Ok(());
    };

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let shutdown = shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("failed to listen for shutdown signals")?;
                return Ok(());
            }
            _ = ticker.tick() => {
                if let Err(e) = warm_once(&config, &runner, &fetcher).await {
                    error!(error = %format!("{e:#}"), "warm-up pass failed");
                }
            }
        }
    }
}
