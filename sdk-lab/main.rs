//! flopt SDK Lab
//!
//! Polls a local Flipt server and prints a flag every few seconds.
//! Run with: cargo run --example sdk-lab
//!
//! Environment:
//! - `FLIPT_URL` (default `http://localhost:8080`)
//! - `FLIPT_NAMESPACE` (default `default`)
//! - `RUST_LOG` (default `flopt=debug,sdk_lab=info`)

use std::sync::Arc;
use std::time::Duration;

use flopt::{Flags, FlagsOptions, FliptConfig, FliptFetcher, Refresher, RefresherOptions};
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const FLAG_KEY: &str = "test-flag";
const REFRESH_INTERVAL: Duration = Duration::from_secs(2);
const READ_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> flopt::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("flopt=debug,sdk_lab=info")),
        )
        .init();

    let base_url =
        std::env::var("FLIPT_URL").unwrap_or_else(|_| flopt::http::DEFAULT_BASE_URL.to_string());
    let namespace = std::env::var("FLIPT_NAMESPACE")
        .unwrap_or_else(|_| flopt::http::DEFAULT_NAMESPACE.to_string());

    let flags = Arc::new(Flags::new(
        FlagsOptions::builder()
            .bootstrap_pairs([FLAG_KEY, "false"])
            .build(),
    )?);

    let fetcher = FliptFetcher::new(FliptConfig::new(base_url, namespace))?;
    let registry = Registry::new();
    let options = RefresherOptions::builder()
        .fetch_fn(fetcher.into_fetch_fn())
        .fetch_max_concurrency(4)
        .registry(registry.clone())
        .failed_attempts_hook(|| tracing::warn!("flag source looks unhealthy"))
        .failed_attempts_max_count(3)
        .failed_attempts_max_duration(Duration::from_secs(1))
        .build();
    let refresher = Arc::new(Refresher::new(Arc::clone(&flags), options)?);

    let cancel = CancellationToken::new();
    let handle = Arc::clone(&refresher).spawn(cancel.clone(), REFRESH_INTERVAL);

    let mut reads = tokio::time::interval(READ_INTERVAL);
    loop {
        tokio::select! {
            _ = reads.tick() => {
                let enabled = flags.is_enabled(FLAG_KEY, false);
                tracing::info!(key = FLAG_KEY, enabled, "flag value");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                cancel.cancel();
                break;
            }
        }
    }

    match handle.await {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "refresher task failed"),
    }

    tracing::info!(
        failed = refresher.failed_refreshes().get(FLAG_KEY),
        "failed refreshes for {}",
        FLAG_KEY
    );
    Ok(())
}
