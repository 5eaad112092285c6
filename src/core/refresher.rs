//! Background refresher for cached flags.
//!
//! On every tick the refresher snapshots the keys currently in the store,
//! fetches each of them concurrently (optionally capped), and merges the
//! successful results back with a single batch update. Failures are counted
//! per cycle and can trigger a caller-supplied hook.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::config::RefresherOptions;
use super::flags::Flags;
use super::metrics::FailedRefreshes;
use crate::error::{ErrorCode, FloptError, Result};
use crate::types::Pair;

/// Future returned by a [`FetchFn`].
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<bool>> + Send>>;

/// Fetches the current value of one flag.
///
/// Called concurrently from many tasks. The token is cancelled when the
/// refresher shuts down; well-behaved fetchers return promptly once it is.
pub type FetchFn = Arc<dyn Fn(CancellationToken, String) -> FetchFuture + Send + Sync>;

/// Hook invoked when a cycle crosses the failure thresholds.
pub type FailedAttemptsHook = Arc<dyn Fn() + Send + Sync>;

/// Box an async closure into a [`FetchFn`].
///
/// ```
/// use flopt::fetch_fn;
///
/// let fetch = fetch_fn(|_cancel, key| async move { Ok(key.starts_with("on-")) });
/// ```
pub fn fetch_fn<F, Fut>(f: F) -> FetchFn
where
    F: Fn(CancellationToken, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    Arc::new(move |cancel: CancellationToken, key: String| -> FetchFuture {
        Box::pin(f(cancel, key))
    })
}

/// Outcome of a single refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Number of keys dispatched.
    pub fetched: usize,
    /// Number of values merged into the store.
    pub updated: usize,
    /// Number of failed fetches.
    pub failed: u32,
    /// Sum of the time spent in failed fetches.
    pub failed_duration: Duration,
    /// Whether the failed attempts hook ran.
    pub hook_fired: bool,
}

/// Periodically refreshes every flag known to a [`Flags`] store.
///
/// Features:
/// - Bounded fan-out of one fetch per tracked key
/// - Atomic merge of all successful results per cycle
/// - Per-cycle failure count and duration with a threshold hook
/// - Cooperative shutdown through a [`CancellationToken`]
pub struct Refresher {
    flags: Arc<Flags>,
    fetch_fn: FetchFn,
    fetch_max_concurrency: Option<usize>,
    failed_refreshes: FailedRefreshes,
    failed_attempts_hook: Option<FailedAttemptsHook>,
    failed_attempts_max_count: u32,
    failed_attempts_max_duration: Duration,
    failed_attempts: Arc<AtomicU32>,
    failed_attempts_nanos: Arc<AtomicU64>,
}

/// State shared by the fetch tasks of one cycle.
#[derive(Clone)]
struct CycleShared {
    fetch_fn: FetchFn,
    semaphore: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
    failed_refreshes: FailedRefreshes,
    failed_attempts: Arc<AtomicU32>,
    failed_attempts_nanos: Arc<AtomicU64>,
}

impl Refresher {
    /// Create a refresher for `flags`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no fetch function was given or if the
    /// failed refreshes counter is already registered on the given registry.
    pub fn new(flags: Arc<Flags>, options: RefresherOptions) -> Result<Self> {
        options.validate()?;

        let fetch_fn = options.fetch_fn.ok_or_else(|| {
            FloptError::config_error(ErrorCode::ConfigMissingRequired, "fetch function is required")
        })?;

        let failed_refreshes = FailedRefreshes::new()?;
        if let Some(registry) = &options.registry {
            failed_refreshes.register(registry)?;
        }

        Ok(Self {
            flags,
            fetch_fn,
            fetch_max_concurrency: normalize_concurrency(options.fetch_max_concurrency),
            failed_refreshes,
            failed_attempts_hook: options.failed_attempts_hook,
            failed_attempts_max_count: options.failed_attempts_max_count,
            failed_attempts_max_duration: options.failed_attempts_max_duration,
            failed_attempts: Arc::new(AtomicU32::new(0)),
            failed_attempts_nanos: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Run refresh cycles every `every` until `cancel` fires.
    ///
    /// The first cycle starts one interval after the call. A cycle that is in
    /// progress when `cancel` fires runs to completion; its fetchers see the
    /// cancellation through their token.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalidInterval` if `every` is zero.
    pub async fn refresh_cache(&self, cancel: CancellationToken, every: Duration) -> Result<()> {
        if every.is_zero() {
            return Err(FloptError::config_error(
                ErrorCode::ConfigInvalidInterval,
                "refresh interval must be positive",
            ));
        }

        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Refresher started with interval {:?}", every);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("Refresher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.refresh_once(&cancel).await;
                }
            }
        }

        tracing::info!("Refresher stopped");
        Ok(())
    }

    /// Run [`refresh_cache`](Self::refresh_cache) on the tokio runtime.
    pub fn spawn(
        self: Arc<Self>,
        cancel: CancellationToken,
        every: Duration,
    ) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.refresh_cache(cancel, every).await })
    }

    /// Run one refresh cycle now.
    ///
    /// Failure counters are reset on entry and keep the values of this cycle
    /// until the next one starts.
    pub async fn refresh_once(&self, cancel: &CancellationToken) -> CycleReport {
        self.failed_attempts.store(0, Ordering::SeqCst);
        self.failed_attempts_nanos.store(0, Ordering::SeqCst);

        let keys = self.flags.keys();
        if keys.is_empty() {
            return CycleReport::default();
        }

        let shared = CycleShared {
            fetch_fn: Arc::clone(&self.fetch_fn),
            semaphore: self
                .fetch_max_concurrency
                .map(|limit| Arc::new(Semaphore::new(limit))),
            cancel: cancel.child_token(),
            failed_refreshes: self.failed_refreshes.clone(),
            failed_attempts: Arc::clone(&self.failed_attempts),
            failed_attempts_nanos: Arc::clone(&self.failed_attempts_nanos),
        };

        let fetched = keys.len();
        let (results_tx, mut results_rx) = mpsc::channel::<Pair>(fetched);
        let mut tasks = JoinSet::new();
        for key in keys {
            tasks.spawn(fetch_one(shared.clone(), key, results_tx.clone()));
        }
        drop(results_tx);

        // Buffer results outside the store so its lock is only taken once.
        let mut corrections = HashMap::with_capacity(fetched);
        while let Some(pair) = results_rx.recv().await {
            corrections.insert(pair.key, pair.value);
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "fetch task did not complete");
                    self.failed_attempts.fetch_add(1, Ordering::SeqCst);
                    first_error.get_or_insert(FloptError::new(
                        ErrorCode::FetchPanicked,
                        format!("fetch task did not complete: {}", e),
                    ));
                }
            }
        }

        let updated = corrections.len();
        self.flags.batch_update(corrections);

        let failed = self.failed_attempts.load(Ordering::SeqCst);
        let failed_duration = Duration::from_nanos(self.failed_attempts_nanos.load(Ordering::SeqCst));

        let mut hook_fired = false;
        if let Some(error) = first_error {
            tracing::debug!(error = %error, failed, ?failed_duration, "error fetching flag");
            if let Some(hook) = &self.failed_attempts_hook {
                if failed >= self.failed_attempts_max_count
                    || failed_duration > self.failed_attempts_max_duration
                {
                    tracing::warn!(
                        failed,
                        ?failed_duration,
                        "failed attempts threshold exceeded"
                    );
                    hook();
                    hook_fired = true;
                }
            }
        }

        CycleReport {
            fetched,
            updated,
            failed,
            failed_duration,
            hook_fired,
        }
    }

    /// The store this refresher keeps up to date.
    pub fn flags(&self) -> &Arc<Flags> {
        &self.flags
    }

    /// Failed fetches in the current (or last finished) cycle.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts.load(Ordering::SeqCst)
    }

    /// Time spent in failed fetches in the current (or last finished) cycle.
    pub fn failed_attempts_duration(&self) -> Duration {
        Duration::from_nanos(self.failed_attempts_nanos.load(Ordering::SeqCst))
    }

    /// Cumulative per-key failure counter.
    pub fn failed_refreshes(&self) -> &FailedRefreshes {
        &self.failed_refreshes
    }

    /// Effective fetch cap, `None` when unbounded.
    pub fn fetch_max_concurrency(&self) -> Option<usize> {
        self.fetch_max_concurrency
    }
}

/// Zero means unbounded; larger caps are clamped to what a semaphore holds.
fn normalize_concurrency(limit: Option<usize>) -> Option<usize> {
    limit
        .filter(|l| *l > 0)
        .map(|l| l.min(Semaphore::MAX_PERMITS))
}

async fn fetch_one(shared: CycleShared, key: String, results: mpsc::Sender<Pair>) -> Result<()> {
    let _permit = match &shared.semaphore {
        Some(semaphore) => {
            let acquired = tokio::select! {
                permit = Arc::clone(semaphore).acquire_owned() => permit.ok(),
                _ = shared.cancel.cancelled() => None,
            };
            match acquired {
                Some(permit) => Some(permit),
                None => {
                    let error = FloptError::cancelled();
                    record_failure(&shared, &key, Duration::ZERO, &error);
                    return Err(error);
                }
            }
        }
        None => None,
    };

    let started = Instant::now();
    tracing::debug!(key = %key, "refreshing flag");

    match (shared.fetch_fn)(shared.cancel.clone(), key.clone()).await {
        Ok(value) => {
            tracing::debug!(key = %key, value, "new value for flag");
            // The receiver outlives every task of the cycle.
            let _ = results.send(Pair::new(key, value)).await;
            Ok(())
        }
        Err(error) => {
            record_failure(&shared, &key, started.elapsed(), &error);
            Err(error)
        }
    }
}

fn record_failure(shared: &CycleShared, key: &str, elapsed: Duration, error: &FloptError) {
    tracing::warn!(key = %key, error = %error, "failed to refresh flag");
    shared.failed_refreshes.inc(key);
    shared.failed_attempts.fetch_add(1, Ordering::SeqCst);
    let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
    shared.failed_attempts_nanos.fetch_add(nanos, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::FlagsOptions;

    fn bootstrapped(pairs: &[&str]) -> Arc<Flags> {
        let options = FlagsOptions::builder()
            .bootstrap_pairs(pairs.iter().copied())
            .build();
        Arc::new(Flags::new(options).unwrap())
    }

    #[tokio::test]
    async fn test_empty_store_skips_cycle() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let fetch = fetch_fn(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async { Ok(true) }
        });

        let hook_calls = Arc::new(AtomicU32::new(0));
        let hook_calls_clone = Arc::clone(&hook_calls);
        let options = RefresherOptions::builder()
            .fetch_fn(fetch)
            .failed_attempts_hook(move || {
                hook_calls_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        let refresher = Refresher::new(Arc::new(Flags::empty()), options).unwrap();

        let report = refresher.refresh_once(&CancellationToken::new()).await;

        assert_eq!(report, CycleReport::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetches_tracked_keys() {
        let flags = bootstrapped(&["a", "false"]);
        let fetch = fetch_fn(|_, key| async move { Ok(key == "a") });
        let refresher =
            Refresher::new(Arc::clone(&flags), RefresherOptions::new(fetch)).unwrap();

        let report = refresher.refresh_once(&CancellationToken::new()).await;

        assert_eq!(report.fetched, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(flags.read("a"), (true, true));
    }

    #[test]
    fn test_normalize_concurrency() {
        assert_eq!(normalize_concurrency(None), None);
        assert_eq!(normalize_concurrency(Some(0)), None);
        assert_eq!(normalize_concurrency(Some(4)), Some(4));
        assert_eq!(
            normalize_concurrency(Some(usize::MAX)),
            Some(Semaphore::MAX_PERMITS)
        );
    }

    #[tokio::test]
    async fn test_missing_fetch_fn() {
        let err = Refresher::new(Arc::new(Flags::empty()), RefresherOptions::default())
            .err()
            .unwrap();
        assert_eq!(err.code, ErrorCode::ConfigMissingRequired);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let fetch = fetch_fn(|_, _| async { Ok(true) });
        let refresher =
            Refresher::new(Arc::new(Flags::empty()), RefresherOptions::new(fetch)).unwrap();

        let err = refresher
            .refresh_cache(CancellationToken::new(), Duration::ZERO)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidInterval);
    }

    #[tokio::test]
    async fn test_panicking_fetch_counts_as_failure() {
        let flags = bootstrapped(&["boom", "true", "fine", "false"]);
        let fetch = fetch_fn(|_, key| async move {
            if key == "boom" {
                panic!("fetcher exploded");
            }
            Ok(true)
        });
        let refresher =
            Refresher::new(Arc::clone(&flags), RefresherOptions::new(fetch)).unwrap();

        let report = refresher.refresh_once(&CancellationToken::new()).await;

        assert_eq!(report.failed, 1);
        assert_eq!(flags.read("boom"), (true, true));
        assert_eq!(flags.read("fine"), (true, true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_duration_accumulates() {
        let flags = bootstrapped(&["a", "true", "b", "true"]);
        let fetch = fetch_fn(|_, _| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(FloptError::fetch_failed("unavailable"))
        });
        let refresher =
            Refresher::new(Arc::clone(&flags), RefresherOptions::new(fetch)).unwrap();

        let report = refresher.refresh_once(&CancellationToken::new()).await;

        assert_eq!(report.failed, 2);
        assert!(report.failed_duration >= Duration::from_millis(20));
        assert_eq!(refresher.failed_attempts_duration(), report.failed_duration);
    }
}
