use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use prometheus::Registry;

use super::refresher::{FailedAttemptsHook, FetchFn};
use crate::error::{ErrorCode, FloptError, Result};

/// Default fetch concurrency: unbounded.
pub const DEFAULT_FETCH_MAX_CONCURRENCY: Option<usize> = None;
pub const DEFAULT_FAILED_ATTEMPTS_MAX_COUNT: u32 = 0;
pub const DEFAULT_FAILED_ATTEMPTS_MAX_DURATION: Duration = Duration::ZERO;

/// A source of initial flag values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bootstrap {
    /// Replaces the whole store contents.
    Map(HashMap<String, bool>),
    /// Alternating key/value tokens, e.g. `["a", "true", "b", "0"]`.
    Pairs(Vec<String>),
}

/// Construction options for [`Flags`](super::Flags).
///
/// Bootstrap sources are applied in the order they were added.
#[derive(Debug, Clone, Default)]
pub struct FlagsOptions {
    pub bootstrap: Vec<Bootstrap>,
}

impl FlagsOptions {
    /// Options with no bootstrap sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new builder.
    pub fn builder() -> FlagsOptionsBuilder {
        FlagsOptionsBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct FlagsOptionsBuilder {
    bootstrap: Vec<Bootstrap>,
}

impl FlagsOptionsBuilder {
    /// Seed the store from a pre-built mapping, replacing earlier sources.
    pub fn bootstrap_map(mut self, values: HashMap<String, bool>) -> Self {
        self.bootstrap.push(Bootstrap::Map(values));
        self
    }

    /// Seed the store from alternating key/value tokens.
    ///
    /// Values go through [`parse_bool`](crate::parse_bool). An odd number of
    /// tokens or an unparseable value fails [`Flags::new`](super::Flags::new).
    pub fn bootstrap_pairs<I, S>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bootstrap
            .push(Bootstrap::Pairs(pairs.into_iter().map(Into::into).collect()));
        self
    }

    /// Build the options.
    pub fn build(self) -> FlagsOptions {
        FlagsOptions {
            bootstrap: self.bootstrap,
        }
    }
}

/// Construction options for [`Refresher`](super::Refresher).
///
/// | field | default |
/// |---|---|
/// | `fetch_fn` | required |
/// | `fetch_max_concurrency` | `None` (unbounded) |
/// | `registry` | `None` (counter is not exported) |
/// | `failed_attempts_hook` | `None` |
/// | `failed_attempts_max_count` | `0` |
/// | `failed_attempts_max_duration` | `0s` |
#[derive(Clone)]
pub struct RefresherOptions {
    pub fetch_fn: Option<FetchFn>,
    /// `Some(0)` is treated as unbounded.
    pub fetch_max_concurrency: Option<usize>,
    pub registry: Option<Registry>,
    pub failed_attempts_hook: Option<FailedAttemptsHook>,
    pub failed_attempts_max_count: u32,
    pub failed_attempts_max_duration: Duration,
}

impl Default for RefresherOptions {
    fn default() -> Self {
        Self {
            fetch_fn: None,
            fetch_max_concurrency: DEFAULT_FETCH_MAX_CONCURRENCY,
            registry: None,
            failed_attempts_hook: None,
            failed_attempts_max_count: DEFAULT_FAILED_ATTEMPTS_MAX_COUNT,
            failed_attempts_max_duration: DEFAULT_FAILED_ATTEMPTS_MAX_DURATION,
        }
    }
}

impl fmt::Debug for RefresherOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefresherOptions")
            .field("fetch_fn", &self.fetch_fn.as_ref().map(|_| "<fn>"))
            .field("fetch_max_concurrency", &self.fetch_max_concurrency)
            .field("registry", &self.registry.as_ref().map(|_| "<registry>"))
            .field(
                "failed_attempts_hook",
                &self.failed_attempts_hook.as_ref().map(|_| "<fn>"),
            )
            .field("failed_attempts_max_count", &self.failed_attempts_max_count)
            .field(
                "failed_attempts_max_duration",
                &self.failed_attempts_max_duration,
            )
            .finish()
    }
}

impl RefresherOptions {
    /// Default options around `fetch_fn`.
    pub fn new(fetch_fn: FetchFn) -> Self {
        Self {
            fetch_fn: Some(fetch_fn),
            ..Default::default()
        }
    }

    /// Create a new builder.
    pub fn builder() -> RefresherOptionsBuilder {
        RefresherOptionsBuilder::default()
    }

    /// Check that all required options are present.
    pub fn validate(&self) -> Result<()> {
        if self.fetch_fn.is_none() {
            return Err(FloptError::config_error(
                ErrorCode::ConfigMissingRequired,
                "fetch function is required",
            ));
        }

        Ok(())
    }
}

#[derive(Default)]
pub struct RefresherOptionsBuilder {
    options: RefresherOptions,
}

impl RefresherOptionsBuilder {
    /// Set the function used to fetch each flag.
    pub fn fetch_fn(mut self, fetch_fn: FetchFn) -> Self {
        self.options.fetch_fn = Some(fetch_fn);
        self
    }

    /// Cap the number of in-flight fetches per cycle. Any `limit <= 0` means
    /// unbounded.
    pub fn fetch_max_concurrency(mut self, limit: isize) -> Self {
        self.options.fetch_max_concurrency = usize::try_from(limit).ok().filter(|l| *l > 0);
        self
    }

    /// Register the failed-refresh counter on `registry`.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.options.registry = Some(registry);
        self
    }

    /// Called once per cycle when the failure thresholds are crossed.
    pub fn failed_attempts_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.options.failed_attempts_hook = Some(std::sync::Arc::new(hook));
        self
    }

    /// Failed fetches per cycle at which the hook fires.
    pub fn failed_attempts_max_count(mut self, count: u32) -> Self {
        self.options.failed_attempts_max_count = count;
        self
    }

    /// Failed fetch time per cycle beyond which the hook fires.
    pub fn failed_attempts_max_duration(mut self, duration: Duration) -> Self {
        self.options.failed_attempts_max_duration = duration;
        self
    }

    /// Build the options.
    pub fn build(self) -> RefresherOptions {
        self.options
    }
}
