//! Failed-refresh counter exported through Prometheus.

use prometheus::{IntCounterVec, Opts, Registry};

use crate::error::{ErrorCode, FloptError, Result};

/// Metric names as constants for consistency.
pub mod names {
    pub const FAILED_REFRESHES_TOTAL: &str = "ff_client_failed_refreshes_total";
    pub const FAILED_REFRESHES_HELP: &str = "The total number of failed refreshes";
    pub const KEY_LABEL: &str = "key";
}

/// Counter of failed fetches, labeled by flag key.
///
/// Cloning shares the underlying counter.
#[derive(Clone, Debug)]
pub struct FailedRefreshes {
    counter: IntCounterVec,
}

impl FailedRefreshes {
    pub fn new() -> Result<Self> {
        let counter = IntCounterVec::new(
            Opts::new(names::FAILED_REFRESHES_TOTAL, names::FAILED_REFRESHES_HELP),
            &[names::KEY_LABEL],
        )
        .map_err(|e| {
            FloptError::config_error(
                ErrorCode::ConfigMetricsError,
                format!("failed to create failed refreshes counter: {}", e),
            )
        })?;

        Ok(Self { counter })
    }

    /// Register on `registry`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigDuplicateMetric` if a counter with the same name is
    /// already registered there.
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry
            .register(Box::new(self.counter.clone()))
            .map_err(|e| match e {
                prometheus::Error::AlreadyReg => FloptError::config_error(
                    ErrorCode::ConfigDuplicateMetric,
                    format!("{} is already registered", names::FAILED_REFRESHES_TOTAL),
                ),
                other => FloptError::config_error(
                    ErrorCode::ConfigMetricsError,
                    format!("failed to register failed refreshes counter: {}", other),
                ),
            })
    }

    pub fn inc(&self, key: &str) {
        self.counter.with_label_values(&[key]).inc();
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counter.with_label_values(&[key]).get()
    }
}
