mod config;
mod flags;
mod metrics;
mod refresher;

pub use config::{
    Bootstrap, FlagsOptions, FlagsOptionsBuilder, RefresherOptions, RefresherOptionsBuilder,
    DEFAULT_FAILED_ATTEMPTS_MAX_COUNT, DEFAULT_FAILED_ATTEMPTS_MAX_DURATION,
    DEFAULT_FETCH_MAX_CONCURRENCY,
};
pub use flags::Flags;
pub use metrics::{names as metric_names, FailedRefreshes};
pub use refresher::{
    fetch_fn, CycleReport, FailedAttemptsHook, FetchFn, FetchFuture, Refresher,
};
