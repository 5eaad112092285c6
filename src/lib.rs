//! flopt
//!
//! A client-side cache of boolean feature flags, kept fresh by a background
//! refresher that polls a remote source.
//!
//! Reads go straight to the in-memory [`Flags`] store and never wait on the
//! network. A [`Refresher`] re-fetches every known key on a fixed interval,
//! merges the results atomically, and reports failure pressure through an
//! optional hook.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use flopt::{FlagsOptions, Flags, FliptConfig, FliptFetcher, Refresher, RefresherOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> flopt::Result<()> {
//!     let flags = Arc::new(Flags::new(
//!         FlagsOptions::builder().bootstrap_pairs(["dark-mode", "false"]).build(),
//!     )?);
//!
//!     let fetcher = FliptFetcher::new(FliptConfig::new("http://localhost:8080", "default"))?;
//!     let options = RefresherOptions::builder()
//!         .fetch_fn(fetcher.into_fetch_fn())
//!         .fetch_max_concurrency(8)
//!         .build();
//!     let refresher = Arc::new(Refresher::new(Arc::clone(&flags), options)?);
//!
//!     let cancel = CancellationToken::new();
//!     let handle = refresher.spawn(cancel.clone(), Duration::from_secs(30));
//!
//!     // Unknown keys return the fallback and are refreshed from then on.
//!     let enabled = flags.is_enabled("new-checkout", false);
//!     println!("new-checkout: {}", enabled);
//!
//!     cancel.cancel();
//!     handle.await.ok();
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod core;
pub mod error;
pub mod http;
pub mod types;
pub mod utils;

// Re-exports from core module
pub use crate::core::{
    fetch_fn, Bootstrap, CycleReport, FailedAttemptsHook, FailedRefreshes, FetchFn, FetchFuture,
    Flags, FlagsOptions, FlagsOptionsBuilder, Refresher, RefresherOptions,
    RefresherOptionsBuilder,
};

// Re-exports from error module
pub use crate::error::{ErrorCode, FloptError, Result};

// Re-exports from http module
pub use crate::http::{FliptConfig, FliptFetcher, FliptFlag};

// Re-exports from types module
pub use crate::types::Pair;

// Re-exports from utils module
pub use crate::utils::parse_bool;
