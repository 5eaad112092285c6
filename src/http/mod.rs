mod flipt;

pub use flipt::{
    FliptConfig, FliptFetcher, FliptFlag, DEFAULT_BASE_URL, DEFAULT_NAMESPACE, DEFAULT_TIMEOUT,
};
