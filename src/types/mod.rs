//! Value types shared between the store and the refresher.

/// A flag key and a freshly fetched value.
///
/// Only used to carry results from fetch tasks back to the merge step of a
/// refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub key: String,
    pub value: bool,
}

impl Pair {
    /// Create a pair from a key and its fetched value.
    pub fn new(key: impl Into<String>, value: bool) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}
