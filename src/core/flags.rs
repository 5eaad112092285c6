use parking_lot::RwLock;
use std::collections::HashMap;

use super::config::{Bootstrap, FlagsOptions};
use crate::error::{ErrorCode, FloptError, Result};
use crate::utils::parse_bool;

/// Thread-safe cache of flag keys to boolean values.
///
/// Reads never touch the network. Every key in the store is refreshed by a
/// [`Refresher`](super::Refresher) on its next cycle, so a key enters the
/// refresh set simply by being read through [`Flags::is_enabled`].
///
/// The store is an ordinary value: share it with `Arc<Flags>`.
#[derive(Debug, Default)]
pub struct Flags {
    values: RwLock<HashMap<String, bool>>,
}

impl Flags {
    /// Create a store from `options`, applying bootstrap sources in order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalidBootstrap` if a pair sequence has an odd length
    /// or contains a value that is not a boolean literal.
    pub fn new(options: FlagsOptions) -> Result<Self> {
        let mut values = HashMap::new();
        for source in options.bootstrap {
            apply_bootstrap(&mut values, source)?;
        }

        Ok(Self {
            values: RwLock::new(values),
        })
    }

    /// Create an empty store.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the cached value and whether the key is present.
    pub fn read(&self, key: &str) -> (bool, bool) {
        match self.values.read().get(key) {
            Some(value) => (*value, true),
            None => (false, false),
        }
    }

    /// Returns the cached value, if any.
    pub fn get(&self, key: &str) -> Option<bool> {
        self.values.read().get(key).copied()
    }

    /// Insert or overwrite a single flag.
    pub fn update(&self, key: impl Into<String>, value: bool) {
        self.values.write().insert(key.into(), value);
    }

    /// Merge `values` into the store under a single write lock.
    ///
    /// Keys absent from `values` keep their current value. An empty map does
    /// not take the lock at all.
    pub fn batch_update(&self, values: HashMap<String, bool>) {
        if values.is_empty() {
            return;
        }

        let mut current = self.values.write();
        current.extend(values);
    }

    /// Returns the cached value for `key`, or registers and returns
    /// `fallback` when the key is unknown.
    pub fn is_enabled(&self, key: &str, fallback: bool) -> bool {
        if let Some(value) = self.get(key) {
            return value;
        }

        // Another writer may have raced us between the read and write locks.
        *self
            .values
            .write()
            .entry(key.to_string())
            .or_insert(fallback)
    }

    /// Whether `key` is tracked.
    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Snapshot of every tracked key.
    pub fn keys(&self) -> Vec<String> {
        self.values.read().keys().cloned().collect()
    }

    /// Snapshot of the whole mapping.
    pub fn snapshot(&self) -> HashMap<String, bool> {
        self.values.read().clone()
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

fn apply_bootstrap(values: &mut HashMap<String, bool>, source: Bootstrap) -> Result<()> {
    match source {
        Bootstrap::Map(map) => {
            *values = map;
        }
        Bootstrap::Pairs(pairs) => {
            if pairs.len() % 2 != 0 {
                return Err(FloptError::config_error(
                    ErrorCode::ConfigInvalidBootstrap,
                    format!("pairs must be even, got {} tokens", pairs.len()),
                ));
            }

            let mut tokens = pairs.into_iter();
            while let (Some(key), Some(literal)) = (tokens.next(), tokens.next()) {
                let value = parse_bool(&literal).ok_or_else(|| {
                    FloptError::config_error(
                        ErrorCode::ConfigInvalidBootstrap,
                        format!("{:?} is not a boolean", literal),
                    )
                })?;
                values.insert(key, value);
            }
        }
    }

    Ok(())
}
