//! Configuration of the background thread pool used by [`run`](crate::run) and
//! [`spawn`](crate::spawn).
//!
//! The pool is created lazily on first use from [`PoolConfig::from_env`]. Call
//! [`configure`](crate::configure) before that to pick the settings explicitly.
use futures::executor::{ThreadPool, ThreadPoolBuilder};

use crate::ConfigError;

const POOL_SIZE_VAR: &str = "DEFERRED_POOL_SIZE";
const THREAD_PREFIX_VAR: &str = "DEFERRED_THREAD_PREFIX";

/// Settings for the background thread pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    pool_size: usize,
    name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 40,
            name_prefix: "deferred-".to_string(),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the settings from `DEFERRED_POOL_SIZE` and `DEFERRED_THREAD_PREFIX`.
    ///
    /// Unset variables keep their default values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPoolSize`] if `DEFERRED_POOL_SIZE` is not a
    /// positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(size) = lookup(POOL_SIZE_VAR) {
            match size.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.pool_size = n,
                _ => return Err(ConfigError::InvalidPoolSize(size)),
            }
        }
        if let Some(prefix) = lookup(THREAD_PREFIX_VAR) {
            config.name_prefix = prefix;
        }
        Ok(config)
    }

    /// Sets the number of worker threads.
    pub fn pool_size(&mut self, pool_size: usize) -> &mut Self {
        self.pool_size = pool_size;
        self
    }

    /// Sets the prefix of the worker thread names.
    pub fn name_prefix(&mut self, name_prefix: impl Into<String>) -> &mut Self {
        self.name_prefix = name_prefix.into();
        self
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.pool_size
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.name_prefix
    }

    pub(crate) fn build(&self) -> Result<ThreadPool, ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize(self.pool_size.to_string()));
        }
        Ok(ThreadPoolBuilder::new()
            .pool_size(self.pool_size)
            .name_prefix(self.name_prefix.as_str())
            .create()?)
    }
}
