//! Errors reported by the library itself.
//!
//! These never travel through a chain of deferred values: they describe misuse of
//! a [`Resolver`](crate::Resolver) or a failure to set up the background pool.
//! Rejections produced by user code use the caller's own error type.

use std::{fmt, io};

use crate::State;

/// Returned when a deferred value is settled more than once.
///
/// The first call to `resolve`, `reject` or `adopt` on a [`Resolver`] wins. Any
/// later attempt leaves the stored outcome untouched and reports this error instead.
///
/// [`Resolver`]: crate::Resolver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettleError {
    /// The deferred value already left the pending state.
    AlreadySettled(State),

    /// The deferred value is locked in to the outcome of another deferred value.
    Adopting,

    /// A deferred value was asked to follow itself.
    SelfAdoption,
}

impl fmt::Display for SettleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettleError::AlreadySettled(state) => {
                write!(f, "Deferred value is not pending but {state}")
            }
            SettleError::Adopting => {
                write!(f, "Deferred value already follows another deferred value")
            }
            SettleError::SelfAdoption => write!(f, "Deferred value cannot follow itself"),
        }
    }
}

impl std::error::Error for SettleError {}

/// Errors raised while configuring the background thread pool.
#[derive(Debug)]
pub enum ConfigError {
    /// The pool was already created, either by [`configure`] or by a previous
    /// call to [`run`] or [`spawn`].
    ///
    /// [`configure`]: crate::configure
    /// [`run`]: crate::run
    /// [`spawn`]: crate::spawn
    AlreadyConfigured,

    /// The requested pool size is zero or could not be parsed.
    InvalidPoolSize(String),

    /// The operating system refused to start the pool threads.
    Io(io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::AlreadyConfigured => write!(f, "Thread pool is already running"),
            ConfigError::InvalidPoolSize(value) => write!(f, "Invalid thread pool size: {value:?}"),
            ConfigError::Io(e) => write!(f, "Thread pool creation failed: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}
