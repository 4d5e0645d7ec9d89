//! Deferred values with chaining and aggregation combinators.
//!
//! `deferred` provides a single coordination primitive, [`Deferred`], representing a
//! value or an error that becomes available at most once, at an unknown later time.
//! Continuations attached to it run when the outcome arrives and return new deferred
//! values, so asynchronous call chains can be expressed without committing to any
//! particular I/O system or async runtime.
//!
//! Features include:
//! - Exactly-once settlement through a [`Resolver`] that may be used from any thread
//! - `then`, `catch` and `finally` chaining, with transparent flattening when a
//!   continuation returns another deferred value
//! - Combinators [`fork`], [`all`], [`race`] and [`every`] for aggregating many values
//! - [`run`], [`spawn`] and [`from_future`] for bridging synchronous work and plain
//!   futures into deferred values
//! - A [`Future`] implementation, so deferred values can be `.await`ed anywhere
//!
//! # Example
//! ```
//! use deferred::{Deferred, all};
//! use std::thread;
//!
//! let sources = (1..=3).map(|n| {
//!     Deferred::<u32, String>::new(move |resolver| {
//!         thread::spawn(move || resolver.resolve(n * n));
//!     })
//! });
//!
//! let sum = all(sources).then(|squares| Ok(squares.iter().sum::<u32>()));
//! assert_eq!(sum.wait(), Ok(14));
//! ```

pub mod background;
pub mod combinator;
pub mod config;
pub mod deferred;
pub mod error;
pub mod outcome;

pub use background::{Settling, configure, from_future, run, spawn};
pub use combinator::{all, every, fork, race};
pub use config::PoolConfig;
pub use deferred::{Deferred, Resolver, State};
pub use error::{ConfigError, SettleError};
pub use outcome::{IntoOutcome, Outcome};
