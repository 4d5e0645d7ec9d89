//! What a continuation may hand back to a chain.
//!
//! A continuation either produces a plain value, produces an error, or delegates
//! to another deferred value whose eventual outcome is adopted. [`Outcome`] names
//! those three cases and [`IntoOutcome`] lets callbacks return the natural Rust type
//! for each of them.

use crate::Deferred;

/// The three things a continuation can produce.
pub enum Outcome<T, E> {
    /// Fulfill the downstream value.
    Value(T),

    /// Reject the downstream value.
    Error(E),

    /// Follow another deferred value until it settles.
    Deferred(Deferred<T, E>),
}

/// Conversion into an [`Outcome`].
///
/// Implemented for `Result<T, E>` (`Ok` fulfills, `Err` rejects), for
/// [`Deferred<T, E>`] (adopted), and for [`Outcome`] itself.
pub trait IntoOutcome<E> {
    /// Payload of the downstream value on success.
    type Value;

    fn into_outcome(self) -> Outcome<Self::Value, E>;
}

impl<T, E> IntoOutcome<E> for Outcome<T, E> {
    type Value = T;

    fn into_outcome(self) -> Outcome<T, E> {
        self
    }
}

impl<T, E> IntoOutcome<E> for Result<T, E> {
    type Value = T;

    fn into_outcome(self) -> Outcome<T, E> {
        match self {
            Ok(value) => Outcome::Value(value),
            Err(e) => Outcome::Error(e),
        }
    }
}

impl<T, E> IntoOutcome<E> for Deferred<T, E> {
    type Value = T;

    fn into_outcome(self) -> Outcome<T, E> {
        Outcome::Deferred(self)
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        result.into_outcome()
    }
}

impl<T, E> From<Deferred<T, E>> for Outcome<T, E> {
    fn from(deferred: Deferred<T, E>) -> Self {
        Outcome::Deferred(deferred)
    }
}
