//! Defines the `Deferred` value and its settlement machinery.
//!
//! A `Deferred` represents a computation whose result, a value or an error, becomes
//! available at most once at some unknown later time. Continuations registered with
//! [`Deferred::then`], [`Deferred::catch`] and [`Deferred::finally`] run when that
//! result arrives and produce new deferred values, forming a chain.
//!
//! The producer side is a [`Resolver`]. It may be moved to any thread and settles the
//! value exactly once; further attempts are reported as [`SettleError`] and never
//! change the stored outcome.
//!
//! Continuations never run while the internal lock is held, so a callback is free to
//! attach further continuations to the same value, or to settle other values.
use std::{
    any::Any,
    fmt,
    mem,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
};

use log::{debug, trace};

use crate::{IntoOutcome, Outcome, SettleError};

/// Observable settlement state of a [`Deferred`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// No outcome yet.
    Pending,

    /// Settled with a value.
    Fulfilled,

    /// Settled with an error.
    Rejected,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Pending => write!(f, "pending"),
            State::Fulfilled => write!(f, "fulfilled"),
            State::Rejected => write!(f, "rejected"),
        }
    }
}

type Reaction<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

// Which queue a continuation waits in. Both queues receive every outcome: the
// matching one runs the user callback, the other one only relays.
#[derive(Clone, Copy)]
enum Queue {
    Fulfilled,
    Rejected,
}

enum Slot<T, E> {
    Pending,
    // Locked in to the outcome of another deferred value.
    Adopting,
    Fulfilled(T),
    Rejected(E),
}

struct Inner<T, E> {
    slot: Slot<T, E>,
    on_fulfilled: Vec<Reaction<T, E>>,
    on_rejected: Vec<Reaction<T, E>>,
    wakers: Vec<Waker>,
}

impl<T, E> Inner<T, E> {
    fn new() -> Self {
        Self {
            slot: Slot::Pending,
            on_fulfilled: Vec::new(),
            on_rejected: Vec::new(),
            wakers: Vec::new(),
        }
    }

    fn state(&self) -> State {
        match self.slot {
            Slot::Pending | Slot::Adopting => State::Pending,
            Slot::Fulfilled(_) => State::Fulfilled,
            Slot::Rejected(_) => State::Rejected,
        }
    }

    // Fails unless nothing has claimed the slot yet.
    fn claim(&self) -> Result<(), SettleError> {
        match self.slot {
            Slot::Pending => Ok(()),
            Slot::Adopting => Err(SettleError::Adopting),
            _ => Err(SettleError::AlreadySettled(self.state())),
        }
    }
}

impl<T: Clone, E: Clone> Inner<T, E> {
    fn outcome(&self) -> Option<Result<T, E>> {
        match &self.slot {
            Slot::Fulfilled(value) => Some(Ok(value.clone())),
            Slot::Rejected(e) => Some(Err(e.clone())),
            Slot::Pending | Slot::Adopting => None,
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // User code never runs under this lock, poisoning can only come from a
    // panicking allocation and leaves the state consistent.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_cleanup<E, F: FnOnce() -> Option<E>>(cleanup: &Mutex<Option<F>>) -> Option<E> {
    let cleanup = lock(cleanup).take();
    cleanup.and_then(|f| f())
}

/// A value or error that becomes available at most once.
///
/// `Deferred` is a handle: cloning it is cheap and every clone observes the same
/// settlement. Continuations attached to the same value run in the order they were
/// attached. A continuation attached after settlement runs immediately on the
/// calling thread.
///
/// `Deferred` also implements [`Future`], resolving to `Result<T, E>`, so it can be
/// `.await`ed on any executor.
///
/// # Example
/// ```
/// use deferred::Deferred;
///
/// let greeting = Deferred::<_, String>::resolved("hello")
///     .then(|s| Ok(format!("{s} world")))
///     .then(|s| if s.is_empty() { Err("empty".to_string()) } else { Ok(s.len()) });
///
/// assert_eq!(greeting.peek(), Some(Ok(11)));
/// ```
pub struct Deferred<T, E> {
    inner: Arc<Mutex<Inner<T, E>>>,
}

/// The producer side of a [`Deferred`].
///
/// Handed to the executor of [`Deferred::new`] or returned by [`Deferred::pair`].
/// A `Resolver` can be cloned and sent to other threads; whichever clone settles
/// first wins.
pub struct Resolver<T, E> {
    inner: Arc<Mutex<Inner<T, E>>>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("state", &lock(&self.inner).state())
            .finish()
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("state", &lock(&self.inner).state())
            .finish()
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates a pending deferred value and synchronously runs `executor` with its
    /// [`Resolver`].
    ///
    /// The executor may settle the value right away, hand the resolver to another
    /// thread to settle later, or drop it, in which case the value stays pending.
    ///
    /// # Example
    /// ```
    /// use deferred::{Deferred, State};
    /// use std::thread;
    ///
    /// let d = Deferred::<u32, String>::new(|resolver| {
    ///     thread::spawn(move || resolver.resolve(7));
    /// });
    /// assert_eq!(d.wait(), Ok(7));
    /// assert_eq!(d.state(), State::Fulfilled);
    /// ```
    pub fn new(executor: impl FnOnce(Resolver<T, E>)) -> Self {
        let (deferred, resolver) = Self::pair();
        executor(resolver);
        deferred
    }

    /// Creates a pending deferred value together with its [`Resolver`].
    #[must_use]
    pub fn pair() -> (Self, Resolver<T, E>) {
        let inner = Arc::new(Mutex::new(Inner::new()));
        (
            Self {
                inner: Arc::clone(&inner),
            },
            Resolver { inner },
        )
    }

    /// Creates a deferred value already fulfilled with `value`.
    pub fn resolved(value: T) -> Self {
        Self::resolved_with(Ok(value))
    }

    /// Creates a deferred value already rejected with `error`.
    pub fn rejected(error: E) -> Self {
        Self::resolved_with(Err(error))
    }

    /// Creates a deferred value from anything convertible into an [`Outcome`].
    ///
    /// Passing another `Deferred` makes the new value adopt its eventual outcome, so
    /// nesting never produces a deferred value of a deferred value.
    pub fn resolved_with<R>(outcome: R) -> Self
    where
        R: IntoOutcome<E, Value = T>,
    {
        let (deferred, resolver) = Self::pair();
        resolver.forward(outcome.into_outcome());
        deferred
    }

    /// Current settlement state.
    ///
    /// A value that is following another deferred value reports [`State::Pending`]
    /// until that value settles.
    pub fn state(&self) -> State {
        lock(&self.inner).state()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    /// Returns a copy of the outcome if the value has settled.
    pub fn peek(&self) -> Option<Result<T, E>> {
        lock(&self.inner).outcome()
    }

    /// Blocks the current thread until the value settles.
    ///
    /// Must not be called from a continuation of this same value, or from a thread
    /// the value depends on to make progress.
    pub fn wait(&self) -> Result<T, E> {
        futures::executor::block_on(self.clone())
    }

    /// Attaches a continuation that runs when the value is fulfilled.
    ///
    /// Returns a new deferred value settled by the callback's return value:
    /// `Ok` fulfills it, `Err` rejects it and a returned `Deferred` is adopted.
    /// If this value is rejected, `on_fulfilled` is never called and the returned
    /// value is rejected with the same error.
    ///
    /// # Example
    /// ```
    /// use deferred::Deferred;
    ///
    /// let d = Deferred::<_, String>::resolved(2)
    ///     .then(|n| Deferred::resolved(n * 10))
    ///     .then(|n| Ok(n + 1));
    /// assert_eq!(d.peek(), Some(Ok(21)));
    /// ```
    pub fn then<R, F>(&self, on_fulfilled: F) -> Deferred<R::Value, E>
    where
        F: FnOnce(T) -> R + Send + 'static,
        R: IntoOutcome<E>,
        R::Value: Clone + Send + 'static,
    {
        let (next, resolver) = Deferred::pair();
        self.subscribe(Queue::Fulfilled, move |outcome| match outcome {
            Ok(value) => resolver.forward(on_fulfilled(value).into_outcome()),
            Err(e) => resolver.forward(Outcome::Error(e)),
        });
        next
    }

    /// Attaches a continuation that runs when the value is rejected.
    ///
    /// The callback may recover with `Ok`, reject again with `Err` or delegate to
    /// another `Deferred`. If this value is fulfilled, `on_rejected` is never called
    /// and the returned value is fulfilled with the same payload, so a `catch` can be
    /// inserted anywhere in a chain without consuming values.
    ///
    /// # Example
    /// ```
    /// use deferred::Deferred;
    ///
    /// let d = Deferred::<u32, String>::rejected("boom".into())
    ///     .then(|n| Ok(n + 1))
    ///     .catch(|e| Ok(e.len() as u32));
    /// assert_eq!(d.peek(), Some(Ok(4)));
    /// ```
    pub fn catch<R, F>(&self, on_rejected: F) -> Deferred<T, E>
    where
        F: FnOnce(E) -> R + Send + 'static,
        R: IntoOutcome<E, Value = T>,
    {
        let (next, resolver) = Deferred::pair();
        self.subscribe(Queue::Rejected, move |outcome| match outcome {
            Ok(value) => resolver.forward(Outcome::Value(value)),
            Err(e) => resolver.forward(on_rejected(e).into_outcome()),
        });
        next
    }

    /// Attaches a cleanup step that runs whatever the outcome.
    ///
    /// The original value or error passes through unchanged unless `cleanup`
    /// returns an error, which then replaces the outcome on both paths.
    pub fn finally<F>(&self, cleanup: F) -> Deferred<T, E>
    where
        F: FnOnce() -> Option<E> + Send + 'static,
    {
        // Exactly one branch of the fork fires.
        let on_fulfilled = Arc::new(Mutex::new(Some(cleanup)));
        let on_rejected = Arc::clone(&on_fulfilled);

        crate::fork(
            self,
            move |value| match run_cleanup(&on_fulfilled) {
                Some(e) => Err(e),
                None => Ok(value),
            },
            move |e| match run_cleanup(&on_rejected) {
                Some(replaced) => Err(replaced),
                None => Err(e),
            },
        )
    }

    // Raw continuations see either outcome and run immediately once settled.
    pub(crate) fn react_fulfilled(&self, reaction: impl FnOnce(Result<T, E>) + Send + 'static) {
        self.subscribe(Queue::Fulfilled, reaction);
    }

    pub(crate) fn react_rejected(&self, reaction: impl FnOnce(Result<T, E>) + Send + 'static) {
        self.subscribe(Queue::Rejected, reaction);
    }

    fn subscribe(&self, queue: Queue, reaction: impl FnOnce(Result<T, E>) + Send + 'static) {
        let mut inner = lock(&self.inner);
        if let Some(outcome) = inner.outcome() {
            drop(inner);
            reaction(outcome);
            return;
        }
        match queue {
            Queue::Fulfilled => inner.on_fulfilled.push(Box::new(reaction)),
            Queue::Rejected => inner.on_rejected.push(Box::new(reaction)),
        }
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Fulfills the deferred value.
    ///
    /// # Errors
    ///
    /// Returns [`SettleError`] if the value was already settled or is following
    /// another deferred value. The stored outcome is left untouched.
    pub fn resolve(&self, value: T) -> Result<(), SettleError> {
        self.settle(Ok(value), false)
    }

    /// Rejects the deferred value.
    ///
    /// # Errors
    ///
    /// Same as [`Resolver::resolve`].
    pub fn reject(&self, error: E) -> Result<(), SettleError> {
        self.settle(Err(error), false)
    }

    /// Makes the deferred value follow `other` and settle with its outcome.
    ///
    /// From this point on the value is locked in: direct `resolve` and `reject`
    /// calls fail with [`SettleError::Adopting`] even though the state is still
    /// pending.
    ///
    /// # Errors
    ///
    /// Same as [`Resolver::resolve`]. Adopting the very value this resolver
    /// settles would never complete and fails with [`SettleError::SelfAdoption`].
    pub fn adopt(&self, other: Deferred<T, E>) -> Result<(), SettleError> {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return Err(SettleError::SelfAdoption);
        }
        {
            let mut inner = lock(&self.inner);
            inner.claim()?;
            inner.slot = Slot::Adopting;
        }
        trace!("deferred value adopting another deferred value");
        let this = self.clone();
        other.react_fulfilled(move |outcome| {
            if let Err(e) = this.settle(outcome, true) {
                debug!("adopted outcome discarded: {e}");
            }
        });
        Ok(())
    }

    /// Settles the deferred value from anything convertible into an [`Outcome`].
    ///
    /// `Ok` and [`Outcome::Value`] fulfill, `Err` and [`Outcome::Error`] reject, and
    /// a `Deferred` is adopted.
    ///
    /// # Errors
    ///
    /// Same as [`Resolver::adopt`].
    pub fn resolve_with<R>(&self, outcome: R) -> Result<(), SettleError>
    where
        R: IntoOutcome<E, Value = T>,
    {
        match outcome.into_outcome() {
            Outcome::Value(value) => self.resolve(value),
            Outcome::Error(e) => self.reject(e),
            Outcome::Deferred(other) => self.adopt(other),
        }
    }

    /// Current state of the deferred value this resolver settles.
    pub fn state(&self) -> State {
        lock(&self.inner).state()
    }

    // Settles a value the library owns. Losing the race is expected here, for
    // instance when a combinator output has already been settled.
    pub(crate) fn forward(&self, outcome: Outcome<T, E>) {
        if let Err(e) = self.resolve_with(outcome) {
            debug!("discarding late settlement: {e}");
        }
    }

    // Stores the outcome and drains both queues outside the lock. Only the
    // adoption path may settle a value that is locked in.
    //
    // Awaiting tasks are woken before any continuation runs. A panicking
    // continuation does not stop its siblings; the first panic is re-raised once
    // the queues are drained.
    fn settle(&self, outcome: Result<T, E>, adopted: bool) -> Result<(), SettleError> {
        let (on_fulfilled, on_rejected, wakers) = {
            let mut inner = lock(&self.inner);
            if !adopted {
                inner.claim()?;
            } else if !matches!(inner.slot, Slot::Adopting) {
                return Err(SettleError::AlreadySettled(inner.state()));
            }
            inner.slot = match &outcome {
                Ok(value) => Slot::Fulfilled(value.clone()),
                Err(e) => Slot::Rejected(e.clone()),
            };
            (
                mem::take(&mut inner.on_fulfilled),
                mem::take(&mut inner.on_rejected),
                mem::take(&mut inner.wakers),
            )
        };

        trace!(
            "deferred value {}, waking {} tasks, running {} continuations",
            if outcome.is_ok() { State::Fulfilled } else { State::Rejected },
            wakers.len(),
            on_fulfilled.len() + on_rejected.len()
        );

        for waker in wakers {
            waker.wake();
        }

        // The queue whose callbacks react to this outcome runs first, the other one
        // only relays it.
        let (first, second) = match &outcome {
            Ok(_) => (on_fulfilled, on_rejected),
            Err(_) => (on_rejected, on_fulfilled),
        };
        let mut panicked: Option<Box<dyn Any + Send>> = None;
        for reaction in first.into_iter().chain(second) {
            let outcome = outcome.clone();
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || reaction(outcome))) {
                debug!("continuation panicked, draining the rest");
                panicked.get_or_insert(payload);
            }
        }
        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }
        Ok(())
    }
}

/// Resolves to a copy of the outcome.
///
/// Each distinct task polling a pending value keeps one waker registered until the
/// value settles. Re-polling from the same task does not add another, but a future
/// that is dropped before completion leaves its waker behind until settlement.
impl<T: Clone, E: Clone> Future for Deferred<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = lock(&self.inner);
        match inner.outcome() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    inner.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
