//! Bridges from synchronous work and plain futures to deferred values.
//!
//! [`run`] executes a closure on a shared thread pool, [`spawn`] polls a future on
//! that same pool, and [`from_future`] leaves the choice of executor to the caller:
//! the returned [`Settling`] future can be spawned on tokio, smol or any other
//! runtime and settles the deferred value when the wrapped future completes.
use std::{
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    sync::OnceLock,
    task::{Context, Poll, ready},
};

use futures::executor::ThreadPool;
use log::{error, trace, warn};
use pin_project_lite::pin_project;

use crate::{ConfigError, Deferred, IntoOutcome, PoolConfig, Resolver};

static THREAD_POOL: OnceLock<ThreadPool> = OnceLock::new();

fn thread_pool() -> &'static ThreadPool {
    THREAD_POOL.get_or_init(|| {
        let config = PoolConfig::from_env().unwrap_or_else(|e| {
            warn!("{e}, using default thread pool settings");
            PoolConfig::default()
        });
        config.build().expect("Thread pool creation failed")
    })
}

/// Creates the background thread pool with explicit settings.
///
/// Must be called before the first [`run`] or [`spawn`]; the pool is otherwise
/// created from [`PoolConfig::from_env`].
///
/// # Errors
///
/// - [`ConfigError::AlreadyConfigured`]: the pool already exists.
/// - [`ConfigError::InvalidPoolSize`]: the configured size is zero.
/// - [`ConfigError::Io`]: the worker threads could not be started.
pub fn configure(config: &PoolConfig) -> Result<(), ConfigError> {
    if THREAD_POOL.get().is_some() {
        return Err(ConfigError::AlreadyConfigured);
    }
    let pool = config.build()?;
    THREAD_POOL
        .set(pool)
        .map_err(|_| ConfigError::AlreadyConfigured)?;
    trace!("thread pool configured with {} threads", config.size());
    Ok(())
}

/// Runs `task_fn` on the background thread pool.
///
/// The returned value is pending when this function returns. It fulfills with the
/// closure's `Ok` value, rejects with its `Err`, or adopts a returned `Deferred`.
/// If the closure panics the panic is logged and the value stays pending. A panic in
/// a continuation attached to the returned value is logged as well and never takes
/// down a worker thread.
///
/// # Example
/// ```
/// use deferred::run;
///
/// let d = run(|| Ok::<_, String>(6 * 7));
/// assert_eq!(d.wait(), Ok(42));
/// ```
pub fn run<R, E, F>(task_fn: F) -> Deferred<R::Value, E>
where
    F: FnOnce() -> R + Send + 'static,
    R: IntoOutcome<E>,
    R::Value: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let (deferred, resolver) = Deferred::pair();
    thread_pool().spawn_ok(async move {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(task_fn)) {
            Ok(r) => r.into_outcome(),
            Err(_) => {
                error!("background function panicked, deferred value left pending");
                return;
            }
        };
        // The value is settled even if one of its continuations panics.
        if panic::catch_unwind(AssertUnwindSafe(|| resolver.forward(outcome))).is_err() {
            error!("continuation of a background value panicked");
        }
    });
    deferred
}

/// Polls `future` to completion on the background thread pool and settles the
/// returned value with its output.
///
/// The future must not rely on a particular runtime, e.g. `tokio::time::sleep()`
/// will panic here. Use [`from_future`] to drive such futures on their own runtime.
pub fn spawn<Fut, E>(future: Fut) -> Deferred<<Fut::Output as IntoOutcome<E>>::Value, E>
where
    Fut: Future + Send + 'static,
    Fut::Output: IntoOutcome<E>,
    <Fut::Output as IntoOutcome<E>>::Value: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let (deferred, settling) = from_future(future);
    thread_pool().spawn_ok(settling);
    deferred
}

/// Splits `future` into a deferred value and the future that settles it.
///
/// Nothing happens until the returned [`Settling`] is polled. Dropping it before
/// completion leaves the deferred value pending.
///
/// # Example
/// ```
/// use deferred::from_future;
///
/// let (d, settling) = from_future(async { Err::<u8, _>("offline") });
/// assert!(d.is_pending());
/// futures::executor::block_on(settling);
/// assert_eq!(d.peek(), Some(Err("offline")));
/// ```
pub fn from_future<Fut, E>(
    future: Fut,
) -> (Deferred<<Fut::Output as IntoOutcome<E>>::Value, E>, Settling<Fut, E>)
where
    Fut: Future,
    Fut::Output: IntoOutcome<E>,
    <Fut::Output as IntoOutcome<E>>::Value: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let (deferred, resolver) = Deferred::pair();
    let settling = Settling {
        future,
        resolver: Some(resolver),
    };
    (deferred, settling)
}

pin_project! {
    /// A future that settles a deferred value with the output of an inner future.
    ///
    /// Created by [`from_future`].
    #[must_use = "futures do nothing unless polled or .awaited"]
    pub struct Settling<F, E>
    where
        F: Future,
        F::Output: IntoOutcome<E>,
    {
        #[pin]
        future: F,
        resolver: Option<Resolver<<F::Output as IntoOutcome<E>>::Value, E>>,
    }
}

impl<F, E> Future for Settling<F, E>
where
    F: Future,
    F::Output: IntoOutcome<E>,
    <F::Output as IntoOutcome<E>>::Value: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let output = ready!(this.future.poll(cx));
        if let Some(resolver) = this.resolver.take() {
            resolver.forward(output.into_outcome());
        }
        Poll::Ready(())
    }
}
