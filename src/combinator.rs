//! Combinators that build one deferred value out of others.
//!
//! Every combinator attaches internal continuations to its inputs and settles a
//! single output. Inputs may settle from different threads at the same time, so the
//! shared bookkeeping of one combinator lives behind one mutex, and "first writer
//! wins" is decided by the output's own settlement gate: a late settlement is simply
//! reported back as [`SettleError`](crate::SettleError) and discarded.
use std::sync::{Arc, Mutex};

use log::trace;

use crate::{Deferred, IntoOutcome, Outcome, deferred::lock};

// Index-aligned results of one `all` or `every` call.
struct Tally<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
}

impl<T> Tally<T> {
    fn new(len: usize) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            slots: (0..len).map(|_| None).collect(),
            remaining: len,
        }))
    }

    // Storing a slot and checking for the last one must happen under one lock,
    // otherwise two finishing inputs could both see `remaining == 0` or neither.
    fn record(&mut self, index: usize, value: T) -> Option<Vec<T>> {
        if self.slots[index].replace(value).is_none() {
            self.remaining -= 1;
        }
        if self.remaining > 0 {
            return None;
        }
        self.slots.iter_mut().map(Option::take).collect()
    }
}

/// Attaches a success and a failure continuation to `source` and exposes them as one
/// deferred value.
///
/// Whichever branch fires settles the returned value through the usual resolution
/// rules: `Ok` fulfills, `Err` rejects and a returned `Deferred` is adopted. Unlike
/// chaining [`Deferred::then`] and [`Deferred::catch`], an error returned by
/// `on_fulfilled` is not handed to `on_rejected`.
///
/// # Example
/// ```
/// use deferred::{Deferred, fork};
///
/// let d = fork(
///     &Deferred::<u8, String>::rejected("lost".into()),
///     |n| Ok(n.to_string()),
///     |e| Ok(format!("recovered from {e}")),
/// );
/// assert_eq!(d.peek(), Some(Ok("recovered from lost".to_string())));
/// ```
pub fn fork<T, E, U, F, G, R1, R2>(
    source: &Deferred<T, E>,
    on_fulfilled: F,
    on_rejected: G,
) -> Deferred<U, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    U: Clone + Send + 'static,
    F: FnOnce(T) -> R1 + Send + 'static,
    G: FnOnce(E) -> R2 + Send + 'static,
    R1: IntoOutcome<E, Value = U>,
    R2: IntoOutcome<E, Value = U>,
{
    let (next, resolver) = Deferred::pair();
    let on_error = resolver.clone();

    source.react_fulfilled(move |outcome| {
        if let Ok(value) = outcome {
            resolver.forward(on_fulfilled(value).into_outcome());
        }
    });
    source.react_rejected(move |outcome| {
        if let Err(e) = outcome {
            on_error.forward(on_rejected(e).into_outcome());
        }
    });
    next
}

/// Waits for every input to fulfill.
///
/// The output fulfills with the results in input order, whatever order the inputs
/// completed in. It rejects with the error of the first input to reject, by
/// completion time; later outcomes are discarded. With no inputs the output is
/// fulfilled immediately with an empty vector.
///
/// # Example
/// ```
/// use deferred::{Deferred, all};
///
/// let d = all([Deferred::<_, String>::resolved(1), Deferred::resolved(2)]);
/// assert_eq!(d.peek(), Some(Ok(vec![1, 2])));
/// ```
pub fn all<T, E, I>(sources: I) -> Deferred<Vec<T>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Deferred<T, E>>,
{
    let sources: Vec<_> = sources.into_iter().collect();
    if sources.is_empty() {
        return Deferred::resolved(Vec::new());
    }

    let (aggregate, resolver) = Deferred::pair();
    let tally = Tally::new(sources.len());
    trace!("all: waiting on {} deferred values", sources.len());

    for (index, source) in sources.iter().enumerate() {
        let tally = Arc::clone(&tally);
        let resolver = resolver.clone();
        source.react_fulfilled(move |outcome| match outcome {
            Ok(value) => {
                let finished = lock(&tally).record(index, value);
                if let Some(values) = finished {
                    resolver.forward(Outcome::Value(values));
                }
            }
            Err(e) => resolver.forward(Outcome::Error(e)),
        });
    }
    aggregate
}

/// Settles with the outcome of whichever input settles first.
///
/// Completion order decides, not input order. Later settlements are ignored. With
/// no inputs the output stays pending forever.
pub fn race<T, E, I>(sources: I) -> Deferred<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Deferred<T, E>>,
{
    let (winner, resolver) = Deferred::pair();
    for source in sources {
        let resolver = resolver.clone();
        source.react_fulfilled(move |outcome| resolver.forward(outcome.into_outcome()));
    }
    winner
}

/// Waits for every input to settle and never rejects.
///
/// Each slot of the output holds the input's value or error, in input order. With
/// no inputs the output is fulfilled immediately with an empty vector.
///
/// # Example
/// ```
/// use deferred::{Deferred, every};
///
/// let d = every([
///     Deferred::resolved(1),
///     Deferred::rejected("nope".to_string()),
/// ]);
/// assert_eq!(d.peek(), Some(Ok(vec![Ok(1), Err("nope".to_string())])));
/// ```
pub fn every<T, E, I>(sources: I) -> Deferred<Vec<Result<T, E>>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Deferred<T, E>>,
{
    let sources: Vec<_> = sources.into_iter().collect();
    if sources.is_empty() {
        return Deferred::resolved(Vec::new());
    }

    let (aggregate, resolver) = Deferred::pair();
    let tally = Tally::new(sources.len());

    for (index, source) in sources.iter().enumerate() {
        let tally = Arc::clone(&tally);
        let resolver = resolver.clone();
        source.react_fulfilled(move |outcome| {
            let finished = lock(&tally).record(index, outcome);
            if let Some(outcomes) = finished {
                resolver.forward(Outcome::Value(outcomes));
            }
        });
    }
    aggregate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::State;
    use std::{sync::mpsc, thread, time::Duration};

    #[test]
    fn fork_routes_to_single_branch() {
        let ok = fork(
            &Deferred::<u8, &str>::resolved(3),
            |n| Ok(n * 2),
            |_| Err("unexpected"),
        );
        let err = fork(
            &Deferred::<u8, &str>::rejected("bad"),
            |_| Err("unexpected"),
            |e| Ok(e.len() as u8),
        );
        assert_eq!(ok.peek(), Some(Ok(6)));
        assert_eq!(err.peek(), Some(Ok(3)));
    }

    #[test]
    fn fork_error_from_success_branch_rejects() {
        let d = fork(
            &Deferred::<u8, &str>::resolved(3),
            |_| Err::<u8, _>("Bar"),
            |_| Ok(0),
        );
        assert_eq!(d.peek(), Some(Err("Bar")));
    }

    #[test]
    fn all_keeps_input_order_when_completing_backwards() {
        let (first, resolve_first) = Deferred::<u8, ()>::pair();
        let (second, resolve_second) = Deferred::<u8, ()>::pair();
        let d = all([first, second]);

        resolve_second.resolve(2).unwrap();
        assert_eq!(d.state(), State::Pending);
        resolve_first.resolve(1).unwrap();
        assert_eq!(d.peek(), Some(Ok(vec![1, 2])));
    }

    #[test]
    fn all_rejects_with_first_rejection_by_time() {
        let (first, resolve_first) = Deferred::<u8, &str>::pair();
        let (second, resolve_second) = Deferred::<u8, &str>::pair();
        let d = all([first, second]);

        resolve_second.reject("second").unwrap();
        resolve_first.reject("first").unwrap();
        assert_eq!(d.peek(), Some(Err("second")));
    }

    #[test]
    fn race_ignores_later_settlements() {
        let (slow, resolve_slow) = Deferred::<u8, &str>::pair();
        let (fast, resolve_fast) = Deferred::<u8, &str>::pair();
        let d = race([slow, fast]);

        resolve_fast.reject("fast").unwrap();
        resolve_slow.resolve(1).unwrap();
        assert_eq!(d.peek(), Some(Err("fast")));
    }

    #[test]
    fn race_of_nothing_stays_pending() {
        let d = race(Vec::<Deferred<u8, ()>>::new());
        assert!(d.is_pending());
    }

    #[test]
    fn every_waits_for_the_slowest() {
        let (slow, resolver) = Deferred::<u8, &str>::pair();
        let d = every([Deferred::rejected("fast"), slow]);
        assert!(d.is_pending());
        resolver.resolve(5).unwrap();
        assert_eq!(d.peek(), Some(Ok(vec![Err("fast"), Ok(5)])));
    }

    #[test]
    fn all_settles_once_under_concurrent_completion() {
        let (tx, rx) = mpsc::channel();
        let mut sources = Vec::new();
        for _ in 0..32 {
            let (d, resolver) = Deferred::<usize, ()>::pair();
            sources.push(d);
            tx.send(resolver).unwrap();
        }
        drop(tx);

        let d = all(sources);
        let handles: Vec<_> = rx
            .into_iter()
            .enumerate()
            .map(|(i, resolver)| {
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis((i % 4) as u64));
                    resolver.resolve(i).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(d.wait(), Ok((0..32).collect::<Vec<_>>()));
    }
}
