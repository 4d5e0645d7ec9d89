use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    time::Duration,
};

use deferred::{Deferred, State, all, every, fork, from_future, race, run, spawn};
use macro_rules_attribute::apply;

#[derive(Clone, Debug, PartialEq)]
struct Failure(String);

fn failure(msg: &str) -> Failure {
    Failure(msg.to_string())
}

#[test]
fn fork_calls_success_branch() {
    let d = fork(
        &Deferred::<_, Failure>::resolved("Foo"),
        |s| {
            assert_eq!(s, "Foo");
            Ok("Bar")
        },
        |_| -> Result<&'static str, Failure> { panic!("Should not be here") },
    )
    .then(|s| {
        assert_eq!(s, "Bar");
        Ok(s.len())
    });
    assert_eq!(d.peek(), Some(Ok(3)));
}

#[test]
fn fork_calls_failure_branch() {
    let d = fork(
        &Deferred::<u8, _>::rejected(failure("Foo")),
        |_| -> Result<u8, Failure> { panic!("Should not be here") },
        |e| Ok(e.0.len() as u8),
    );
    assert_eq!(d.peek(), Some(Ok(3)));
}

#[test]
fn catch_after_fork_sees_returned_error() {
    let caught = Arc::new(AtomicBool::new(false));
    let caught_cl = Arc::clone(&caught);
    fork(
        &Deferred::<_, Failure>::resolved("Foo"),
        |_| Err::<&str, _>(failure("Bar")),
        |_| Ok("unreachable"),
    )
    .catch(move |e| {
        assert_eq!(e, failure("Bar"));
        caught_cl.store(true, Ordering::Relaxed);
        Ok("")
    });
    assert!(caught.load(Ordering::Relaxed));
}

#[test]
fn all_resolves_in_order() {
    let d = all([Deferred::<_, Failure>::resolved(1), Deferred::resolved(2)]);
    assert_eq!(d.peek(), Some(Ok(vec![1, 2])));
}

#[test]
fn all_rejects_with_first_rejection() {
    let d = all([
        Deferred::resolved(1),
        Deferred::rejected(failure("Error 1")),
        Deferred::rejected(failure("Error 2")),
    ]);
    assert_eq!(d.peek(), Some(Err(failure("Error 1"))));
}

#[test]
fn all_of_nothing_is_empty() {
    let d = all(Vec::<Deferred<u8, Failure>>::new());
    assert_eq!(d.peek(), Some(Ok(vec![])));
}

#[test]
fn race_takes_first_settled() {
    let won = race([
        Deferred::resolved(1),
        Deferred::rejected(failure("err")),
    ]);
    let lost = race([
        Deferred::rejected(failure("err")),
        Deferred::resolved(1),
    ]);
    assert_eq!(won.peek(), Some(Ok(1)));
    assert_eq!(lost.peek(), Some(Err(failure("err"))));
}

#[test]
fn every_captures_rejections() {
    let d = every([
        Deferred::resolved(1),
        Deferred::resolved(2),
        Deferred::rejected(failure("Error!")),
    ]);
    assert_eq!(
        d.peek(),
        Some(Ok(vec![Ok(1), Ok(2), Err(failure("Error!"))]))
    );
    assert!(every(Vec::<Deferred<u8, Failure>>::new()).peek().unwrap().unwrap().is_empty());
}

#[test]
fn run_reports_result_later() {
    let done = Arc::new(AtomicU8::new(1));
    let done_fn = Arc::clone(&done);
    let done_then = Arc::clone(&done);

    let d = run(move || {
        std::thread::sleep(Duration::from_millis(20));
        done_fn.store(2, Ordering::SeqCst);
        Ok::<_, Failure>("AAA")
    })
    .then(move |s| {
        done_then.store(3, Ordering::SeqCst);
        Ok(s)
    });

    assert_eq!(done.load(Ordering::SeqCst), 1, "Run should not block the caller");
    assert_eq!(d.wait(), Ok("AAA"));
    assert_eq!(done.load(Ordering::SeqCst), 3);
}

#[test]
fn run_rejects_on_error() {
    let d = run(|| Err::<String, _>(failure("Oh no"))).catch(|e| Ok(e.0));
    assert_eq!(d.wait(), Ok("Oh no".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn race_by_completion_time_across_threads() {
    let slow = run(|| {
        std::thread::sleep(Duration::from_millis(200));
        Ok::<_, Failure>("slow")
    });
    let fast = run(|| {
        std::thread::sleep(Duration::from_millis(1));
        Ok::<_, Failure>("fast")
    });
    assert_eq!(race([slow, fast]).await, Ok("fast"));
}

#[tokio::test(flavor = "multi_thread")]
async fn all_with_tokio_driven_sources() {
    let sources = (0..8u64).map(|i| {
        let (d, settling) = from_future(async move {
            tokio::time::sleep(Duration::from_millis(8 - i)).await;
            Ok::<_, Failure>(i)
        });
        tokio::spawn(settling);
        d
    });
    let d = all(sources);
    assert_eq!(d.await, Ok((0..8).collect::<Vec<_>>()));
}

#[tokio::test(flavor = "multi_thread")]
async fn every_mixes_outcomes_across_threads() {
    let d = every([
        run(|| Ok::<_, Failure>(1)),
        run(|| Err(failure("middle"))),
        spawn(async { Ok::<_, Failure>(3) }),
    ]);
    assert_eq!(d.await, Ok(vec![Ok(1), Err(failure("middle")), Ok(3)]));
}

#[apply(smol_macros::test!)]
async fn settles_on_smol_executor(ex: &smol_macros::Executor<'_>) {
    let (d, settling) = from_future(async {
        smol::Timer::after(Duration::from_millis(5)).await;
        Ok::<_, Failure>("smol")
    });
    ex.spawn(settling).detach();

    let chained = d.then(|s| Ok(s.to_uppercase()));
    assert_eq!(chained.await, Ok("SMOL".to_string()));
    assert_eq!(d.state(), State::Fulfilled);
}

#[test]
fn awaited_with_futures_lite() {
    let d = spawn(async { Ok::<_, Failure>(21) }).then(|n| Ok(n * 2));
    assert_eq!(futures_lite::future::block_on(d), Ok(42));
}
