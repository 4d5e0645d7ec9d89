use deferred::{Deferred, from_future};
use macro_rules_attribute::apply;
use smol::Timer;
use smol_macros::{Executor, main};
use std::time::Duration;

async fn fetch(name: &'static str, millis: u64) -> Result<String, String> {
    println!("Fetching {name}");
    Timer::after(Duration::from_millis(millis)).await;
    println!("Fetched {name}");
    Ok(format!("<{name}>"))
}

#[apply(main!)]
async fn main(ex: &Executor<'_>) {
    let (profile, settling) = from_future(fetch("profile", 300));
    ex.spawn(settling).detach();

    // Delegating to another deferred value flattens the chain.
    let page = profile.then(|profile| {
        let (friends, settling) = from_future(fetch("friends", 100));
        smol::spawn(settling).detach();
        friends.then(move |friends| Ok::<_, String>(format!("{profile}{friends}")))
    });

    let page: Deferred<String, String> = page.finally(|| {
        println!("Request finished");
        None
    });

    println!("After spawn");
    println!("Page: {:?}", page.await);
}
