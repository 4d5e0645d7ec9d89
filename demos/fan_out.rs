use std::time::Duration;

use deferred::{Deferred, all, every, race, run};

#[derive(Clone, Debug)]
struct Unavailable(&'static str);

fn lookup(region: &'static str, millis: u64) -> Deferred<u32, Unavailable> {
    run(move || {
        std::thread::sleep(Duration::from_millis(millis));
        if region == "mars" {
            return Err(Unavailable(region));
        }
        Ok(millis as u32)
    })
}

#[tokio::main]
async fn main() {
    let regions = [("eu", 30), ("us", 10), ("asia", 20)];

    let latencies = all(regions.iter().map(|&(r, ms)| lookup(r, ms))).await;
    println!("All regions: {latencies:?}");

    let fastest = race(regions.iter().map(|&(r, ms)| lookup(r, ms))).await;
    println!("Fastest region: {fastest:?}");

    let report = every([lookup("eu", 5), lookup("mars", 5)])
        .then(|outcomes| {
            let up = outcomes.iter().filter(|o| o.is_ok()).count();
            Ok(format!("{up}/{} regions up", outcomes.len()))
        })
        .await;
    println!("Report: {report:?}");

    let recovered = lookup("mars", 1)
        .catch(|Unavailable(region)| {
            println!("{region} unavailable, falling back");
            lookup("eu", 1)
        })
        .await;
    println!("Recovered: {recovered:?}");
}
