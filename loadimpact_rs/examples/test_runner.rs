//! Start a test and print its results as they arrive.
//!
//! ```text
//! LOADIMPACT_API_TOKEN=... cargo run --example test_runner -- <test-config-id>
//! ```
//!
//! Ctrl-C aborts the test; the stream keeps draining until the run settles.

use loadimpact::{LoadImpact, LoadZone, MetricId, StandardMetric};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), loadimpact::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_id: i64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .ok_or_else(|| loadimpact::Error::Config("usage: test_runner <test-config-id>".into()))?;

    let li = LoadImpact::from_env()?;
    info!(token = %li.api_token_masked(), config_id, "starting test");

    let run = li.start_test(config_id).await?;
    println!("test {} started ({})", run.id(), run.status());

    let aborter = run.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            match aborter.abort().await {
                Ok(true) => println!("abort requested, draining remaining results"),
                Ok(false) => println!("test already stopping"),
                Err(e) => warn!(error = %e, "abort failed"),
            }
        }
    });

    let ids = vec![
        MetricId::standard(StandardMetric::UserLoadTime, Some(LoadZone::World)),
        MetricId::standard(StandardMetric::ActiveUsers, Some(LoadZone::World)),
        MetricId::standard(StandardMetric::RequestsPerSecond, Some(LoadZone::World)),
    ];
    let mut stream = run.result_stream(ids);
    let mut iter = stream.iterate();
    while let Some(changes) = iter.next().await {
        let changes = changes?;
        for (id, point) in &changes.changes {
            println!("[{}] {} @{} {}", changes.cycle, id, point.offset, point.data);
        }
    }
    drop(iter);

    let test = run.sync().await?;
    println!("test {} ended: {}", test.id, test.status_text());
    Ok(())
}
