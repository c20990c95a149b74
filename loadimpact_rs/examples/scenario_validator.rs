//! Validate a user scenario and print its log.
//!
//! ```text
//! LOADIMPACT_API_TOKEN=... cargo run --example scenario_validator -- <user-scenario-id>
//! ```

use loadimpact::{LoadImpact, ValidationStatus};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), loadimpact::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let scenario_id: i64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .ok_or_else(|| {
            loadimpact::Error::Config("usage: scenario_validator <user-scenario-id>".into())
        })?;

    let li = LoadImpact::from_env()?;
    let validation = li.validate_scenario(scenario_id).await?;
    println!("validation {} queued", validation.id());

    let mut log = validation.log_stream();
    while let Some(entry) = log.next().await {
        let entry = entry?;
        println!(
            "{:>5} {:<7} {}",
            entry.offset,
            entry.level.as_deref().unwrap_or("-"),
            entry.message.as_deref().unwrap_or_default()
        );
    }

    match log.status() {
        ValidationStatus::Finished => println!("validation passed"),
        status => println!("validation ended: {}", status),
    }
    Ok(())
}
