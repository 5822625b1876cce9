//! # PE Runtime
//!
//! Runs one confidential assessment against the simulated collaborators
//! and prints the revealed scores.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use pe_runtime::{load_config, Scenario};
use pe_telemetry::{encode_metrics, init_telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = load_config().context("failed to load configuration")?;

    // Initialize telemetry; the guard flushes spans on drop
    let _telemetry = init_telemetry(config.telemetry.clone())
        .await
        .context("failed to initialize telemetry")?;

    info!(
        version = pe_assessment::VERSION,
        chain = %config.chain_id,
        account = %config.account,
        "Starting assessment runtime"
    );

    let scenario = Scenario::new(config);
    let follower = scenario.follow_status();
    let outcome = scenario.run().await;
    follower.abort();

    match encode_metrics() {
        Ok(text) => debug!(metrics = %text, "Final metrics"),
        Err(err) => warn!(error = %err, "Metrics unavailable"),
    }

    let report = outcome.context("assessment scenario failed")?;
    println!("{report}");
    Ok(())
}
