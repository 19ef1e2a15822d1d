//! # Workbench Runtime
//!
//! Entry point for the workbench process.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment
//! 2. Initialize logging
//! 3. Build the bus and mount the tool panels
//! 4. Drive the demonstration session
//! 5. Print the diagnostic snapshot and metrics
//! 6. Optionally wait for Ctrl+C, then shut down

use anyhow::{Context, Result};
use tracing::{info, warn};
use workbench_runtime::monitor::retry_dead_letters;
use workbench_runtime::scenario::run_demo_session;
use workbench_runtime::{RuntimeConfig, WorkbenchRuntime};
use workbench_telemetry::init_telemetry;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = RuntimeConfig::from_env().context("Failed to load configuration")?;
    let _telemetry = init_telemetry(&config.telemetry).context("Failed to initialize telemetry")?;

    info!("===========================================");
    info!("  Workbench Runtime v{}", env!("CARGO_PKG_VERSION"));
    info!("  Project: {}", config.project_id);
    info!("===========================================");

    let runtime = WorkbenchRuntime::new(&config).context("Failed to build workbench")?;
    run_demo_session(&runtime).await;

    let retried = retry_dead_letters(runtime.bus(), |dead| {
        dead.reason.label() == "delivery_exhausted"
    });
    if retried > 0 {
        info!(retried, "Re-dispatched dead letters that exhausted delivery");
    }

    let snapshot = runtime.snapshot();
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("Failed to encode diagnostics")?
    );
    match runtime.bus().metrics_text() {
        Ok(text) => println!("{text}"),
        Err(e) => warn!(error = %e, "Failed to encode metrics"),
    }

    if config.keep_running {
        info!("Workbench is running. Press Ctrl+C to stop.");
        tokio::signal::ctrl_c().await?;
    }

    runtime.shutdown();
    Ok(())
}
