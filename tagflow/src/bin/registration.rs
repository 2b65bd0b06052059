//! Runs the three-stage registration pipeline.
//!
//! Configuration comes from `TAGFLOW_*` environment variables; logging is
//! controlled with `RUST_LOG` and switches to JSON when `TAGFLOW_LOG_JSON`
//! is set.

use anyhow::Context;
use std::process::ExitCode;
use std::sync::Arc;
use tagflow::config::PipelineConfig;
use tagflow::events::LoggingEventSink;
use tagflow::pipeline::{registration_pipeline, Orchestrator};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const ENV_LOG_JSON: &str = "TAGFLOW_LOG_JSON";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if std::env::var_os(ENV_LOG_JSON).is_some() {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();

    let config = PipelineConfig::from_env().context("invalid pipeline configuration")?;
    let (spec, ledger) = registration_pipeline(&config, Arc::new(LoggingEventSink::default()))
        .context("invalid pipeline description")?;

    let report = Orchestrator::new()
        .run(spec)
        .await
        .context("pipeline could not start")?;

    if report.is_success() {
        info!(
            run_id = %report.run_id,
            registered = ledger.len(),
            duration_ms = report.duration_ms,
            "Registration finished"
        );
    } else {
        warn!(run_id = %report.run_id, report = %report.to_json(), "Registration finished with faults");
    }

    Ok(ExitCode::from(u8::try_from(report.exit_code()).unwrap_or(1)))
}
