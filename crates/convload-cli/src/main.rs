mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use convload_core::engine::TestRun;
use convload_core::results::export::{write_csv_reports, write_json_report};
use convload_core::scenario::{on_run_start, on_run_stop, SamplePayload, XmlConverterUser};
use convload_core::ConvloadError;
use tracing_subscriber::EnvFilter;

use crate::cli::ConvloadCli;

#[tokio::main]
async fn main() -> Result<ExitCode, ConvloadError> {
    // stdout stays free for piping; every log line goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = ConvloadCli::parse();

    let payload = Arc::new(SamplePayload::default());
    let stats = TestRun::new(cli.run_config(), move |_| {
        XmlConverterUser::new(Arc::clone(&payload))
    })
    .on_start(on_run_start)
    .on_stop(on_run_stop)
    .run()
    .await?;

    if let Some(prefix) = &cli.csv {
        write_csv_reports(&stats, prefix)?;
    }
    if let Some(path) = &cli.json {
        write_json_report(&stats, path)?;
    }

    if stats.num_failures > 0 {
        tracing::warn!(
            "{} of {} requests failed ({:.2}%)",
            stats.num_failures,
            stats.num_requests,
            stats.failure_ratio() * 100.0
        );
        return Ok(ExitCode::from(cli.exit_code_on_error));
    }
    Ok(ExitCode::SUCCESS)
}
