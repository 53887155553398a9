use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use convload_core::engine::{parse_duration, RunConfig};

#[derive(Debug, Parser)]
#[command(name = "convload", version, about, long_about = None)]
pub struct ConvloadCli {
    /// Base URL of the conversion service
    #[arg(long, default_value = "http://localhost:8080")]
    pub host: String,

    /// Number of concurrent users
    #[arg(short, long, default_value_t = 1)]
    pub users: usize,

    /// Users started per second until all are running
    #[arg(short = 'r', long, default_value_t = 1.0)]
    pub spawn_rate: f64,

    /// Stop after this long, e.g. `90`, `30s`, `5m` or `1h30m`. Runs until
    /// Ctrl-C when omitted.
    #[arg(short = 't', long, value_parser = parse_duration)]
    pub run_time: Option<Duration>,

    /// Only print the summary when the run ends, no periodic progress lines
    #[arg(long, default_value = "false")]
    pub only_summary: bool,

    /// Write `<PREFIX>_stats.csv` and `<PREFIX>_failures.csv` when the run ends
    #[arg(long, value_name = "PREFIX")]
    pub csv: Option<String>,

    /// Write the run summary as JSON to this path
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,

    /// Process exit code when any request failed
    #[arg(long, default_value_t = 1)]
    pub exit_code_on_error: u8,

    /// How often to log a progress line
    #[arg(long, default_value = "2s", value_parser = parse_duration)]
    pub progress_interval: Duration,

    /// How long a request in flight may keep running after the run stops.
    /// `0` abandons it immediately.
    #[arg(long, default_value = "0", value_parser = parse_duration)]
    pub stop_timeout: Duration,
}

impl ConvloadCli {
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            host: self.host.clone(),
            users: self.users,
            spawn_rate: self.spawn_rate,
            run_time: self.run_time,
            progress_interval: self.progress_interval,
            only_summary: self.only_summary,
            stop_timeout: self.stop_timeout,
        }
    }
}
