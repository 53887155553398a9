use crate::engine::RunConfig;
use crate::results::RunStatistics;

/// Start listener: announces the run.
pub fn on_run_start(config: &RunConfig) {
    tracing::info!(host = %config.host, users = config.users, "Load test starting...");
}

/// The closing summary, one line each, with values taken verbatim from `stats`.
pub fn run_stop_summary_lines(stats: &RunStatistics) -> Vec<String> {
    vec![
        "Load test completed!".to_string(),
        format!("Total requests: {}", stats.num_requests),
        format!("Total failures: {}", stats.num_failures),
        format!("Average response time: {:.2}ms", stats.avg_response_time),
        format!("RPS: {:.2}", stats.total_rps),
    ]
}

/// Stop listener: logs the closing summary.
pub fn on_run_stop(_config: &RunConfig, stats: &RunStatistics) {
    for line in run_stop_summary_lines(stats) {
        tracing::info!("{line}");
    }
}
