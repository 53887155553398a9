use std::path::{Path, PathBuf};

use super::{EndpointStats, RunStatistics};
use crate::error::ConvloadError;

const STATS_HEADER: [&str; 12] = [
    "Type",
    "Name",
    "Request Count",
    "Failure Count",
    "Median Response Time",
    "Average Response Time",
    "Min Response Time",
    "Max Response Time",
    "95%",
    "99%",
    "Total Content Length",
    "Requests/s",
];

// ---------------------------------------------------------------------------
// CSV export
// ---------------------------------------------------------------------------

/// Export the per-endpoint statistics as CSV.
///
/// One row per (method, name) pair in the order the aggregator reports them,
/// followed by an `Aggregated` row with the run totals. Times are in
/// milliseconds.
pub fn export_csv(stats: &RunStatistics) -> Result<String, ConvloadError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(STATS_HEADER)?;

    for endpoint in &stats.endpoints {
        writer.write_record(endpoint_row(endpoint))?;
    }

    writer.write_record([
        String::new(),
        "Aggregated".to_string(),
        stats.num_requests.to_string(),
        stats.num_failures.to_string(),
        format_ms(stats.median_response_time),
        format_ms(stats.avg_response_time),
        format_ms(stats.min_response_time),
        format_ms(stats.max_response_time),
        format_ms(stats.p95_response_time),
        format_ms(stats.p99_response_time),
        stats.total_content_length.to_string(),
        format!("{:.2}", stats.total_rps),
    ])?;

    into_string(writer)
}

/// Export the failure groups as CSV, most frequent first.
pub fn export_failures_csv(stats: &RunStatistics) -> Result<String, ConvloadError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Method", "Name", "Error", "Occurrences"])?;

    for failure in &stats.failures {
        let occurrences = failure.occurrences.to_string();
        writer.write_record([
            failure.method.as_str(),
            failure.name.as_str(),
            failure.error.as_str(),
            occurrences.as_str(),
        ])?;
    }

    into_string(writer)
}

fn endpoint_row(endpoint: &EndpointStats) -> [String; 12] {
    [
        endpoint.method.clone(),
        endpoint.name.clone(),
        endpoint.num_requests.to_string(),
        endpoint.num_failures.to_string(),
        format_ms(endpoint.median_response_time),
        format_ms(endpoint.avg_response_time),
        format_ms(endpoint.min_response_time),
        format_ms(endpoint.max_response_time),
        format_ms(endpoint.p95_response_time),
        format_ms(endpoint.p99_response_time),
        endpoint.total_content_length.to_string(),
        format!("{:.2}", endpoint.requests_per_second),
    ]
}

fn format_ms(ms: f64) -> String {
    format!("{ms:.2}")
}

fn into_string(writer: csv::Writer<Vec<u8>>) -> Result<String, ConvloadError> {
    let bytes = writer
        .into_inner()
        .map_err(|e| ConvloadError::Engine(format!("Failed to flush CSV: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| ConvloadError::Engine(format!("CSV output is not UTF-8: {e}")))
}

// ---------------------------------------------------------------------------
// JSON export
// ---------------------------------------------------------------------------

/// Export the run summary as pretty-printed JSON.
pub fn export_json(stats: &RunStatistics) -> Result<String, ConvloadError> {
    Ok(serde_json::to_string_pretty(stats)?)
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Write `<prefix>_stats.csv` and `<prefix>_failures.csv`, returning both paths.
pub fn write_csv_reports(
    stats: &RunStatistics,
    prefix: &str,
) -> Result<(PathBuf, PathBuf), ConvloadError> {
    let stats_path = PathBuf::from(format!("{prefix}_stats.csv"));
    let failures_path = PathBuf::from(format!("{prefix}_failures.csv"));

    std::fs::write(&stats_path, export_csv(stats)?)?;
    std::fs::write(&failures_path, export_failures_csv(stats)?)?;

    tracing::info!(
        "Wrote CSV reports to {} and {}",
        stats_path.display(),
        failures_path.display()
    );
    Ok((stats_path, failures_path))
}

/// Write the JSON summary to `path`.
pub fn write_json_report(stats: &RunStatistics, path: &Path) -> Result<(), ConvloadError> {
    std::fs::write(path, export_json(stats)?)?;
    tracing::info!("Wrote JSON report to {}", path.display());
    Ok(())
}
