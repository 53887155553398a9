use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConvloadError;

/// Run-time parameters for a [`TestRun`](crate::engine::TestRun).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunConfig {
    /// Base URL of the service under test, e.g. `http://localhost:8080`.
    pub host: String,
    /// Number of concurrent simulated users.
    pub users: usize,
    /// Users started per second until `users` are running.
    pub spawn_rate: f64,
    /// Stop after this long. `None` runs until cancelled or Ctrl-C.
    pub run_time: Option<Duration>,
    /// How often a progress line is logged while the run is in flight.
    pub progress_interval: Duration,
    /// Only log the final summary, no periodic progress.
    pub only_summary: bool,
    /// How long a user's in-flight task may keep running once the run has
    /// been stopped. Zero abandons it immediately.
    pub stop_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:8080".to_string(),
            users: 1,
            spawn_rate: 1.0,
            run_time: None,
            progress_interval: Duration::from_secs(2),
            only_summary: false,
            stop_timeout: Duration::ZERO,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConvloadError> {
        if self.users == 0 {
            return Err(ConvloadError::Validation(
                "users must be at least 1".to_string(),
            ));
        }
        if !self.spawn_rate.is_finite() || self.spawn_rate <= 0.0 {
            return Err(ConvloadError::Validation(format!(
                "spawn rate must be a positive number, got {}",
                self.spawn_rate
            )));
        }
        if Duration::try_from_secs_f64(1.0 / self.spawn_rate).is_err() {
            return Err(ConvloadError::Validation(format!(
                "spawn rate {} is too low to schedule users",
                self.spawn_rate
            )));
        }
        if self.run_time.is_some_and(|d| d.is_zero()) {
            return Err(ConvloadError::Validation(
                "run time must be greater than zero".to_string(),
            ));
        }
        if self.progress_interval.is_zero() {
            return Err(ConvloadError::Validation(
                "progress interval must be greater than zero".to_string(),
            ));
        }

        let url = reqwest::Url::parse(&self.host).map_err(|e| {
            ConvloadError::Validation(format!("host \"{}\" is not a valid URL: {e}", self.host))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ConvloadError::Validation(format!(
                "host must use http or https, got \"{other}\""
            ))),
        }
    }

    /// Delay between starting consecutive users. Saturates for rates that
    /// [`RunConfig::validate`] rejects.
    pub fn spawn_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.spawn_rate).unwrap_or(Duration::MAX)
    }
}

/// Parse a run-time string such as `90`, `30s`, `5m`, `1h` or `1h30m`.
///
/// A bare number is taken as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, ConvloadError> {
    let invalid = || ConvloadError::InvalidDuration(input.to_string());

    let s = input.trim();
    if s.is_empty() {
        return Err(invalid());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total_secs = 0u64;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        let unit_secs = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(invalid()),
        };
        total_secs = value
            .checked_mul(unit_secs)
            .and_then(|secs| total_secs.checked_add(secs))
            .ok_or_else(invalid)?;
        digits.clear();
    }

    // Trailing digits without a unit, e.g. "5m10".
    if !digits.is_empty() {
        return Err(invalid());
    }

    Ok(Duration::from_secs(total_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_seconds() {
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn parse_single_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn parse_compound_duration() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("2m15s").unwrap(), Duration::from_secs(135));
        assert_eq!(parse_duration(" 60s ").unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for input in ["", "   ", "10x", "m", "5m10", "1.5h", "-5s", "s10"] {
            let err = parse_duration(input).unwrap_err();
            assert!(
                matches!(err, ConvloadError::InvalidDuration(_)),
                "expected InvalidDuration for {input:?}"
            );
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_users_is_rejected() {
        let config = RunConfig {
            users: 0,
            ..RunConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("users"));
    }

    #[test]
    fn non_positive_spawn_rate_is_rejected() {
        for spawn_rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = RunConfig {
                spawn_rate,
                ..RunConfig::default()
            };
            assert!(config.validate().is_err(), "spawn rate {spawn_rate}");
        }
    }

    #[test]
    fn vanishing_spawn_rate_is_rejected_without_panicking() {
        let config = RunConfig {
            spawn_rate: 1e-30,
            ..RunConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConvloadError::Validation(_)));
        assert_eq!(config.spawn_interval(), Duration::MAX);
    }

    #[test]
    fn relative_or_non_http_host_is_rejected() {
        for host in ["/convert", "localhost:8080", "ftp://example.com"] {
            let config = RunConfig {
                host: host.to_string(),
                ..RunConfig::default()
            };
            assert!(config.validate().is_err(), "host {host}");
        }
    }

    #[test]
    fn zero_run_time_is_rejected() {
        let config = RunConfig {
            run_time: Some(Duration::ZERO),
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn spawn_interval_is_inverse_of_rate() {
        let config = RunConfig {
            spawn_rate: 4.0,
            ..RunConfig::default()
        };
        assert_eq!(config.spawn_interval(), Duration::from_millis(250));
    }
}
