use std::time::Duration;

use crate::error::ConvloadError;

/// Wrapper around a reqwest Client with builder-pattern configuration and
/// connection-pool settings.
///
/// Cloning is cheap and shares the underlying connection pool, so one client
/// is built per run and handed to every simulated user.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

/// Builder for [`HttpClient`].
///
/// No request timeout is set, so reqwest's own default applies.
pub struct HttpClientBuilder {
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Duration,
    user_agent: String,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 100,
            pool_idle_timeout: Duration::from_secs(90),
            user_agent: format!("convload/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool_max_idle_per_host(mut self, n: usize) -> Self {
        self.pool_max_idle_per_host = n;
        self
    }

    pub fn build(self) -> Result<HttpClient, ConvloadError> {
        let inner = reqwest::Client::builder()
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .pool_idle_timeout(self.pool_idle_timeout)
            .user_agent(self.user_agent)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(HttpClient { inner })
    }
}

impl HttpClient {
    /// Returns a builder for customising the client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    pub(crate) fn inner(&self) -> &reqwest::Client {
        &self.inner
    }
}
