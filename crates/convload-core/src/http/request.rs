use std::time::Instant;

use bytes::Bytes;
use reqwest::Method;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::ConvloadError;
use crate::http::client::HttpClient;
use crate::http::response::CatchResponse;
use crate::results::RequestRecord;

/// The request handle given to one simulated user.
///
/// Paths are resolved against the run's host, and every response produced
/// through [`ScenarioRequest::send_catch`] reports its verdict to the run's
/// aggregator.
#[derive(Debug, Clone)]
pub struct UserClient {
    user_id: usize,
    base_url: String,
    client: HttpClient,
    verdict_tx: UnboundedSender<RequestRecord>,
}

impl UserClient {
    pub(crate) fn new(
        user_id: usize,
        base_url: impl Into<String>,
        client: HttpClient,
        verdict_tx: UnboundedSender<RequestRecord>,
    ) -> Self {
        Self {
            user_id,
            base_url: base_url.into(),
            client,
            verdict_tx,
        }
    }

    pub fn user_id(&self) -> usize {
        self.user_id
    }

    pub fn post(&self, path: &str) -> ScenarioRequest<'_> {
        self.request(Method::POST, path)
    }

    pub fn request(&self, method: Method, path: &str) -> ScenarioRequest<'_> {
        ScenarioRequest {
            client: self,
            method,
            path: path.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Join `path` onto the base URL with exactly one `/` between them.
    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn report_error(&self, name: &str, method: &Method, elapsed_ms: f64, message: String) {
        let record = RequestRecord {
            name: name.to_string(),
            method: method.to_string(),
            elapsed_ms,
            size_bytes: 0,
            failure: Some(message),
        };
        if self.verdict_tx.send(record).is_err() {
            tracing::debug!("Aggregator closed, dropping transport failure for {name}");
        }
    }
}

/// A request being assembled by a scenario task.
pub struct ScenarioRequest<'a> {
    client: &'a UserClient,
    method: Method,
    path: String,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl ScenarioRequest<'_> {
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> String {
        self.client.url_for(&self.path)
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Send the request and hand the response back for the scenario to judge.
    ///
    /// Transport faults (connection refused, client timeout, body read error)
    /// are recorded as failures here and returned as `Err`; no
    /// [`CatchResponse`] exists for them.
    pub async fn send_catch(self) -> Result<CatchResponse, ConvloadError> {
        let url = self.url();
        let name = self.path;
        let client = self.client;

        let mut builder = client.client.inner().request(self.method.clone(), url);
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = self.body {
            builder = builder.body(body);
        }

        let start = Instant::now();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                client.report_error(&name, &self.method, elapsed_ms, format!("Network error: {e}"));
                return Err(e.into());
            }
        };

        let status = response.status().as_u16();

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                client.report_error(
                    &name,
                    &self.method,
                    elapsed_ms,
                    format!("Error reading response body: {e}"),
                );
                return Err(e.into());
            }
        };
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        Ok(CatchResponse::new(
            name,
            self.method.to_string(),
            status,
            body,
            elapsed_ms,
            client.verdict_tx.clone(),
        ))
    }
}
