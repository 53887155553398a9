use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ConvloadError;
use crate::http::{ScenarioRequest, UserClient};
use crate::scenario::payload::SamplePayload;
use crate::scenario::LoadScenario;

pub const CONVERT_PATH: &str = "/convert";
pub const XML_CONTENT_TYPE: &str = "application/xml";

/// Why a conversion request counts as failed.
#[derive(Debug, thiserror::Error)]
pub enum RequestFailure {
    #[error("Failed with status code: {0}")]
    HttpStatus(u16),

    #[error("Invalid JSON response: {0}")]
    ResponseParse(#[from] serde_json::Error),
}

#[derive(Debug)]
pub enum RequestOutcome {
    Success,
    Failure(RequestFailure),
}

/// Judge a conversion response: only a 200 whose body parses as JSON passes.
pub fn classify_response(status: u16, body: &[u8]) -> RequestOutcome {
    if status != 200 {
        return RequestOutcome::Failure(RequestFailure::HttpStatus(status));
    }
    match serde_json::from_slice::<serde::de::IgnoredAny>(body) {
        Ok(_) => RequestOutcome::Success,
        Err(e) => RequestOutcome::Failure(e.into()),
    }
}

/// A user that posts the sample XML document to the conversion endpoint,
/// back to back.
#[derive(Debug, Clone)]
pub struct XmlConverterUser {
    payload: Arc<SamplePayload>,
}

impl XmlConverterUser {
    pub fn new(payload: Arc<SamplePayload>) -> Self {
        Self { payload }
    }

    pub(crate) fn conversion_request<'a>(&self, client: &'a UserClient) -> ScenarioRequest<'a> {
        client
            .post(CONVERT_PATH)
            .header("Content-Type", XML_CONTENT_TYPE)
            .body(self.payload.body())
    }
}

#[async_trait]
impl LoadScenario for XmlConverterUser {
    fn name(&self) -> &str {
        "XMLConverterUser"
    }

    fn wait_time(&self) -> Duration {
        Duration::ZERO
    }

    async fn run_task(&self, client: &UserClient) -> Result<(), ConvloadError> {
        let response = self.conversion_request(client).send_catch().await?;
        match classify_response(response.status(), response.body()) {
            RequestOutcome::Success => response.success(),
            RequestOutcome::Failure(failure) => response.failure(failure),
        }
        Ok(())
    }
}
