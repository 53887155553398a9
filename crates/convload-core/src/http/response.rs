use std::fmt::Display;

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;

use crate::results::RequestRecord;

/// A received response whose pass/fail verdict is decided by the scenario.
///
/// Exactly one [`RequestRecord`] reaches the aggregator per response:
/// [`CatchResponse::success`] and [`CatchResponse::failure`] consume the
/// wrapper, and dropping it without either reports a default verdict based
/// on the status code (below 400 passes).
pub struct CatchResponse {
    name: String,
    method: String,
    status: u16,
    body: Bytes,
    elapsed_ms: f64,
    /// Taken when the verdict is sent.
    verdict_tx: Option<UnboundedSender<RequestRecord>>,
}

impl CatchResponse {
    pub(crate) fn new(
        name: String,
        method: String,
        status: u16,
        body: Bytes,
        elapsed_ms: f64,
        verdict_tx: UnboundedSender<RequestRecord>,
    ) -> Self {
        Self {
            name,
            method,
            status,
            body,
            elapsed_ms,
            verdict_tx: Some(verdict_tx),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn size_bytes(&self) -> u64 {
        self.body.len() as u64
    }

    /// Report this request as successful.
    pub fn success(mut self) {
        self.report(None);
    }

    /// Report this request as failed with the given message.
    pub fn failure(mut self, message: impl Display) {
        self.report(Some(message.to_string()));
    }

    fn report(&mut self, failure: Option<String>) {
        let Some(tx) = self.verdict_tx.take() else {
            return;
        };
        let record = RequestRecord {
            name: self.name.clone(),
            method: self.method.clone(),
            elapsed_ms: self.elapsed_ms,
            size_bytes: self.size_bytes(),
            failure,
        };
        if tx.send(record).is_err() {
            tracing::debug!("Aggregator closed, dropping verdict for {}", self.name);
        }
    }
}

impl Drop for CatchResponse {
    fn drop(&mut self) {
        if self.verdict_tx.is_some() {
            let failure = (self.status >= 400)
                .then(|| format!("Failed with status code: {}", self.status));
            self.report(failure);
        }
    }
}
