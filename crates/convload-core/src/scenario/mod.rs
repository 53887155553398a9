//! Scenario definitions: the contract the runner drives, and the XML
//! conversion scenario built on it.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ConvloadError;
use crate::http::UserClient;

pub mod hooks;
pub mod payload;
pub mod xml_converter;

pub use hooks::{on_run_start, on_run_stop, run_stop_summary_lines};
pub use payload::SamplePayload;
pub use xml_converter::{classify_response, RequestFailure, RequestOutcome, XmlConverterUser};

/// One simulated client's repeated behaviour.
///
/// The runner builds one instance per user and calls [`LoadScenario::run_task`]
/// in a loop, pausing for [`LoadScenario::wait_time`] between iterations,
/// until the run stops.
#[async_trait]
pub trait LoadScenario: Send + Sync + 'static {
    /// Label used in logs.
    fn name(&self) -> &str;

    /// Pause between two task iterations of the same user.
    fn wait_time(&self) -> Duration {
        Duration::ZERO
    }

    /// Run one task iteration.
    ///
    /// Per-request outcomes are reported through the responses the task
    /// receives from `client`; an `Err` only ends the current iteration.
    async fn run_task(&self, client: &UserClient) -> Result<(), ConvloadError>;
}
