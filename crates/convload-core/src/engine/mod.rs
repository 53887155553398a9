pub mod aggregator;
pub mod config;
pub mod executor;
pub mod virtual_user;

pub use aggregator::{AggregatorSnapshot, StreamingAggregator};
pub use config::{parse_duration, RunConfig};
pub use executor::{StartHook, StopHook, TestRun};
