pub mod engine;
pub mod error;
pub mod http;
pub mod results;
pub mod scenario;

pub use error::ConvloadError;
