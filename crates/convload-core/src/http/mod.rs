pub mod client;
pub mod request;
pub mod response;

pub use client::{HttpClient, HttpClientBuilder};
pub use request::{ScenarioRequest, UserClient};
pub use response::CatchResponse;
