// reefsync-api: async HTTP client for aquarium controllers and their cloud account

pub mod auth;
pub mod client;
pub mod cloud;
pub mod error;
pub mod retry;
pub mod transport;

pub use auth::{CloudCredentials, TOKEN_RENEWAL_WINDOW, TokenManager};
pub use client::{Attempt, HttpClient, Method};
pub use cloud::{CloudClient, DEFAULT_CLOUD_HOST};
pub use error::Error;
pub use retry::{HTTP_DELAY_BETWEEN_RETRY, HTTP_MAX_RETRY, RetryPolicy};
pub use transport::{TlsMode, TransportConfig};
