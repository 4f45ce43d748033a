// zaplink-api: Async Rust client for the Zaptec EV charger cloud API

pub mod auth;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod limiter;
pub mod models;
pub mod transport;

pub use auth::Credentials;
pub use client::{ApiClient, ApiConfig};
pub use error::ApiError;
pub use limiter::RateLimiter;
pub use transport::TransportConfig;
