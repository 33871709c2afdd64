//! HTTP adapter: the shared rate-limited channel and the JSON client built on it

pub mod channel;
pub mod client;

pub use channel::{CircuitBreaker, RateLimitedChannel};
pub use client::ApiClient;
