//! HTTP client layer — `SovHttp` with per-endpoint retry policies and an
//! unload-safe beacon path.

pub mod client;
pub mod retry;

pub use client::SovHttp;
pub use retry::{RetryConfig, RetryPolicy};
