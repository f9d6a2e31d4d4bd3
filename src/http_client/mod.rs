//! Outbound HTTP plumbing: a retrying client factory and a pool that shares
//! clients across notification channels.

mod client;
mod pool;

pub use client::create_retryable_http_client;
pub use pool::{HttpClientPool, HttpClientPoolError};
