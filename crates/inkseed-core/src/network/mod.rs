//! Network plumbing for media downloads.

mod client;
mod retry;

pub use client::HttpClient;
pub use retry::{retry_async, RetryPolicy, RetryStats};
