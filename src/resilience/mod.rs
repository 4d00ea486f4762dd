pub mod retry;

pub use retry::{Backoff, RetryConfig, Retryable};
