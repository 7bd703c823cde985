//! Resilience patterns for stampede
//!
//! Retry honouring server-advised delays, randomized jitter for spreading
//! load, and a stop coordinator that lets a run wind down its virtual users
//! in a bounded time.

pub mod jitter;
pub mod retry;
pub mod shutdown;

// Re-export commonly used types
pub use jitter::{uniform_between, uniform_jitter};
pub use retry::{RetryError, RetryExecutor, RetryPolicy, Retryable};
pub use shutdown::{ShutdownCoordinator, ShutdownError, ShutdownListener, ShutdownSignal, TaskGuard};
