//! 弹性模块：所有后端共享的重试与退避策略。
//!
//! # Resilience
//!
//! Backends report failures as rate-limited, transient or fatal. The
//! [`RetryPolicy`] retries the first two with capped exponential backoff and
//! jitter, honours provider `Retry-After` hints, and gives up after
//! `max_attempts` with [`crate::Error::RetryExhausted`].
//!
//! ```rust
//! use bug_oracle::resilience::{RetryConfig, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(
//!     RetryConfig::new()
//!         .with_max_attempts(3)
//!         .with_base_delay(Duration::from_millis(200))
//!         .with_jitter(false),
//! );
//! assert_eq!(policy.backoff_delay(2, None), Duration::from_millis(400));
//! ```

pub mod retry;

pub use retry::{Jitter, NoJitter, RandomJitter, RetryConfig, RetryPolicy, RetryState};
