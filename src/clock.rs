//! Time source used for cache expiry and retry backoff.
//!
//! Production code runs on [`SystemClock`]. Tests drive a [`ManualClock`] so
//! TTL expiry and backoff sleeps happen instantly and can be inspected.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

#[async_trait]
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> SystemTime;

    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

/// Controllable clock. `sleep` returns immediately, advances the clock and
/// records the requested duration.
#[derive(Debug)]
pub struct ManualClock {
    origin: SystemTime,
    state: Mutex<ManualState>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }

    pub fn starting_at(origin: SystemTime) -> Self {
        Self {
            origin,
            state: Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                sleeps: Vec::new(),
            }),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        st.elapsed += by;
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sleeps
            .clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        let st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.origin + st.elapsed
    }

    async fn sleep(&self, duration: Duration) {
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        st.elapsed += duration;
        st.sleeps.push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_time() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_millis(250)).await;
        clock.advance(Duration::from_secs(1));
        assert_eq!(
            clock.now().duration_since(start).unwrap(),
            Duration::from_millis(1250)
        );
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(250)]);
    }
}
