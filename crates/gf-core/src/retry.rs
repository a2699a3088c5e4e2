//! Bounded exponential backoff used around every bus/KV/ClickHouse
//! suspension point. After the cap is reached the last error is returned to
//! the caller, which surfaces it as fatal.

use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl BackoffConfig {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.max)
    }
}

/// Default backoff for bus `Publish`/`Fetch` calls (spec §4.1: "bus errors
/// from Publish and Fetch are retried with exponential backoff up to a
/// component-configured cap; after the cap the component surfaces a fatal
/// error"). Every component uses the same bounded default since the spec
/// does not expose a separate per-component bus-retry config.
pub fn bus_backoff() -> BackoffConfig {
    BackoffConfig::default()
}

/// Runs `op` up to `config.max_attempts` times with exponential backoff
/// between attempts, returning the last error if every attempt failed. A
/// `0` max_attempts is treated as `1` (always try at least once).
pub async fn with_backoff<T, E, F, Fut>(config: &BackoffConfig, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = config.max_attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt + 1 < attempts {
                    let delay = config.delay_for_attempt(attempt);
                    warn!(operation = label, attempt, %e, delay_ms = delay.as_millis() as u64, "retrying after error");
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_ok() {
        let calls = AtomicU32::new(0);
        let cfg = BackoffConfig {
            initial: Duration::from_millis(1),
            ..Default::default()
        };
        let result: Result<u32, String> = with_backoff(&cfg, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_up_to_cap_then_returns_last_error() {
        let calls = AtomicU32::new(0);
        let cfg = BackoffConfig {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(2),
            multiplier: 1.0,
            max_attempts: 3,
        };
        let result: Result<u32, String> = with_backoff(&cfg, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("boom".to_string())
        })
        .await;
        assert_eq!(result.unwrap_err(), "boom");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn recovers_on_a_later_attempt() {
        let calls = AtomicU32::new(0);
        let cfg = BackoffConfig {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(2),
            multiplier: 1.0,
            max_attempts: 5,
        };
        let result: Result<u32, String> = with_backoff(&cfg, "test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err("boom".to_string())
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }
}
