//! Bounded retry with backoff, and the topic readiness probe built on it

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::bus::Bus;
use crate::error::{BusError, BusResult};

/// Retry parameters
///
/// The default keeps the readiness budget ARI proxies have always used:
/// 20 probes, 100 ms apart, no growth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    #[serde(with = "duration_ms", rename = "initial_delay_ms")]
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "duration_ms", rename = "max_delay_ms")]
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failure
    pub backoff_multiplier: f64,
    /// Add up to ±10% random jitter to each delay
    #[serde(default)]
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(100),
            backoff_multiplier: 1.0,
            use_jitter: false,
        }
    }
}

impl RetryConfig {
    /// Fixed delay between a bounded number of attempts
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            use_jitter: false,
        }
    }

    /// Exponential backoff starting at 50 ms, capped at 2 s
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let next_ms = (delay.as_millis() as f64 * self.backoff_multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.use_jitter {
            return delay;
        }
        let jitter = (rand::random::<f64>() - 0.5) * 0.2;
        let millis = delay.as_millis() as f64;
        Duration::from_millis((millis * (1.0 + jitter)) as u64)
    }
}

/// Run `operation` until it succeeds, fails with a non-recoverable error, or
/// the attempt budget runs out. The last error is returned in the latter two
/// cases.
pub async fn retry_with_backoff<T, F, Fut>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> BusResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BusResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) if e.is_recoverable() && attempt < max_attempts => {
                debug!(
                    operation = operation_name,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    error = %e,
                    next_delay_ms = delay.as_millis() as u64,
                    "Recoverable error, will retry"
                );
                sleep(config.jittered(delay)).await;
                delay = config.next_delay(delay);
            }
            Err(e) => {
                warn!(
                    operation = operation_name,
                    attempts = attempt,
                    category = e.category(),
                    error = %e,
                    "Giving up"
                );
                return Err(e);
            }
        }
    }
}

/// Poll [`Bus::topic_exists`] under `config`
///
/// Returns [`BusError::TopicNotReady`] once the budget is spent.
pub async fn wait_for_topic(bus: &dyn Bus, topic: &str, config: &RetryConfig) -> BusResult<()> {
    let attempts = config.max_attempts.max(1);
    retry_with_backoff("wait_for_topic", config, || async move {
        if bus.topic_exists(topic).await {
            Ok(())
        } else {
            Err(BusError::TopicNotReady {
                topic: topic.to_string(),
                attempts,
            })
        }
    })
    .await
}

/// Serde adapter storing a `Duration` as integer milliseconds
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
