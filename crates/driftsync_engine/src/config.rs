//! Configuration for the sync engine.

use driftsync_protocol::DeviceId;
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote authority.
    pub server_url: String,
    /// Device identity stamped on recorded changes.
    pub device_id: DeviceId,
    /// User identity stamped on recorded changes.
    pub user_id: String,
    /// Timeout applied to each remote round trip.
    pub request_timeout: Duration,
    /// Backoff policy between failed sync attempts.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(
        server_url: impl Into<String>,
        device_id: DeviceId,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            device_id,
            user_id: user_id.into(),
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Configuration for backoff between failed sync attempts.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of consecutive attempts tracked.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Ceiling on the computed delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no backoff.
    pub fn no_backoff() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay after `failures` consecutive failures.
    ///
    /// Zero failures means no delay; beyond that the delay grows
    /// exponentially up to `max_delay`, capped at `max_attempts`
    /// doublings.
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let exponent = failures.saturating_sub(1).min(self.max_attempts);
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% jitter, derived from the clock to avoid an RNG
            // dependency.
            let jitter = capped * 0.25 * clock_jitter();
            Duration::from_secs_f64(capped + jitter)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(6)
    }
}

fn clock_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new(
            "https://sync.example.com",
            DeviceId::from("device-a"),
            "user-1",
        )
        .with_request_timeout(Duration::from_secs(10));

        assert_eq!(config.server_url, "https://sync.example.com");
        assert_eq!(config.device_id, DeviceId::from("device-a"));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn no_failures_means_no_delay() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn backoff_grows_exponentially() {
        let retry = RetryConfig::new(6)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        let first = retry.delay_for_attempt(1);
        assert!(first >= Duration::from_millis(100));
        assert!(first <= Duration::from_millis(125));

        let third = retry.delay_for_attempt(3);
        assert!(third >= Duration::from_millis(400));
    }

    #[test]
    fn backoff_respects_ceiling() {
        let retry = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        let delay = retry.delay_for_attempt(8);
        // 5s ceiling plus at most 25% jitter.
        assert!(delay <= Duration::from_millis(6250));
    }

    #[test]
    fn no_backoff_config() {
        let retry = RetryConfig::no_backoff();
        assert_eq!(retry.delay_for_attempt(3), Duration::ZERO);
    }
}
