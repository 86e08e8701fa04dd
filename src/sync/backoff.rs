//! Reconnect pacing with exponential backoff behind a circuit breaker.
//!
//! The first attempt after a healthy period is immediate. Each further
//! consecutive failure doubles the delay up to `max_delay`. Connection
//! attempts also pass through a [`recloser`] breaker: once `trip_after`
//! consecutive attempts fail it opens, attempts are rejected without touching
//! the backing store, and the loop waits `open_wait` before a single trial
//! attempt decides whether it closes again.

use std::future::Future;
use std::time::Duration;

use recloser::{AsyncRecloser, Error as RecloserError, Recloser};

use crate::error::{MirrorError, Result};

/// Configuration of the reconnect schedule.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Growth per consecutive failure; finite and at least 1
    pub factor: f64,
    /// Consecutive failures after which the breaker opens
    pub trip_after: u32,
    /// Delay between attempts while the breaker is open
    pub open_wait: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            factor: 2.0,
            trip_after: 8,
            open_wait: Duration::from_secs(30),
        }
    }
}

impl BackoffConfig {
    /// Millisecond delays for tests.
    pub fn fast() -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
            trip_after: 50,
            open_wait: Duration::from_millis(20),
        }
    }

    /// Rejects schedules that cannot be followed.
    pub fn validate(&self) -> Result<()> {
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(MirrorError::Config(format!(
                "backoff factor must be finite and at least 1, got {}",
                self.factor
            )));
        }
        if self.trip_after == 0 {
            return Err(MirrorError::Config(
                "backoff trip_after must be at least 1".to_string(),
            ));
        }
        if self.initial_delay > self.max_delay {
            return Err(MirrorError::Config(format!(
                "backoff initial_delay {:?} exceeds max_delay {:?}",
                self.initial_delay, self.max_delay
            )));
        }
        Ok(())
    }
}

/// Breaker position as last observed by an attempt, reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Failure-driven delay schedule and the breaker guarding attempts.
pub struct Backoff {
    config: BackoffConfig,
    failures: u32,
    state: BreakerState,
    breaker: AsyncRecloser,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let trip_after = config.trip_after.max(1);
        let breaker = Recloser::custom()
            // Trips only on a window made entirely of failures.
            .error_rate(1.0 - 0.5 / trip_after as f32)
            .closed_len(trip_after as usize)
            .half_open_len(1)
            .open_wait(config.open_wait)
            .build();

        Self {
            config,
            failures: 0,
            state: BreakerState::Closed,
            breaker: breaker.into(),
        }
    }

    /// Runs one connection attempt through the breaker.
    ///
    /// `Err(Rejected)` means the breaker is open and `attempt` was never
    /// polled; the next [`delay`](Self::delay) is then `open_wait`.
    pub async fn call<T, Fut>(
        &mut self,
        attempt: Fut,
    ) -> std::result::Result<T, RecloserError<MirrorError>>
    where
        Fut: Future<Output = Result<T>>,
    {
        let outcome = self.breaker.call(attempt).await;
        match &outcome {
            Ok(_) => self.state = BreakerState::Closed,
            Err(RecloserError::Rejected) => self.state = BreakerState::Open,
            Err(RecloserError::Inner(_)) => {
                self.state = BreakerState::Closed;
                self.record_failure();
            }
        }
        outcome
    }

    /// Records a failure outside a guarded attempt, e.g. a dropped connection.
    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    /// Records a healthy cycle; the next attempt is immediate again.
    pub fn reset(&mut self) {
        self.failures = 0;
        self.state = BreakerState::Closed;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Delay to wait before the next attempt, `None` when it may go at once.
    pub fn delay(&self) -> Option<Duration> {
        if self.state == BreakerState::Open {
            return Some(self.config.open_wait);
        }
        if self.failures == 0 {
            return None;
        }
        let exponent = (self.failures - 1).min(64) as i32;
        let secs = self.config.initial_delay.as_secs_f64() * self.config.factor.powi(exponent);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(self.config.max_delay);
        Some(delay.min(self.config.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            factor: 2.0,
            trip_after: 6,
            open_wait: Duration::from_secs(30),
        }
    }

    async fn fail(backoff: &mut Backoff) -> std::result::Result<(), RecloserError<MirrorError>> {
        backoff
            .call(async { Err::<(), _>(MirrorError::Transport("refused".to_string())) })
            .await
    }

    async fn succeed(backoff: &mut Backoff) -> std::result::Result<(), RecloserError<MirrorError>> {
        backoff.call(async { Ok::<(), MirrorError>(()) }).await
    }

    #[test]
    fn test_no_delay_without_failures() {
        let backoff = Backoff::new(config());
        assert_eq!(backoff.delay(), None);
        assert_eq!(backoff.state(), BreakerState::Closed);
    }

    #[test]
    fn test_delay_exponential_backoff() {
        let mut backoff = Backoff::new(config());

        backoff.record_failure();
        assert_eq!(backoff.delay(), Some(Duration::from_millis(100)));
        backoff.record_failure();
        assert_eq!(backoff.delay(), Some(Duration::from_millis(200)));
        backoff.record_failure();
        assert_eq!(backoff.delay(), Some(Duration::from_millis(400)));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let mut backoff = Backoff::new(config());
        for _ in 0..5 {
            backoff.record_failure();
        }
        assert_eq!(backoff.delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_delay_does_not_overflow_with_large_factor() {
        let mut backoff = Backoff::new(BackoffConfig {
            factor: 10.0,
            trip_after: 100,
            max_delay: Duration::from_secs(5),
            ..config()
        });
        for _ in 0..30 {
            backoff.record_failure();
        }
        assert_eq!(backoff.delay(), Some(Duration::from_secs(5)));

        for _ in 0..1000 {
            backoff.record_failure();
        }
        assert_eq!(backoff.delay(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_delay_with_unvalidated_factor_stays_bounded() {
        let mut backoff = Backoff::new(BackoffConfig {
            factor: f64::NAN,
            ..config()
        });
        backoff.record_failure();
        backoff.record_failure();
        assert_eq!(backoff.delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_validate_rejects_bad_schedules() {
        assert!(BackoffConfig::default().validate().is_ok());
        assert!(BackoffConfig::fast().validate().is_ok());

        for factor in [0.5, -2.0, f64::NAN, f64::INFINITY] {
            let config = BackoffConfig { factor, ..config() };
            assert!(matches!(config.validate(), Err(MirrorError::Config(_))));
        }
        let config = BackoffConfig { trip_after: 0, ..config() };
        assert!(config.validate().is_err());
        let config = BackoffConfig {
            initial_delay: Duration::from_secs(10),
            ..self::config()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_breaker_rejects_after_consecutive_failures() {
        let mut backoff = Backoff::new(BackoffConfig {
            trip_after: 3,
            open_wait: Duration::from_millis(50),
            ..config()
        });
        for _ in 0..3 {
            assert!(matches!(fail(&mut backoff).await, Err(RecloserError::Inner(_))));
        }

        assert!(matches!(succeed(&mut backoff).await, Err(RecloserError::Rejected)));
        assert_eq!(backoff.state(), BreakerState::Open);
        assert_eq!(backoff.delay(), Some(Duration::from_millis(50)));

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(succeed(&mut backoff).await.is_ok());
        assert_eq!(backoff.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_breaker_ignores_interrupted_failure_runs() {
        let mut backoff = Backoff::new(BackoffConfig {
            trip_after: 3,
            ..config()
        });

        fail(&mut backoff).await.unwrap_err();
        fail(&mut backoff).await.unwrap_err();
        succeed(&mut backoff).await.unwrap();
        fail(&mut backoff).await.unwrap_err();
        fail(&mut backoff).await.unwrap_err();

        assert!(succeed(&mut backoff).await.is_ok());
        assert_eq!(backoff.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_reset_after_rejection_closes() {
        let mut backoff = Backoff::new(BackoffConfig {
            trip_after: 1,
            ..config()
        });
        fail(&mut backoff).await.unwrap_err();
        assert!(matches!(succeed(&mut backoff).await, Err(RecloserError::Rejected)));

        backoff.reset();

        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.state(), BreakerState::Closed);
        assert_eq!(backoff.delay(), None);
    }
}
