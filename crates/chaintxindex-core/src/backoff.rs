//! Exponential backoff with jitter, a cap on each wait and on the total elapsed time.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Configuration for an [`ExponentialBackoff`].
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// First delay.
    pub initial_interval: Duration,
    /// Maximum single delay (caps exponential growth).
    pub max_interval: Duration,
    /// Multiplier applied to the delay after each wait.
    pub multiplier: f64,
    /// Randomize each delay by ±`jitter_fraction * delay` (0.0 = no jitter).
    pub jitter_fraction: f64,
    /// Give up once this much time has passed since the first attempt.
    /// `None` retries forever.
    pub max_elapsed: Option<Duration>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            multiplier: 1.5,
            jitter_fraction: 0.5,
            max_elapsed: Some(Duration::from_secs(15 * 60)),
        }
    }
}

impl BackoffConfig {
    /// Fixed delay: no growth, no jitter and no deadline.
    pub fn constant(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
            jitter_fraction: 0.0,
            max_elapsed: None,
        }
    }
}

/// Pick a delay uniformly from `[d - f*d, d + f*d]`.
fn randomize(delay: Duration, fraction: f64) -> Duration {
    if fraction <= 0.0 || delay.is_zero() {
        return delay;
    }
    let secs = delay.as_secs_f64();
    let spread = secs * fraction.min(1.0);
    Duration::from_secs_f64(rand::thread_rng().gen_range(secs - spread..=secs + spread))
}

/// Stateful backoff: call [`next_backoff`](Self::next_backoff) after each failure.
///
/// Elapsed time is measured on the tokio clock so paused-time tests advance it.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    current: Duration,
    started: Instant,
}

impl ExponentialBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current: config.initial_interval,
            started: Instant::now(),
            config,
        }
    }

    /// Restart the clock and the interval.
    pub fn reset(&mut self) {
        self.current = self.config.initial_interval;
        self.started = Instant::now();
    }

    /// Time since the first attempt (or the last reset).
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Returns the delay before the next attempt, or `None` if sleeping it
    /// would exceed `max_elapsed`.
    ///
    /// Growth follows the un-jittered interval; only the returned delay is
    /// randomized.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        let interval = self.current.min(self.config.max_interval);
        let delay = randomize(interval, self.config.jitter_fraction);
        if let Some(max) = self.config.max_elapsed {
            if self.elapsed() + delay > max {
                return None;
            }
        }
        let grown = interval.as_secs_f64() * self.config.multiplier;
        let cap = self.config.max_interval.as_secs_f64();
        self.current = Duration::from_secs_f64(grown.min(cap));
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(initial_ms: u64, max_ms: u64, multiplier: f64) -> BackoffConfig {
        BackoffConfig {
            initial_interval: Duration::from_millis(initial_ms),
            max_interval: Duration::from_millis(max_ms),
            multiplier,
            jitter_fraction: 0.0,
            max_elapsed: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delays_grow_geometrically() {
        let mut b = ExponentialBackoff::new(config(100, 30_000, 2.0));
        assert_eq!(b.next_backoff(), Some(Duration::from_millis(100)));
        assert_eq!(b.next_backoff(), Some(Duration::from_millis(200)));
        assert_eq!(b.next_backoff(), Some(Duration::from_millis(400)));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_capped_at_max() {
        let mut b = ExponentialBackoff::new(config(100, 500, 10.0));
        for _ in 0..5 {
            let d = b.next_backoff().unwrap();
            assert!(d <= Duration::from_millis(500), "d={d:?} exceeds max");
        }
        assert_eq!(b.next_backoff(), Some(Duration::from_millis(500)));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_max_elapsed() {
        let mut b = ExponentialBackoff::new(BackoffConfig {
            max_elapsed: Some(Duration::from_millis(100)),
            ..config(10, 10, 1.0)
        });
        let mut waits = 0;
        while let Some(d) = b.next_backoff() {
            tokio::time::sleep(d).await;
            waits += 1;
        }
        assert_eq!(waits, 10);
        assert!(b.elapsed() <= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_restarts_interval() {
        let mut b = ExponentialBackoff::new(config(100, 10_000, 2.0));
        b.next_backoff();
        b.next_backoff();
        b.reset();
        assert_eq!(b.next_backoff(), Some(Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn jitter_stays_within_fraction() {
        let mut b = ExponentialBackoff::new(BackoffConfig {
            jitter_fraction: 0.5,
            ..config(1_000, 1_000, 1.0)
        });
        let mut distinct = std::collections::HashSet::new();
        for _ in 0..50 {
            let d = b.next_backoff().unwrap();
            let secs = d.as_secs_f64();
            assert!((0.5 - 1e-6..=1.5 + 1e-6).contains(&secs), "d={d:?} outside ±50%");
            distinct.insert(d);
        }
        assert!(distinct.len() > 1, "jitter produced a constant delay");
    }

    #[tokio::test(start_paused = true)]
    async fn jitter_does_not_change_growth() {
        let mut b = ExponentialBackoff::new(BackoffConfig {
            jitter_fraction: 0.5,
            ..config(100, 30_000, 2.0)
        });
        for base in [100u64, 200, 400, 800] {
            let ms = b.next_backoff().unwrap().as_secs_f64() * 1_000.0;
            let base = base as f64;
            assert!(ms >= base * 0.5 - 1e-3 && ms <= base * 1.5 + 1e-3, "ms={ms} base={base}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn constant_never_gives_up() {
        let mut b = ExponentialBackoff::new(BackoffConfig::constant(Duration::from_secs(1)));
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(b.next_backoff(), Some(Duration::from_secs(1)));
    }
}
