//! Rate-limit wait state.
//!
//! When the storefront throttles the account, the engine waits in fixed
//! ticks and quietly re-submits the same key once per retry interval of
//! elapsed wait. There is no cap on the total wait: the throttle lifts on
//! the storefront's schedule, typically within an hour.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use redeemer_core::redeem::{RetryState, WaitSchedule, WaitStep};
//!
//! let schedule = WaitSchedule::new(Duration::from_secs(1), Duration::from_secs(3));
//! let mut state = RetryState::new();
//! assert_eq!(state.advance(&schedule), WaitStep::Wait);
//! assert_eq!(state.advance(&schedule), WaitStep::Wait);
//! assert_eq!(state.advance(&schedule), WaitStep::Retry);
//! assert_eq!(state.elapsed(), Duration::from_secs(3));
//! ```

use std::time::Duration;

use async_trait::async_trait;

use super::constants::{DEFAULT_RETRY_INTERVAL, DEFAULT_TICK};

/// Rotating indicator shown while waiting.
const ANIMATION: [char; 4] = ['|', '/', '-', '\\'];

const MIN_TICK: Duration = Duration::from_millis(1);

/// Suspends the engine between wait ticks.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Sleeps for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Tick length and retry cadence for rate-limit waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSchedule {
    tick: Duration,
    retry_interval: Duration,
}

impl Default for WaitSchedule {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl WaitSchedule {
    /// Creates a schedule. The tick is at least 1 ms and the retry interval
    /// at least one tick.
    #[must_use]
    pub fn new(tick: Duration, retry_interval: Duration) -> Self {
        let tick = tick.max(MIN_TICK);
        Self {
            tick,
            retry_interval: retry_interval.max(tick),
        }
    }

    /// Length of one wait tick.
    #[must_use]
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Elapsed wait between retries.
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }
}

/// What the engine does after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStep {
    /// Keep waiting.
    Wait,
    /// Re-submit the key.
    Retry,
}

/// Wait progress for one rate-limited key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    elapsed: Duration,
    ticks: u64,
    last_retry_at: Duration,
    retries: u32,
}

impl RetryState {
    /// Starts a wait at zero elapsed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one elapsed tick and reports whether a retry is due.
    pub fn advance(&mut self, schedule: &WaitSchedule) -> WaitStep {
        self.ticks += 1;
        self.elapsed += schedule.tick;
        if self.elapsed - self.last_retry_at >= schedule.retry_interval {
            self.last_retry_at = self.elapsed;
            self.retries += 1;
            WaitStep::Retry
        } else {
            WaitStep::Wait
        }
    }

    /// Indicator character for the current tick.
    #[must_use]
    pub fn animation_frame(&self) -> char {
        let index = usize::try_from(self.ticks % ANIMATION.len() as u64).unwrap_or_default();
        ANIMATION[index]
    }

    /// Total time waited so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of ticks recorded.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Number of retries issued.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_retries_every_sixty_ticks() {
        let schedule = WaitSchedule::default();
        let mut state = RetryState::new();
        let mut retry_ticks = Vec::new();
        for _ in 0..180 {
            if state.advance(&schedule) == WaitStep::Retry {
                retry_ticks.push(state.ticks());
            }
        }
        assert_eq!(retry_ticks, vec![60, 120, 180]);
        assert_eq!(state.retries(), 3);
        assert_eq!(state.elapsed(), Duration::from_secs(180));
    }

    #[test]
    fn test_animation_rotates_through_four_frames() {
        let schedule = WaitSchedule::default();
        let mut state = RetryState::new();
        let mut frames = String::new();
        for _ in 0..6 {
            frames.push(state.animation_frame());
            state.advance(&schedule);
        }
        assert_eq!(frames, "|/-\\|/");
    }

    #[test]
    fn test_schedule_clamps_degenerate_values() {
        let schedule = WaitSchedule::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(schedule.tick(), MIN_TICK);
        assert_eq!(schedule.retry_interval(), MIN_TICK);

        let mut state = RetryState::new();
        assert_eq!(state.advance(&schedule), WaitStep::Retry);
    }

    #[test]
    fn test_retry_interval_not_multiple_of_tick() {
        let schedule = WaitSchedule::new(Duration::from_secs(2), Duration::from_secs(5));
        let mut state = RetryState::new();
        let steps: Vec<_> = (0..6).map(|_| state.advance(&schedule)).collect();
        // Retries at 6 s and 12 s of elapsed wait.
        assert_eq!(
            steps,
            vec![
                WaitStep::Wait,
                WaitStep::Wait,
                WaitStep::Retry,
                WaitStep::Wait,
                WaitStep::Wait,
                WaitStep::Retry,
            ]
        );
    }

    #[tokio::test]
    async fn test_tokio_sleeper_sleeps() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_millis(20)).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
