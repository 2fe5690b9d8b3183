//! Dispatch pacer — randomized inter-send delay.
//!
//! Burst sending gets sender accounts throttled or banned; sequential
//! pacing with jitter approximates human cadence and is the engine's only
//! backpressure mechanism. The trait exists so tests can run the loop
//! without wall-clock waits.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

use relaycast_core::config::PacingConfig;

/// Inserts the pause between consecutive dispatch units.
#[async_trait]
pub trait Pacer: Send + Sync {
    /// Wait before the next unit. Called for every unit except the first.
    async fn pause(&self);
}

/// Production pacer — uniform jitter in a configured range.
pub struct JitterPacer {
    min: Duration,
    max: Duration,
}

impl JitterPacer {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn from_config(config: &PacingConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    fn draw(&self) -> Duration {
        if self.min >= self.max {
            return self.min;
        }
        // Draw before awaiting — thread_rng is not Send across await points.
        let millis = rand::thread_rng().gen_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(millis as u64)
    }
}

#[async_trait]
impl Pacer for JitterPacer {
    async fn pause(&self) {
        let delay = self.draw();
        tracing::debug!("⏳ Pacing: sleeping {}ms before next send", delay.as_millis());
        tokio::time::sleep(delay).await;
    }
}

/// Test pacer — no delay.
pub struct NoDelayPacer;

#[async_trait]
impl Pacer for NoDelayPacer {
    async fn pause(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_within_bounds() {
        let pacer = JitterPacer::new(Duration::from_millis(300), Duration::from_millis(900));
        for _ in 0..50 {
            let delay = pacer.draw();
            assert!(delay >= Duration::from_millis(300));
            assert!(delay <= Duration::from_millis(900));
        }
    }

    #[test]
    fn test_draw_degenerate_range() {
        let pacer = JitterPacer::new(Duration::from_millis(500), Duration::from_millis(500));
        assert_eq!(pacer.draw(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_sleeps_a_nonzero_interval() {
        let pacer = JitterPacer::from_config(&PacingConfig::default());
        let before = tokio::time::Instant::now();
        pacer.pause().await;
        let elapsed = before.elapsed();
        assert!(elapsed >= Duration::from_millis(3_000));
        assert!(elapsed <= Duration::from_millis(10_000));
    }
}
