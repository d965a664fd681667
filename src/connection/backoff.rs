use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            jitter: true,
        }
    }
}

/// Exponential reconnect backoff with a cap and randomized jitter.
///
/// One round corresponds to one full sweep over the candidate endpoint set;
/// a successful connect resets the schedule.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    round: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, round: 0 }
    }

    pub fn reset(&mut self) {
        self.round = 0;
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    /// Delay to sleep before the next connect sweep, advancing the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for_round(self.round);
        self.round = self.round.saturating_add(1);

        if self.config.jitter {
            apply_jitter(delay)
        } else {
            delay
        }
    }

    fn delay_for_round(&self, round: u32) -> Duration {
        let multiplier = 2_u64.saturating_pow(round.min(32));
        let millis = (self.config.initial.as_millis() as u64).saturating_mul(multiplier);
        std::cmp::min(Duration::from_millis(millis), self.config.max)
    }
}

fn apply_jitter(delay: Duration) -> Duration {
    let mut rng = rand::rng();
    let jitter_factor = rng.random_range(0.5..1.5); // ±50% jitter
    let jittered_millis = (delay.as_millis() as f64 * jitter_factor) as u64;
    Duration::from_millis(jittered_millis)
}
