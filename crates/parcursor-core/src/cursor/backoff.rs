//! Escalating wait for claimers that found nothing to take yet.

use crate::config::BackoffConfig;
use std::hint;
use std::thread;
use std::time::Duration;

/// Spin, then yield, then sleep with exponential growth up to a cap.
pub(crate) struct Backoff<'a> {
    config: &'a BackoffConfig,
    step: u32,
}

impl<'a> Backoff<'a> {
    pub fn new(config: &'a BackoffConfig) -> Self {
        Self { config, step: 0 }
    }

    /// Wait one round. Returns `true` if the round slept.
    pub fn snooze(&mut self) -> bool {
        let spin_limit = self.config.spin_limit;
        let yield_limit = spin_limit.saturating_add(self.config.yield_limit);

        let slept = if self.step < spin_limit {
            for _ in 0..(1u32 << self.step.min(10)) {
                hint::spin_loop();
            }
            false
        } else if self.step < yield_limit {
            thread::yield_now();
            false
        } else {
            thread::sleep(self.sleep_for(self.step - yield_limit));
            true
        };

        self.step = self.step.saturating_add(1);
        slept
    }

    /// Sleep for the `attempt`-th sleeping round.
    fn sleep_for(&self, attempt: u32) -> Duration {
        let micros = self
            .config
            .base_sleep_micros
            .saturating_mul(1u64 << attempt.min(20));
        Duration::from_micros(micros.min(self.config.max_sleep_micros))
    }
}
