//! Periodic new-demand generation.

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::config::WorkloadConfig;

/// Opens a fresh demand on a random idle consumer every few ticks.
///
/// The gap between demands is drawn uniformly from
/// `[interval_min_ticks, interval_max_ticks]`. Each demand gets a whole
/// number of minutes of runtime `tau`, and a deadline `delta` drawn from
/// `(tau, 1.5 * tau]` so it can always be met if started right away.
#[derive(Debug, Clone)]
pub struct DemandGenerator {
    interval_min_ticks: u64,
    interval_max_ticks: u64,
    tau_min_minutes: u64,
    tau_max_minutes: u64,
    /// Ticks left until the next demand is due.
    countdown: u64,
    rng: StdRng,
}

impl DemandGenerator {
    /// Creates a generator with its own seeded random source.
    ///
    /// # Panics
    ///
    /// Panics if a bound is zero or a range is inverted.
    pub fn new(config: &WorkloadConfig, seed: u64) -> Self {
        assert!(config.interval_min_ticks > 0);
        assert!(config.interval_min_ticks <= config.interval_max_ticks);
        assert!(config.tau_min_minutes > 0);
        assert!(config.tau_min_minutes <= config.tau_max_minutes);

        let mut generator = Self {
            interval_min_ticks: config.interval_min_ticks,
            interval_max_ticks: config.interval_max_ticks,
            tau_min_minutes: config.tau_min_minutes,
            tau_max_minutes: config.tau_max_minutes,
            countdown: 0,
            rng: StdRng::seed_from_u64(seed),
        };
        generator.countdown = generator.sample_interval();
        generator
    }

    /// Counts one tick down; returns `true` when a demand is due.
    ///
    /// A due demand re-arms the countdown whether or not a consumer ends
    /// up receiving it.
    pub fn on_tick(&mut self) -> bool {
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown == 0 {
            self.countdown = self.sample_interval();
            true
        } else {
            false
        }
    }

    /// Ticks left until the next demand.
    pub fn countdown(&self) -> u64 {
        self.countdown
    }

    /// Picks one index out of `idle_count` candidates.
    pub fn pick(&mut self, idle_count: usize) -> Option<usize> {
        (idle_count > 0).then(|| self.rng.random_range(0..idle_count))
    }

    /// Samples `(tau_s, delta_s)` with `tau_s < delta_s <= 1.5 * tau_s`.
    pub fn sample_demand(&mut self) -> (u64, u64) {
        let tau_s = self
            .rng
            .random_range(self.tau_min_minutes..=self.tau_max_minutes)
            * 60;
        let delta_s = self.rng.random_range(tau_s + 1..=tau_s * 3 / 2);
        (tau_s, delta_s)
    }

    fn sample_interval(&mut self) -> u64 {
        self.rng
            .random_range(self.interval_min_ticks..=self.interval_max_ticks)
    }
}
