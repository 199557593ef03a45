//! Core simulation types: timing configuration and per-tick reports.

use std::fmt;

use serde::Serialize;

/// Centralized simulation timing.
///
/// Devices and the engine reference this struct for tick length instead of
/// recomputing `dt_hours`.
///
/// # Examples
///
/// ```
/// use rec_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(60, 42);
/// assert!((cfg.dt_hours - 1.0 / 60.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct SimConfig {
    /// Simulated seconds per tick.
    pub tick_seconds: u64,
    /// Duration of one tick in hours, derived as `tick_seconds / 3600`.
    pub dt_hours: f32,
    /// Master random seed for reproducibility.
    pub seed: u64,
}

impl SimConfig {
    /// Creates a new simulation configuration.
    ///
    /// # Panics
    ///
    /// Panics if `tick_seconds` is zero.
    pub fn new(tick_seconds: u64, seed: u64) -> Self {
        assert!(tick_seconds > 0, "tick_seconds must be > 0");
        Self {
            tick_seconds,
            dt_hours: tick_seconds as f32 / 3600.0,
            seed,
        }
    }
}

/// A demand opened by the workload generator during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedDemand {
    pub member_id: String,
    pub consumer_id: String,
    pub tau_s: u64,
    pub delta_s: u64,
}

/// Outcome of applying one decision message to the world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Consumers switched on.
    pub activated: usize,
    /// Explicit denials, logged and left pending.
    pub denied: usize,
    /// Activations refused because the consumer was no longer pending.
    pub rejected: usize,
    /// Decisions dropped because they were planned for an older tick.
    pub stale: usize,
}

/// Complete record of one closed-loop tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    /// Tick index.
    pub tick: u64,
    /// Simulated seconds since start, at the end of the tick.
    pub time_s: u64,
    /// Energy produced by all producers (kWh).
    pub production_kwh: f32,
    /// Energy drawn by active consumers (kWh).
    pub consumption_kwh: f32,
    /// Consumption served from the battery (kWh).
    pub battery_consumption_kwh: f32,
    /// Consumption served by the external grid (kWh).
    pub non_battery_consumption_kwh: f32,
    /// Production spilled at the capacity ceiling (kWh).
    pub curtailed_kwh: f32,
    /// Battery charge after settlement (kWh).
    pub battery_kwh: f32,
    /// Consumers drawing power during the tick.
    pub active_consumers: usize,
    /// Requests finished this tick.
    pub completed: usize,
    /// Requests whose deadline lapsed with runtime still owed.
    pub deadline_missed: usize,
    /// Demand opened by the workload generator, if any.
    pub generated: Option<GeneratedDemand>,
    /// Consumers the analyzer judged activable.
    pub eligible: usize,
    /// Activations applied after planning.
    pub activated: usize,
    /// Explicit denials issued by the planner.
    pub denied: usize,
    /// Decisions the engine rejected as invariant violations.
    pub rejected: usize,
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>4} ({:>6}s) | prod={:.3} kWh  cons={:.3} kWh  grid={:.3} kWh | \
             battery={:.3} kWh | active={} done={} missed={} | \
             eligible={} on={} denied={} rejected={}",
            self.tick,
            self.time_s,
            self.production_kwh,
            self.consumption_kwh,
            self.non_battery_consumption_kwh,
            self.battery_kwh,
            self.active_consumers,
            self.completed,
            self.deadline_missed,
            self.eligible,
            self.activated,
            self.denied,
            self.rejected,
        )?;
        if let Some(d) = &self.generated {
            write!(
                f,
                " | new {}/{} tau={}s delta={}s",
                d.member_id, d.consumer_id, d.tau_s, d.delta_s
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_config_minute_ticks() {
        let cfg = SimConfig::new(60, 42);
        assert_eq!(cfg.tick_seconds, 60);
        assert_eq!(cfg.seed, 42);
        assert!((cfg.dt_hours - 1.0 / 60.0).abs() < 1e-7);
    }

    #[test]
    fn sim_config_hour_ticks() {
        let cfg = SimConfig::new(3600, 0);
        assert_eq!(cfg.dt_hours, 1.0);
    }

    #[test]
    #[should_panic]
    fn sim_config_zero_tick_panics() {
        SimConfig::new(0, 0);
    }

    #[test]
    fn tick_report_display_mentions_generated_demand() {
        let r = TickReport {
            tick: 3,
            time_s: 240,
            generated: Some(GeneratedDemand {
                member_id: "m1".into(),
                consumer_id: "c2".into(),
                tau_s: 120,
                delta_s: 150,
            }),
            ..TickReport::default()
        };
        let s = format!("{r}");
        assert!(s.contains("m1/c2"));
        assert!(s.contains("tau=120s"));
    }
}
