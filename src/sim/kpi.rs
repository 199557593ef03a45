//! Post-hoc KPI computation from closed-loop tick reports.

use std::fmt;

use serde::Serialize;

use super::types::TickReport;

/// Aggregate key performance indicators derived from a complete run.
///
/// Computed post-hoc from `Vec<TickReport>` to ensure consistency between
/// tick data and reported metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiReport {
    /// Ticks covered by the report.
    pub ticks: usize,
    /// Total energy produced (kWh).
    pub production_kwh: f32,
    /// Total energy drawn by active consumers (kWh).
    pub consumption_kwh: f32,
    /// Consumption served from the battery (kWh).
    pub battery_served_kwh: f32,
    /// Consumption served by the external grid (kWh).
    pub grid_served_kwh: f32,
    /// Production lost at the capacity ceiling (kWh).
    pub curtailed_kwh: f32,
    /// Share of consumption served from the battery, in percent.
    pub self_sufficiency_pct: f32,
    /// Demands opened by the workload generator.
    pub demands_assigned: usize,
    /// Requests run to completion.
    pub demands_completed: usize,
    pub activations: usize,
    pub denials: usize,
    /// Stale activations refused by the engine.
    pub rejections: usize,
    pub deadline_misses: usize,
    pub min_battery_kwh: f32,
    pub max_battery_kwh: f32,
}

impl KpiReport {
    /// Computes all KPIs from the complete tick report vector.
    ///
    /// An empty slice gives an all-zero report.
    pub fn from_reports(reports: &[TickReport]) -> Self {
        if reports.is_empty() {
            return Self::default();
        }

        let mut kpi = Self {
            ticks: reports.len(),
            min_battery_kwh: f32::INFINITY,
            max_battery_kwh: f32::NEG_INFINITY,
            ..Self::default()
        };
        for r in reports {
            kpi.production_kwh += r.production_kwh;
            kpi.consumption_kwh += r.consumption_kwh;
            kpi.battery_served_kwh += r.battery_consumption_kwh;
            kpi.grid_served_kwh += r.non_battery_consumption_kwh;
            kpi.curtailed_kwh += r.curtailed_kwh;
            kpi.demands_assigned += usize::from(r.generated.is_some());
            kpi.demands_completed += r.completed;
            kpi.activations += r.activated;
            kpi.denials += r.denied;
            kpi.rejections += r.rejected;
            kpi.deadline_misses += r.deadline_missed;
            kpi.min_battery_kwh = kpi.min_battery_kwh.min(r.battery_kwh);
            kpi.max_battery_kwh = kpi.max_battery_kwh.max(r.battery_kwh);
        }
        kpi.self_sufficiency_pct = if kpi.consumption_kwh > 0.0 {
            100.0 * kpi.battery_served_kwh / kpi.consumption_kwh
        } else {
            100.0
        };
        kpi
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ({} ticks) ---", self.ticks)?;
        writeln!(f, "Production:            {:.3} kWh", self.production_kwh)?;
        writeln!(f, "Consumption:           {:.3} kWh", self.consumption_kwh)?;
        writeln!(
            f,
            "  battery / grid:      {:.3} / {:.3} kWh ({:.1}% self-sufficient)",
            self.battery_served_kwh, self.grid_served_kwh, self.self_sufficiency_pct
        )?;
        writeln!(f, "Curtailed:             {:.3} kWh", self.curtailed_kwh)?;
        writeln!(
            f,
            "Battery range:         {:.3} .. {:.3} kWh",
            self.min_battery_kwh, self.max_battery_kwh
        )?;
        writeln!(
            f,
            "Demands:               {} assigned, {} completed, {} missed deadlines",
            self.demands_assigned, self.demands_completed, self.deadline_misses
        )?;
        write!(
            f,
            "Decisions:             {} activations, {} denials, {} rejected",
            self.activations, self.denials, self.rejections
        )
    }
}
