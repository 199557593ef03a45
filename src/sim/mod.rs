/// Eligibility filtering over consumer snapshots.
pub mod analyzer;
/// Simulation clock for tick management.
pub mod clock;
pub mod closed_loop;
pub mod engine;
pub mod kpi;
/// Battery-constrained allocation.
pub mod planner;
pub mod types;
/// Periodic new-demand generation.
pub mod workload;
