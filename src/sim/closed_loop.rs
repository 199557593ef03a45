//! Lock-step closed loop: engine → snapshot → eligibility → plan → apply.

use tracing::debug;

use crate::messages::DecisionMessage;

use super::analyzer::EligibilityAnalyzer;
use super::engine::Engine;
use super::planner::Planner;
use super::types::TickReport;

/// Runs every stage of one tick in order on the calling thread.
///
/// Each tick's counter pass completes before eligibility is computed, and
/// the tick's decisions are applied before the next counter pass, so this
/// is the reference ordering the concurrent pipeline approximates.
pub struct ClosedLoop<P: Planner> {
    engine: Engine,
    analyzer: EligibilityAnalyzer,
    planner: P,
    last_decisions: DecisionMessage,
}

impl<P: Planner> ClosedLoop<P> {
    pub fn new(engine: Engine, analyzer: EligibilityAnalyzer, planner: P) -> Self {
        Self {
            engine,
            analyzer,
            planner,
            last_decisions: DecisionMessage::default(),
        }
    }

    /// Executes one full tick and returns its report.
    pub fn step(&mut self) -> TickReport {
        let mut report = self.engine.step();

        let snapshot = self.engine.snapshot();
        let eligibility = self.analyzer.analyze(&snapshot);
        let decisions = self.planner.plan(&eligibility);
        let dispatch = self.engine.apply_decisions(snapshot.tick, &decisions);

        report.eligible = eligibility.len();
        report.activated = dispatch.activated;
        report.denied = dispatch.denied;
        report.rejected = dispatch.rejected;
        if !decisions.is_empty() {
            debug!(tick = report.tick, ?dispatch, "decisions applied");
        }

        self.last_decisions = decisions;
        report
    }

    /// Runs `ticks` ticks and collects their reports.
    pub fn run(&mut self, ticks: usize) -> Vec<TickReport> {
        (0..ticks).map(|_| self.step()).collect()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Mutable engine access, for injecting demands between ticks.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Decisions issued during the latest tick.
    pub fn last_decisions(&self) -> &DecisionMessage {
        &self.last_decisions
    }
}
