//! World state engine: owns every consumer, producer, and the battery, and
//! advances them one tick at a time.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::config::ScenarioConfig;
use crate::devices::{
    Battery, Consumer, ConsumerPhase, ConsumerTransition, Device, DeviceContext, Producer,
};
use crate::error::MutationError;
use crate::messages::{
    Action, AssignDemand, BatteryRecord, ConsumerRecord, DecisionMessage, MarkActive,
    ProducerRecord, Snapshot, TelemetryFrame,
};
use crate::topology::Topology;

use super::clock::Clock;
use super::types::{DispatchReport, GeneratedDemand, SimConfig, TickReport};
use super::workload::DemandGenerator;

/// Seed offset for producer RNGs; producer `i` uses `seed + offset + i`.
const PRODUCER_SEED_OFFSET: u64 = 101;
/// Seed offset for the workload generator RNG.
const WORKLOAD_SEED_OFFSET: u64 = 57;

/// Simulation engine owning all mutable community state.
///
/// Nothing outside the engine mutates consumers or the battery: the
/// analyzer and planner work on snapshots and hand back decisions that
/// [`Engine::apply_decisions`] applies.
pub struct Engine {
    config: SimConfig,
    clock: Clock,
    producers: Vec<Producer>,
    consumers: Vec<Consumer>,
    /// member id → consumer id → index into `consumers`
    index: BTreeMap<String, BTreeMap<String, usize>>,
    battery: Battery,
    workload: Option<DemandGenerator>,
    last_report: TickReport,
}

impl Engine {
    /// Creates a new engine.
    ///
    /// # Arguments
    ///
    /// * `config` - Simulation timing
    /// * `producers` - Shared producers
    /// * `consumers` - Flexible consumers (ids unique per member)
    /// * `battery` - Shared battery
    /// * `workload` - New-demand generator; `None` leaves demand entirely external
    pub fn new(
        config: SimConfig,
        producers: Vec<Producer>,
        consumers: Vec<Consumer>,
        battery: Battery,
        workload: Option<DemandGenerator>,
    ) -> Self {
        let mut index: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
        for (i, c) in consumers.iter().enumerate() {
            index
                .entry(c.member_id.clone())
                .or_default()
                .insert(c.consumer_id.clone(), i);
        }
        Self {
            clock: Clock::new(config.tick_seconds),
            config,
            producers,
            consumers,
            index,
            battery,
            workload,
            last_report: TickReport::default(),
        }
    }

    /// Builds the engine for a validated scenario and topology.
    pub fn from_scenario(scenario: &ScenarioConfig, topology: &Topology) -> Self {
        let s = &scenario.simulation;
        let config = SimConfig::new(s.tick_seconds, s.seed);

        let mut producers = Vec::with_capacity(topology.producer_count());
        let mut consumers = Vec::with_capacity(topology.consumer_count());
        for (member_id, member) in &topology.members {
            for (producer_id, p) in &member.producers {
                let seed = s
                    .seed
                    .wrapping_add(PRODUCER_SEED_OFFSET)
                    .wrapping_add(producers.len() as u64);
                producers.push(Producer::new(member_id, producer_id, p.max_pi_kw, seed));
            }
            for (consumer_id, c) in &member.consumers {
                consumers.push(Consumer::new(member_id, consumer_id, c.cons_kw));
            }
        }

        let b = &scenario.battery;
        let battery = Battery::new(b.max_capacity_kwh, b.initial_kwh);
        let workload =
            DemandGenerator::new(&scenario.workload, s.seed.wrapping_add(WORKLOAD_SEED_OFFSET));

        Self::new(config, producers, consumers, battery, Some(workload))
    }

    /// Executes one tick and returns its report.
    ///
    /// Order within the tick: consumption of the consumers active during
    /// the tick, the counter pass, production sampling, battery settlement,
    /// then new-demand generation.
    pub fn step(&mut self) -> TickReport {
        let tick = self.clock.tick();
        let context = DeviceContext::new(tick, self.config.dt_hours);

        let mut consumption_kwh = 0.0_f32;
        let mut active_consumers = 0;
        for c in &mut self.consumers {
            if c.is_active() {
                active_consumers += 1;
                consumption_kwh += c.energy_kwh(&context);
            }
        }

        let mut completed = 0;
        let mut deadline_missed = 0;
        for c in &mut self.consumers {
            match c.advance(self.config.tick_seconds) {
                ConsumerTransition::Completed => {
                    completed += 1;
                    debug!(tick, member = %c.member_id, consumer = %c.consumer_id, "request satisfied");
                }
                ConsumerTransition::DeadlineMissed => {
                    deadline_missed += 1;
                    warn!(
                        tick,
                        member = %c.member_id,
                        consumer = %c.consumer_id,
                        tau_s = c.tau_s(),
                        "deadline lapsed with runtime still owed"
                    );
                }
                ConsumerTransition::Unchanged => {}
            }
        }

        let production_kwh: f32 = self
            .producers
            .iter_mut()
            .map(|p| p.produce(&context))
            .sum();

        let flow = self.battery.settle(production_kwh, consumption_kwh);
        if flow.non_battery_consumption_kwh > 0.0 {
            debug!(
                tick,
                deficit_kwh = flow.non_battery_consumption_kwh,
                "battery exhausted, deficit served by grid"
            );
        }

        let generated = self.generate_demand(tick);

        let report = TickReport {
            tick,
            time_s: self.clock.elapsed_s(),
            production_kwh,
            consumption_kwh,
            battery_consumption_kwh: flow.battery_consumption_kwh,
            non_battery_consumption_kwh: flow.non_battery_consumption_kwh,
            curtailed_kwh: flow.curtailed_kwh,
            battery_kwh: self.battery.value_kwh(),
            active_consumers,
            completed,
            deadline_missed,
            generated,
            ..TickReport::default()
        };
        self.last_report = report.clone();
        report
    }

    fn generate_demand(&mut self, tick: u64) -> Option<GeneratedDemand> {
        let workload = self.workload.as_mut()?;
        if !workload.on_tick() {
            return None;
        }

        let idle: Vec<usize> = self
            .consumers
            .iter()
            .enumerate()
            .filter(|(_, c)| c.phase() == ConsumerPhase::Idle)
            .map(|(i, _)| i)
            .collect();
        let Some(pick) = workload.pick(idle.len()) else {
            info!(tick, "demand due but every consumer is busy; skipped");
            return None;
        };
        let (tau_s, delta_s) = workload.sample_demand();

        let consumer = &mut self.consumers[idle[pick]];
        if let Err(err) = consumer.assign(tau_s, delta_s) {
            warn!(tick, error = %err, "generated demand rejected");
            return None;
        }
        info!(
            tick,
            member = %consumer.member_id,
            consumer = %consumer.consumer_id,
            tau_s,
            delta_s,
            "new demand assigned"
        );
        Some(GeneratedDemand {
            member_id: consumer.member_id.clone(),
            consumer_id: consumer.consumer_id.clone(),
            tau_s,
            delta_s,
        })
    }

    /// Opens a demand on an idle consumer.
    ///
    /// # Errors
    ///
    /// Returns a `MutationError` (and logs it) if the consumer is unknown,
    /// not idle, or the counters are zero. The world is unchanged on error.
    pub fn assign_demand(&mut self, request: &AssignDemand) -> Result<(), MutationError> {
        let result = self
            .consumer_mut(&request.member_id, &request.consumer_id)
            .and_then(|c| c.assign(request.tau_s, request.delta_s));
        match &result {
            Ok(()) => info!(
                member = %request.member_id,
                consumer = %request.consumer_id,
                tau_s = request.tau_s,
                delta_s = request.delta_s,
                "demand assigned"
            ),
            Err(err) => warn!(
                member = %request.member_id,
                consumer = %request.consumer_id,
                reason = %err,
                "assign demand rejected"
            ),
        }
        result
    }

    /// Starts a pending consumer.
    ///
    /// # Errors
    ///
    /// Returns a `MutationError` (and logs it) if the consumer is unknown or
    /// not pending. The world is unchanged on error.
    pub fn mark_active(&mut self, request: &MarkActive) -> Result<(), MutationError> {
        let result = self
            .consumer_mut(&request.member_id, &request.consumer_id)
            .and_then(Consumer::activate);
        match &result {
            Ok(()) => debug!(
                member = %request.member_id,
                consumer = %request.consumer_id,
                "consumer activated"
            ),
            Err(err) => warn!(
                member = %request.member_id,
                consumer = %request.consumer_id,
                reason = %err,
                "mark active rejected"
            ),
        }
        result
    }

    /// Index of the latest completed tick, `None` before the first.
    pub fn latest_tick(&self) -> Option<u64> {
        self.clock.completed().checked_sub(1)
    }

    /// Applies a planner decision message computed from tick `tick`.
    ///
    /// The whole message is applied at once, between two counter passes.
    /// A message planned for any tick other than the latest completed one
    /// is dropped: each decision is logged and counted as stale, and no
    /// consumer changes. Otherwise `activate` marks the consumer active and
    /// `deactivate` is an explicit denial that leaves the consumer pending.
    /// Activations that no longer match the consumer's state are rejected
    /// and counted, never applied.
    pub fn apply_decisions(&mut self, tick: u64, decisions: &DecisionMessage) -> DispatchReport {
        let mut report = DispatchReport::default();
        let latest = self.latest_tick();
        if latest != Some(tick) {
            for (member_id, decision) in decisions.iter() {
                report.stale += 1;
                warn!(
                    planned_tick = tick,
                    latest_tick = ?latest,
                    member = member_id,
                    consumer = %decision.consumer_id,
                    action = ?decision.action,
                    reason = "planned for a superseded tick",
                    "decision dropped"
                );
            }
            return report;
        }
        for (member_id, decision) in decisions.iter() {
            match decision.action {
                Action::Activate => {
                    let request = MarkActive {
                        member_id: member_id.to_string(),
                        consumer_id: decision.consumer_id.clone(),
                    };
                    match self.mark_active(&request) {
                        Ok(()) => report.activated += 1,
                        Err(_) => report.rejected += 1,
                    }
                }
                Action::Deactivate => {
                    report.denied += 1;
                    info!(
                        member = member_id,
                        consumer = %decision.consumer_id,
                        reason = "insufficient battery budget",
                        "activation denied"
                    );
                }
            }
        }
        report
    }

    /// Builds the telemetry frame for the state after the latest tick.
    pub fn frame(&self) -> TelemetryFrame {
        let timestamp_s = self.clock.elapsed_s();
        let flow = self.battery.last_flow();
        TelemetryFrame {
            tick: self.last_report.tick,
            timestamp_s,
            producers: self
                .producers
                .iter()
                .map(|p| ProducerRecord {
                    member_id: p.member_id.clone(),
                    producer_id: p.producer_id.clone(),
                    production_kwh: p.last_kwh,
                    timestamp_s,
                })
                .collect(),
            consumers: self
                .consumers
                .iter()
                .map(|c| ConsumerRecord {
                    member_id: c.member_id.clone(),
                    consumer_id: c.consumer_id.clone(),
                    tau_s: c.tau_s(),
                    delta_s: c.delta_s(),
                    cons_kw: c.cons_kw,
                    active: c.is_active(),
                    timestamp_s,
                })
                .collect(),
            battery: BatteryRecord {
                max_capacity_kwh: self.battery.max_capacity_kwh,
                battery_kwh: self.battery.value_kwh(),
                battery_consumption_kwh: flow.battery_consumption_kwh,
                non_battery_consumption_kwh: flow.non_battery_consumption_kwh,
                timestamp_s,
            },
        }
    }

    /// Snapshot of the current state, as the analyzer would read it.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_frame(&self.frame())
    }

    /// Looks up a consumer by member and consumer id.
    pub fn consumer(&self, member_id: &str, consumer_id: &str) -> Option<&Consumer> {
        let i = *self.index.get(member_id)?.get(consumer_id)?;
        self.consumers.get(i)
    }

    fn consumer_mut(
        &mut self,
        member_id: &str,
        consumer_id: &str,
    ) -> Result<&mut Consumer, MutationError> {
        let members = self
            .index
            .get(member_id)
            .ok_or_else(|| MutationError::UnknownMember {
                member: member_id.to_string(),
            })?;
        let i = *members
            .get(consumer_id)
            .ok_or_else(|| MutationError::UnknownConsumer {
                member: member_id.to_string(),
                consumer: consumer_id.to_string(),
            })?;
        Ok(&mut self.consumers[i])
    }

    pub fn consumers(&self) -> &[Consumer] {
        &self.consumers
    }

    pub fn producers(&self) -> &[Producer] {
        &self.producers
    }

    /// Returns a reference to the battery.
    pub fn battery(&self) -> &Battery {
        &self.battery
    }

    /// Returns a reference to the simulation configuration.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Number of ticks executed so far.
    pub fn ticks_run(&self) -> u64 {
        self.clock.completed()
    }
}
