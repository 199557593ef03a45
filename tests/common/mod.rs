//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use rec_sim::devices::{Battery, Consumer, Producer};
use rec_sim::messages::{AssignDemand, EligibilityMessage, EligibilityRecord, MarkActive};
use rec_sim::sim::analyzer::EligibilityAnalyzer;
use rec_sim::sim::closed_loop::ClosedLoop;
use rec_sim::sim::engine::Engine;
use rec_sim::sim::planner::GreedyPlanner;
use rec_sim::sim::types::SimConfig;

/// One-minute ticks, seed 42.
pub fn minute_config() -> SimConfig {
    SimConfig::new(60, 42)
}

/// Engine over `consumers` with no producers and no workload generator.
pub fn quiet_engine(consumers: Vec<Consumer>, capacity_kwh: f32, initial_kwh: f32) -> Engine {
    Engine::new(
        minute_config(),
        Vec::new(),
        consumers,
        Battery::new(capacity_kwh, initial_kwh),
        None,
    )
}

/// Engine with one member `m1` owning a 4 kW producer and consumers `c1..cn`.
pub fn small_engine(cons_kw: &[f32], initial_kwh: f32) -> Engine {
    let consumers = cons_kw
        .iter()
        .enumerate()
        .map(|(i, kw)| Consumer::new("m1", &format!("c{}", i + 1), *kw))
        .collect();
    Engine::new(
        minute_config(),
        vec![Producer::new("m1", "p1", 4.0, 7)],
        consumers,
        Battery::new(20.0, initial_kwh),
        None,
    )
}

/// Closed loop with a 120 s urgency threshold.
pub fn closed_loop(engine: Engine) -> ClosedLoop<GreedyPlanner> {
    ClosedLoop::new(engine, EligibilityAnalyzer::new(120), GreedyPlanner)
}

pub fn assign(member: &str, consumer: &str, tau_s: u64, delta_s: u64) -> AssignDemand {
    AssignDemand {
        member_id: member.into(),
        consumer_id: consumer.into(),
        tau_s,
        delta_s,
    }
}

pub fn mark(member: &str, consumer: &str) -> MarkActive {
    MarkActive {
        member_id: member.into(),
        consumer_id: consumer.into(),
    }
}

/// Eligibility record with `tau = 60 s` and the given slack.
pub fn record(id: &str, cons_required_kwh: f32, slack_s: u64, is_urgent: bool) -> EligibilityRecord {
    EligibilityRecord {
        consumer_id: id.into(),
        cons_required_kwh,
        tau_s: 60,
        delta_s: 60 + slack_s,
        is_urgent,
    }
}

/// Single-member eligibility message.
pub fn eligibility(battery_kwh: f32, records: Vec<EligibilityRecord>) -> EligibilityMessage {
    let mut msg = EligibilityMessage {
        battery_kwh,
        ..EligibilityMessage::default()
    };
    msg.members.insert("m1".into(), records);
    msg
}
