//! Typed messages crossing the controller's boundaries.
//!
//! Wire field names follow the community's telemetry and planner contracts
//! (`tau`, `delta`, `cons_required`, `isUrgent`, ...). Inbound JSON is
//! validated once here; the core only ever sees fully-typed values.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::devices::{MAX_COUNTER_S, slack_s};
use crate::error::BoundaryError;

/// Production of one producer during one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerRecord {
    pub member_id: String,
    pub producer_id: String,
    #[serde(rename = "production_energy")]
    pub production_kwh: f32,
    #[serde(rename = "timestamp")]
    pub timestamp_s: u64,
}

/// Counters of one consumer after a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerRecord {
    pub member_id: String,
    pub consumer_id: String,
    #[serde(rename = "tau")]
    pub tau_s: u64,
    #[serde(rename = "delta")]
    pub delta_s: u64,
    #[serde(rename = "cons")]
    pub cons_kw: f32,
    pub active: bool,
    #[serde(rename = "timestamp")]
    pub timestamp_s: u64,
}

/// Battery state after a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryRecord {
    #[serde(rename = "max_capacity")]
    pub max_capacity_kwh: f32,
    #[serde(rename = "battery_value")]
    pub battery_kwh: f32,
    #[serde(rename = "battery_consumption")]
    pub battery_consumption_kwh: f32,
    #[serde(rename = "non_battery_consumption")]
    pub non_battery_consumption_kwh: f32,
    #[serde(rename = "timestamp")]
    pub timestamp_s: u64,
}

/// Everything the engine publishes for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub tick: u64,
    #[serde(rename = "timestamp")]
    pub timestamp_s: u64,
    pub producers: Vec<ProducerRecord>,
    pub consumers: Vec<ConsumerRecord>,
    pub battery: BatteryRecord,
}

/// Latest reading of one consumer, as seen by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumerReading {
    pub tau_s: u64,
    pub delta_s: u64,
    pub cons_kw: f32,
    pub active: bool,
}

/// Versioned view of the latest telemetry values.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Tick of the newest frame folded into this snapshot.
    pub tick: u64,
    pub battery_kwh: f32,
    /// member id → consumer id → reading
    pub consumers: BTreeMap<String, BTreeMap<String, ConsumerReading>>,
}

impl Snapshot {
    /// Builds a snapshot straight from a frame.
    pub fn from_frame(frame: &TelemetryFrame) -> Self {
        let mut consumers: BTreeMap<String, BTreeMap<String, ConsumerReading>> = BTreeMap::new();
        for c in &frame.consumers {
            consumers.entry(c.member_id.clone()).or_default().insert(
                c.consumer_id.clone(),
                ConsumerReading {
                    tau_s: c.tau_s,
                    delta_s: c.delta_s,
                    cons_kw: c.cons_kw,
                    active: c.active,
                },
            );
        }
        Self {
            tick: frame.tick,
            battery_kwh: frame.battery.battery_kwh,
            consumers,
        }
    }
}

/// A pending consumer the analyzer allows the planner to consider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EligibilityRecord {
    pub consumer_id: String,
    #[serde(rename = "cons_required")]
    pub cons_required_kwh: f32,
    #[serde(rename = "tau")]
    pub tau_s: u64,
    #[serde(rename = "delta")]
    pub delta_s: u64,
    #[serde(rename = "isUrgent")]
    pub is_urgent: bool,
}

impl EligibilityRecord {
    /// `delta - tau` in seconds; negative once the deadline can no longer be met.
    pub fn slack_s(&self) -> i64 {
        slack_s(self.tau_s, self.delta_s)
    }
}

/// Analyzer → planner message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EligibilityMessage {
    /// member id → activable consumers. Members without any are omitted.
    pub members: BTreeMap<String, Vec<EligibilityRecord>>,
    /// Battery charge the records were judged against (kWh).
    #[serde(rename = "battery")]
    pub battery_kwh: f32,
}

impl EligibilityMessage {
    /// Returns `true` when no consumer is activable.
    pub fn is_empty(&self) -> bool {
        self.members.values().all(Vec::is_empty)
    }

    /// Number of activable consumers across members.
    pub fn len(&self) -> usize {
        self.members.values().map(Vec::len).sum()
    }

    /// Decodes and validates an inbound eligibility message.
    ///
    /// # Errors
    ///
    /// Returns a `BoundaryError` for malformed JSON, missing fields, or
    /// out-of-range values. No partial message is ever returned.
    pub fn from_json(raw: &[u8]) -> Result<Self, BoundaryError> {
        let msg: Self = serde_json::from_slice(raw)?;
        msg.validate()?;
        Ok(msg)
    }

    fn validate(&self) -> Result<(), BoundaryError> {
        if !self.battery_kwh.is_finite() {
            return Err(BoundaryError::invalid("battery", "must be finite"));
        }
        for (member_id, records) in &self.members {
            if member_id.is_empty() {
                return Err(BoundaryError::invalid("members", "member id must not be empty"));
            }
            let mut seen = BTreeSet::new();
            for (i, r) in records.iter().enumerate() {
                if r.consumer_id.is_empty() {
                    return Err(BoundaryError::invalid(
                        format!("members.{member_id}[{i}].consumer_id"),
                        "must not be empty",
                    ));
                }
                if !seen.insert(r.consumer_id.as_str()) {
                    return Err(BoundaryError::invalid(
                        format!("members.{member_id}[{i}].consumer_id"),
                        format!("duplicate consumer `{}`", r.consumer_id),
                    ));
                }
                check_counters(&format!("members.{member_id}[{i}]"), r.tau_s, r.delta_s)?;
                if !r.cons_required_kwh.is_finite() || r.cons_required_kwh < 0.0 {
                    return Err(BoundaryError::invalid(
                        format!("members.{member_id}[{i}].cons_required"),
                        "must be finite and >= 0",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Binding allocation outcome for one consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Activate,
    Deactivate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Decision {
    pub consumer_id: String,
    pub action: Action,
}

/// Planner → actuation message: member id → ordered decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionMessage {
    pub members: BTreeMap<String, Vec<Decision>>,
}

impl DecisionMessage {
    pub fn is_empty(&self) -> bool {
        self.members.values().all(Vec::is_empty)
    }

    /// Iterates `(member_id, decision)` pairs in member order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Decision)> {
        self.members
            .iter()
            .flat_map(|(m, ds)| ds.iter().map(move |d| (m.as_str(), d)))
    }

    /// Number of decisions with the given action.
    pub fn count(&self, action: Action) -> usize {
        self.iter().filter(|(_, d)| d.action == action).count()
    }

    /// Decodes and validates an inbound decision message.
    ///
    /// # Errors
    ///
    /// Returns a `BoundaryError` for malformed JSON, unknown actions, or
    /// empty ids.
    pub fn from_json(raw: &[u8]) -> Result<Self, BoundaryError> {
        let msg: Self = serde_json::from_slice(raw)?;
        for (member_id, decision) in msg.iter() {
            if member_id.is_empty() || decision.consumer_id.is_empty() {
                return Err(BoundaryError::invalid(
                    "consumer_id",
                    "member and consumer ids must not be empty",
                ));
            }
        }
        Ok(msg)
    }
}

/// External request to open a demand on an idle consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignDemand {
    pub member_id: String,
    pub consumer_id: String,
    #[serde(rename = "tau")]
    pub tau_s: u64,
    #[serde(rename = "delta")]
    pub delta_s: u64,
}

impl AssignDemand {
    /// Decodes and validates an "assign demand" request.
    ///
    /// # Errors
    ///
    /// Returns a `BoundaryError` for malformed JSON, empty ids, or counters
    /// above [`MAX_COUNTER_S`]. Whether the consumer may take the demand is
    /// checked by the engine.
    pub fn from_json(raw: &[u8]) -> Result<Self, BoundaryError> {
        let req: Self = serde_json::from_slice(raw)?;
        require_ids(&req.member_id, &req.consumer_id)?;
        check_counters("", req.tau_s, req.delta_s)?;
        Ok(req)
    }
}

/// External request to start a pending consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkActive {
    pub member_id: String,
    pub consumer_id: String,
}

impl MarkActive {
    /// Decodes and validates a "mark active" request.
    ///
    /// # Errors
    ///
    /// Returns a `BoundaryError` for malformed JSON or empty ids.
    pub fn from_json(raw: &[u8]) -> Result<Self, BoundaryError> {
        let req: Self = serde_json::from_slice(raw)?;
        require_ids(&req.member_id, &req.consumer_id)?;
        Ok(req)
    }
}

fn require_ids(member_id: &str, consumer_id: &str) -> Result<(), BoundaryError> {
    if member_id.is_empty() {
        return Err(BoundaryError::invalid("member_id", "must not be empty"));
    }
    if consumer_id.is_empty() {
        return Err(BoundaryError::invalid("consumer_id", "must not be empty"));
    }
    Ok(())
}

fn check_counters(prefix: &str, tau_s: u64, delta_s: u64) -> Result<(), BoundaryError> {
    for (name, value) in [("tau", tau_s), ("delta", delta_s)] {
        if value > MAX_COUNTER_S {
            let field = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{prefix}.{name}")
            };
            return Err(BoundaryError::invalid(
                field,
                format!("must be <= {MAX_COUNTER_S} (got {value})"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligibility_message_uses_wire_names() {
        let raw = br#"{"members": {"m1": [
            {"consumer_id": "c1", "cons_required": 1.5, "tau": 120, "delta": 200, "isUrgent": false}
        ]}, "battery": 8.0}"#;
        let msg = EligibilityMessage::from_json(raw).expect("valid message");
        let r = &msg.members["m1"][0];
        assert_eq!(r.cons_required_kwh, 1.5);
        assert_eq!(r.slack_s(), 80);
        assert!(!r.is_urgent);
        assert_eq!(msg.battery_kwh, 8.0);
        assert_eq!(msg.len(), 1);
    }

    #[test]
    fn eligibility_message_missing_field_is_rejected() {
        let raw = br#"{"members": {"m1": [
            {"consumer_id": "c1", "cons_required": 1.5, "tau": 120, "delta": 200}
        ]}, "battery": 8.0}"#;
        assert!(matches!(
            EligibilityMessage::from_json(raw),
            Err(BoundaryError::Json(_))
        ));
        assert!(EligibilityMessage::from_json(br#"{"members": {}}"#).is_err());
    }

    #[test]
    fn eligibility_message_negative_requirement_is_rejected() {
        let raw = br#"{"members": {"m1": [
            {"consumer_id": "c1", "cons_required": -1.0, "tau": 120, "delta": 200, "isUrgent": true}
        ]}, "battery": 8.0}"#;
        let err = EligibilityMessage::from_json(raw).expect_err("negative requirement");
        assert!(err.to_string().contains("cons_required"));
    }

    #[test]
    fn eligibility_message_duplicate_consumer_is_rejected() {
        let raw = br#"{"members": {"m1": [
            {"consumer_id": "c1", "cons_required": 6.0, "tau": 60, "delta": 90, "isUrgent": false},
            {"consumer_id": "c1", "cons_required": 6.0, "tau": 60, "delta": 90, "isUrgent": false}
        ]}, "battery": 10.0}"#;
        let err = EligibilityMessage::from_json(raw).expect_err("duplicate consumer");
        assert!(matches!(err, BoundaryError::Invalid { .. }));
        assert!(err.to_string().contains("duplicate consumer `c1`"));

        // the same id under two members is fine
        let raw = br#"{"members": {
            "m1": [{"consumer_id": "c1", "cons_required": 1.0, "tau": 60, "delta": 90, "isUrgent": false}],
            "m2": [{"consumer_id": "c1", "cons_required": 1.0, "tau": 60, "delta": 90, "isUrgent": false}]
        }, "battery": 10.0}"#;
        assert_eq!(EligibilityMessage::from_json(raw).expect("valid").len(), 2);
    }

    #[test]
    fn eligibility_message_oversized_counter_is_rejected() {
        let raw = br#"{"members": {"m1": [
            {"consumer_id": "c1", "cons_required": 0.1, "tau": 60, "delta": 18446744073709551615, "isUrgent": false}
        ]}, "battery": 0.0}"#;
        let err = EligibilityMessage::from_json(raw).expect_err("delta above bound");
        assert!(err.to_string().contains("members.m1[0].delta"));
    }

    #[test]
    fn assign_demand_rejects_counters_above_bound() {
        let raw = br#"{"member_id": "m1", "consumer_id": "c1", "tau": 60, "delta": 18446744073709551615}"#;
        let err = AssignDemand::from_json(raw).expect_err("delta above bound");
        assert!(matches!(err, BoundaryError::Invalid { ref field, .. } if field == "delta"));

        let raw = format!(
            r#"{{"member_id": "m1", "consumer_id": "c1", "tau": 60, "delta": {}}}"#,
            MAX_COUNTER_S + 1
        );
        assert!(AssignDemand::from_json(raw.as_bytes()).is_err());
        let raw = format!(
            r#"{{"member_id": "m1", "consumer_id": "c1", "tau": 60, "delta": {MAX_COUNTER_S}}}"#
        );
        assert_eq!(
            AssignDemand::from_json(raw.as_bytes()).expect("bound").delta_s,
            MAX_COUNTER_S
        );
    }

    #[test]
    fn producer_record_uses_production_energy() {
        let record = ProducerRecord {
            member_id: "m1".into(),
            producer_id: "p1".into(),
            production_kwh: 0.5,
            timestamp_s: 60,
        };
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["production_energy"], 0.5);
        assert!(json.get("production").is_none());
    }

    #[test]
    fn decision_message_serializes_as_member_map() {
        let mut msg = DecisionMessage::default();
        msg.members.insert(
            "m1".into(),
            vec![
                Decision {
                    consumer_id: "c1".into(),
                    action: Action::Activate,
                },
                Decision {
                    consumer_id: "c2".into(),
                    action: Action::Deactivate,
                },
            ],
        );
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["m1"][0]["action"], "activate");
        assert_eq!(json["m1"][1]["action"], "deactivate");
        assert_eq!(msg.count(Action::Activate), 1);
    }

    #[test]
    fn decision_message_rejects_unknown_action() {
        let raw = br#"{"m1": [{"consumer_id": "c1", "action": "toggle"}]}"#;
        assert!(DecisionMessage::from_json(raw).is_err());
    }

    #[test]
    fn assign_demand_requires_ids() {
        let raw = br#"{"member_id": "", "consumer_id": "c1", "tau": 60, "delta": 90}"#;
        let err = AssignDemand::from_json(raw).expect_err("empty member");
        assert!(err.to_string().contains("member_id"));
        let ok = br#"{"member_id": "m1", "consumer_id": "c1", "tau": 60, "delta": 90}"#;
        assert_eq!(AssignDemand::from_json(ok).expect("valid").tau_s, 60);
    }

    #[test]
    fn mark_active_rejects_extra_fields() {
        let raw = br#"{"member_id": "m1", "consumer_id": "c1", "action": "activate"}"#;
        assert!(MarkActive::from_json(raw).is_err());
    }
}
