//! Eligibility analysis: which pending consumers may be considered this tick.

use tracing::{debug, warn};

use crate::devices::slack_s;
use crate::error::SnapshotError;
use crate::messages::{EligibilityMessage, EligibilityRecord, Snapshot};
use crate::transport::SnapshotSource;
use crate::transport::retry::{RetryPolicy, retry};

const SECONDS_PER_HOUR: f32 = 3600.0;

/// Eligibility produced from one snapshot version.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// Tick of the snapshot the message was computed from.
    pub tick: u64,
    pub eligibility: EligibilityMessage,
}

/// Pure filter over a consumer snapshot.
///
/// A pending consumer (`!active`, `tau > 0`) is urgent when its slack
/// `delta - tau` is below the threshold. It is activable when urgent, or when
/// its remaining energy is non-zero and strictly below the battery charge.
///
/// # Examples
///
/// ```
/// use rec_sim::sim::analyzer::EligibilityAnalyzer;
/// use rec_sim::messages::Snapshot;
///
/// let analyzer = EligibilityAnalyzer::new(120);
/// let empty = Snapshot { tick: 0, battery_kwh: 5.0, consumers: Default::default() };
/// assert!(analyzer.analyze(&empty).is_empty());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EligibilityAnalyzer {
    urgency_threshold_s: u64,
}

impl EligibilityAnalyzer {
    pub fn new(urgency_threshold_s: u64) -> Self {
        Self {
            urgency_threshold_s,
        }
    }

    /// Computes the activable consumers of a snapshot, grouped by member.
    ///
    /// Members without any activable consumer are omitted. Does no battery
    /// bookkeeping; the same snapshot always yields the same message.
    pub fn analyze(&self, snapshot: &Snapshot) -> EligibilityMessage {
        let battery_kwh = snapshot.battery_kwh;
        let threshold = i64::try_from(self.urgency_threshold_s).unwrap_or(i64::MAX);

        let mut message = EligibilityMessage {
            battery_kwh,
            ..EligibilityMessage::default()
        };
        for (member_id, consumers) in &snapshot.consumers {
            let records: Vec<EligibilityRecord> = consumers
                .iter()
                .filter(|(_, r)| !r.active && r.tau_s > 0)
                .filter_map(|(consumer_id, r)| {
                    let cons_required_kwh = r.tau_s as f32 / SECONDS_PER_HOUR * r.cons_kw;
                    let is_urgent = slack_s(r.tau_s, r.delta_s) < threshold;
                    let affordable = cons_required_kwh > 0.0 && battery_kwh > cons_required_kwh;
                    (is_urgent || affordable).then(|| EligibilityRecord {
                        consumer_id: consumer_id.clone(),
                        cons_required_kwh,
                        tau_s: r.tau_s,
                        delta_s: r.delta_s,
                        is_urgent,
                    })
                })
                .collect();
            if !records.is_empty() {
                message.members.insert(member_id.clone(), records);
            }
        }
        message
    }

    /// Fetches the latest snapshot with bounded retries, then analyzes it.
    ///
    /// # Errors
    ///
    /// Returns the last `SnapshotError` once the retry budget is spent. An
    /// unobtainable or partial snapshot is never turned into an empty
    /// message.
    pub async fn poll<S: SnapshotSource>(
        &self,
        source: &S,
        policy: &RetryPolicy,
    ) -> Result<Analysis, SnapshotError> {
        let snapshot = retry(policy, "snapshot fetch", || source.fetch())
            .await
            .inspect_err(|err| warn!(error = %err, "no usable snapshot"))?;
        let eligibility = self.analyze(&snapshot);
        debug!(
            tick = snapshot.tick,
            eligible = eligibility.len(),
            battery_kwh = snapshot.battery_kwh,
            "eligibility computed"
        );
        Ok(Analysis {
            tick: snapshot.tick,
            eligibility,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::devices::MAX_COUNTER_S;
    use crate::messages::ConsumerReading;

    fn reading(tau_s: u64, delta_s: u64, cons_kw: f32, active: bool) -> ConsumerReading {
        ConsumerReading {
            tau_s,
            delta_s,
            cons_kw,
            active,
        }
    }

    fn snapshot(battery_kwh: f32, members: &[(&str, &[(&str, ConsumerReading)])]) -> Snapshot {
        let mut consumers = BTreeMap::new();
        for (m, cs) in members {
            let map: BTreeMap<String, ConsumerReading> =
                cs.iter().map(|(id, r)| (id.to_string(), *r)).collect();
            consumers.insert(m.to_string(), map);
        }
        Snapshot {
            tick: 7,
            battery_kwh,
            consumers,
        }
    }

    #[test]
    fn idle_and_active_consumers_are_skipped() {
        let s = snapshot(
            50.0,
            &[(
                "m1",
                &[
                    ("idle", reading(0, 0, 2.0, false)),
                    ("busy", reading(120, 300, 2.0, true)),
                ],
            )],
        );
        assert!(EligibilityAnalyzer::new(120).analyze(&s).is_empty());
    }

    #[test]
    fn tight_slack_is_urgent_even_without_battery() {
        let s = snapshot(0.0, &[("m1", &[("c1", reading(180, 200, 3.0, false))])]);
        let msg = EligibilityAnalyzer::new(120).analyze(&s);
        let r = &msg.members["m1"][0];
        assert!(r.is_urgent);
        assert!((r.cons_required_kwh - 0.15).abs() < 1e-6);
    }

    #[test]
    fn non_urgent_needs_strictly_more_battery_than_required() {
        // 3600 s at 1 kW = 1 kWh
        let c = reading(3600, 7200, 1.0, false);
        let analyzer = EligibilityAnalyzer::new(120);
        assert!(analyzer.analyze(&snapshot(1.0, &[("m1", &[("c1", c)])])).is_empty());
        assert_eq!(
            analyzer.analyze(&snapshot(1.01, &[("m1", &[("c1", c)])])).len(),
            1
        );
    }

    #[test]
    fn expired_request_is_urgent() {
        let s = snapshot(0.0, &[("m1", &[("c1", reading(120, 0, 1.0, false))])]);
        let msg = EligibilityAnalyzer::new(0).analyze(&s);
        assert!(msg.members["m1"][0].is_urgent);
        assert_eq!(msg.members["m1"][0].slack_s(), -120);
    }

    #[test]
    fn far_deadline_is_not_urgent() {
        let far = reading(60, u64::MAX, 1.0, false);
        let bounded = reading(60, MAX_COUNTER_S, 1.0, false);
        let s = snapshot(0.0, &[("m1", &[("far", far), ("bounded", bounded)])]);
        assert!(EligibilityAnalyzer::new(120).analyze(&s).is_empty());
    }

    #[test]
    fn members_without_candidates_are_omitted() {
        let s = snapshot(
            10.0,
            &[
                ("m1", &[("c1", reading(60, 600, 1.0, false))]),
                ("m2", &[("c2", reading(0, 0, 1.0, false))]),
            ],
        );
        let msg = EligibilityAnalyzer::new(120).analyze(&s);
        assert!(msg.members.contains_key("m1"));
        assert!(!msg.members.contains_key("m2"));
        assert_eq!(msg.battery_kwh, 10.0);
    }

    #[test]
    fn analysis_is_idempotent() {
        let s = snapshot(
            2.0,
            &[(
                "m1",
                &[
                    ("a", reading(60, 90, 4.0, false)),
                    ("b", reading(300, 900, 1.0, false)),
                ],
            )],
        );
        let analyzer = EligibilityAnalyzer::new(120);
        assert_eq!(analyzer.analyze(&s), analyzer.analyze(&s));
    }
}
