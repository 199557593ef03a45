//! Battery-constrained allocation of activable consumers.

use std::cmp::Ordering;

use tracing::debug;

use crate::messages::{Action, Decision, DecisionMessage, EligibilityMessage, EligibilityRecord};

/// Turns an eligibility message into binding activate/deactivate decisions.
pub trait Planner {
    /// Allocates the battery budget. Must be deterministic in its input.
    fn plan(&self, eligibility: &EligibilityMessage) -> DecisionMessage;
}

/// Deadline-first greedy allocator.
///
/// Members are processed in ascending id order against one running battery
/// balance. Within a member, urgent consumers are activated unconditionally
/// (tightest slack first) and their requirement is deducted even below zero.
/// Non-urgent consumers are then walked by slack and activated while their
/// requirement fits the remaining balance; a consumer that does not fit is
/// denied and the walk continues.
///
/// A negative balance left by urgent activations is carried forward, so it
/// suppresses every later non-urgent activation in the same plan.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyPlanner;

impl GreedyPlanner {
    /// Orders by slack, then remaining deadline, then id, so equal-slack
    /// records have a stable order.
    fn by_priority(a: &&EligibilityRecord, b: &&EligibilityRecord) -> Ordering {
        a.slack_s()
            .cmp(&b.slack_s())
            .then(a.delta_s.cmp(&b.delta_s))
            .then_with(|| a.consumer_id.cmp(&b.consumer_id))
    }
}

impl Planner for GreedyPlanner {
    fn plan(&self, eligibility: &EligibilityMessage) -> DecisionMessage {
        let mut balance_kwh = eligibility.battery_kwh;
        let mut decisions = DecisionMessage::default();

        for (member_id, records) in &eligibility.members {
            let (mut urgent, mut relaxed): (Vec<&EligibilityRecord>, Vec<&EligibilityRecord>) =
                records.iter().partition(|r| r.is_urgent);
            urgent.sort_by(Self::by_priority);
            relaxed.sort_by(Self::by_priority);

            let mut out = Vec::with_capacity(records.len());
            for r in urgent {
                balance_kwh -= r.cons_required_kwh;
                out.push(Decision {
                    consumer_id: r.consumer_id.clone(),
                    action: Action::Activate,
                });
            }
            for r in relaxed {
                let action = if r.cons_required_kwh <= balance_kwh {
                    balance_kwh -= r.cons_required_kwh;
                    Action::Activate
                } else {
                    Action::Deactivate
                };
                out.push(Decision {
                    consumer_id: r.consumer_id.clone(),
                    action,
                });
            }
            if !out.is_empty() {
                decisions.members.insert(member_id.clone(), out);
            }
        }

        debug!(
            activate = decisions.count(Action::Activate),
            deactivate = decisions.count(Action::Deactivate),
            balance_kwh,
            "plan computed"
        );
        decisions
    }
}
