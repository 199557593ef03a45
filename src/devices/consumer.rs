use crate::devices::types::{Device, DeviceContext};
use crate::error::MutationError;

/// Seconds per hour, for runtime → energy conversion.
const SECONDS_PER_HOUR: f32 = 3600.0;

/// Largest accepted `tau`/`delta` (2^53 s). Counters up to this bound survive
/// a round trip through `f64` telemetry series exactly.
pub const MAX_COUNTER_S: u64 = 1 << 53;

/// `delta - tau` in seconds, without wrapping for any pair of counters.
pub fn slack_s(tau_s: u64, delta_s: u64) -> i64 {
    let slack = i128::from(delta_s) - i128::from(tau_s);
    i64::try_from(slack).unwrap_or(if slack > 0 { i64::MAX } else { i64::MIN })
}

/// Lifecycle phase derived from a consumer's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerPhase {
    /// No open request (`tau == 0`, `delta == 0`).
    Idle,
    /// Open request waiting for activation.
    Pending,
    /// Drawing power until `tau` runs out.
    Active,
}

/// What a single tick did to a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerTransition {
    Unchanged,
    /// `tau` reached 0; the consumer went back to idle.
    Completed,
    /// `delta` reached 0 while runtime was still owed.
    DeadlineMissed,
}

/// A flexible consumer with a bounded runtime request and a deadline.
///
/// `tau_s` is the runtime still owed, `delta_s` the time left before the
/// request expires. Both are whole seconds and saturate at zero.
///
/// # Power Flow Convention
/// Returns `cons_kw` while active and 0 otherwise (consumption magnitude).
#[derive(Debug, Clone)]
pub struct Consumer {
    /// Owning member.
    pub member_id: String,

    /// Consumer identifier, unique within the member.
    pub consumer_id: String,

    /// Power draw while active (kW).
    pub cons_kw: f32,

    tau_s: u64,
    delta_s: u64,
    active: bool,
    cons_required_kwh: f32,
}

impl Consumer {
    /// Creates an idle consumer.
    ///
    /// # Panics
    ///
    /// Panics if `cons_kw` is not strictly positive.
    pub fn new(member_id: &str, consumer_id: &str, cons_kw: f32) -> Self {
        assert!(cons_kw.is_finite() && cons_kw > 0.0);
        Self {
            member_id: member_id.to_string(),
            consumer_id: consumer_id.to_string(),
            cons_kw,
            tau_s: 0,
            delta_s: 0,
            active: false,
            cons_required_kwh: 0.0,
        }
    }

    pub fn tau_s(&self) -> u64 {
        self.tau_s
    }

    pub fn delta_s(&self) -> u64 {
        self.delta_s
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Energy still needed to finish the request (kWh).
    pub fn cons_required_kwh(&self) -> f32 {
        self.cons_required_kwh
    }

    pub fn phase(&self) -> ConsumerPhase {
        if self.active {
            ConsumerPhase::Active
        } else if self.tau_s > 0 {
            ConsumerPhase::Pending
        } else {
            ConsumerPhase::Idle
        }
    }

    /// Opens a new request. Only legal on an idle consumer.
    ///
    /// # Errors
    ///
    /// `InvalidDemand` if either counter is zero or above [`MAX_COUNTER_S`],
    /// `NotIdle` if a request is already open. The consumer is unchanged on
    /// error.
    pub fn assign(&mut self, tau_s: u64, delta_s: u64) -> Result<(), MutationError> {
        let reason = if tau_s == 0 || delta_s == 0 {
            Some(format!("tau and delta must be > 0 (tau={tau_s}s, delta={delta_s}s)"))
        } else if tau_s > MAX_COUNTER_S || delta_s > MAX_COUNTER_S {
            Some(format!(
                "tau and delta must be <= {MAX_COUNTER_S}s (tau={tau_s}s, delta={delta_s}s)"
            ))
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(MutationError::InvalidDemand {
                member: self.member_id.clone(),
                consumer: self.consumer_id.clone(),
                reason,
            });
        }
        if self.phase() != ConsumerPhase::Idle || self.delta_s != 0 {
            return Err(MutationError::NotIdle {
                member: self.member_id.clone(),
                consumer: self.consumer_id.clone(),
                tau_s: self.tau_s,
                delta_s: self.delta_s,
                active: self.active,
            });
        }
        self.tau_s = tau_s;
        self.delta_s = delta_s;
        self.recompute_required();
        Ok(())
    }

    /// Starts drawing power. Only legal while pending.
    ///
    /// # Errors
    ///
    /// `NotPending` if the consumer is idle or already active.
    pub fn activate(&mut self) -> Result<(), MutationError> {
        if self.phase() != ConsumerPhase::Pending {
            return Err(MutationError::NotPending {
                member: self.member_id.clone(),
                consumer: self.consumer_id.clone(),
                tau_s: self.tau_s,
                active: self.active,
            });
        }
        self.active = true;
        Ok(())
    }

    /// Advances both counters by one tick.
    ///
    /// `delta` always runs down; `tau` only while active. Finishing the
    /// runtime resets the consumer to idle in the same tick.
    pub fn advance(&mut self, tick_seconds: u64) -> ConsumerTransition {
        let had_deadline = self.delta_s > 0;
        self.delta_s = self.delta_s.saturating_sub(tick_seconds);

        let mut transition = ConsumerTransition::Unchanged;
        if self.active {
            self.tau_s = self.tau_s.saturating_sub(tick_seconds);
            if self.tau_s == 0 {
                self.active = false;
                self.delta_s = 0;
                transition = ConsumerTransition::Completed;
            }
        }

        if transition == ConsumerTransition::Unchanged
            && had_deadline
            && self.delta_s == 0
            && self.tau_s > 0
        {
            transition = ConsumerTransition::DeadlineMissed;
        }

        self.recompute_required();
        transition
    }

    fn recompute_required(&mut self) {
        self.cons_required_kwh = self.tau_s as f32 / SECONDS_PER_HOUR * self.cons_kw;
    }
}

impl Device for Consumer {
    fn power_kw(&mut self, _context: &DeviceContext) -> f32 {
        if self.active { self.cons_kw } else { 0.0 }
    }
}
