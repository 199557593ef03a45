//! In-memory analytical store: latest value per telemetry series plus a
//! bounded frame history.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::devices::MAX_COUNTER_S;
use crate::error::{SnapshotError, TransportError};
use crate::messages::{ConsumerReading, Snapshot, TelemetryFrame};

use super::{SnapshotSource, TelemetrySink};

/// Member and entity ids under which the community battery is recorded.
pub const BATTERY_MEMBER: &str = "community";
pub const BATTERY_ENTITY: &str = "battery";

/// Counters are stored as `f64`; every integer up to this bound is exact.
const MAX_COUNTER_F64: f64 = MAX_COUNTER_S as f64;

/// One measured quantity of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Production,
    Tau,
    Delta,
    Cons,
    Active,
    BatteryValue,
    MaxCapacity,
    BatteryConsumption,
    NonBatteryConsumption,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Production => "production_energy",
            Field::Tau => "tau",
            Field::Delta => "delta",
            Field::Cons => "cons",
            Field::Active => "active",
            Field::BatteryValue => "battery_value",
            Field::MaxCapacity => "max_capacity",
            Field::BatteryConsumption => "battery_consumption",
            Field::NonBatteryConsumption => "non_battery_consumption",
        }
    }

    fn is_consumer_field(self) -> bool {
        matches!(self, Field::Tau | Field::Delta | Field::Cons | Field::Active)
    }
}

/// `(member_id, consumer_id | producer_id, field)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    pub member_id: String,
    pub entity_id: String,
    pub field: Field,
}

impl SeriesKey {
    pub fn new(member_id: &str, entity_id: &str, field: Field) -> Self {
        Self {
            member_id: member_id.to_string(),
            entity_id: entity_id.to_string(),
            field,
        }
    }

    pub fn battery(field: Field) -> Self {
        Self::new(BATTERY_MEMBER, BATTERY_ENTITY, field)
    }
}

#[derive(Debug, Default)]
struct Inner {
    latest: BTreeMap<SeriesKey, f64>,
    latest_tick: Option<u64>,
    history: VecDeque<TelemetryFrame>,
}

/// Thread-safe telemetry store.
///
/// Writers replace each series' latest value; readers rebuild a snapshot
/// from those values. The lock is never held across an await.
#[derive(Debug)]
pub struct TelemetryStore {
    inner: Mutex<Inner>,
    history_limit: usize,
}

impl TelemetryStore {
    /// Creates an empty store keeping at most `history_limit` frames.
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            history_limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes one series value and advances the store's tick.
    pub fn record(&self, tick: u64, key: SeriesKey, value: f64) {
        let mut inner = self.lock();
        inner.latest.insert(key, value);
        inner.latest_tick = Some(inner.latest_tick.map_or(tick, |t| t.max(tick)));
    }

    /// Explodes a frame into its series and appends it to the history.
    pub fn ingest(&self, frame: TelemetryFrame) {
        let mut inner = self.lock();
        for p in &frame.producers {
            inner.latest.insert(
                SeriesKey::new(&p.member_id, &p.producer_id, Field::Production),
                f64::from(p.production_kwh),
            );
        }
        for c in &frame.consumers {
            let series = [
                (Field::Tau, c.tau_s as f64),
                (Field::Delta, c.delta_s as f64),
                (Field::Cons, f64::from(c.cons_kw)),
                (Field::Active, if c.active { 1.0 } else { 0.0 }),
            ];
            for (field, value) in series {
                inner
                    .latest
                    .insert(SeriesKey::new(&c.member_id, &c.consumer_id, field), value);
            }
        }
        let b = &frame.battery;
        let battery = [
            (Field::BatteryValue, b.battery_kwh),
            (Field::MaxCapacity, b.max_capacity_kwh),
            (Field::BatteryConsumption, b.battery_consumption_kwh),
            (Field::NonBatteryConsumption, b.non_battery_consumption_kwh),
        ];
        for (field, value) in battery {
            inner
                .latest
                .insert(SeriesKey::battery(field), f64::from(value));
        }

        inner.latest_tick = Some(frame.tick);
        trace!(tick = frame.tick, series = inner.latest.len(), "frame ingested");
        inner.history.push_back(frame);
        while inner.history.len() > self.history_limit {
            inner.history.pop_front();
        }
    }

    /// Rebuilds the consumer snapshot from the latest series values.
    ///
    /// # Errors
    ///
    /// `Empty` before any telemetry arrived, `MissingBattery` without a
    /// battery reading, `MissingField` when a consumer lacks one of its
    /// series, `InvalidCounter` when `tau` or `delta` is not a whole number
    /// of seconds within [`MAX_COUNTER_S`].
    pub fn snapshot(&self) -> Result<Snapshot, SnapshotError> {
        let inner = self.lock();
        let Some(tick) = inner.latest_tick else {
            return Err(SnapshotError::Empty);
        };
        let battery_kwh = inner
            .latest
            .get(&SeriesKey::battery(Field::BatteryValue))
            .copied()
            .ok_or(SnapshotError::MissingBattery)?;

        let seen: BTreeSet<(&str, &str)> = inner
            .latest
            .keys()
            .filter(|k| k.field.is_consumer_field())
            .map(|k| (k.member_id.as_str(), k.entity_id.as_str()))
            .collect();

        let mut consumers: BTreeMap<String, BTreeMap<String, ConsumerReading>> = BTreeMap::new();
        for (member_id, consumer_id) in seen {
            let get = |field: Field| {
                inner
                    .latest
                    .get(&SeriesKey::new(member_id, consumer_id, field))
                    .copied()
                    .ok_or_else(|| SnapshotError::MissingField {
                        member: member_id.to_string(),
                        entity: consumer_id.to_string(),
                        field: field.as_str(),
                    })
            };
            let counter = |field: Field| {
                let value = get(field)?;
                let in_range = value.is_finite()
                    && value >= 0.0
                    && value.fract() == 0.0
                    && value <= MAX_COUNTER_F64;
                if in_range {
                    Ok(value as u64)
                } else {
                    Err(SnapshotError::InvalidCounter {
                        member: member_id.to_string(),
                        entity: consumer_id.to_string(),
                        field: field.as_str(),
                    })
                }
            };
            let reading = ConsumerReading {
                tau_s: counter(Field::Tau)?,
                delta_s: counter(Field::Delta)?,
                cons_kw: get(Field::Cons)? as f32,
                active: get(Field::Active)? != 0.0,
            };
            consumers
                .entry(member_id.to_string())
                .or_default()
                .insert(consumer_id.to_string(), reading);
        }

        Ok(Snapshot {
            tick,
            battery_kwh: battery_kwh as f32,
            consumers,
        })
    }

    /// Newest frame in the history.
    pub fn latest(&self) -> Option<TelemetryFrame> {
        self.lock().history.back().cloned()
    }

    /// Frames with `from <= tick <= to`, oldest first.
    pub fn frames(&self, from: u64, to: u64) -> Vec<TelemetryFrame> {
        self.lock()
            .history
            .iter()
            .filter(|f| f.tick >= from && f.tick <= to)
            .cloned()
            .collect()
    }

    /// Number of frames currently held.
    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TelemetrySink for TelemetryStore {
    async fn publish(&self, frame: TelemetryFrame) -> Result<(), TransportError> {
        self.ingest(frame);
        Ok(())
    }
}

impl SnapshotSource for TelemetryStore {
    async fn fetch(&self) -> Result<Snapshot, SnapshotError> {
        self.snapshot()
    }
}
