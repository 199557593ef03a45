//! Typed boundary to the external transport.
//!
//! The core only talks to these traits. The in-process implementations are
//! [`store::TelemetryStore`] (telemetry in, snapshots out) and the engine
//! actuator in [`crate::pipeline`].

pub mod retry;
pub mod store;

use std::future::Future;

use crate::error::{SnapshotError, TransportError};
use crate::messages::{DecisionMessage, Snapshot, TelemetryFrame};
use crate::sim::types::DispatchReport;

/// Receives the engine's per-tick telemetry.
pub trait TelemetrySink: Send + Sync + 'static {
    fn publish(&self, frame: TelemetryFrame)
    -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Serves the latest value of every telemetry series.
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<Snapshot, SnapshotError>> + Send;
}

/// Forwards allocation decisions to actuation.
///
/// `tick` is the snapshot tick the decisions were planned from; the
/// receiver drops them if its world has moved past that tick.
pub trait DecisionSink: Send + Sync + 'static {
    fn dispatch(
        &self,
        tick: u64,
        decisions: &DecisionMessage,
    ) -> impl Future<Output = Result<DispatchReport, TransportError>> + Send;
}
