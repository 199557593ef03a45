//! API response and query types.

use serde::{Deserialize, Serialize};

use crate::messages::TelemetryFrame;

/// Latest community state.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    /// Tick of the newest frame, if any arrived yet.
    pub tick: Option<u64>,
    /// Most recent telemetry frame.
    pub latest: Option<TelemetryFrame>,
}

/// Query parameters for `GET /telemetry`.
#[derive(Debug, Deserialize)]
pub struct TelemetryQuery {
    /// Start tick (inclusive). Defaults to 0.
    pub from: Option<u64>,
    /// End tick (inclusive). Defaults to the latest tick.
    pub to: Option<u64>,
}

/// Acknowledgement of an accepted mutation.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub status: &'static str,
    pub member_id: String,
    pub consumer_id: String,
}

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
