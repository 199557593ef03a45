//! Renewable-energy community simulator with a closed-loop battery
//! allocation controller.

#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod devices;
pub mod error;
pub mod io;
/// Typed boundary messages: telemetry, eligibility, decisions, mutations.
pub mod messages;
pub mod pipeline;
/// Engine, analyzer, planner, and reporting modules.
pub mod sim;
pub mod topology;
/// Transport boundary traits, retry, and the in-memory telemetry store.
pub mod transport;
