//! Device simulation components for the energy community.

/// Shared community battery.
pub mod battery;
/// Flexible consumer with runtime/deadline counters.
pub mod consumer;
/// Stochastic renewable producer.
pub mod producer;
pub mod types;

// Re-export the main types for convenience
pub use battery::{Battery, BatteryFlow};
pub use consumer::{Consumer, ConsumerPhase, ConsumerTransition, MAX_COUNTER_S, slack_s};
pub use producer::Producer;
pub use types::Device;
pub use types::DeviceContext;
