//! Error taxonomy for the community controller.
//!
//! Each enum maps to one failure class: invariant violations on world
//! mutations, transient transport failures, partial snapshots, and
//! malformed boundary messages. Startup configuration errors live in
//! [`crate::config::ConfigError`].

use thiserror::Error;

/// A mutation request targeted a consumer in an illegal source state.
///
/// Rejected synchronously; the world is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("unknown member `{member}`")]
    UnknownMember { member: String },

    #[error("unknown consumer `{consumer}` of member `{member}`")]
    UnknownConsumer { member: String, consumer: String },

    #[error(
        "consumer `{consumer}` of member `{member}` is not idle (tau={tau_s}s, delta={delta_s}s, active={active})"
    )]
    NotIdle {
        member: String,
        consumer: String,
        tau_s: u64,
        delta_s: u64,
        active: bool,
    },

    #[error(
        "consumer `{consumer}` of member `{member}` is not pending (tau={tau_s}s, active={active})"
    )]
    NotPending {
        member: String,
        consumer: String,
        tau_s: u64,
        active: bool,
    },

    #[error("invalid demand for consumer `{consumer}` of member `{member}`: {reason}")]
    InvalidDemand {
        member: String,
        consumer: String,
        reason: String,
    },
}

/// Transient failure at a transport boundary. Retried, then dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{endpoint} unavailable: {reason}")]
    Unavailable { endpoint: String, reason: String },

    #[error("{0} channel closed")]
    Closed(&'static str),
}

/// The analyzer could not obtain a complete snapshot.
///
/// Kept apart from "nothing eligible", which is an empty `Ok` result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot fetch failed: {0}")]
    Transport(#[from] TransportError),

    #[error("snapshot has no telemetry yet")]
    Empty,

    #[error("snapshot is missing `{field}` for {member}/{entity}")]
    MissingField {
        member: String,
        entity: String,
        field: &'static str,
    },

    #[error("snapshot is missing the battery series")]
    MissingBattery,

    #[error("snapshot `{field}` of {member}/{entity} is not a counter in range")]
    InvalidCounter {
        member: String,
        entity: String,
        field: &'static str,
    },
}

/// A command sent to the running engine did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("rejected: {0}")]
    Rejected(#[from] MutationError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A message crossing the boundary failed validation.
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid `{field}`: {message}")]
    Invalid { field: String, message: String },
}

impl BoundaryError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}
