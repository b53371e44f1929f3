use std::fmt;

use thiserror::Error;
use ulid::Ulid;

use crate::model::Span;
use crate::ports::StoreError;

/// What a `NotFound` refers to. Tokens are secrets and never echoed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Provider(Ulid),
    Service(Ulid),
    Appointment(Ulid),
    CancellationToken,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Provider(id) => write!(f, "provider {id}"),
            Missing::Service(id) => write!(f, "service {id}"),
            Missing::Appointment(id) => write!(f, "appointment {id}"),
            Missing::CancellationToken => f.write_str("cancellation token"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(Missing),
    /// The requested span is taken. Callers should re-query availability for
    /// the provider and day of `requested` and resubmit.
    #[error("slot {requested} for provider {provider_id} is no longer available (overlaps appointment {conflicting})")]
    Conflict {
        provider_id: Ulid,
        requested: Span,
        conflicting: Ulid,
    },
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::NotFound(_) => "not_found",
            EngineError::Conflict { .. } => "conflict",
            EngineError::Internal(_) => "internal",
        }
    }
}

/// Collaborator failures are fatal to the request only. Call sites that can
/// see `Overlap`/`Missing` map those explicitly before falling back to this.
impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Internal(e.to_string())
    }
}
