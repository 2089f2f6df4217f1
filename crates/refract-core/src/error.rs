//! Error taxonomy for pipeline runs.
//!
//! Each variant maps to the phase that can produce it, and the `Display`
//! rendering is the human-readable reason surfaced to observers via
//! [`PipelineState::failure_reason`](crate::model::PipelineState).

use refract_events::PipelinePhase;
use thiserror::Error;

/// Convenient result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failure raised by one of the pipeline phases.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The candidate was rejected before any network activity.
    #[error("{reason}")]
    Validation {
        /// Why the candidate was turned away.
        reason: String,
    },

    /// The control endpoint rejected the negotiation or could not be reached.
    #[error("{message}")]
    Negotiation {
        /// Server-provided message, or a generic fallback when the
        /// response body could not be interpreted.
        message: String,
        /// Transport-level cause, when one exists.
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The write destination answered with a non-success status code.
    #[error("upload failed with status {status}")]
    TransferRejected {
        /// HTTP status code returned by the destination.
        status: u16,
    },

    /// The byte stream to the write destination broke below the HTTP layer.
    #[error("{reason}")]
    TransferTransport {
        /// Short description of the transport failure.
        reason: String,
        /// Underlying client error.
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Completion polling exhausted its attempt budget without ever
    /// observing the processed artifact.
    #[error("processed artifact did not appear after {attempts} attempts")]
    Timeout {
        /// Number of probes issued before giving up.
        attempts: u32,
    },
}

impl PipelineError {
    /// Phase in which this class of failure originates.
    #[must_use]
    pub const fn phase(&self) -> PipelinePhase {
        match self {
            Self::Validation { .. } => PipelinePhase::Validating,
            Self::Negotiation { .. } => PipelinePhase::NegotiatingSlot,
            Self::TransferRejected { .. } | Self::TransferTransport { .. } => {
                PipelinePhase::Transferring
            }
            Self::Timeout { .. } => PipelinePhase::Polling,
        }
    }
}
