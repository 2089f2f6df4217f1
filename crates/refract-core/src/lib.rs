//! Upload-and-poll orchestration for asynchronous image transforms.
//!
//! A run moves a payload through four phases: candidate validation, write
//! slot negotiation with the control endpoint, a single streaming transfer
//! into the slot, and bounded polling of the read side until the processed
//! artifact appears. [`controller::PipelineController`] sequences the phases,
//! owns the observable state, and reports unified progress, while each phase
//! lives in its own module behind an injectable seam:
//!
//! - [`validate`]: pure candidate checks, no I/O
//! - [`negotiate`]: the control-endpoint client
//! - [`transfer`]: chunked `PUT` with transfer-local progress
//! - [`poll`]: existence probes with pluggable pacing
//! - [`keys`]: storage-key conventions shared by the phases
//! - [`progress`]: the sink seam observers plug into

pub mod controller;
pub mod error;
pub mod keys;
pub mod model;
pub mod negotiate;
pub mod poll;
pub mod progress;
pub mod transfer;
pub mod validate;

pub use controller::{PipelineController, RunArtifact};
pub use error::{PipelineError, PipelineResult};
pub use keys::{
    ANONYMOUS_KEY_SCOPE, KeyGenerator, PROCESSED_KEY_SEGMENT, RAW_KEY_SEGMENT,
    SequentialKeyGenerator, UuidKeyGenerator, derive_processed_key, suggested_key,
};
pub use model::{
    MAX_TARGET_DIMENSION, MIN_TARGET_DIMENSION, OutputFormat, PipelineState, TransferAck,
    TransformParams, TransformRequest, UploadCandidate, WriteSlot,
};
pub use negotiate::SlotNegotiator;
pub use poll::{ArtifactProbe, CompletionPoller, HttpProbe, ProbeDelay, TokioDelay};
pub use progress::{NullProgressSink, ProgressSink};
pub use transfer::TransferExecutor;
pub use validate::validate_candidate;
