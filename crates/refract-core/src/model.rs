//! Domain model for pipeline runs.
//!
//! The types here are deliberately dumb: construction validates, accessors
//! expose, and all behaviour lives in the phase modules. [`TransformRequest`]
//! is the one gatekeeper, rejecting out-of-range parameters before a run can
//! even start.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use refract_config::TransformDefaults;
use refract_events::PipelinePhase;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PipelineError, PipelineResult};

/// Smallest accepted target dimension, in pixels.
pub const MIN_TARGET_DIMENSION: u32 = 1;

/// Largest accepted target dimension, in pixels.
pub const MAX_TARGET_DIMENSION: u32 = 4_000;

/// Output formats the transform backend can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JPEG output.
    Jpeg,
    /// PNG output.
    Png,
    /// WebP output.
    Webp,
}

impl OutputFormat {
    /// Wire label used by the control endpoint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            other => Err(PipelineError::Validation {
                reason: format!("output format '{other}' must be one of jpeg, png, webp"),
            }),
        }
    }
}

/// Descriptor for the payload a caller wants to push through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCandidate {
    /// Name the payload was selected under.
    pub filename: String,
    /// Declared content type of the payload.
    pub mime_type: String,
    /// Payload size in bytes.
    pub size_bytes: u64,
}

impl UploadCandidate {
    /// Describe a candidate payload.
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            size_bytes,
        }
    }
}

/// Transform parameters for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformParams {
    /// Target width in pixels, 1 to 4000.
    pub width: u32,
    /// Target height in pixels, 1 to 4000.
    pub height: u32,
    /// Output quality, 1 to 100.
    pub quality: u8,
    /// Output format to request.
    pub format: OutputFormat,
    /// Optional watermark text stamped onto the result.
    pub watermark: Option<String>,
}

impl TransformParams {
    /// Parameters taken from a configuration fallback section.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] when the configured format label
    /// is not a known output format.
    pub fn from_defaults(defaults: &TransformDefaults) -> PipelineResult<Self> {
        Ok(Self {
            width: defaults.width,
            height: defaults.height,
            quality: defaults.quality,
            format: defaults.format.parse()?,
            watermark: None,
        })
    }
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            quality: 85,
            format: OutputFormat::Jpeg,
            watermark: None,
        }
    }
}

/// Validated, immutable description of a single pipeline run.
///
/// Construction is the only mutation point. Once a request exists its
/// parameters are frozen for the lifetime of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    candidate: UploadCandidate,
    params: TransformParams,
}

impl TransformRequest {
    /// Bind a candidate payload to transform parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] when a dimension falls outside
    /// `1..=4000` or quality falls outside `1..=100`. Candidate-level checks
    /// (size, content type) are deferred to the run itself.
    pub fn new(candidate: UploadCandidate, params: TransformParams) -> PipelineResult<Self> {
        check_dimension("width", params.width)?;
        check_dimension("height", params.height)?;
        if params.quality == 0 || params.quality > 100 {
            return Err(PipelineError::Validation {
                reason: format!("quality {} must be between 1 and 100", params.quality),
            });
        }
        Ok(Self { candidate, params })
    }

    /// The payload descriptor this run will push.
    #[must_use]
    pub const fn candidate(&self) -> &UploadCandidate {
        &self.candidate
    }

    /// The transform parameters for this run.
    #[must_use]
    pub const fn params(&self) -> &TransformParams {
        &self.params
    }
}

fn check_dimension(field: &str, value: u32) -> PipelineResult<()> {
    if value < MIN_TARGET_DIMENSION || value > MAX_TARGET_DIMENSION {
        return Err(PipelineError::Validation {
            reason: format!(
                "{field} {value} must be between {MIN_TARGET_DIMENSION} and {MAX_TARGET_DIMENSION}"
            ),
        });
    }
    Ok(())
}

/// One-time write destination negotiated with the control endpoint.
///
/// A slot is consumed by value when the transfer starts, so it can never be
/// replayed across runs.
#[derive(Debug, Clone)]
pub struct WriteSlot {
    /// Destination accepting exactly one `PUT`.
    pub upload_url: Url,
    /// Storage key the destination will write under.
    pub object_key: String,
    /// Instant after which the destination stops honouring the slot, when
    /// the control endpoint disclosed one.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Acknowledgement returned by the write destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferAck {
    /// Status code the destination answered with.
    pub status: u16,
    /// Bytes handed to the transport.
    pub bytes_sent: u64,
}

/// Observable snapshot of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineState {
    /// Phase the run is currently in.
    pub phase: PipelinePhase,
    /// Unified progress on the 0 to 100 scale.
    pub progress_percent: u8,
    /// Storage key negotiated for the run, once known.
    pub object_key: Option<String>,
    /// Read-side location of the processed artifact, once available.
    pub result_reference: Option<Url>,
    /// Human-readable reason for the most recent failure.
    pub failure_reason: Option<String>,
}

impl PipelineState {
    /// Snapshot of a pipeline that has not started a run.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            phase: PipelinePhase::Idle,
            progress_percent: 0,
            object_key: None,
            result_reference: None,
            failure_reason: None,
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::idle()
    }
}
