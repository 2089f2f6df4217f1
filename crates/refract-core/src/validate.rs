//! Pre-flight candidate checks.
//!
//! Validation is pure and synchronous: no clock, no I/O. A rejection here
//! short-circuits the run before any network call is made.

use refract_config::UploadLimits;

use crate::error::{PipelineError, PipelineResult};
use crate::model::UploadCandidate;

/// Check a candidate against the configured acceptance limits.
///
/// # Errors
///
/// Returns [`PipelineError::Validation`] when the candidate is absent
/// (zero-byte or unnamed), larger than the configured ceiling, or declares a
/// content type outside the allow-list.
pub fn validate_candidate(
    candidate: &UploadCandidate,
    limits: &UploadLimits,
) -> PipelineResult<()> {
    if candidate.filename.trim().is_empty() || candidate.size_bytes == 0 {
        return Err(PipelineError::Validation {
            reason: "no file selected".to_string(),
        });
    }
    if candidate.size_bytes > limits.max_size_bytes {
        return Err(PipelineError::Validation {
            reason: format!(
                "file size {} exceeds the {} byte limit",
                candidate.size_bytes, limits.max_size_bytes
            ),
        });
    }
    if !limits.allows_mime(&candidate.mime_type) {
        return Err(PipelineError::Validation {
            reason: format!(
                "unsupported content type '{}'; expected one of {}",
                candidate.mime_type,
                limits.allowed_mime_types.join(", ")
            ),
        });
    }
    Ok(())
}
