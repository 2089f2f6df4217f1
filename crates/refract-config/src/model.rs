//! Typed configuration models for the upload pipeline.
//!
//! # Design
//! - Pure data carriers with serde defaults matching the control endpoint's own
//!   fallback behaviour.
//! - Endpoint locations are kept as strings in the serialized form and parsed
//!   into [`Url`] values on access, so a malformed location surfaces as a
//!   field-level error rather than a deserialization failure.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, ConfigResult};

/// Ceiling on candidate payload size accepted for upload.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Probe budget for a single completion-poll cycle.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 20;

/// Pause between completion probes, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Content types accepted for upload candidates.
pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] =
    &["image/jpeg", "image/jpg", "image/png", "image/webp"];

const DEFAULT_TARGET_WIDTH: u32 = 800;
const DEFAULT_TARGET_HEIGHT: u32 = 600;
const DEFAULT_QUALITY: u8 = 85;
const DEFAULT_OUTPUT_FORMAT: &str = "jpeg";
const MAX_TARGET_DIMENSION: u32 = 4_000;
const SUPPORTED_OUTPUT_FORMATS: &[&str] = &["jpeg", "png", "webp"];

/// Root configuration document for the pipeline and its collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Remote endpoints the pipeline talks to.
    pub endpoints: Endpoints,
    /// Candidate acceptance limits enforced before any network call.
    pub limits: UploadLimits,
    /// Completion-poll attempt budget and pacing.
    pub polling: PollPlan,
    /// Fallback transform parameters mirroring the control endpoint.
    pub transform: TransformDefaults,
}

impl PipelineConfig {
    /// Validate every section, returning the first field-level failure.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] describing the offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        self.endpoints.validate()?;
        self.limits.validate()?;
        self.polling.validate()?;
        self.transform.validate()
    }
}

/// Remote locations consumed by the pipeline and the history client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Endpoints {
    /// Control endpoint that negotiates write slots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negotiate_url: Option<String>,
    /// Read-side base location for completion probes and artifact references.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_base_url: Option<String>,
    /// Record-store endpoint for saving completed runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_save_url: Option<String>,
    /// Record-store endpoint for listing completed runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_list_url: Option<String>,
}

impl Endpoints {
    /// Control endpoint as a parsed URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when unset and
    /// [`ConfigError::InvalidField`] when the value does not parse.
    pub fn negotiate_url(&self) -> ConfigResult<Url> {
        require_url("endpoints", "negotiate_url", self.negotiate_url.as_deref())
    }

    /// Read-side base location as a parsed URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when unset and
    /// [`ConfigError::InvalidField`] when the value does not parse.
    pub fn read_base_url(&self) -> ConfigResult<Url> {
        require_url("endpoints", "read_base_url", self.read_base_url.as_deref())
    }

    /// History save endpoint, when configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when a configured value does not
    /// parse.
    pub fn history_save_url(&self) -> ConfigResult<Option<Url>> {
        self.history_save_url
            .as_deref()
            .map(|raw| parse_url("endpoints", "history_save_url", raw))
            .transpose()
    }

    /// History list endpoint, when configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when a configured value does not
    /// parse.
    pub fn history_list_url(&self) -> ConfigResult<Option<Url>> {
        self.history_list_url
            .as_deref()
            .map(|raw| parse_url("endpoints", "history_list_url", raw))
            .transpose()
    }

    fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("negotiate_url", self.negotiate_url.as_deref()),
            ("read_base_url", self.read_base_url.as_deref()),
            ("history_save_url", self.history_save_url.as_deref()),
            ("history_list_url", self.history_list_url.as_deref()),
        ] {
            if let Some(raw) = value {
                parse_url("endpoints", field, raw)?;
            }
        }
        Ok(())
    }
}

/// Candidate acceptance limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UploadLimits {
    /// Maximum accepted payload size in bytes.
    pub max_size_bytes: u64,
    /// Declared content types accepted for upload.
    pub allowed_mime_types: Vec<String>,
}

impl UploadLimits {
    /// Whether the declared content type is on the allow-list.
    #[must_use]
    pub fn allows_mime(&self, mime: &str) -> bool {
        self.allowed_mime_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(mime))
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_size_bytes == 0 {
            return Err(ConfigError::InvalidField {
                section: "limits",
                field: "max_size_bytes",
                value: Some(self.max_size_bytes.to_string()),
                reason: "must be positive",
            });
        }
        if self.allowed_mime_types.is_empty() {
            return Err(ConfigError::InvalidField {
                section: "limits",
                field: "allowed_mime_types",
                value: None,
                reason: "must list at least one content type",
            });
        }
        if let Some(empty) = self.allowed_mime_types.iter().find(|m| m.trim().is_empty()) {
            return Err(ConfigError::InvalidField {
                section: "limits",
                field: "allowed_mime_types",
                value: Some(empty.clone()),
                reason: "entries must not be blank",
            });
        }
        Ok(())
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|mime| (*mime).to_string())
                .collect(),
        }
    }
}

/// Completion-poll attempt budget and pacing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollPlan {
    /// Maximum number of existence probes per run.
    pub max_attempts: u32,
    /// Pause after each unsuccessful probe, in milliseconds.
    pub interval_ms: u64,
}

impl PollPlan {
    /// Inter-probe pause as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidField {
                section: "polling",
                field: "max_attempts",
                value: Some(self.max_attempts.to_string()),
                reason: "must be positive",
            });
        }
        if self.interval_ms == 0 {
            return Err(ConfigError::InvalidField {
                section: "polling",
                field: "interval_ms",
                value: Some(self.interval_ms.to_string()),
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

impl Default for PollPlan {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_POLL_ATTEMPTS,
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// Fallback transform parameters, matching the control endpoint's defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransformDefaults {
    /// Target width in pixels.
    pub width: u32,
    /// Target height in pixels.
    pub height: u32,
    /// Output quality, 1 to 100.
    pub quality: u8,
    /// Output format label (`jpeg`, `png`, or `webp`).
    pub format: String,
}

impl TransformDefaults {
    fn validate(&self) -> ConfigResult<()> {
        if self.width == 0 || self.width > MAX_TARGET_DIMENSION {
            return Err(ConfigError::InvalidField {
                section: "transform",
                field: "width",
                value: Some(self.width.to_string()),
                reason: "must be between 1 and 4000",
            });
        }
        if self.height == 0 || self.height > MAX_TARGET_DIMENSION {
            return Err(ConfigError::InvalidField {
                section: "transform",
                field: "height",
                value: Some(self.height.to_string()),
                reason: "must be between 1 and 4000",
            });
        }
        if self.quality == 0 || self.quality > 100 {
            return Err(ConfigError::InvalidField {
                section: "transform",
                field: "quality",
                value: Some(self.quality.to_string()),
                reason: "must be between 1 and 100",
            });
        }
        if !SUPPORTED_OUTPUT_FORMATS.contains(&self.format.as_str()) {
            return Err(ConfigError::InvalidField {
                section: "transform",
                field: "format",
                value: Some(self.format.clone()),
                reason: "must be one of jpeg, png, webp",
            });
        }
        Ok(())
    }
}

impl Default for TransformDefaults {
    fn default() -> Self {
        Self {
            width: DEFAULT_TARGET_WIDTH,
            height: DEFAULT_TARGET_HEIGHT,
            quality: DEFAULT_QUALITY,
            format: DEFAULT_OUTPUT_FORMAT.to_string(),
        }
    }
}

fn require_url(
    section: &'static str,
    field: &'static str,
    value: Option<&str>,
) -> ConfigResult<Url> {
    let raw = value.ok_or(ConfigError::MissingField { section, field })?;
    parse_url(section, field, raw)
}

fn parse_url(section: &'static str, field: &'static str, raw: &str) -> ConfigResult<Url> {
    Url::parse(raw).map_err(|_| ConfigError::InvalidField {
        section,
        field,
        value: Some(raw.to_string()),
        reason: "must be an absolute URL",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        let config = PipelineConfig::default();
        config.validate().expect("default config should be valid");
        assert_eq!(config.limits.max_size_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.polling.max_attempts, DEFAULT_POLL_ATTEMPTS);
        assert_eq!(config.polling.interval(), Duration::from_millis(1_000));
        assert_eq!(config.transform.format, "jpeg");
    }

    #[test]
    fn mime_allow_list_is_case_insensitive() {
        let limits = UploadLimits::default();
        assert!(limits.allows_mime("image/jpeg"));
        assert!(limits.allows_mime("IMAGE/PNG"));
        assert!(!limits.allows_mime("application/pdf"));
    }

    #[test]
    fn malformed_endpoint_is_rejected() {
        let config = PipelineConfig {
            endpoints: Endpoints {
                negotiate_url: Some("not a url".into()),
                ..Endpoints::default()
            },
            ..PipelineConfig::default()
        };
        let err = config.validate().expect_err("bad URL should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                section: "endpoints",
                field: "negotiate_url",
                ..
            }
        ));
    }

    #[test]
    fn missing_negotiate_url_surfaces_on_access() {
        let endpoints = Endpoints::default();
        let err = endpoints
            .negotiate_url()
            .expect_err("unset endpoint should be missing");
        assert!(matches!(err, ConfigError::MissingField { field, .. } if field == "negotiate_url"));
    }

    #[test]
    fn zero_poll_budget_is_rejected() {
        let config = PipelineConfig {
            polling: PollPlan {
                max_attempts: 0,
                interval_ms: 1_000,
            },
            ..PipelineConfig::default()
        };
        let err = config.validate().expect_err("zero attempts should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                field: "max_attempts",
                ..
            }
        ));
    }

    #[test]
    fn out_of_range_transform_defaults_are_rejected() {
        let config = PipelineConfig {
            transform: TransformDefaults {
                width: 4_001,
                ..TransformDefaults::default()
            },
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            transform: TransformDefaults {
                format: "gif".into(),
                ..TransformDefaults::default()
            },
            ..PipelineConfig::default()
        };
        let err = config.validate().expect_err("gif should be rejected");
        assert!(matches!(err, ConfigError::InvalidField { field: "format", .. }));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = PipelineConfig {
            endpoints: Endpoints {
                negotiate_url: Some("https://api.example.test/v1/upload-url".into()),
                read_base_url: Some("https://cdn.example.test".into()),
                ..Endpoints::default()
            },
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string(&config).expect("serialize");
        let restored: PipelineConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, config);
        assert_eq!(
            restored
                .endpoints
                .negotiate_url()
                .expect("parsed URL")
                .as_str(),
            "https://api.example.test/v1/upload-url"
        );
    }
}
