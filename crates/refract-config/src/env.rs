//! Environment-variable loader for [`PipelineConfig`].

use std::env;
use std::str::FromStr;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::PipelineConfig;

/// Control endpoint location.
pub const ENV_NEGOTIATE_URL: &str = "REFRACT_NEGOTIATE_URL";
/// Read-side base location.
pub const ENV_READ_BASE_URL: &str = "REFRACT_READ_BASE_URL";
/// History save endpoint location.
pub const ENV_HISTORY_SAVE_URL: &str = "REFRACT_HISTORY_SAVE_URL";
/// History list endpoint location.
pub const ENV_HISTORY_LIST_URL: &str = "REFRACT_HISTORY_LIST_URL";
/// Maximum accepted payload size in bytes.
pub const ENV_MAX_UPLOAD_BYTES: &str = "REFRACT_MAX_UPLOAD_BYTES";
/// Completion-poll attempt budget.
pub const ENV_POLL_ATTEMPTS: &str = "REFRACT_POLL_ATTEMPTS";
/// Completion-poll interval in milliseconds.
pub const ENV_POLL_INTERVAL_MS: &str = "REFRACT_POLL_INTERVAL_MS";

/// Build a [`PipelineConfig`] from process environment variables, falling back
/// to defaults for anything unset.
///
/// # Errors
///
/// Returns an error when a variable holds a non-unicode or unparsable value,
/// or when the resulting document fails validation.
pub fn from_env() -> ConfigResult<PipelineConfig> {
    from_lookup(env_var)
}

/// Build a [`PipelineConfig`] from an arbitrary variable lookup.
///
/// The lookup seam exists so tests and embedders can supply variables without
/// mutating process state.
///
/// # Errors
///
/// Returns an error when the lookup fails, a value does not parse, or the
/// resulting document fails validation.
pub fn from_lookup<F>(mut lookup: F) -> ConfigResult<PipelineConfig>
where
    F: FnMut(&'static str) -> ConfigResult<Option<String>>,
{
    let mut config = PipelineConfig::default();

    if let Some(value) = lookup(ENV_NEGOTIATE_URL)? {
        config.endpoints.negotiate_url = Some(value);
    }
    if let Some(value) = lookup(ENV_READ_BASE_URL)? {
        config.endpoints.read_base_url = Some(value);
    }
    if let Some(value) = lookup(ENV_HISTORY_SAVE_URL)? {
        config.endpoints.history_save_url = Some(value);
    }
    if let Some(value) = lookup(ENV_HISTORY_LIST_URL)? {
        config.endpoints.history_list_url = Some(value);
    }
    if let Some(raw) = lookup(ENV_MAX_UPLOAD_BYTES)? {
        config.limits.max_size_bytes = parse_number("limits", "max_size_bytes", &raw)?;
    }
    if let Some(raw) = lookup(ENV_POLL_ATTEMPTS)? {
        config.polling.max_attempts = parse_number("polling", "max_attempts", &raw)?;
    }
    if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS)? {
        config.polling.interval_ms = parse_number("polling", "interval_ms", &raw)?;
    }

    config.validate()?;
    debug!(
        negotiate = config.endpoints.negotiate_url.is_some(),
        read_base = config.endpoints.read_base_url.is_some(),
        history = config.endpoints.history_save_url.is_some(),
        "pipeline configuration loaded"
    );
    Ok(config)
}

fn env_var(name: &'static str) -> ConfigResult<Option<String>> {
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::EnvNotUnicode { name }),
    }
}

fn parse_number<T: FromStr>(
    section: &'static str,
    field: &'static str,
    raw: &str,
) -> ConfigResult<T> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidField {
        section,
        field,
        value: Some(raw.to_string()),
        reason: "must be an unsigned integer",
    })
}
