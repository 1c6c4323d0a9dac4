//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Names accepted in `security.attribute_checks`.
pub const ATTRIBUTE_CHECK_NAMES: &[&str] = &[
    "all",
    "none",
    "trusted",
    "codebase",
    "permissions",
    "alac",
    "entry_point",
];

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_loader(config)?;
    validate_security(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_loader(config: &Config) -> ConfigResult<()> {
    let l = &config.loader;

    if l.native_suffixes.is_empty() {
        return Err(invalid(
            "loader.native_suffixes",
            "at least one native library suffix is required",
        ));
    }
    if let Some(bad) = l.native_suffixes.iter().find(|s| !s.starts_with('.') || s.len() < 2) {
        return Err(invalid(
            "loader.native_suffixes",
            format!("suffix '{bad}' must start with '.' and name an extension"),
        ));
    }

    if l.max_bundle_entries == 0 {
        return Err(invalid("loader.max_bundle_entries", "must be greater than 0"));
    }
    if l.max_bundle_bytes == 0 {
        return Err(invalid("loader.max_bundle_bytes", "must be greater than 0"));
    }

    if let Some(root) = &l.scratch_root
        && !std::path::Path::new(root).is_absolute()
    {
        return Err(invalid(
            "loader.scratch_root",
            format!("'{root}' must be an absolute path"),
        ));
    }

    Ok(())
}

fn validate_security(config: &Config) -> ConfigResult<()> {
    let s = &config.security;

    if let Some(unknown) = s
        .attribute_checks
        .iter()
        .find(|c| !ATTRIBUTE_CHECK_NAMES.contains(&c.as_str()))
    {
        return Err(invalid(
            "security.attribute_checks",
            format!(
                "unknown check '{unknown}'; expected one of: {}",
                ATTRIBUTE_CHECK_NAMES.join(", ")
            ),
        ));
    }
    if s.attribute_checks.iter().any(|c| c == "none") && s.attribute_checks.len() > 1 {
        return Err(invalid(
            "security.attribute_checks",
            "'none' cannot be combined with other checks",
        ));
    }

    if let Some(empty) = s.trusted_publishers.iter().position(|p| p.trim().is_empty()) {
        return Err(invalid(
            "security.trusted_publishers",
            format!("entry {empty} is empty"),
        ));
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let log = &config.logging;

    if !matches!(
        log.level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported level '{}'; expected one of: trace, debug, info, warn, error",
                log.level
            ),
        ));
    }

    if !matches!(log.format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported format '{}'; expected one of: pretty, compact, json, full",
                log.format
            ),
        ));
    }

    Ok(())
}
