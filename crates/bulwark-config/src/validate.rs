//! Post-merge configuration validation.

use std::collections::HashSet;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Approval modes accepted in `approval.mode`.
pub const APPROVAL_MODES: &[&str] = &["interactive", "approve_all", "auto_deny"];

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "compact", "json", "full"];

/// Upper bound on `delegation.max_depth`.
const MAX_DELEGATION_DEPTH: usize = 16;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_sandbox(config)?;
    validate_approval(config)?;
    validate_delegation(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn check_absolute(field: &str, value: &str) -> ConfigResult<()> {
    if !value.starts_with('/') {
        return Err(invalid(field, format!("'{value}' must be an absolute path")));
    }
    if value.split('/').any(|s| s == "..") {
        return Err(invalid(field, format!("'{value}' must not contain '..'")));
    }
    Ok(())
}

fn validate_sandbox(config: &Config) -> ConfigResult<()> {
    let s = &config.sandbox;
    check_absolute("sandbox.root", &s.root)?;

    let mut targets = HashSet::new();
    for (i, mount) in s.mounts.iter().enumerate() {
        check_absolute(&format!("sandbox.mounts[{i}].source"), &mount.source)?;
        check_absolute(&format!("sandbox.mounts[{i}].target"), &mount.target)?;
        let target = mount.target.trim_end_matches('/');
        let target = if target.is_empty() { "/" } else { target };
        if !targets.insert(target.to_owned()) {
            return Err(invalid(
                format!("sandbox.mounts[{i}].target"),
                format!("duplicate mount target '{target}'"),
            ));
        }
    }
    Ok(())
}

fn validate_approval(config: &Config) -> ConfigResult<()> {
    let mode = config.approval.mode.as_str();
    if !APPROVAL_MODES.contains(&mode) {
        return Err(invalid(
            "approval.mode",
            format!(
                "unknown mode '{mode}'; expected one of: {}",
                APPROVAL_MODES.join(", ")
            ),
        ));
    }
    Ok(())
}

fn validate_delegation(config: &Config) -> ConfigResult<()> {
    let depth = config.delegation.max_depth;
    if depth == 0 || depth > MAX_DELEGATION_DEPTH {
        return Err(invalid(
            "delegation.max_depth",
            format!("max_depth must be between 1 and {MAX_DELEGATION_DEPTH}"),
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !LOG_LEVELS.contains(&l.level.to_lowercase().as_str()) {
        return Err(invalid(
            "logging.level",
            format!("unknown level '{}'; expected one of: {}", l.level, LOG_LEVELS.join(", ")),
        ));
    }
    if !LOG_FORMATS.contains(&l.format.to_lowercase().as_str()) {
        return Err(invalid(
            "logging.format",
            format!("unknown format '{}'; expected one of: {}", l.format, LOG_FORMATS.join(", ")),
        ));
    }
    Ok(())
}
