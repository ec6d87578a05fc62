//! Environment variable fallbacks.
//!
//! Env vars are a **fallback**, not an override: they only fill fields that
//! no config file set.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, set_nested};

/// How an env var's text becomes a TOML value.
#[derive(Debug, Clone, Copy)]
enum Kind {
    Str,
    Int,
    Bool,
}

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: Kind,
}

/// All supported `BULWARK_*` env var mappings.
const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "BULWARK_SANDBOX_ROOT",
        field_path: "sandbox.root",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "BULWARK_SANDBOX_READONLY",
        field_path: "sandbox.readonly",
        kind: Kind::Bool,
    },
    EnvMapping {
        var_name: "BULWARK_APPROVAL_MODE",
        field_path: "approval.mode",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "BULWARK_MAX_DEPTH",
        field_path: "delegation.max_depth",
        kind: Kind::Int,
    },
    EnvMapping {
        var_name: "BULWARK_LOG_LEVEL",
        field_path: "logging.level",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "BULWARK_LOG_FORMAT",
        field_path: "logging.format",
        kind: Kind::Str,
    },
];

/// Apply environment variable fallbacks to fields that no config file set.
///
/// Returns the number of env vars applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] when a numeric or boolean variable does
/// not parse.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if sources
            .get(mapping.field_path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults)
        {
            continue;
        }
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };

        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var fallback"
        );
        let value = coerce(mapping, raw)?;
        let segments: Vec<&str> = mapping.field_path.split('.').collect();
        set_nested(merged, &segments, value);
        sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
        count = count.saturating_add(1);
    }

    Ok(count)
}

fn coerce(mapping: &EnvMapping, raw: &str) -> ConfigResult<toml::Value> {
    let invalid = |expected: &str| ConfigError::EnvError {
        var_name: mapping.var_name.to_owned(),
        message: format!("expected {expected}, got '{raw}'"),
    };
    match mapping.kind {
        Kind::Str => Ok(toml::Value::String(raw.to_owned())),
        Kind::Int => raw
            .trim()
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|_| invalid("an integer")),
        Kind::Bool => raw
            .trim()
            .parse::<bool>()
            .map(toml::Value::Boolean)
            .map_err(|_| invalid("true or false")),
    }
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}
