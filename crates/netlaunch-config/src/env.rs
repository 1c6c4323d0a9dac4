//! `NETLAUNCH_*` environment overrides.
//!
//! Environment variables are the last layer: a set variable replaces the
//! value from every file layer.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources};

/// Prefix shared by every recognised variable.
pub const ENV_PREFIX: &str = "NETLAUNCH_";

#[derive(Clone, Copy)]
enum FieldKind {
    Bool,
    Str,
}

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: FieldKind,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "NETLAUNCH_STRICT",
        field_path: "loader.strict",
        kind: FieldKind::Bool,
    },
    EnvMapping {
        var_name: "NETLAUNCH_VERIFY",
        field_path: "loader.verify_signatures",
        kind: FieldKind::Bool,
    },
    EnvMapping {
        var_name: "NETLAUNCH_SCRATCH_ROOT",
        field_path: "loader.scratch_root",
        kind: FieldKind::Str,
    },
    EnvMapping {
        var_name: "NETLAUNCH_LOG_LEVEL",
        field_path: "logging.level",
        kind: FieldKind::Str,
    },
];

/// Snapshot the process environment, keeping only `NETLAUNCH_*` variables.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with(ENV_PREFIX))
        .collect()
}

/// Apply every mapped variable present in `env_vars` to `merged`.
///
/// Returns the number of variables applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if a boolean variable holds something
/// other than `true`/`false`/`1`/`0`/`yes`/`no`.
pub fn apply_env_overrides<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };
        let value = coerce(mapping, raw)?;
        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var override"
        );
        set_field(merged, mapping.field_path, value);
        sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
        count = count.saturating_add(1);
    }

    Ok(count)
}

fn coerce(mapping: &EnvMapping, raw: &str) -> ConfigResult<toml::Value> {
    match mapping.kind {
        FieldKind::Str => Ok(toml::Value::String(raw.to_owned())),
        FieldKind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(toml::Value::Boolean(true)),
            "0" | "false" | "no" | "off" => Ok(toml::Value::Boolean(false)),
            _ => Err(ConfigError::EnvError {
                var_name: mapping.var_name.to_owned(),
                message: format!("expected a boolean, got '{raw}'"),
            }),
        },
    }
}

/// Set a dotted field, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };
    let mut current = root;
    for segment in segments {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment.to_owned())
            .or_insert(toml::Value::Table(toml::map::Map::new()));
    }
    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), value);
    }
}
