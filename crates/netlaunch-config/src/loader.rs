//! Config file discovery and layered loading.
//!
//! 1. Parse `defaults.toml` → base
//! 2. Merge `/etc/netlaunch/config.toml` (system)
//! 3. Merge `~/.netlaunch/config.toml` (user)
//! 4. Merge an explicit file, if given
//! 5. Apply `NETLAUNCH_*` overrides
//! 6. Deserialize and validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_overrides, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Default system-wide config location.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/netlaunch/config.toml";

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// A resolved configuration together with source annotations.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final merged configuration.
    pub config: Config,
    /// Dotted field path → which layer set the value.
    pub field_sources: FieldSources,
    /// Config file paths that were loaded, in precedence order.
    pub loaded_files: Vec<String>,
}

impl ResolvedConfig {
    /// Layer that set `field` (e.g. `"loader.strict"`).
    #[must_use]
    pub fn source_of(&self, field: &str) -> Option<&ConfigLayer> {
        self.field_sources.get(field)
    }
}

/// Where each layer is read from.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// System config file. `None` uses [`SYSTEM_CONFIG_PATH`].
    pub system_path: Option<PathBuf>,
    /// Directory holding the user's `config.toml`. `None` uses `~/.netlaunch`.
    pub user_dir: Option<PathBuf>,
    /// Extra file merged above the user layer.
    pub explicit: Option<PathBuf>,
    /// Environment snapshot. `None` reads the process environment.
    pub env: Option<HashMap<String, String>>,
}

/// Load configuration with the full precedence chain.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, an
/// environment override is invalid, or the merged configuration fails
/// validation.
pub fn load(options: &LoadOptions) -> ConfigResult<ResolvedConfig> {
    let env_vars = options.env.clone().unwrap_or_else(collect_env_vars);

    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);

    let system_path = options
        .system_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(SYSTEM_CONFIG_PATH));
    let user_path = match &options.user_dir {
        Some(dir) => dir.join("config.toml"),
        None => home_directory()?.join(".netlaunch").join("config.toml"),
    };

    let mut layers = vec![(system_path, ConfigLayer::System), (user_path, ConfigLayer::User)];
    if let Some(explicit) = &options.explicit {
        layers.push((
            explicit.clone(),
            ConfigLayer::Explicit(explicit.display().to_string()),
        ));
    }

    for (path, layer) in layers {
        let overlay = if matches!(layer, ConfigLayer::Explicit(_)) {
            Some(read_file(&path)?)
        } else {
            try_load_file(&path)?
        };
        if let Some(overlay) = overlay {
            deep_merge_tracking(&mut merged, &overlay, "", &layer, &mut field_sources);
            loaded_files.push(path.display().to_string());
            info!(path = %path.display(), layer = %layer, "Loaded config layer");
        }
    }

    let env_count = apply_env_overrides(&mut merged, &mut field_sources, &env_vars)?;
    if env_count > 0 {
        debug!(count = env_count, "Applied environment overrides");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load a config from a specific file path (no layering).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let value = read_file(path)?;
    let config: Config = value
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Read and parse a file that must exist.
fn read_file(path: &Path) -> ConfigResult<toml::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_bounded(path, &content)
}

/// Try to load a file, returning `None` if the file doesn't exist.
///
/// Uses a single read to avoid a stat/read race.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };
    parse_bounded(path, &content).map(Some)
}

fn parse_bounded(path: &Path, content: &str) -> ConfigResult<toml::Value> {
    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {} byte limit",
                content.len(),
                MAX_CONFIG_FILE_SIZE
            ),
        });
    }
    toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })
}

/// Determine the user's home directory.
fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}
