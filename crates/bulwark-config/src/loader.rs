//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge `~/.bulwark/config.toml` (user)
//! 3. Merge `{workspace}/.bulwark/config.toml` (workspace) + restriction enforcement
//! 4. Apply env var fallbacks for fields no file set
//! 5. Deserialize merged tree → `Config`
//! 6. Validate

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, enforce_restrictions, record_leaves};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Directory name used under the home directory and the workspace root.
const CONFIG_DIR: &str = ".bulwark";

/// A loaded configuration together with where each value came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final merged configuration.
    pub config: Config,
    /// Dotted field path → which layer set the value.
    pub field_sources: FieldSources,
    /// Config file paths that were loaded (in precedence order).
    pub loaded_files: Vec<String>,
}

impl ResolvedConfig {
    /// The layer that set `field` (a dotted path such as `"approval.mode"`).
    #[must_use]
    pub fn source_of(&self, field: &str) -> Option<ConfigLayer> {
        self.field_sources.get(field).copied()
    }
}

/// Load the configuration with layered file precedence.
///
/// `workspace_root` is the root of the current project. If `None`, the
/// workspace layer is skipped. `home_override` replaces the home directory
/// used to find the user layer.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, or if the
/// final merged configuration fails validation.
pub fn load(workspace_root: Option<&Path>, home_override: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    let home_dir = match home_override {
        Some(h) => h.to_path_buf(),
        None => home_directory()?,
    };

    // 1. Embedded defaults.
    let mut merged = defaults_value()?;
    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", ConfigLayer::Defaults, &mut field_sources);

    // 2. User config.
    let user_path = home_dir.join(CONFIG_DIR).join("config.toml");
    if let Some(overlay) = try_load_file(&user_path)? {
        deep_merge_tracking(&mut merged, &overlay, "", ConfigLayer::User, &mut field_sources);
        loaded_files.push(user_path.display().to_string());
        info!(path = %user_path.display(), "loaded user config");
    }

    // 3. Workspace config. The tree before this layer is the baseline the
    //    workspace may only tighten.
    if let Some(ws_root) = workspace_root {
        let ws_path = ws_root.join(CONFIG_DIR).join("config.toml");
        if let Some(overlay) = try_load_file(&ws_path)? {
            let baseline = merged.clone();
            deep_merge_tracking(&mut merged, &overlay, "", ConfigLayer::Workspace, &mut field_sources);
            enforce_restrictions(&mut merged, &baseline, &overlay);
            loaded_files.push(ws_path.display().to_string());
            info!(path = %ws_path.display(), "loaded workspace config");
        }
    }

    // 4. Env var fallbacks.
    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, &collect_env_vars())?;
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    // 5. Deserialize.
    let config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: "<merged config>".to_owned(),
            source: e,
        })?;

    // 6. Validate.
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load a config from a specific file path (no layering).
///
/// Fields the file omits take their default values.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let Some(value) = try_load_file(path)? else {
        return Err(ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
    };

    let config: Config = value.try_into().map_err(|e: toml::de::Error| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    validate::validate(&config)?;
    Ok(config)
}

fn defaults_value() -> ConfigResult<toml::Value> {
    toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
        path: "<embedded defaults>".to_owned(),
        source: e,
    })
}

/// Try to load a file, returning `None` if the file doesn't exist.
///
/// Uses a single read so there is no window between a size or existence
/// check and the read.
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

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

/// Determine the user's home directory.
fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, content: &str) {
        let cfg_dir = dir.join(CONFIG_DIR);
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(cfg_dir.join("config.toml"), content).unwrap();
    }

    #[test]
    fn test_defaults_deserialize_to_default_config() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_without_files() {
        let home = tempfile::tempdir().unwrap();
        let resolved = load(None, Some(home.path())).unwrap();
        assert!(resolved.loaded_files.is_empty());
        assert_eq!(resolved.config.approval.mode, "interactive");
        assert_eq!(resolved.source_of("delegation.max_depth"), Some(ConfigLayer::Defaults));
    }

    #[test]
    fn test_user_then_workspace() {
        let home = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        write(
            home.path(),
            r#"
            [sandbox]
            root = "/srv/proj"

            [[sandbox.mounts]]
            source = "/srv/docs"
            target = "/docs"
            "#,
        );
        write(
            ws.path(),
            r"
            [delegation]
            max_depth = 1
            ",
        );

        let resolved = load(Some(ws.path()), Some(home.path())).unwrap();
        let config = &resolved.config;
        assert_eq!(config.sandbox.root, "/srv/proj");
        assert_eq!(config.sandbox.mounts.len(), 1);
        assert_eq!(config.delegation.max_depth, 1);
        assert_eq!(resolved.source_of("sandbox.root"), Some(ConfigLayer::User));
        assert_eq!(resolved.source_of("delegation.max_depth"), Some(ConfigLayer::Workspace));
        assert_eq!(resolved.loaded_files.len(), 2);
    }

    #[test]
    fn test_workspace_cannot_loosen() {
        let home = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        write(
            home.path(),
            r#"
            [sandbox]
            root = "/srv/proj"
            readonly = true

            [[sandbox.mounts]]
            source = "/srv/docs"
            target = "/docs"
            readonly = true
            "#,
        );
        write(
            ws.path(),
            r#"
            [sandbox]
            root = "/"
            readonly = false

            [[sandbox.mounts]]
            source = "/srv/docs"
            target = "/docs"
            readonly = false

            [[sandbox.mounts]]
            source = "/etc"
            target = "/etc"

            [approval]
            mode = "approve_all"

            [delegation]
            max_depth = 10

            [tools]
            require_approval_for_writes = false
            "#,
        );

        let config = load(Some(ws.path()), Some(home.path())).unwrap().config;
        assert_eq!(config.sandbox.root, "/srv/proj");
        assert!(config.sandbox.readonly);
        assert_eq!(config.sandbox.mounts.len(), 1);
        assert!(config.sandbox.mounts[0].readonly);
        assert_eq!(config.approval.mode, "interactive");
        assert_eq!(config.delegation.max_depth, 3);
        assert!(config.tools.require_approval_for_writes);
    }

    #[test]
    fn test_workspace_can_tighten() {
        let home = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        write(home.path(), "[sandbox]\nroot = \"/srv/proj\"\n");
        write(
            ws.path(),
            r#"
            [sandbox]
            root = "/srv/proj/app"
            readonly = true

            [approval]
            mode = "auto_deny"

            [tools]
            require_approval_for_reads = true
            "#,
        );

        let config = load(Some(ws.path()), Some(home.path())).unwrap().config;
        assert_eq!(config.sandbox.root, "/srv/proj/app");
        assert!(config.sandbox.readonly);
        assert_eq!(config.approval.mode, "auto_deny");
        assert!(config.tools.require_approval_for_reads);
    }

    #[test]
    fn test_invalid_merged_config_rejected() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), "[approval]\nmode = \"sometimes\"\n");
        let err = load(None, Some(home.path())).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "approval.mode"));
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), "[sandbox\nroot = ");
        let err = load(None, Some(home.path())).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { ref path, .. } if path.ends_with("config.toml")));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bulwark.toml");
        std::fs::write(&path, "[delegation]\nmax_depth = 2\n").unwrap();
        let config = load_file(&path).unwrap();
        assert_eq!(config.delegation.max_depth, 2);
        assert_eq!(config.sandbox, crate::SandboxSection::default());

        let missing = load_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_oversized_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("huge.toml");
        let data = "x = \"".to_owned() + &"a".repeat(1_100_000) + "\"";
        std::fs::write(&file_path, data).unwrap();

        let result = try_load_file(&file_path);
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }
}
