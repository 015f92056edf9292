//! User settings of the language server.
//!
//! Settings are read from `~/.config/tslgen/config.json` (or the platform's
//! equivalent) and can be overridden per session through the client's
//! `initializationOptions`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

/// Settings of the language server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Interpreter running the generator daemon.
    pub python_interpreter: String,
    /// Spaces per indentation level in generated snippets.
    pub indent_unit: usize,
    /// Scratch folder for daemon builds, relative to the project root.
    /// Falls back to the generator profile's folder.
    pub build_dir_name: Option<String>,
    /// Whether `tslgen.build` may start the generator daemon.
    pub enable_daemon: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            python_interpreter: "python3".to_string(),
            indent_unit: 2,
            build_dir_name: None,
            enable_daemon: true,
        }
    }
}

impl Settings {
    /// One level of snippet indentation.
    pub fn indent(&self) -> String {
        " ".repeat(self.indent_unit.max(1))
    }

    /// Settings from the user config file, or defaults when the file is
    /// missing or broken.
    pub fn load() -> Self {
        match load_config() {
            Ok(Some(settings)) => settings,
            Ok(None) => Settings::default(),
            Err(e) => {
                warn!(error = %e, "Ignoring user config");
                Settings::default()
            }
        }
    }

    /// Apply the keys present in `options` on top of these settings.
    pub fn merged_with(&self, options: &serde_json::Value) -> Result<Settings, ConfigError> {
        let serde_json::Value::Object(overrides) = options else {
            return Ok(self.clone());
        };
        let mut merged = serde_json::to_value(SettingsView::from(self))
            .map_err(|e| ConfigError::Options(e.to_string()))?;
        if let serde_json::Value::Object(base) = &mut merged {
            for (key, value) in overrides {
                base.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(merged).map_err(|e| ConfigError::Options(e.to_string()))
    }
}

/// Serializable mirror of [`Settings`], used to merge overrides key by key.
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsView<'a> {
    python_interpreter: &'a str,
    indent_unit: usize,
    build_dir_name: Option<&'a str>,
    enable_daemon: bool,
}

impl<'a> From<&'a Settings> for SettingsView<'a> {
    fn from(settings: &'a Settings) -> Self {
        SettingsView {
            python_interpreter: &settings.python_interpreter,
            indent_unit: settings.indent_unit,
            build_dir_name: settings.build_dir_name.as_deref(),
            enable_daemon: settings.enable_daemon,
        }
    }
}

/// Get the path to the user config file.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tslgen").join("config.json"))
}

/// Load the user configuration from disk.
///
/// Returns `Ok(None)` if the config file doesn't exist.
pub fn load_config() -> Result<Option<Settings>, ConfigError> {
    let Some(path) = config_path() else {
        debug!("No config directory available");
        return Ok(None);
    };
    load_config_from(&path)
}

/// Load settings from a specific file.
pub fn load_config_from(path: &Path) -> Result<Option<Settings>, ConfigError> {
    if !path.exists() {
        debug!(?path, "Config file does not exist");
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let settings: Settings =
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    info!(?path, "Loaded user config");
    Ok(Some(settings))
}

/// Error loading settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid initialization options: {0}")]
    Options(String),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config_from(&dir.path().join("config.json")).unwrap().is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"indentUnit": 4}"#).unwrap();
        let settings = load_config_from(&path).unwrap().unwrap();
        assert_eq!(settings.indent_unit, 4);
        assert_eq!(settings.indent(), "    ");
        assert_eq!(settings.python_interpreter, "python3");
        assert!(settings.enable_daemon);
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{").unwrap();
        assert!(matches!(load_config_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_initialization_options_override() {
        let base = Settings {
            indent_unit: 4,
            ..Settings::default()
        };
        let merged = base
            .merged_with(&json!({"pythonInterpreter": "/opt/py/bin/python", "enableDaemon": false}))
            .unwrap();
        assert_eq!(merged.python_interpreter, "/opt/py/bin/python");
        assert_eq!(merged.indent_unit, 4);
        assert!(!merged.enable_daemon);

        assert_eq!(base.merged_with(&serde_json::Value::Null).unwrap(), base);
        assert!(base.merged_with(&json!({"indentUnit": "wide"})).is_err());
    }
}
