//! fhescore Settings
//!
//! JSON-backed settings files. A service picks its own config type and wraps
//! it in `Settings<T>`; missing files are created with `T::default()`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Overrides the base directory for every service's settings.
pub const CONFIG_DIR_ENV: &str = "FHESCORE_CONFIG_DIR";
pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("settings file not found: {0}")]
    NotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// A config value plus the file it lives in.
///
/// ```ignore
/// let settings: Settings<LedgerSettings> = Settings::load_or_default("fhescore", None)?;
/// ```
#[derive(Debug)]
pub struct Settings<T> {
    pub config: T,
    path: PathBuf,
}

impl<T: Serialize + DeserializeOwned + Default> Settings<T> {
    /// Load from `custom_path` or the service's default path, writing defaults
    /// when the file does not exist yet.
    pub fn load_or_default(service: &str, custom_path: Option<&Path>) -> Result<Self> {
        let path = custom_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_settings_path(service));

        if path.exists() {
            Self::load(&path)
        } else {
            info!(path = %path.display(), "writing default settings");
            let settings = Self {
                config: T::default(),
                path,
            };
            settings.save()?;
            Ok(settings)
        }
    }

    /// Load an existing file. Missing files are an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SettingsError::NotFound(path.to_path_buf()));
        }
        debug!(path = %path.display(), "loading settings");
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            config,
            path: path.to_path_buf(),
        })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(&self.config)?;
        fs::write(&self.path, content).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Apply `f` to the config and persist the result.
    pub fn update(&mut self, f: impl FnOnce(&mut T)) -> Result<()> {
        f(&mut self.config);
        self.save()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Base directory for a service's files.
///
/// `$FHESCORE_CONFIG_DIR/{service}` when set, otherwise
/// `$XDG_CONFIG_HOME/{service}` or `~/.config/{service}`.
pub fn default_config_dir_for(service: &str) -> PathBuf {
    let service = service.to_lowercase();
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return PathBuf::from(dir).join(service);
    }
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"));
    base.join(service)
}

pub fn default_settings_path(service: &str) -> PathBuf {
    default_config_dir_for(service).join(SETTINGS_FILE)
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
    #[serde(default)]
    struct TestConfig {
        name: String,
        value: u32,
    }

    #[test]
    fn test_load_or_default_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings: Settings<TestConfig> =
            Settings::load_or_default("test", Some(&path)).unwrap();
        assert_eq!(settings.config, TestConfig::default());
        assert!(path.exists());
        assert_eq!(settings.path(), path.as_path());

        let again: Settings<TestConfig> = Settings::load_or_default("test", Some(&path)).unwrap();
        assert_eq!(again.config, TestConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings: Settings<TestConfig> =
            Settings::load_or_default("test", Some(&path)).unwrap();
        settings
            .update(|c| {
                c.name = "modified".to_string();
                c.value = 42;
            })
            .unwrap();

        let loaded: Settings<TestConfig> = Settings::load(&path).unwrap();
        assert_eq!(loaded.config.name, "modified");
        assert_eq!(loaded.config.value, 42);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "value": 7 }"#).unwrap();

        let loaded: Settings<TestConfig> = Settings::load(&path).unwrap();
        assert_eq!(loaded.config.value, 7);
        assert_eq!(loaded.config.name, "");
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();

        let err = Settings::<TestConfig>::load(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
        assert!(err.to_string().contains("settings.json"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(
            Settings::<TestConfig>::load(&path),
            Err(SettingsError::NotFound(_))
        ));
    }

    #[test]
    fn test_default_path_ends_with_service() {
        let path = default_settings_path("FheScore");
        assert!(path.ends_with("fhescore/settings.json"));
    }
}
