//! TOML config file plumbing shared by the master and peripheral binaries.
//!
//! Each binary owns its schema and validation; this module resolves the
//! platform config directory and moves a serde value to and from disk:
//! - Linux:    `$XDG_CONFIG_HOME/splitkb/` or `~/.config/splitkb/`
//! - macOS:    `~/Library/Application Support/splitkb/`
//! - Windows:  `%APPDATA%\splitkb\`

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The file parsed but a value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Path of `file_name` inside the platform config directory.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn default_config_path(file_name: &str) -> Result<PathBuf, ConfigError> {
    let dir = platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)?;
    Ok(dir.join(file_name))
}

/// Reads and parses the TOML file at `path`.
///
/// Returns `Ok(None)` if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found"
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(toml::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `value` to `path` as pretty TOML, creating parent directories.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn write_toml<T: Serialize>(value: &T, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(value)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory, including the `splitkb` subdirectory.
pub fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("splitkb"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("splitkb"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("splitkb")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        name: String,
        #[serde(default)]
        count: u32,
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("splitkb_core_config_test_{}_{name}", std::process::id()))
            .join("nested")
            .join("sample.toml")
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent().and_then(Path::parent) {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_missing_file_reads_as_none() {
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/sample.toml");
        let result: Option<Sample> = read_toml(&path).expect("not found is not an error");
        assert!(result.is_none());
    }

    #[test]
    fn test_write_creates_parent_directories_and_reads_back() {
        // Arrange
        let path = temp_path("round_trip");
        let value = Sample {
            name: "left".into(),
            count: 3,
        };

        // Act
        write_toml(&value, &path).expect("write");
        let loaded: Option<Sample> = read_toml(&path).expect("read");

        // Assert
        assert_eq!(loaded, Some(value));
        cleanup(&path);
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        // Arrange
        let path = temp_path("malformed");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "count = \"three\"\n").unwrap();

        // Act
        let result = read_toml::<Sample>(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Parse(_))));
        cleanup(&path);
    }

    #[test]
    fn test_directory_in_place_of_file_is_an_io_error() {
        // Arrange
        let path = temp_path("is_dir");
        std::fs::create_dir_all(&path).unwrap();

        // Act
        let result = read_toml::<Sample>(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Io { path: p, .. }) if p == path));
        cleanup(&path);
    }

    #[test]
    fn test_default_config_path_joins_file_name() {
        if let Ok(path) = default_config_path("master.toml") {
            assert!(path.ends_with("splitkb/master.toml"), "got {path:?}");
        }
    }
}
