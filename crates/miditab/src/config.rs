//! Configuration for the converters, loaded from TOML.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, section by section):
//! 1. `~/.config/miditab/config.toml` (user)
//! 2. `./miditab.toml` (local override), or an explicit path given by the caller
//!
//! # Example Config
//!
//! ```toml
//! [encode]
//! bpm = 96.0
//! ticks_per_beat = 480
//! time_signature = [3, 4]
//! clocks_per_click = 24
//! note_order = "sort_by_start"
//!
//! [extract]
//! unmatched_note_off = "error"
//! retrigger = "close_and_restart"
//! unclosed = "close_at_track_end"
//! ```

use crate::encode::EncodeOptions;
use crate::notes::ExtractOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete miditab configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MiditabConfig {
    pub encode: EncodeOptions,
    pub extract: ExtractOptions,
}

/// Sections present in one file; absent sections leave earlier values alone.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    encode: Option<EncodeOptions>,
    extract: Option<ExtractOptions>,
}

impl MiditabConfig {
    /// Load from the standard locations, `explicit` replacing the local file.
    ///
    /// Returns the config and the files that were read, in load order.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let files = discover_config_files(explicit)?;
        let mut config = Self::default();
        for path in &files {
            config.apply(load_file(path)?);
        }
        Ok((config, files))
    }

    /// Load a single file over the defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply(load_file(path)?);
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply(parse_toml(contents, Path::new("<string>"))?);
        Ok(config)
    }

    fn apply(&mut self, file: ConfigFile) {
        if let Some(encode) = file.encode {
            self.encode = encode;
        }
        if let Some(extract) = file.extract {
            self.extract = extract;
        }
    }
}

/// Config files to load, in order. Only existing files are returned.
///
/// An explicit path must exist; it replaces `./miditab.toml`.
pub fn discover_config_files(explicit: Option<&Path>) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = Vec::new();

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("miditab/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::FileRead {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }
        files.push(path.to_path_buf());
        return Ok(files);
    }

    let local = PathBuf::from("miditab.toml");
    if local.exists() {
        files.push(local);
    }

    Ok(files)
}

fn load_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_toml(&contents, path)
}

fn parse_toml(contents: &str, path: &Path) -> Result<ConfigFile, ConfigError> {
    toml::from_str(contents).map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
