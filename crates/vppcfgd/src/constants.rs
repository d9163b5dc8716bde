//! Cross-cutting constants shared with the rest of the platform.

use std::path::{Path, PathBuf};

use log::info;
use serde_yaml::Value as YamlValue;
use thiserror::Error;

/// Default location of the constants file.
pub const CONSTANTS_PATH: &str = "/etc/sonic/constants.yml";
const ROOT_KEY: &str = "constants";

/// Errors raised while loading the constants file.
#[derive(Error, Debug)]
pub enum ConstantsError {
    #[error("Failed to read constants file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse constants file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Constants file '{path}' has no top-level '{key}' entry")]
    MissingKey { path: PathBuf, key: &'static str },
}

/// The mapping found under the file's `constants` key.
#[derive(Debug, Clone)]
pub struct Constants {
    root: YamlValue,
}

impl Constants {
    /// Reads and validates the constants file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConstantsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConstantsError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let constants = Self::parse_at(&content, path)?;
        info!("Loaded constants from {}", path.display());
        Ok(constants)
    }

    /// Parses constants from text. Errors carry an empty path.
    pub fn parse(content: &str) -> Result<Self, ConstantsError> {
        Self::parse_at(content, Path::new(""))
    }

    fn parse_at(content: &str, path: &Path) -> Result<Self, ConstantsError> {
        let doc: YamlValue = serde_yaml::from_str(content).map_err(|e| ConstantsError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        let root = doc.get(ROOT_KEY).ok_or_else(|| ConstantsError::MissingKey {
            path: path.to_path_buf(),
            key: ROOT_KEY,
        })?;
        Ok(Self { root: root.clone() })
    }

    /// Top-level groups below the `constants` entry, in file order.
    /// Non-string keys are skipped.
    pub fn groups(&self) -> Vec<&str> {
        match self.root.as_mapping() {
            Some(mapping) => mapping.keys().filter_map(YamlValue::as_str).collect(),
            None => Vec::new(),
        }
    }
}
