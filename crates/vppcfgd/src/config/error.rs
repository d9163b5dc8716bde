//! Errors raised while loading, rendering or persisting VPP configuration.

use std::path::PathBuf;
use thiserror::Error;

use crate::value::ValueError;

/// Errors of the configuration manager and its artifacts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read template '{path}': {source}")]
    ReadTemplate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse template '{path}': {source}")]
    ParseTemplate {
        path: PathBuf,
        #[source]
        source: ValueError,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to replace '{path}': {source}")]
    ReplaceFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
