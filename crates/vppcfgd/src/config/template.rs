//! The VPP configuration template.

use std::path::Path;

use log::{debug, info};

use super::error::ConfigError;
use crate::value::{map_from_json, Map, ValueError};

/// Default VPP configuration every override is merged onto.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    doc: Map,
}

impl Template {
    /// Reads the template file. It must hold a JSON object without arrays.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadTemplate {
            path: path.to_path_buf(),
            source: e,
        })?;

        let parse_error = |source: ValueError| ConfigError::ParseTemplate {
            path: path.to_path_buf(),
            source,
        };
        let json: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| parse_error(ValueError::Json(e)))?;
        let doc = map_from_json(json).map_err(parse_error)?;

        info!("Loaded VPP template from {}", path.display());
        debug!("Template {:?}", doc);
        Ok(Self { doc })
    }

    /// Builds a template from an in-memory document.
    pub fn from_json(json: serde_json::Value) -> Result<Self, ValueError> {
        Ok(Self {
            doc: map_from_json(json)?,
        })
    }

    pub fn as_map(&self) -> &Map {
        &self.doc
    }
}
