//! Manager for the `PLATFORM|vpp` entry.
//!
//! Each field of the entry holds a JSON sub-document written with single
//! quotes (e.g. `dpdk = "{'dev': {'0000:00:08.0': {}}}"`). The fields are
//! decoded into one override document and handed to the [`ConfigMgr`].

use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

use super::{Fields, ManagerError, SetOutcome, TableHandler};
use crate::config::ConfigMgr;
use crate::value::{Map, Value};

/// The only key of the table this handler acts on.
pub const VPP_KEY: &str = "vpp";

/// Feeds the decoded `vpp` entry into the shared [`ConfigMgr`].
pub struct VppCfgHandler {
    cfg_mgr: Arc<Mutex<ConfigMgr>>,
}

impl VppCfgHandler {
    /// Handler writing into `cfg_mgr`.
    pub fn new(cfg_mgr: Arc<Mutex<ConfigMgr>>) -> Self {
        Self { cfg_mgr }
    }

    /// Decodes every field into a nested value. Fails on the first field
    /// that is not a valid document.
    pub fn parse_fields(key: &str, data: &Fields) -> Result<Map, ManagerError> {
        let mut overrides = Map::with_capacity(data.len());
        for (field, raw) in data {
            let normalized = raw.replace('\'', "\"");
            let value = Value::from_json_str(&normalized).map_err(|source| {
                ManagerError::MalformedPayload {
                    key: key.to_string(),
                    field: field.clone(),
                    source,
                }
            })?;
            overrides.insert(field.clone(), value);
        }
        Ok(overrides)
    }
}

impl TableHandler for VppCfgHandler {
    fn set_handler(&mut self, key: &str, data: &Fields) -> Result<SetOutcome, ManagerError> {
        if key != VPP_KEY {
            return Ok(SetOutcome::Applied);
        }
        debug!("Key {} data {:?}", key, data);

        let overrides = Self::parse_fields(key, data)?;
        self.cfg_mgr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(&overrides);
        Ok(SetOutcome::Applied)
    }

    fn del_handler(&mut self, key: &str) {
        debug!("Ignoring delete of '{}', configuration is not rolled back", key);
    }
}
