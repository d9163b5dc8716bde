//! Seeds the `PLATFORM|vpp` entry from the port list handed to the
//! container at start.
//!
//! Every port in `VPP_DPDK_PORTS` that is a veth interface becomes a host
//! interface (`vports`); any other port is handed to DPDK under a generated
//! `bobm<N>` name.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use indexmap::IndexMap;
use log::{debug, info};
use serde_json::json;
use thiserror::Error;

use crate::config::{write_atomic, ConfigError};
use crate::directory::SlotId;
use crate::manager::{Fields, VPP_KEY};
use crate::transport::file_table::parse_table;
use crate::transport::{FileTableSource, Table};

/// Set to `y` to let `load-ports` write the platform entry.
pub const VPP_CONF_DB_ENV: &str = "VPP_CONF_DB";
/// Comma-separated ports, either veth names or PCI addresses.
pub const VPP_DPDK_PORTS_ENV: &str = "VPP_DPDK_PORTS";

/// Errors raised by `load-ports`.
#[derive(Error, Debug)]
pub enum PortsError {
    #[error("Failed to read table '{path}': {source}")]
    ReadTable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse table '{path}': {reason}")]
    ParseTable { path: PathBuf, reason: String },

    #[error("Failed to serialize table: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Write(#[from] ConfigError),
}

/// Tells whether a port is a veth interface.
pub trait LinkProbe {
    fn is_veth(&self, port: &str) -> bool;
}

/// Asks `ip link` about the port.
#[derive(Debug, Default)]
pub struct IpLinkProbe;

impl LinkProbe for IpLinkProbe {
    fn is_veth(&self, port: &str) -> bool {
        Command::new("ip")
            .args(["link", "show", "type", "veth", "dev", port])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

/// Port settings taken from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortsEnv {
    /// Whether the entry should be written at all.
    pub enabled: bool,
    /// Ports in list order, empty items removed.
    pub ports: Vec<String>,
}

impl PortsEnv {
    /// Reads [`VPP_CONF_DB_ENV`] and [`VPP_DPDK_PORTS_ENV`].
    pub fn from_env() -> Self {
        let enabled = std::env::var(VPP_CONF_DB_ENV).is_ok_and(|v| v == "y");
        let ports = std::env::var(VPP_DPDK_PORTS_ENV)
            .map(|list| parse_port_list(&list))
            .unwrap_or_default();
        Self { enabled, ports }
    }
}

/// Splits a comma-separated port list, skipping empty items.
pub fn parse_port_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|port| !port.is_empty())
        .map(str::to_string)
        .collect()
}

/// Builds the fields of the `vpp` entry. Groups without ports are left out.
pub fn build_vpp_entry(ports: &[String], probe: &dyn LinkProbe) -> Fields {
    let mut vports = serde_json::Map::new();
    let mut devs = serde_json::Map::new();

    for port in ports {
        if probe.is_veth(port) {
            debug!("{} is a veth interface", port);
            vports.insert(port.clone(), json!(""));
        } else {
            let name = format!("bobm{}", devs.len());
            debug!("{} is a DPDK device named {}", port, name);
            devs.insert(port.clone(), json!({ "name": name }));
        }
    }

    let mut fields = Fields::new();
    if !vports.is_empty() {
        fields.insert(
            "vports".to_string(),
            serde_json::Value::Object(vports).to_string(),
        );
    }
    if !devs.is_empty() {
        fields.insert("dpdk".to_string(), json!({ "dev": devs }).to_string());
    }
    fields
}

/// Writes the `vpp` entry into `CONFIG_DB/PLATFORM`, keeping the table's
/// other entries. Returns `None` when loading is disabled.
pub fn load_ports(
    env: &PortsEnv,
    db_dir: &Path,
    probe: &dyn LinkProbe,
) -> Result<Option<Fields>, PortsError> {
    if !env.enabled {
        info!("{} is not set, skipping port load", VPP_CONF_DB_ENV);
        return Ok(None);
    }

    let slot = SlotId::new("CONFIG_DB", "PLATFORM");
    let path = FileTableSource::table_path(db_dir, &slot);
    let mut table = read_existing(&path)?;

    let entry = build_vpp_entry(&env.ports, probe);
    table.insert(VPP_KEY.to_string(), entry.clone());

    write_atomic(&path, &serde_json::to_string_pretty(&table)?)?;
    info!("Loaded {} port(s) into {}", env.ports.len(), path.display());
    Ok(Some(entry))
}

fn read_existing(path: &Path) -> Result<Table, PortsError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(IndexMap::new()),
        Err(e) => {
            return Err(PortsError::ReadTable {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    parse_table(&content).map_err(|reason| PortsError::ParseTable {
        path: path.to_path_buf(),
        reason,
    })
}
