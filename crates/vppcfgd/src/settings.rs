//! Runtime settings of the daemon.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::OutputPaths;
use crate::constants::CONSTANTS_PATH;
use crate::runner::SELECT_TIMEOUT;

/// Default location of the VPP template.
pub const VPP_TEMPLATE_PATH: &str = "/etc/sonic/vpp/vpp_template.json";
/// Default root of the file-backed tables.
pub const TABLE_DB_DIR: &str = "/var/run/vppcfgd/db";

/// Paths and timings the daemon runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// VPP template merged under every update.
    pub template: PathBuf,
    /// Platform constants file, checked at startup.
    pub constants: PathBuf,
    /// Where the rendered artifacts go.
    pub outputs: OutputPaths,
    /// Root of the file-backed tables.
    pub db_dir: PathBuf,
    /// How long the runner waits for the first event of a tick.
    pub poll_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            template: PathBuf::from(VPP_TEMPLATE_PATH),
            constants: PathBuf::from(CONSTANTS_PATH),
            outputs: OutputPaths::default(),
            db_dir: PathBuf::from(TABLE_DB_DIR),
            poll_timeout: SELECT_TIMEOUT,
        }
    }
}
