pub mod config;
pub mod constants;
pub mod directory;
pub mod error;
pub mod logging;
pub mod manager;
pub mod ports;
pub mod runner;
pub mod settings;
pub mod shutdown;
pub mod transport;
pub mod value;

pub use config::{CommitReport, ConfigMgr, OutputPaths, PluginOverrides, Template};
pub use constants::Constants;
pub use directory::{Dependency, Directory, SlotId};
pub use error::{Result, VppcfgdError};
pub use manager::{
    EventHandler, Fields, Manager, Operation, SetOutcome, TableHandler, VppCfgHandler,
};
pub use runner::{Runner, Tick};
pub use settings::Settings;
pub use shutdown::ShutdownToken;
pub use transport::{ChangeEvent, EventSource, FileTableSource};
pub use value::{Map, Value};
