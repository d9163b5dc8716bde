//! VPP configuration: template, merge, render and persistence.

pub mod error;
pub mod mgr;
pub mod output;
pub mod overrides;
pub mod render;
pub mod template;

pub use error::ConfigError;
pub use mgr::{CommitReport, ConfigMgr};
pub use output::{write_atomic, OutputPaths};
pub use overrides::PluginOverrides;
pub use render::{render_startup, vports_commands};
pub use template::Template;
