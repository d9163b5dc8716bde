//! Isolated daemon wiring for integration tests.
//!
//! A `TestHarness` owns a temp directory holding the template, the output
//! files and the table directory, and builds a runner fed by an in-process
//! channel.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value as JsonValue;
use tempfile::TempDir;

use vppcfgd::config::{ConfigMgr, OutputPaths, PluginOverrides, Template};
use vppcfgd::directory::{Directory, SlotId};
use vppcfgd::manager::{Fields, Manager, VppCfgHandler};
use vppcfgd::runner::Runner;
use vppcfgd::shutdown::ShutdownToken;
use vppcfgd::transport::{channel, ChannelPublisher};

pub const TEST_POLL_TIMEOUT: Duration = Duration::from_millis(20);

pub fn platform() -> SlotId {
    SlotId::new("CONFIG_DB", "PLATFORM")
}

pub fn state_platform() -> SlotId {
    SlotId::new("STATE_DB", "PLATFORM")
}

pub fn fields(pairs: &[(&str, &str)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub template_path: PathBuf,
    pub outputs: OutputPaths,
    pub db_dir: PathBuf,
    pub directory: Arc<Directory>,
    pub cfg_mgr: Arc<Mutex<ConfigMgr>>,
}

impl TestHarness {
    /// Harness with the given template and no plugin overrides.
    pub fn new(template: JsonValue) -> Self {
        Self::with_overrides(template, PluginOverrides::default())
    }

    pub fn with_overrides(template: JsonValue, overrides: PluginOverrides) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let template_path = base.join("vpp_template.json");
        std::fs::write(&template_path, template.to_string()).expect("Failed to write template");

        let outputs = OutputPaths::in_dir(base.join("vpp"));
        let db_dir = base.join("db");
        let template = Template::load(&template_path).expect("Failed to load template");
        let cfg_mgr = Arc::new(Mutex::new(ConfigMgr::new(
            template,
            outputs.clone(),
            overrides,
        )));

        Self {
            temp_dir,
            template_path,
            outputs,
            db_dir,
            directory: Arc::new(Directory::new()),
            cfg_mgr,
        }
    }

    /// Runner with a VppCfg manager on `CONFIG_DB|PLATFORM` and
    /// `STATE_DB|PLATFORM`, fed by the returned publisher.
    pub fn channel_runner(&self) -> (Runner, ChannelPublisher) {
        let (publisher, source) = channel();
        let mut runner = Runner::new(
            Arc::clone(&self.cfg_mgr),
            Box::new(source),
            ShutdownToken::new(),
        )
        .with_poll_timeout(TEST_POLL_TIMEOUT);

        for slot in [platform(), state_platform()] {
            let manager = Manager::new(
                "VppCfgMgr",
                Arc::clone(&self.directory),
                vec![],
                slot,
                VppCfgHandler::new(Arc::clone(&self.cfg_mgr)),
            );
            runner.add_manager(manager).expect("Failed to add manager");
        }
        (runner, publisher)
    }

    pub fn startup_conf(&self) -> String {
        std::fs::read_to_string(&self.outputs.startup_conf).expect("startup.conf missing")
    }

    pub fn bootup_conf(&self) -> String {
        std::fs::read_to_string(&self.outputs.bootup_conf).expect("bootup.conf missing")
    }

    pub fn startup_json(&self) -> JsonValue {
        let content =
            std::fs::read_to_string(&self.outputs.startup_json).expect("startup.json missing");
        serde_json::from_str(&content).expect("startup.json is not JSON")
    }

    pub fn outputs_exist(&self) -> bool {
        self.outputs.startup_json.exists()
            || self.outputs.bootup_conf.exists()
            || self.outputs.startup_conf.exists()
    }
}
