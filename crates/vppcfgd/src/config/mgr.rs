//! The configuration manager.
//!
//! [`ConfigMgr::update`] merges an override document onto the template;
//! [`ConfigMgr::commit`] gates DPDK, applies the plugin toggles, renders
//! the working tree and writes the startup artifacts.

use log::{debug, info, warn};
use serde::Serialize;
use tracing::info_span;

use super::error::ConfigError;
use super::output::OutputPaths;
use super::overrides::PluginOverrides;
use super::render::{render_startup, vports_commands, DEV_KEY, PLUGIN_KEY};
use super::template::Template;
use crate::value::{deep_merge, map_to_json, Map, Value};

/// Top-level section holding the DPDK settings.
pub const DPDK_KEY: &str = "dpdk";
/// Top-level section holding plugin directives.
pub const PLUGINS_KEY: &str = "plugins";
/// Plugin names the commit may disable.
pub const DPDK_PLUGIN: &str = "dpdk_plugin.so";
pub const LINUX_NL_PLUGIN: &str = "linux_nl_plugin.so";
/// Placeholder device name that does not count as a real DPDK device.
pub const DEFAULT_DEV: &str = "default";

/// What a successful commit produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    /// Text written to `startup.conf`.
    pub startup_conf: String,
    /// Text written to `bootup.conf`.
    pub bootup_conf: String,
    /// Whether a real DPDK device survived gating.
    pub dpdk_enabled: bool,
}

/// Owns the VPP configuration tree and turns it into startup files.
#[derive(Debug)]
pub struct ConfigMgr {
    template: Template,
    outputs: OutputPaths,
    overrides: PluginOverrides,
    working: Option<Map>,
}

impl ConfigMgr {
    /// Creates a manager with no working tree. Nothing is written until
    /// the first [`ConfigMgr::commit`].
    pub fn new(template: Template, outputs: OutputPaths, overrides: PluginOverrides) -> Self {
        Self {
            template,
            outputs,
            overrides,
            working: None,
        }
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn outputs(&self) -> &OutputPaths {
        &self.outputs
    }

    /// The merged tree waiting for the next commit, if any.
    pub fn working_tree(&self) -> Option<&Map> {
        self.working.as_ref()
    }

    /// Drops the working tree.
    pub fn reset(&mut self) {
        self.working = None;
    }

    /// Rebuilds the working tree as the template with `overrides` merged on
    /// top. The template itself is left untouched.
    pub fn update(&mut self, overrides: &Map) {
        let mut tree = self.template.as_map().clone();
        deep_merge(&mut tree, overrides);
        debug!("Merged VPP configuration {:?}", tree);
        self.working = Some(tree);
    }

    /// Applies the port, DPDK and environment adjustments, renders the tree
    /// and rewrites the three output files.
    ///
    /// On success the working tree is reset. On failure it stays resident so
    /// the next commit writes it again.
    pub fn commit(&mut self) -> Result<CommitReport, ConfigError> {
        let _span = info_span!("commit").entered();

        let mut tree = match &self.working {
            Some(tree) => tree.clone(),
            None => {
                warn!("Committing without a preceding update, rendering resident state");
                Map::new()
            }
        };

        let bootup_conf = vports_commands(&tree);
        let mut dpdk_enabled = has_dpdk_devices(&tree);
        if !dpdk_enabled {
            disable_dpdk(&mut tree);
        }
        if self.overrides.disable_dpdk {
            disable_dpdk(&mut tree);
            dpdk_enabled = false;
        }
        if self.overrides.disable_linux_nl {
            set_plugin(&mut tree, LINUX_NL_PLUGIN, "disable");
        }

        let startup_conf = render_startup(&tree);
        let startup_json = to_pretty_json(&tree)?;

        debug!("bootup ports config {}", bootup_conf);
        debug!("startup {}", startup_conf);
        self.outputs
            .write_all(&startup_json, &bootup_conf, &startup_conf)?;

        self.reset();
        info!("Config changes committed.");

        Ok(CommitReport {
            startup_conf,
            bootup_conf,
            dpdk_enabled,
        })
    }
}

/// True when `dpdk/dev` lists at least one device besides the placeholder.
fn has_dpdk_devices(tree: &Map) -> bool {
    tree.get(DPDK_KEY)
        .and_then(Value::as_mapping)
        .and_then(|dpdk| dpdk.get(DEV_KEY))
        .and_then(Value::as_mapping)
        .is_some_and(|devs| devs.keys().any(|name| name != DEFAULT_DEV))
}

fn disable_dpdk(tree: &mut Map) {
    set_plugin(tree, DPDK_PLUGIN, "disable");
    tree.shift_remove(DPDK_KEY);
}

fn set_plugin(tree: &mut Map, name: &str, value: &str) {
    tree.entry(PLUGINS_KEY.to_string())
        .or_insert_with(Value::mapping)
        .make_mapping()
        .entry(PLUGIN_KEY.to_string())
        .or_insert_with(Value::mapping)
        .make_mapping()
        .insert(name.to_string(), Value::scalar(value));
}

fn to_pretty_json(tree: &Map) -> Result<String, ConfigError> {
    let json = serde_json::Value::Object(map_to_json(tree));
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    json.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::map_from_json;
    use serde_json::json;
    use tempfile::TempDir;

    fn map(json: serde_json::Value) -> Map {
        map_from_json(json).unwrap()
    }

    fn mgr(dir: &TempDir, template: serde_json::Value, overrides: PluginOverrides) -> ConfigMgr {
        ConfigMgr::new(
            Template::from_json(template).unwrap(),
            OutputPaths::in_dir(dir.path()),
            overrides,
        )
    }

    #[test]
    fn test_update_does_not_mutate_template() {
        let dir = TempDir::new().unwrap();
        let mut cfg = mgr(&dir, json!({"unix": {"nodaemon": ""}}), PluginOverrides::default());

        cfg.update(&map(json!({"unix": {"log": "/var/log/vpp.log"}})));
        cfg.update(&map(json!({"cpu": {"main-core": "1"}})));

        assert_eq!(cfg.template().as_map(), &map(json!({"unix": {"nodaemon": ""}})));
        assert_eq!(
            cfg.working_tree(),
            Some(&map(json!({"unix": {"nodaemon": ""}, "cpu": {"main-core": "1"}})))
        );
    }

    #[test]
    fn test_commit_with_device_keeps_dpdk() {
        let dir = TempDir::new().unwrap();
        let mut cfg = mgr(&dir, json!({"plugins": {"plugin": {}}}), PluginOverrides::default());

        cfg.update(&map(json!({"dpdk": {"dev": {"0000:00:08.0": {}}}})));
        let report = cfg.commit().unwrap();

        assert!(report.dpdk_enabled);
        assert!(report.startup_conf.contains("dev 0000:00:08.0 { }"));
        assert!(!report.startup_conf.contains("dpdk_plugin.so"));
        assert!(cfg.working_tree().is_none());
    }

    #[test]
    fn test_commit_placeholder_device_disables_dpdk() {
        let dir = TempDir::new().unwrap();
        let mut cfg = mgr(&dir, json!({"plugins": {"plugin": {}}}), PluginOverrides::default());

        cfg.update(&map(json!({"dpdk": {"dev": {"default": {}}}})));
        let report = cfg.commit().unwrap();

        assert!(!report.dpdk_enabled);
        assert!(report
            .startup_conf
            .contains("plugin dpdk_plugin.so { disable }"));
        assert!(!report.startup_conf.contains("dpdk {"));
        assert!(!report.startup_conf.contains("dev "));
    }

    #[test]
    fn test_commit_env_overrides() {
        let dir = TempDir::new().unwrap();
        let overrides = PluginOverrides {
            disable_dpdk: true,
            disable_linux_nl: true,
        };
        let mut cfg = mgr(&dir, json!({"plugins": {"plugin": {}}}), overrides);

        cfg.update(&map(json!({"dpdk": {"dev": {"0000:00:08.0": {}}}})));
        let report = cfg.commit().unwrap();

        assert!(!report.dpdk_enabled);
        assert!(report
            .startup_conf
            .contains("plugin linux_nl_plugin.so { disable }"));
        assert!(report
            .startup_conf
            .contains("plugin dpdk_plugin.so { disable }"));
        assert!(!report.startup_conf.contains("0000:00:08.0"));
    }

    #[test]
    fn test_commit_creates_missing_plugin_sections() {
        let dir = TempDir::new().unwrap();
        let mut cfg = mgr(&dir, json!({"plugins": "none"}), PluginOverrides::default());

        cfg.update(&Map::new());
        let report = cfg.commit().unwrap();
        assert_eq!(
            report.startup_conf,
            "plugins {\n    plugin dpdk_plugin.so { disable }\n}\n"
        );
    }

    #[test]
    fn test_commit_writes_vports_and_json() {
        let dir = TempDir::new().unwrap();
        let mut cfg = mgr(&dir, json!({"plugins": {"plugin": {}}}), PluginOverrides::default());

        cfg.update(&map(json!({"vports": {"Ethernet0": "", "Ethernet4": ""}})));
        let report = cfg.commit().unwrap();

        let outputs = cfg.outputs();
        assert_eq!(
            std::fs::read_to_string(&outputs.bootup_conf).unwrap(),
            "create host-interface name Ethernet0\ncreate host-interface name Ethernet4\n"
        );
        assert_eq!(
            std::fs::read_to_string(&outputs.startup_conf).unwrap(),
            report.startup_conf
        );
        assert!(!report.startup_conf.contains("Ethernet0"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&outputs.startup_json).unwrap())
                .unwrap();
        assert_eq!(json["vports"]["Ethernet0"], "");
        assert_eq!(json["plugins"]["plugin"]["dpdk_plugin.so"], "disable");
    }

    #[test]
    fn test_repeated_cycles_render_identically() {
        let dir = TempDir::new().unwrap();
        let mut cfg = mgr(
            &dir,
            json!({"unix": {"nodaemon": ""}, "plugins": {"plugin": {"default": "disable"}}}),
            PluginOverrides::default(),
        );
        let overrides = map(json!({"dpdk": {"dev": {"0000:00:08.0": {"name": "bobm0"}}}}));

        cfg.update(&overrides);
        let first = cfg.commit().unwrap();
        cfg.update(&overrides);
        let second = cfg.commit().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_commit_without_update_renders_empty_state() {
        let dir = TempDir::new().unwrap();
        let mut cfg = mgr(&dir, json!({"unix": {}}), PluginOverrides::default());

        let report = cfg.commit().unwrap();
        assert_eq!(
            report.startup_conf,
            "plugins {\n    plugin dpdk_plugin.so { disable }\n}\n"
        );
    }

    #[test]
    fn test_failed_commit_keeps_working_tree() {
        let dir = TempDir::new().unwrap();
        let mut cfg = mgr(&dir, json!({}), PluginOverrides::default());
        std::fs::create_dir(dir.path().join(".startup.json.tmp")).unwrap();

        cfg.update(&map(json!({"unix": {}})));
        assert!(cfg.commit().is_err());
        assert!(cfg.working_tree().is_some());
    }

    #[test]
    fn test_startup_json_uses_four_space_indent() {
        let json = to_pretty_json(&map(json!({"unix": {"nodaemon": ""}}))).unwrap();
        assert_eq!(json, "{\n    \"unix\": {\n        \"nodaemon\": \"\"\n    }\n}");
    }
}
