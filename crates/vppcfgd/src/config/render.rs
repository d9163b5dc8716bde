//! Rendering of the merged tree into VPP `startup.conf` syntax.
//!
//! Mappings open a `key {` ... `}` block; empty mappings collapse to
//! `key { }`. Two keys get bespoke treatment: entries under `dev` render as
//! `dev <pci-address> { ... }` blocks and entries under `plugin` render as
//! `plugin <name> { <value> }` lines. Scalars render as `key value`, or a
//! bare `key` when the value is empty. `vports` never reaches the output.

use std::fmt::Write;

use crate::value::{Map, Value};

pub const INDENT: &str = "    ";

/// Key whose entries become host-interface bring-up commands.
pub const VPORTS_KEY: &str = "vports";
pub const DEV_KEY: &str = "dev";
pub const PLUGIN_KEY: &str = "plugin";

/// Renders the whole tree.
pub fn render_startup(tree: &Map) -> String {
    let mut out = String::new();
    gen_conf(tree, "", &mut out);
    out
}

/// One `create host-interface` command per entry under `vports`.
pub fn vports_commands(tree: &Map) -> String {
    let mut out = String::new();
    if let Some(Value::Mapping(vports)) = tree.get(VPORTS_KEY) {
        for name in vports.keys() {
            let _ = writeln!(out, "create host-interface name {}", name);
        }
    }
    out
}

fn gen_conf(cfg: &Map, indent: &str, out: &mut String) {
    for (key, val) in cfg {
        match val {
            Value::Mapping(child) => match key.as_str() {
                VPORTS_KEY => continue,
                DEV_KEY => gen_dpdk_dev(child, indent, out),
                PLUGIN_KEY => gen_plugins(child, indent, out),
                _ => gen_block(key, child, indent, out, gen_conf),
            },
            Value::Scalar(s) => gen_leaf(key, s, indent, out),
        }
    }
}

fn gen_dpdk_dev(cfg: &Map, indent: &str, out: &mut String) {
    for (key, val) in cfg {
        match val {
            Value::Mapping(child) => {
                gen_block(&format!("dev {}", key), child, indent, out, gen_dpdk_dev)
            }
            Value::Scalar(s) => gen_leaf(key, s, indent, out),
        }
    }
}

fn gen_plugins(cfg: &Map, indent: &str, out: &mut String) {
    for (key, val) in cfg {
        match val {
            Value::Scalar(s) => {
                let _ = writeln!(out, "{}plugin {} {{ {} }}", indent, key, s);
            }
            Value::Mapping(child) => {
                gen_block(&format!("plugin {}", key), child, indent, out, gen_conf)
            }
        }
    }
}

fn gen_block(
    header: &str,
    child: &Map,
    indent: &str,
    out: &mut String,
    body: fn(&Map, &str, &mut String),
) {
    if child.is_empty() {
        let _ = writeln!(out, "{}{} {{ }}", indent, header);
        return;
    }
    let _ = writeln!(out, "{}{} {{", indent, header);
    body(child, &format!("{}{}", indent, INDENT), out);
    let _ = writeln!(out, "{}}}", indent);
}

fn gen_leaf(key: &str, value: &str, indent: &str, out: &mut String) {
    if value.is_empty() {
        let _ = writeln!(out, "{}{}", indent, key);
    } else {
        let _ = writeln!(out, "{}{} {}", indent, key, value);
    }
}
