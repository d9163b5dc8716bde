//! Persisted artifacts of a commit.

use std::path::{Path, PathBuf};

use log::warn;

use super::error::ConfigError;

pub const VPP_CONFIG_JSON_PATH: &str = "/etc/sonic/vpp/startup.json";
pub const VPP_BOOTUP_CFG_PATH: &str = "/etc/sonic/vpp/bootup.conf";
pub const VPP_CFG_STARTUP_PATH: &str = "/etc/sonic/vpp/startup.conf";

/// Locations of the three files rewritten on every commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// Merged tree as JSON.
    pub startup_json: PathBuf,
    /// Host-interface bring-up commands.
    pub bootup_conf: PathBuf,
    /// VPP startup configuration.
    pub startup_conf: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            startup_json: PathBuf::from(VPP_CONFIG_JSON_PATH),
            bootup_conf: PathBuf::from(VPP_BOOTUP_CFG_PATH),
            startup_conf: PathBuf::from(VPP_CFG_STARTUP_PATH),
        }
    }
}

impl OutputPaths {
    /// Standard file names under `dir`.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            startup_json: dir.join("startup.json"),
            bootup_conf: dir.join("bootup.conf"),
            startup_conf: dir.join("startup.conf"),
        }
    }

    /// Writes all three files or none of them.
    ///
    /// Contents go to hidden sibling files first; the targets are only
    /// replaced once every temporary file has been written.
    pub fn write_all(
        &self,
        startup_json: &str,
        bootup_conf: &str,
        startup_conf: &str,
    ) -> Result<(), ConfigError> {
        let files = [
            (&self.startup_json, startup_json),
            (&self.bootup_conf, bootup_conf),
            (&self.startup_conf, startup_conf),
        ];

        let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(files.len());
        for (target, content) in files {
            match stage(target, content) {
                Ok(tmp) => staged.push((tmp, target.as_path())),
                Err(e) => {
                    discard(&staged);
                    return Err(e);
                }
            }
        }

        for (tmp, target) in &staged {
            std::fs::rename(tmp, target).map_err(|e| ConfigError::ReplaceFile {
                path: target.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

/// Atomically replaces a single file. Used by callers outside the commit
/// path that still want readers to never see a partial file.
pub fn write_atomic(target: &Path, content: &str) -> Result<(), ConfigError> {
    let tmp = stage(target, content)?;
    std::fs::rename(&tmp, target).map_err(|e| ConfigError::ReplaceFile {
        path: target.to_path_buf(),
        source: e,
    })
}

fn stage(target: &Path, content: &str) -> Result<PathBuf, ConfigError> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::CreateDirectory {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let tmp = temp_path(target);
    std::fs::write(&tmp, content).map_err(|e| ConfigError::WriteFile {
        path: tmp.clone(),
        source: e,
    })?;
    Ok(tmp)
}

fn temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".to_string());
    target.with_file_name(format!(".{}.tmp", name))
}

fn discard(staged: &[(PathBuf, &Path)]) {
    for (tmp, _) in staged {
        if let Err(e) = std::fs::remove_file(tmp) {
            warn!("Failed to remove temporary file {}: {}", tmp.display(), e);
        }
    }
}
