//! Plugin toggles read from the process environment.

/// Environment variable that force-disables the DPDK plugin.
pub const DPDK_DISABLE_ENV: &str = "DPDK_DISABLE";

/// Environment variable that disables the linux-nl plugin.
pub const NO_LINUX_NL_ENV: &str = "NO_LINUX_NL";

/// Plugin switches set outside of the configuration database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PluginOverrides {
    /// `DPDK_DISABLE=y`: disable the DPDK plugin on every commit.
    pub disable_dpdk: bool,
    /// `NO_LINUX_NL=y`: disable the linux-nl plugin on every commit.
    pub disable_linux_nl: bool,
}

impl PluginOverrides {
    /// Reads both toggles; only the exact value `y` enables one.
    pub fn from_env() -> Self {
        Self {
            disable_dpdk: env_flag(DPDK_DISABLE_ENV),
            disable_linux_nl: env_flag(NO_LINUX_NL_ENV),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "y").unwrap_or(false)
}
