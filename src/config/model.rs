// src/config/model.rs

use serde::Deserialize;

use crate::bridge::SessionOptions;
use crate::vm::VmConfig;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [exec]
/// shell = "/bin/bash"
/// banner = "Connecting...\n"
///
/// [vm]
/// enabled = true
/// launcher = "/usr/bin/qemu-system-aarch64"
/// kernel_image = "/var/lib/execbridge/vmlinuz"
/// initial_ramdisk = "/var/lib/execbridge/initrd"
/// bootable_disk = "/var/lib/execbridge/disk.img"
/// cpus = 4
/// memory_mib = 2048
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Per-session exec behaviour from `[exec]`.
    #[serde(default)]
    pub exec: ExecSection,

    /// Guest VM boot settings from `[vm]`.
    #[serde(default)]
    pub vm: VmSection,
}

/// `[exec]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecSection {
    /// Command interpreter used for every exec request, invoked as
    /// `<shell> -c <command>`. Must be an absolute path.
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Optional banner written to the channel's error stream before each
    /// command starts.
    #[serde(default)]
    pub banner: Option<String>,
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

impl Default for ExecSection {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            banner: None,
        }
    }
}

/// `[vm]` section.
///
/// The path fields are optional here because the section itself is optional;
/// validation requires all of them once `enabled = true`.
#[derive(Debug, Clone, Deserialize)]
pub struct VmSection {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub launcher: Option<String>,

    #[serde(default)]
    pub kernel_image: Option<String>,

    #[serde(default)]
    pub initial_ramdisk: Option<String>,

    #[serde(default)]
    pub bootable_disk: Option<String>,

    #[serde(default = "default_cpus")]
    pub cpus: u32,

    #[serde(default = "default_memory_mib")]
    pub memory_mib: u64,

    #[serde(default = "default_kernel_cmdline")]
    pub kernel_cmdline: String,
}

fn default_cpus() -> u32 {
    4
}

fn default_memory_mib() -> u64 {
    2048
}

fn default_kernel_cmdline() -> String {
    "console=hvc0".to_string()
}

impl Default for VmSection {
    fn default() -> Self {
        Self {
            enabled: false,
            launcher: None,
            kernel_image: None,
            initial_ramdisk: None,
            bootable_disk: None,
            cpus: default_cpus(),
            memory_mib: default_memory_mib(),
            kernel_cmdline: default_kernel_cmdline(),
        }
    }
}

/// Validated configuration. Only obtainable through
/// `ConfigFile::try_from(raw)` (or `Default` for the built-in defaults), so
/// holding one means validation has passed.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub exec: ExecSection,
    /// Present only when `[vm].enabled = true` and all boot paths validated.
    pub vm: Option<VmConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(exec: ExecSection, vm: Option<VmConfig>) -> Self {
        Self { exec, vm }
    }

    /// Session options for new exec sessions, derived from `[exec]`.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            shell: self.exec.shell.clone().into(),
            banner: self.exec.banner.clone(),
        }
    }
}
