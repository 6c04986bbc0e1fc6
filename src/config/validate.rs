// src/config/validate.rs

use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile, VmSection};
use crate::errors::{ExecBridgeError, Result};
use crate::vm::VmConfig;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::ExecBridgeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_exec(&raw)?;
        let vm = build_vm_config(&raw.vm)?;
        Ok(ConfigFile::new_unchecked(raw.exec, vm))
    }
}

fn validate_exec(cfg: &RawConfigFile) -> Result<()> {
    let shell = Path::new(&cfg.exec.shell);
    if !shell.is_absolute() {
        return Err(ExecBridgeError::Config(format!(
            "[exec].shell must be an absolute path (got '{}')",
            cfg.exec.shell
        )));
    }
    Ok(())
}

fn build_vm_config(vm: &VmSection) -> Result<Option<VmConfig>> {
    if !vm.enabled {
        return Ok(None);
    }

    if vm.cpus == 0 {
        return Err(ExecBridgeError::Config(
            "[vm].cpus must be >= 1 (got 0)".to_string(),
        ));
    }
    if vm.memory_mib < 64 {
        return Err(ExecBridgeError::Config(format!(
            "[vm].memory_mib must be >= 64 (got {})",
            vm.memory_mib
        )));
    }

    let launcher = require_path(&vm.launcher, "launcher")?;
    let kernel_image = require_path(&vm.kernel_image, "kernel_image")?;
    let initial_ramdisk = require_path(&vm.initial_ramdisk, "initial_ramdisk")?;
    let bootable_disk = require_path(&vm.bootable_disk, "bootable_disk")?;

    let mut config = VmConfig::new(launcher, kernel_image, initial_ramdisk, bootable_disk);
    config.cpus = vm.cpus;
    config.memory_mib = vm.memory_mib;
    config.kernel_cmdline = vm.kernel_cmdline.clone();
    Ok(Some(config))
}

fn require_path(value: &Option<String>, field: &str) -> Result<PathBuf> {
    match value {
        Some(s) if !s.is_empty() => Ok(PathBuf::from(s)),
        _ => Err(ExecBridgeError::Config(format!(
            "[vm].{field} is required when [vm].enabled = true"
        ))),
    }
}
