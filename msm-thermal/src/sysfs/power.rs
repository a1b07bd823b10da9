use nix::sys::reboot::{RebootMode, reboot};

use crate::hw::PowerControl;
use crate::tracing::prelude::*;

/// Flush filesystems and power off through `reboot(2)`.
///
/// Needs `CAP_SYS_BOOT`.
pub struct SystemPowerOff;

impl PowerControl for SystemPowerOff {
    fn critical_shutdown(&self) {
        nix::unistd::sync();

        match reboot(RebootMode::RB_POWER_OFF) {
            Ok(never) => match never {},
            Err(e) => error!(error = %e, "Power off failed"),
        }
    }
}

/// Logs instead of powering off. For bring-up and testing on a desk.
pub struct DryRunPowerOff;

impl PowerControl for DryRunPowerOff {
    fn critical_shutdown(&self) {
        error!("Critical temperature reached; dry run, not powering off");
    }
}
