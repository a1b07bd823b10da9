//! Linux sysfs implementations of the [`crate::hw`] traits.

mod cpufreq;
mod power;
mod thermal_zone;

pub use cpufreq::{SysfsCpuFreq, parse_cpulist};
pub use power::{DryRunPowerOff, SystemPowerOff};
pub use thermal_zone::{SysfsThermalZone, TemperatureUnit};

use std::io;
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_THERMAL_ROOT: &str = "/sys/class/thermal";
pub const DEFAULT_CPU_ROOT: &str = "/sys/devices/system/cpu";

/// Read a single whitespace-trimmed value from a sysfs attribute.
async fn read_value<T: FromStr>(path: &Path) -> io::Result<T> {
    let raw = tokio::fs::read_to_string(path).await?;
    raw.trim().parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: unexpected value {:?}", path.display(), raw.trim()),
        )
    })
}
