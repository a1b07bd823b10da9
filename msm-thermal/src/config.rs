//! Daemon configuration.
//!
//! Settings come from an optional JSON file named by `MSM_THERMAL_CONFIG`,
//! then individual environment variables override single fields. Anything
//! left unset falls back to the defaults below.

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::api::server::DEFAULT_PORT;
use crate::error::{Error, Result};
use crate::sysfs::{DEFAULT_CPU_ROOT, DEFAULT_THERMAL_ROOT, TemperatureUnit};
use crate::thermal::ThermalConfig;

pub const CONFIG_PATH_VAR: &str = "MSM_THERMAL_CONFIG";
pub const API_ADDR_VAR: &str = "MSM_THERMAL_API_ADDR";
pub const SENSOR_ID_VAR: &str = "MSM_THERMAL_SENSOR_ID";
pub const DRY_RUN_VAR: &str = "MSM_THERMAL_DRY_RUN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// API listen address.
    pub api_addr: SocketAddr,

    /// Directory holding the `thermal_zoneN` entries.
    pub thermal_root: PathBuf,

    /// Unit of the thermal zone's `temp` attribute.
    pub sensor_unit: TemperatureUnit,

    /// Directory holding `possible` and the `cpuN/cpufreq` entries.
    pub cpu_root: PathBuf,

    /// Log instead of powering off at the shutdown temperature.
    pub dry_run: bool,

    pub thermal: ThermalConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            api_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            thermal_root: PathBuf::from(DEFAULT_THERMAL_ROOT),
            sensor_unit: TemperatureUnit::default(),
            cpu_root: PathBuf::from(DEFAULT_CPU_ROOT),
            dry_run: false,
            thermal: ThermalConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load from the environment: file first, then per-field overrides.
    pub fn load() -> Result<Self> {
        let mut config = match env::var_os(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|name| env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply overrides looked up by variable name.
    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(API_ADDR_VAR) {
            self.api_addr = addr
                .parse()
                .map_err(|_| Error::Other(format!("{API_ADDR_VAR}: invalid address {addr:?}")))?;
        }

        if let Some(id) = lookup(SENSOR_ID_VAR) {
            self.thermal.sensor_id = id
                .parse()
                .map_err(|_| Error::Other(format!("{SENSOR_ID_VAR}: invalid sensor id {id:?}")))?;
        }

        if let Some(flag) = lookup(DRY_RUN_VAR) {
            self.dry_run = matches!(flag.as_str(), "1" | "true" | "yes");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_listen_on_localhost() {
        let config = DaemonConfig::default();

        assert_eq!(config.api_addr, "127.0.0.1:7786".parse().unwrap());
        assert_eq!(config.thermal_root, PathBuf::from("/sys/class/thermal"));
        assert!(!config.dry_run);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"dry_run": true, "sensor_unit": "celsius", "thermal": {{"sensor_id": 7, "shutdown_temp": 85}}}}"#
        )
        .unwrap();

        let config = DaemonConfig::from_file(file.path()).unwrap();

        assert!(config.dry_run);
        assert_eq!(config.sensor_unit, TemperatureUnit::Celsius);
        assert_eq!(config.thermal.sensor_id, 7);
        assert_eq!(config.thermal.shutdown_temp, 85);
        assert_eq!(config.thermal.poll_ms, ThermalConfig::default().poll_ms);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();

        assert!(matches!(
            DaemonConfig::from_file(file.path()),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn environment_overrides_apply() {
        let mut config = DaemonConfig::default();

        config
            .apply_overrides(overrides(&[
                (API_ADDR_VAR, "0.0.0.0:9000"),
                (SENSOR_ID_VAR, "5"),
                (DRY_RUN_VAR, "1"),
            ]))
            .unwrap();

        assert_eq!(config.api_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.thermal.sensor_id, 5);
        assert!(config.dry_run);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let mut config = DaemonConfig::default();

        let result = config.apply_overrides(overrides(&[(SENSOR_ID_VAR, "seven")]));

        assert!(matches!(result, Err(Error::Other(_))));
    }
}
