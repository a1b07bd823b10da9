use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::hw::{Celsius, SensorError, TemperatureSensor};

/// Unit a thermal zone reports in.
///
/// Older MSM kernels expose TSENS readings in whole degrees; mainline
/// kernels use millidegrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    Celsius,
    #[default]
    Millicelsius,
}

/// `thermal_zoneN/temp` reader.
pub struct SysfsThermalZone {
    id: u32,
    path: PathBuf,
    unit: TemperatureUnit,
}

impl SysfsThermalZone {
    pub fn new(root: &Path, id: u32, unit: TemperatureUnit) -> Self {
        Self {
            id,
            path: root.join(format!("thermal_zone{id}")).join("temp"),
            unit,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn convert(&self, raw: &str) -> Result<Celsius, SensorError> {
        let parse_error = || SensorError::Parse {
            sensor: self.id,
            raw: raw.to_string(),
        };

        let value: i64 = raw.trim().parse().map_err(|_| parse_error())?;
        let degrees = match self.unit {
            TemperatureUnit::Celsius => value,
            TemperatureUnit::Millicelsius => value.div_euclid(1000),
        };

        Celsius::try_from(degrees).map_err(|_| parse_error())
    }
}

#[async_trait]
impl TemperatureSensor for SysfsThermalZone {
    fn id(&self) -> u32 {
        self.id
    }

    async fn read_temperature(&mut self) -> Result<Celsius, SensorError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SensorError::Io {
                sensor: self.id,
                source,
            })?;

        self.convert(&raw)
    }
}
