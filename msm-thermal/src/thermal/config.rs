use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use utoipa::ToSchema;

use super::state::ThrottlePhase;
use crate::hw::{Celsius, Khz};

/// One hysteresis band: throttle at or above `high`, release below `low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TemperatureBand {
    pub high: Celsius,
    pub low: Celsius,
    /// Ceiling applied while this band is active (kHz).
    pub freq: Khz,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ThermalConfig {
    /// Sensor sampled on every tick.
    pub sensor_id: u32,

    /// Power the device off at or above this temperature (°C).
    pub shutdown_temp: Celsius,

    /// Mildest band, entered from the unthrottled state.
    pub low: TemperatureBand,
    pub mid: TemperatureBand,
    /// Hottest band, applied whenever the temperature is at or above its
    /// `high` threshold.
    pub max: TemperatureBand,

    /// Tick interval while unthrottled (ms).
    pub poll_ms: u32,
    /// Tick interval in phase 1 (ms).
    pub low_poll_ms: u32,
    /// Tick interval in phases 2 and 3, and after a failed sensor read (ms).
    pub mid_max_poll_ms: u32,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            sensor_id: 0,
            shutdown_temp: 80,
            low: TemperatureBand {
                high: 65,
                low: 60,
                freq: 1_242_000,
            },
            mid: TemperatureBand {
                high: 70,
                low: 65,
                freq: 1_026_000,
            },
            max: TemperatureBand {
                high: 75,
                low: 70,
                freq: 810_000,
            },
            poll_ms: 500,
            low_poll_ms: 250,
            mid_max_poll_ms: 100,
        }
    }
}

/// Names of the runtime-tunable values.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConfigKey {
    ShutdownTemp,
    AllowedMaxHigh,
    AllowedMaxLow,
    AllowedMaxFreq,
    AllowedMidHigh,
    AllowedMidLow,
    AllowedMidFreq,
    AllowedLowHigh,
    AllowedLowLow,
    AllowedLowFreq,
    PollMs,
    LowPollMs,
    MidMaxPollMs,
}

impl ConfigKey {
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        name.parse()
            .map_err(|_| ConfigError::UnknownKey(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("band thresholds must ascend: low {low} < mid {mid} < max {max}")]
    BandsOutOfOrder {
        low: Celsius,
        mid: Celsius,
        max: Celsius,
    },

    #[error("{band} band needs low < high, got low {low} and high {high}")]
    EmptyHysteresis {
        band: &'static str,
        low: Celsius,
        high: Celsius,
    },

    #[error("{0} must be greater than zero")]
    ZeroInterval(ConfigKey),

    #[error("{value} is out of range for {key}")]
    OutOfRange { key: ConfigKey, value: i64 },

    #[error("unknown configuration key {0:?}")]
    UnknownKey(String),
}

impl ThermalConfig {
    /// Check the ordering invariants the transition rules depend on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (band, range) in [("low", &self.low), ("mid", &self.mid), ("max", &self.max)] {
            if range.low >= range.high {
                return Err(ConfigError::EmptyHysteresis {
                    band,
                    low: range.low,
                    high: range.high,
                });
            }
        }

        if !(self.low.high < self.mid.high && self.mid.high < self.max.high) {
            return Err(ConfigError::BandsOutOfOrder {
                low: self.low.high,
                mid: self.mid.high,
                max: self.max.high,
            });
        }

        for key in [ConfigKey::PollMs, ConfigKey::LowPollMs, ConfigKey::MidMaxPollMs] {
            if self.get(key) == 0 {
                return Err(ConfigError::ZeroInterval(key));
            }
        }

        Ok(())
    }

    pub fn get(&self, key: ConfigKey) -> i64 {
        match key {
            ConfigKey::ShutdownTemp => self.shutdown_temp.into(),
            ConfigKey::AllowedMaxHigh => self.max.high.into(),
            ConfigKey::AllowedMaxLow => self.max.low.into(),
            ConfigKey::AllowedMaxFreq => self.max.freq.into(),
            ConfigKey::AllowedMidHigh => self.mid.high.into(),
            ConfigKey::AllowedMidLow => self.mid.low.into(),
            ConfigKey::AllowedMidFreq => self.mid.freq.into(),
            ConfigKey::AllowedLowHigh => self.low.high.into(),
            ConfigKey::AllowedLowLow => self.low.low.into(),
            ConfigKey::AllowedLowFreq => self.low.freq.into(),
            ConfigKey::PollMs => self.poll_ms.into(),
            ConfigKey::LowPollMs => self.low_poll_ms.into(),
            ConfigKey::MidMaxPollMs => self.mid_max_poll_ms.into(),
        }
    }

    /// Set a single value. Only the value's range is checked here; use
    /// [`validate`](Self::validate) for the cross-field invariants.
    pub fn set(&mut self, key: ConfigKey, value: i64) -> Result<(), ConfigError> {
        let out_of_range = || ConfigError::OutOfRange { key, value };
        let temp = || Celsius::try_from(value).map_err(|_| out_of_range());
        let unsigned = || u32::try_from(value).map_err(|_| out_of_range());

        match key {
            ConfigKey::ShutdownTemp => self.shutdown_temp = temp()?,
            ConfigKey::AllowedMaxHigh => self.max.high = temp()?,
            ConfigKey::AllowedMaxLow => self.max.low = temp()?,
            ConfigKey::AllowedMaxFreq => self.max.freq = unsigned()?,
            ConfigKey::AllowedMidHigh => self.mid.high = temp()?,
            ConfigKey::AllowedMidLow => self.mid.low = temp()?,
            ConfigKey::AllowedMidFreq => self.mid.freq = unsigned()?,
            ConfigKey::AllowedLowHigh => self.low.high = temp()?,
            ConfigKey::AllowedLowLow => self.low.low = temp()?,
            ConfigKey::AllowedLowFreq => self.low.freq = unsigned()?,
            ConfigKey::PollMs => self.poll_ms = unsigned()?,
            ConfigKey::LowPollMs => self.low_poll_ms = unsigned()?,
            ConfigKey::MidMaxPollMs => self.mid_max_poll_ms = unsigned()?,
        }

        Ok(())
    }

    /// Delay before the tick that follows one ending in `phase`.
    pub fn poll_interval(&self, phase: ThrottlePhase) -> Duration {
        let ms = match phase {
            ThrottlePhase::Unthrottled => self.poll_ms,
            ThrottlePhase::Phase1 => self.low_poll_ms,
            ThrottlePhase::Phase2 | ThrottlePhase::Phase3 => self.mid_max_poll_ms,
        };
        Duration::from_millis(ms.into())
    }

    /// Delay after a failed sensor read.
    pub fn failure_poll_interval(&self) -> Duration {
        Duration::from_millis(self.mid_max_poll_ms.into())
    }
}

/// Live configuration shared between the controller and the API.
///
/// Every committed value has passed [`ThermalConfig::validate`]. The
/// controller takes a [`snapshot`](Self::snapshot) at the start of each
/// tick, so updates apply from the next tick on.
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<RwLock<ThermalConfig>>);

impl SharedConfig {
    pub fn new(config: ThermalConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self(Arc::new(RwLock::new(config))))
    }

    pub fn snapshot(&self) -> ThermalConfig {
        self.0.read().clone()
    }

    pub fn get(&self, key: ConfigKey) -> i64 {
        self.0.read().get(key)
    }

    pub fn set(&self, key: ConfigKey, value: i64) -> Result<ThermalConfig, ConfigError> {
        self.update(|config| config.set(key, value))
    }

    /// Apply `edit` to a copy and commit it only if the result validates.
    pub fn update<F>(&self, edit: F) -> Result<ThermalConfig, ConfigError>
    where
        F: FnOnce(&mut ThermalConfig) -> Result<(), ConfigError>,
    {
        let mut current = self.0.write();
        let mut candidate = current.clone();
        edit(&mut candidate)?;
        candidate.validate()?;
        *current = candidate.clone();
        Ok(candidate)
    }
}
