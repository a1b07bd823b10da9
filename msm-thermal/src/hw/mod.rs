//! Hardware collaborators consumed by the thermal controller.
//!
//! The controller never touches hardware directly. It reads temperatures,
//! adjusts cpufreq ceilings and requests power-off through these traits,
//! which keeps the control loop testable without a device.

mod cpufreq;
#[cfg(test)]
pub(crate) mod fake;
mod power;
mod sensor;

pub use cpufreq::{CpuFreq, FrequencyCap, PolicyError, PolicyHandle};
pub use power::PowerControl;
pub use sensor::{SensorError, TemperatureSensor};

/// Whole degrees Celsius.
pub type Celsius = i32;

/// CPU frequency in kHz, the unit cpufreq uses.
pub type Khz = u32;

/// Logical CPU number.
pub type CpuId = u32;
