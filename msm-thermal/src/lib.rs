//! CPU thermal throttling for MSM8960/APQ8064 class devices.
//!
//! The [`thermal::ThermalController`] samples a temperature sensor, walks a
//! four-phase hysteresis machine and clamps every CPU's cpufreq ceiling to
//! the frequency of the active phase. Hardware access goes through the
//! traits in [`hw`], with Linux sysfs implementations in [`sysfs`].

pub mod api;
pub mod api_client;
pub mod config;
pub mod daemon;
pub mod error;
pub mod hw;
pub mod sysfs;
pub mod thermal;
pub mod tracing;
