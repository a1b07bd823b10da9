mod config;
mod controller;
mod shutdown;
mod state;

pub use config::{ConfigError, ConfigKey, SharedConfig, TemperatureBand, ThermalConfig};
pub use controller::{ThermalController, TickOutcome};
pub use shutdown::ShutdownGuard;
pub use state::{CapTarget, ThrottleDecision, ThrottlePhase, ThrottleState};
