//! API data transfer objects.
//!
//! These types define the API contract shared between the server and
//! clients.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::hw::{Celsius, CpuId, Khz};
use crate::thermal::{ConfigKey, ThrottlePhase};

/// Controller status snapshot, published after every tick.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct ControllerStatus {
    pub phase: ThrottlePhase,
    /// Last successful reading, if any.
    pub temperature_c: Option<Celsius>,
    /// Ceilings this controller has written, per CPU.
    pub ceilings: Vec<CpuCeiling>,
    pub next_poll_ms: u64,
    /// Failed sensor reads since the last good one.
    pub sensor_failures: u32,
    pub shutdown_triggered: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct CpuCeiling {
    pub cpu: CpuId,
    pub khz: Khz,
}

/// One named configuration value.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct ConfigValue {
    pub key: ConfigKey,
    pub value: i64,
}

/// Body of `PUT /config/{key}`.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct SetValueRequest {
    pub value: i64,
}

/// Body of `PATCH /config`: values keyed by name, applied atomically.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct ConfigPatchRequest {
    pub values: BTreeMap<String, i64>,
}
