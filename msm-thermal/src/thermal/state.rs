use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use utoipa::ToSchema;

use super::config::ThermalConfig;
use crate::hw::{Celsius, CpuId, FrequencyCap, Khz};

/// Throttle severity, ordered from none to most severe.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ThrottlePhase {
    #[default]
    Unthrottled,
    Phase1,
    Phase2,
    Phase3,
}

/// Ceiling selected by a transition, before per-CPU resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapTarget {
    Frequency(Khz),
    /// Return to the ceiling recorded while unthrottled.
    Restore,
}

/// Outcome of evaluating one temperature sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Critical temperature; power off and stop ticking.
    Shutdown,
    /// Apply `cap` to every CPU, then commit `next`.
    Transition { cap: CapTarget, next: ThrottlePhase },
    /// Keep the current ceilings and phase.
    Hold,
}

impl ThrottleDecision {
    /// Evaluate the transition rules for a reading of `temp` in `phase`.
    ///
    /// Rules are tried in a fixed order and the first match wins. With a
    /// validated config a reading sitting exactly on a band's `high`
    /// threshold can never also satisfy that band's release rule.
    pub fn evaluate(temp: Celsius, phase: ThrottlePhase, config: &ThermalConfig) -> Self {
        use ThrottlePhase::*;

        let to = |cap, next| ThrottleDecision::Transition { cap, next };

        if temp >= config.shutdown_temp {
            ThrottleDecision::Shutdown
        } else if temp >= config.low.high && temp < config.mid.high && phase == Unthrottled {
            to(CapTarget::Frequency(config.low.freq), Phase1)
        } else if temp < config.low.low && phase > Unthrottled {
            to(CapTarget::Restore, Unthrottled)
        } else if temp >= config.mid.high && temp < config.max.high && phase < Phase2 {
            to(CapTarget::Frequency(config.mid.freq), Phase2)
        } else if temp < config.mid.low && phase > Phase1 {
            to(CapTarget::Frequency(config.low.freq), Phase1)
        } else if temp >= config.max.high {
            to(CapTarget::Frequency(config.max.freq), Phase3)
        } else if temp < config.max.low && phase > Phase2 {
            to(CapTarget::Frequency(config.mid.freq), Phase2)
        } else {
            ThrottleDecision::Hold
        }
    }
}

/// Mutable throttle state owned by the controller.
#[derive(Debug, Default)]
pub struct ThrottleState {
    phase: ThrottlePhase,
    /// Per-CPU ceiling observed while unthrottled, restored on release.
    restore_ceilings: BTreeMap<CpuId, Khz>,
}

impl ThrottleState {
    pub fn phase(&self) -> ThrottlePhase {
        self.phase
    }

    pub fn record_ceiling(&mut self, cpu: CpuId, khz: Khz) {
        self.restore_ceilings.insert(cpu, khz);
    }

    /// Cap that undoes throttling for `cpu`.
    pub fn restore_cap(&self, cpu: CpuId) -> FrequencyCap {
        match self.restore_ceilings.get(&cpu) {
            Some(&khz) => FrequencyCap::Limit(khz),
            None => FrequencyCap::NoLimit,
        }
    }

    pub fn commit(&mut self, phase: ThrottlePhase) {
        self.phase = phase;
    }
}
