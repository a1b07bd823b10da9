use async_trait::async_trait;

use super::{CpuId, Khz};

/// Snapshot of one CPU's frequency policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyHandle {
    pub cpu: CpuId,
    /// Current policy floor.
    pub min_khz: Khz,
    /// Current policy ceiling.
    pub max_khz: Khz,
    /// Highest frequency the hardware supports.
    pub cpuinfo_max_khz: Khz,
}

/// Ceiling requested by the controller before per-CPU clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyCap {
    Limit(Khz),
    /// Lift the ceiling to the hardware maximum.
    NoLimit,
}

impl PolicyHandle {
    /// Resolve a requested cap to the value actually written.
    ///
    /// The result never exceeds the hardware maximum and never drops below
    /// the policy floor.
    pub fn clamp(&self, cap: FrequencyCap) -> Khz {
        let requested = match cap {
            FrequencyCap::Limit(khz) => khz,
            FrequencyCap::NoLimit => self.cpuinfo_max_khz,
        };

        requested.min(self.cpuinfo_max_khz).max(self.min_khz)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("cpu{cpu}: failed to update policy: {source}")]
    Io {
        cpu: CpuId,
        #[source]
        source: std::io::Error,
    },

    #[error("cpu{cpu}: policy rejected {khz} kHz")]
    Rejected { cpu: CpuId, khz: Khz },
}

/// Access to the per-CPU frequency policies.
#[async_trait]
pub trait CpuFreq: Send {
    /// Every CPU that may ever come online, in ascending order.
    fn possible_cpus(&self) -> &[CpuId];

    /// Current policy for `cpu`, or `None` if the CPU has no policy right
    /// now (offline, hot-unplugged).
    async fn policy(&mut self, cpu: CpuId) -> Option<PolicyHandle>;

    /// Set the policy ceiling. Writing the current value again is allowed
    /// and still performs the update.
    async fn set_policy_max(&mut self, policy: &PolicyHandle, khz: Khz)
    -> Result<(), PolicyError>;
}
