//! In-memory collaborators for controller and API tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    Celsius, CpuFreq, CpuId, Khz, PolicyError, PolicyHandle, PowerControl, SensorError,
    TemperatureSensor,
};

/// Sensor whose next reading is set by the test.
#[derive(Clone, Default)]
pub(crate) struct FakeSensor {
    reading: Arc<Mutex<Option<Celsius>>>,
    reads: Arc<AtomicUsize>,
}

impl FakeSensor {
    /// `None` makes subsequent reads fail.
    pub(crate) fn set(&self, reading: Option<Celsius>) {
        *self.reading.lock() = reading;
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TemperatureSensor for FakeSensor {
    fn id(&self) -> u32 {
        0
    }

    async fn read_temperature(&mut self) -> Result<Celsius, SensorError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        (*self.reading.lock()).ok_or(SensorError::Unavailable(0))
    }
}

#[derive(Default)]
struct CpuFreqState {
    policies: BTreeMap<CpuId, PolicyHandle>,
    failing: BTreeSet<CpuId>,
    writes: Vec<(CpuId, Khz)>,
}

/// cpufreq with a fixed set of possible CPUs and a write log.
#[derive(Clone)]
pub(crate) struct FakeCpuFreq {
    possible: Vec<CpuId>,
    state: Arc<Mutex<CpuFreqState>>,
}

pub(crate) const FAKE_MIN_KHZ: Khz = 384_000;
pub(crate) const FAKE_MAX_KHZ: Khz = 1_728_000;

impl FakeCpuFreq {
    /// `cpus` possible CPUs, all online at full speed.
    pub(crate) fn new(cpus: CpuId) -> Self {
        let possible: Vec<CpuId> = (0..cpus).collect();
        let policies = possible
            .iter()
            .map(|&cpu| {
                (
                    cpu,
                    PolicyHandle {
                        cpu,
                        min_khz: FAKE_MIN_KHZ,
                        max_khz: FAKE_MAX_KHZ,
                        cpuinfo_max_khz: FAKE_MAX_KHZ,
                    },
                )
            })
            .collect();

        Self {
            possible,
            state: Arc::new(Mutex::new(CpuFreqState {
                policies,
                ..Default::default()
            })),
        }
    }

    pub(crate) fn unplug(&self, cpu: CpuId) {
        self.state.lock().policies.remove(&cpu);
    }

    pub(crate) fn fail_writes(&self, cpu: CpuId) {
        self.state.lock().failing.insert(cpu);
    }

    pub(crate) fn accept_writes(&self, cpu: CpuId) {
        self.state.lock().failing.remove(&cpu);
    }

    pub(crate) fn set_max(&self, cpu: CpuId, khz: Khz) {
        if let Some(policy) = self.state.lock().policies.get_mut(&cpu) {
            policy.max_khz = khz;
        }
    }

    pub(crate) fn max(&self, cpu: CpuId) -> Option<Khz> {
        self.state.lock().policies.get(&cpu).map(|p| p.max_khz)
    }

    /// Drain the write log.
    pub(crate) fn take_writes(&self) -> Vec<(CpuId, Khz)> {
        std::mem::take(&mut self.state.lock().writes)
    }
}

#[async_trait]
impl CpuFreq for FakeCpuFreq {
    fn possible_cpus(&self) -> &[CpuId] {
        &self.possible
    }

    async fn policy(&mut self, cpu: CpuId) -> Option<PolicyHandle> {
        self.state.lock().policies.get(&cpu).copied()
    }

    async fn set_policy_max(
        &mut self,
        policy: &PolicyHandle,
        khz: Khz,
    ) -> Result<(), PolicyError> {
        let mut state = self.state.lock();
        if state.failing.contains(&policy.cpu) {
            return Err(PolicyError::Rejected {
                cpu: policy.cpu,
                khz,
            });
        }
        state.writes.push((policy.cpu, khz));
        if let Some(p) = state.policies.get_mut(&policy.cpu) {
            p.max_khz = khz;
        }
        Ok(())
    }
}

/// Counts power-off requests instead of acting on them.
#[derive(Default)]
pub(crate) struct FakePower {
    calls: AtomicUsize,
}

impl FakePower {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PowerControl for FakePower {
    fn critical_shutdown(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}
