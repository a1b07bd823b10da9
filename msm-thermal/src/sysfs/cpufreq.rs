use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::read_value;
use crate::hw::{CpuFreq, CpuId, Khz, PolicyError, PolicyHandle};
use crate::tracing::prelude::*;

/// cpufreq policies under `/sys/devices/system/cpu`.
pub struct SysfsCpuFreq {
    root: PathBuf,
    possible: Vec<CpuId>,
}

impl SysfsCpuFreq {
    /// Enumerate possible CPUs from `<root>/possible`.
    pub async fn discover(root: &Path) -> io::Result<Self> {
        let path = root.join("possible");
        let list = tokio::fs::read_to_string(&path).await?;
        let possible = parse_cpulist(&list).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: malformed cpu list {:?}", path.display(), list.trim()),
            )
        })?;

        debug!(cpus = ?possible, "Discovered possible CPUs");

        Ok(Self {
            root: root.to_path_buf(),
            possible,
        })
    }

    fn attr(&self, cpu: CpuId, name: &str) -> PathBuf {
        self.root
            .join(format!("cpu{cpu}"))
            .join("cpufreq")
            .join(name)
    }

    async fn read_policy(&self, cpu: CpuId) -> io::Result<PolicyHandle> {
        Ok(PolicyHandle {
            cpu,
            min_khz: read_value(&self.attr(cpu, "scaling_min_freq")).await?,
            max_khz: read_value(&self.attr(cpu, "scaling_max_freq")).await?,
            cpuinfo_max_khz: read_value(&self.attr(cpu, "cpuinfo_max_freq")).await?,
        })
    }
}

#[async_trait]
impl CpuFreq for SysfsCpuFreq {
    fn possible_cpus(&self) -> &[CpuId] {
        &self.possible
    }

    async fn policy(&mut self, cpu: CpuId) -> Option<PolicyHandle> {
        match self.read_policy(cpu).await {
            Ok(policy) => Some(policy),
            Err(e) => {
                trace!(cpu, error = %e, "cpufreq policy unavailable");
                None
            }
        }
    }

    async fn set_policy_max(
        &mut self,
        policy: &PolicyHandle,
        khz: Khz,
    ) -> Result<(), PolicyError> {
        let cpu = policy.cpu;
        tokio::fs::write(self.attr(cpu, "scaling_max_freq"), format!("{khz}\n"))
            .await
            .map_err(|source| PolicyError::Io { cpu, source })
    }
}

/// Parse a kernel cpu list such as `0-3,6,8-9`.
pub fn parse_cpulist(list: &str) -> Option<Vec<CpuId>> {
    let list = list.trim();
    if list.is_empty() {
        return Some(Vec::new());
    }

    let mut cpus = Vec::new();
    for part in list.split(',') {
        match part.split_once('-') {
            Some((first, last)) => {
                let first: CpuId = first.parse().ok()?;
                let last: CpuId = last.parse().ok()?;
                if first > last {
                    return None;
                }
                cpus.extend(first..=last);
            }
            None => cpus.push(part.parse().ok()?),
        }
    }

    cpus.sort_unstable();
    cpus.dedup();
    Some(cpus)
}
