use crate::collectors::{
    arch, gpu, GpuSession, MetricsSource, Partition, PartitionUsage, ProbeError,
};
use crate::snapshot::{MemoryInfo, SwapInfo};
use std::time::Duration;
use sysinfo::{CpuExt, DiskExt, System, SystemExt};

/// Probes the local machine through `sysinfo`, NVML and `lscpu`.
pub struct HostSource {
    system: System,
}

impl HostSource {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for HostSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for HostSource {
    fn memory(&mut self) -> Result<MemoryInfo, ProbeError> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return Err(ProbeError::Unavailable("memory statistics"));
        }
        Ok(MemoryInfo {
            total,
            available: self.system.available_memory(),
            used: self.system.used_memory(),
        })
    }

    fn swap(&mut self) -> Result<SwapInfo, ProbeError> {
        self.system.refresh_memory();
        Ok(SwapInfo {
            total: self.system.total_swap(),
            used: self.system.used_swap(),
            free: self.system.free_swap(),
        })
    }

    fn partitions(&mut self) -> Result<Vec<Partition>, ProbeError> {
        self.system.refresh_disks_list();
        Ok(self
            .system
            .disks()
            .iter()
            .map(|d| Partition {
                device: d.name().to_string_lossy().to_string(),
                mount_point: d.mount_point().to_path_buf(),
            })
            .collect())
    }

    fn partition_usage(&mut self, partition: &Partition) -> Result<PartitionUsage, ProbeError> {
        let failed = || ProbeError::Partition {
            mount: partition.mount_point.display().to_string(),
        };
        let disk = self
            .system
            .disks_mut()
            .iter_mut()
            .find(|d| d.mount_point() == partition.mount_point.as_path())
            .ok_or_else(failed)?;
        if !disk.refresh() {
            return Err(failed());
        }

        let total = disk.total_space();
        let free = disk.available_space();
        Ok(PartitionUsage {
            total,
            used: total.saturating_sub(free),
            free,
        })
    }

    fn cpu_count(&mut self) -> Result<u32, ProbeError> {
        self.system.refresh_cpu();
        match self.system.cpus().len() {
            0 => Err(ProbeError::Unavailable("cpu list")),
            n => Ok(n as u32),
        }
    }

    fn cpu_usage_per_core(&mut self, window: Duration) -> Result<Vec<f64>, ProbeError> {
        self.system.refresh_cpu();
        std::thread::sleep(window);
        self.system.refresh_cpu();

        let usage: Vec<f64> = self
            .system
            .cpus()
            .iter()
            .map(|c| f64::from(c.cpu_usage()))
            .collect();
        if usage.is_empty() {
            return Err(ProbeError::Unavailable("per-core cpu usage"));
        }
        Ok(usage)
    }

    fn gpu_session(&mut self) -> Result<Box<dyn GpuSession + '_>, ProbeError> {
        gpu::open_session()
    }

    fn architecture_output(&mut self) -> Result<Vec<u8>, ProbeError> {
        arch::run_lscpu()
    }
}
