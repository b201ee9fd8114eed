pub mod arch;
pub mod gpu;
pub mod system;

use crate::snapshot::{
    Architecture, CpuInfo, MemoryInfo, StorageInfo, SwapInfo, SystemSnapshot, GPU_UNAVAILABLE,
};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Per-core utilization is measured over this window. It is the floor on cycle time.
pub const CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0} is not available on this host")]
    Unavailable(&'static str),
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: &'static str,
        source: std::io::Error,
    },
    #[error("{command} exited with {status}")]
    CommandFailed {
        command: &'static str,
        status: std::process::ExitStatus,
    },
    #[error("malformed probe output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("partition {mount} could not be queried")]
    Partition { mount: String },
    #[error("gpu: {0}")]
    Gpu(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub device: String,
    pub mount_point: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// A live handle on the GPU management library. Dropping it releases the library.
pub trait GpuSession {
    fn device_count(&self) -> Result<u32, ProbeError>;
    fn utilization(&self, index: u32) -> Result<u32, ProbeError>;
}

/// Independent host probes. Any of them may fail without affecting the others.
pub trait MetricsSource {
    fn memory(&mut self) -> Result<MemoryInfo, ProbeError>;
    fn swap(&mut self) -> Result<SwapInfo, ProbeError>;
    fn partitions(&mut self) -> Result<Vec<Partition>, ProbeError>;
    fn partition_usage(&mut self, partition: &Partition) -> Result<PartitionUsage, ProbeError>;
    fn cpu_count(&mut self) -> Result<u32, ProbeError>;
    /// Blocks for `window` while utilization is sampled.
    fn cpu_usage_per_core(&mut self, window: Duration) -> Result<Vec<f64>, ProbeError>;
    fn gpu_session(&mut self) -> Result<Box<dyn GpuSession + '_>, ProbeError>;
    /// Raw stdout of the architecture probe command.
    fn architecture_output(&mut self) -> Result<Vec<u8>, ProbeError>;
}

pub struct Collector<S> {
    source: S,
    last_timestamp: Option<DateTime<Utc>>,
}

impl<S: MetricsSource> Collector<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            last_timestamp: None,
        }
    }

    /// Builds a complete snapshot. Never fails: each failed probe degrades to a
    /// zero value or the GPU sentinel and is logged.
    pub fn collect(&mut self) -> SystemSnapshot {
        let timestamp = self.next_timestamp();
        let memory = self.collect_memory();
        let swap = self.collect_swap();
        let storage = self.collect_storage();
        let cpu = self.collect_cpu();
        let gpu_usage = self.collect_gpu_usage();
        let architecture = self.collect_architecture();

        SystemSnapshot {
            timestamp,
            memory,
            swap,
            storage,
            cpu,
            gpu_usage,
            architecture,
        }
    }

    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if last > now => {
                debug!(%last, %now, "wall clock stepped backwards, reusing previous timestamp");
                last
            }
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn collect_memory(&mut self) -> MemoryInfo {
        self.source.memory().unwrap_or_else(|err| {
            warn!(error = %err, "memory probe failed");
            MemoryInfo::default()
        })
    }

    fn collect_swap(&mut self) -> SwapInfo {
        self.source.swap().unwrap_or_else(|err| {
            warn!(error = %err, "swap probe failed");
            SwapInfo::default()
        })
    }

    fn collect_storage(&mut self) -> Vec<StorageInfo> {
        let partitions = match self.source.partitions() {
            Ok(p) => p,
            Err(err) => {
                warn!(error = %err, "partition enumeration failed");
                return Vec::new();
            }
        };

        let mut out = Vec::with_capacity(partitions.len());
        for partition in &partitions {
            match self.source.partition_usage(partition) {
                Ok(usage) => out.push(StorageInfo {
                    device: partition.device.clone(),
                    total: usage.total,
                    used: usage.used,
                    free: usage.free,
                }),
                Err(err) => {
                    warn!(
                        mount = %partition.mount_point.display(),
                        error = %err,
                        "disk usage probe failed"
                    );
                }
            }
        }
        out
    }

    fn collect_cpu(&mut self) -> CpuInfo {
        let total_cores = match self.source.cpu_count() {
            Ok(n) => n,
            Err(err) => {
                warn!(error = %err, "cpu core count probe failed");
                return CpuInfo::default();
            }
        };

        let usage_per_core = self
            .source
            .cpu_usage_per_core(CPU_SAMPLE_WINDOW)
            .unwrap_or_else(|err| {
                warn!(error = %err, "cpu usage probe failed");
                Vec::new()
            });

        CpuInfo {
            total_cores,
            usage_per_core,
        }
    }

    fn collect_gpu_usage(&mut self) -> f64 {
        let session = match self.source.gpu_session() {
            Ok(s) => s,
            Err(err) => {
                warn!(error = %err, "gpu library unavailable");
                return GPU_UNAVAILABLE;
            }
        };
        average_gpu_usage(session.as_ref())
    }

    fn collect_architecture(&mut self) -> Option<Architecture> {
        let parsed = self
            .source
            .architecture_output()
            .and_then(|raw| arch::parse_architecture(&raw));
        match parsed {
            Ok(map) => Some(map),
            Err(err) => {
                warn!(error = %err, "architecture probe failed");
                None
            }
        }
    }
}

/// Averages utilization over every installed device. Unreadable devices add
/// zero but still count toward the divisor.
fn average_gpu_usage(session: &dyn GpuSession) -> f64 {
    let count = match session.device_count() {
        Ok(n) => n,
        Err(err) => {
            warn!(error = %err, "gpu device count failed");
            return GPU_UNAVAILABLE;
        }
    };
    if count == 0 {
        return GPU_UNAVAILABLE;
    }

    let mut total = 0_u64;
    for index in 0..count {
        match session.utilization(index) {
            Ok(pct) => total += u64::from(pct),
            Err(err) => warn!(device = index, error = %err, "gpu utilization read failed"),
        }
    }

    (total as f64 / f64::from(count)).clamp(0.0, 100.0)
}
