use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reported in place of a GPU reading when no device is present or the probe failed.
pub const GPU_UNAVAILABLE: f64 = -1.0;

/// Free-form `lscpu --json` document, kept in the order the tool printed it.
pub type Architecture = serde_json::Map<String, serde_json::Value>;

/// One capture of every monitored sub-metric. Built once by the collector and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    pub timestamp: DateTime<Utc>,
    pub memory: MemoryInfo,
    pub swap: SwapInfo,
    pub storage: Vec<StorageInfo>,
    pub cpu: CpuInfo,
    pub gpu_usage: f64,
    pub architecture: Option<Architecture>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total: u64,
    pub available: u64,
    pub used: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapInfo {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub device: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuInfo {
    pub total_cores: u32,
    pub usage_per_core: Vec<f64>,
}

impl SystemSnapshot {
    pub fn has_gpu_reading(&self) -> bool {
        self.gpu_usage != GPU_UNAVAILABLE
    }
}
