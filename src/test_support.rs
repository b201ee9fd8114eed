use crate::collectors::{GpuSession, MetricsSource, Partition, PartitionUsage, ProbeError};
use crate::config::Config;
use crate::snapshot::{CpuInfo, MemoryInfo, StorageInfo, SwapInfo, SystemSnapshot};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const LSCPU_SAMPLE: &[u8] =
    br#"{"lscpu":[{"field":"Architecture:","data":"x86_64"},{"field":"CPU(s):","data":"4"}]}"#;

pub fn sample_snapshot() -> SystemSnapshot {
    SystemSnapshot {
        timestamp: chrono::Utc::now(),
        memory: MemoryInfo {
            total: 16_000,
            available: 9_000,
            used: 7_000,
        },
        swap: SwapInfo {
            total: 2_000,
            used: 500,
            free: 1_500,
        },
        storage: vec![
            StorageInfo {
                device: "/dev/sda1".to_string(),
                total: 100_000,
                used: 40_000,
                free: 60_000,
            },
            StorageInfo {
                device: "/dev/sdb1".to_string(),
                total: 500_000,
                used: 1_000,
                free: 499_000,
            },
        ],
        cpu: CpuInfo {
            total_cores: 4,
            usage_per_core: vec![12.5, 3.25, 99.0, 0.1],
        },
        gpu_usage: 37.5,
        architecture: serde_json::from_slice(LSCPU_SAMPLE).ok(),
    }
}

pub fn test_config(url: &str) -> Config {
    Config {
        url: url.to_string(),
        token: "secret-token".to_string(),
        request_timeout_secs: Some(5),
        ..Config::default()
    }
}

/// Scripted GPU library. Counts how many sessions were released.
pub struct FakeGpu {
    pub devices: Vec<Option<u32>>,
    pub fail_count: bool,
    pub released: Arc<AtomicUsize>,
}

impl FakeGpu {
    pub fn with_devices(devices: Vec<Option<u32>>) -> Self {
        Self {
            devices,
            fail_count: false,
            released: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct FakeGpuSession<'a> {
    gpu: &'a FakeGpu,
}

impl GpuSession for FakeGpuSession<'_> {
    fn device_count(&self) -> Result<u32, ProbeError> {
        if self.gpu.fail_count {
            return Err(ProbeError::Gpu("device count unavailable".to_string()));
        }
        Ok(self.gpu.devices.len() as u32)
    }

    fn utilization(&self, index: u32) -> Result<u32, ProbeError> {
        self.gpu
            .devices
            .get(index as usize)
            .copied()
            .flatten()
            .ok_or_else(|| ProbeError::Gpu(format!("device {index} unreadable")))
    }
}

impl Drop for FakeGpuSession<'_> {
    fn drop(&mut self) {
        self.gpu.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory probe set; each probe can be told to fail.
pub struct FakeSource {
    pub fail_memory: bool,
    pub fail_swap: bool,
    pub fail_partitions: bool,
    pub partitions: Vec<Partition>,
    pub failing_mounts: Vec<PathBuf>,
    pub fail_cpu_count: bool,
    pub fail_cpu_usage: bool,
    pub cpu_windows: Arc<Mutex<Vec<Duration>>>,
    pub gpu: Option<FakeGpu>,
    pub architecture: Result<Vec<u8>, ()>,
}

impl FakeSource {
    pub fn healthy() -> Self {
        Self {
            fail_memory: false,
            fail_swap: false,
            fail_partitions: false,
            partitions: vec![
                Partition {
                    device: "/dev/sda1".to_string(),
                    mount_point: "/".into(),
                },
                Partition {
                    device: "/dev/sdb1".to_string(),
                    mount_point: "/data".into(),
                },
            ],
            failing_mounts: Vec::new(),
            fail_cpu_count: false,
            fail_cpu_usage: false,
            cpu_windows: Arc::new(Mutex::new(Vec::new())),
            gpu: Some(FakeGpu::with_devices(vec![Some(40), Some(60)])),
            architecture: Ok(LSCPU_SAMPLE.to_vec()),
        }
    }
}

impl MetricsSource for FakeSource {
    fn memory(&mut self) -> Result<MemoryInfo, ProbeError> {
        if self.fail_memory {
            return Err(ProbeError::Unavailable("memory statistics"));
        }
        Ok(MemoryInfo {
            total: 16_000,
            available: 9_000,
            used: 7_000,
        })
    }

    fn swap(&mut self) -> Result<SwapInfo, ProbeError> {
        if self.fail_swap {
            return Err(ProbeError::Unavailable("swap statistics"));
        }
        Ok(SwapInfo {
            total: 2_000,
            used: 500,
            free: 1_500,
        })
    }

    fn partitions(&mut self) -> Result<Vec<Partition>, ProbeError> {
        if self.fail_partitions {
            return Err(ProbeError::Unavailable("partition table"));
        }
        Ok(self.partitions.clone())
    }

    fn partition_usage(&mut self, partition: &Partition) -> Result<PartitionUsage, ProbeError> {
        if self.failing_mounts.contains(&partition.mount_point) {
            return Err(ProbeError::Partition {
                mount: partition.mount_point.display().to_string(),
            });
        }
        Ok(PartitionUsage {
            total: 1_000,
            used: 250,
            free: 750,
        })
    }

    fn cpu_count(&mut self) -> Result<u32, ProbeError> {
        if self.fail_cpu_count {
            return Err(ProbeError::Unavailable("cpu list"));
        }
        Ok(4)
    }

    fn cpu_usage_per_core(&mut self, window: Duration) -> Result<Vec<f64>, ProbeError> {
        self.cpu_windows
            .lock()
            .map_err(|_| ProbeError::Unavailable("cpu window log"))?
            .push(window);
        if self.fail_cpu_usage {
            return Err(ProbeError::Unavailable("per-core cpu usage"));
        }
        Ok(vec![10.0, 20.0, 30.0, 40.0])
    }

    fn gpu_session(&mut self) -> Result<Box<dyn GpuSession + '_>, ProbeError> {
        match &self.gpu {
            Some(gpu) => Ok(Box::new(FakeGpuSession { gpu })),
            None => Err(ProbeError::Unavailable("nvml")),
        }
    }

    fn architecture_output(&mut self) -> Result<Vec<u8>, ProbeError> {
        self.architecture.clone().map_err(|()| ProbeError::CommandFailed {
            command: "lscpu",
            status: failed_exit_status(),
        })
    }
}

#[cfg(unix)]
fn failed_exit_status() -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(1 << 8)
}

#[cfg(windows)]
fn failed_exit_status() -> std::process::ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(1)
}

#[derive(Debug, Clone)]
pub struct ReceivedReport {
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: serde_json::Value,
}

#[derive(Clone)]
struct IngestState {
    status: StatusCode,
    received: Arc<Mutex<Vec<ReceivedReport>>>,
}

/// Local stand-in for the remote collector. Answers every POST with a fixed status.
pub struct CollectorServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedReport>>>,
    task: tokio::task::JoinHandle<()>,
}

impl CollectorServer {
    pub async fn start(status: StatusCode) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/ingest", post(ingest))
            .with_state(IngestState {
                status,
                received: received.clone(),
            });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            addr,
            received,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/ingest", self.addr)
    }

    pub fn received(&self) -> Vec<ReceivedReport> {
        self.received.lock().unwrap().clone()
    }
}

impl Drop for CollectorServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn ingest(State(state): State<IngestState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let report = ReceivedReport {
        authorization: text(header::AUTHORIZATION),
        content_type: text(header::CONTENT_TYPE),
        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
    };
    state.received.lock().unwrap().push(report);
    state.status
}
