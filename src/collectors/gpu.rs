use crate::collectors::{GpuSession, ProbeError};
use std::process::Command;

/// Opens a GPU session for one probe. NVML is preferred; when it cannot be
/// loaded the `nvidia-smi` binary is queried instead.
pub fn open_session() -> Result<Box<dyn GpuSession>, ProbeError> {
    if let Some(session) = open_nvml() {
        return Ok(session);
    }
    SmiSession::query().map(|s| Box::new(s) as Box<dyn GpuSession>)
}

#[cfg(feature = "nvml")]
fn open_nvml() -> Option<Box<dyn GpuSession>> {
    match nvml::NvmlSession::init() {
        Ok(session) => Some(Box::new(session)),
        Err(err) => {
            tracing::debug!(error = %err, "nvml unavailable, trying nvidia-smi");
            None
        }
    }
}

#[cfg(not(feature = "nvml"))]
fn open_nvml() -> Option<Box<dyn GpuSession>> {
    None
}

#[cfg(feature = "nvml")]
mod nvml {
    use crate::collectors::{GpuSession, ProbeError};
    use nvml_wrapper::Nvml;
    use tracing::{debug, warn};

    pub struct NvmlSession {
        nvml: Option<Nvml>,
    }

    impl NvmlSession {
        pub fn init() -> Result<Self, ProbeError> {
            let nvml = Nvml::init().map_err(|e| ProbeError::Gpu(e.to_string()))?;
            Ok(Self { nvml: Some(nvml) })
        }

        fn handle(&self) -> Result<&Nvml, ProbeError> {
            self.nvml
                .as_ref()
                .ok_or(ProbeError::Unavailable("nvml"))
        }
    }

    impl GpuSession for NvmlSession {
        fn device_count(&self) -> Result<u32, ProbeError> {
            self.handle()?
                .device_count()
                .map_err(|e| ProbeError::Gpu(e.to_string()))
        }

        fn utilization(&self, index: u32) -> Result<u32, ProbeError> {
            let device = self
                .handle()?
                .device_by_index(index)
                .map_err(|e| ProbeError::Gpu(e.to_string()))?;
            let rates = device
                .utilization_rates()
                .map_err(|e| ProbeError::Gpu(e.to_string()))?;
            Ok(rates.gpu)
        }
    }

    impl Drop for NvmlSession {
        fn drop(&mut self) {
            if let Some(nvml) = self.nvml.take() {
                match nvml.shutdown() {
                    Ok(()) => debug!("nvml released"),
                    Err(err) => warn!(error = %err, "nvml shutdown failed"),
                }
            }
        }
    }
}

/// Utilization read once from `nvidia-smi`. Holds no library resources.
struct SmiSession {
    devices: Vec<Option<u32>>,
}

impl SmiSession {
    fn query() -> Result<Self, ProbeError> {
        let output = run_nvidia_smi(&[
            "--query-gpu=utilization.gpu",
            "--format=csv,noheader,nounits",
        ])
        .ok_or(ProbeError::Unavailable("nvidia-smi"))?;
        if !output.status.success() {
            return Err(ProbeError::CommandFailed {
                command: "nvidia-smi",
                status: output.status,
            });
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(Self {
            devices: parse_smi_utilization(&text),
        })
    }
}

impl GpuSession for SmiSession {
    fn device_count(&self) -> Result<u32, ProbeError> {
        Ok(self.devices.len() as u32)
    }

    fn utilization(&self, index: u32) -> Result<u32, ProbeError> {
        self.devices
            .get(index as usize)
            .copied()
            .flatten()
            .ok_or_else(|| ProbeError::Gpu(format!("no utilization for device {index}")))
    }
}

fn run_nvidia_smi(args: &[&str]) -> Option<std::process::Output> {
    if let Ok(output) = Command::new("nvidia-smi").args(args).output() {
        return Some(output);
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(output) = Command::new(r"C:\Windows\System32\nvidia-smi.exe")
            .args(args)
            .output()
        {
            return Some(output);
        }
    }

    None
}

/// One line per device. Lines that don't hold a number (e.g. `[N/A]`) are
/// kept as unreadable devices.
fn parse_smi_utilization(text: &str) -> Vec<Option<u32>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| parse_f64_loose(line).map(|v| v.clamp(0.0, 100.0).round() as u32))
        .collect()
}

fn parse_f64_loose(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Some(v);
    }

    let filtered: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == '-')
        .collect();
    if filtered.is_empty() {
        return None;
    }

    filtered.replace(',', ".").parse::<f64>().ok()
}
