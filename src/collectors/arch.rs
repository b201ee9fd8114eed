use crate::collectors::ProbeError;
use crate::snapshot::Architecture;
use std::process::Command;

const LSCPU: &str = "lscpu";

pub fn run_lscpu() -> Result<Vec<u8>, ProbeError> {
    let output = Command::new(LSCPU)
        .arg("--json")
        .output()
        .map_err(|source| ProbeError::Spawn {
            command: LSCPU,
            source,
        })?;
    if !output.status.success() {
        return Err(ProbeError::CommandFailed {
            command: LSCPU,
            status: output.status,
        });
    }
    Ok(output.stdout)
}

/// Accepts any JSON object; the keys are not interpreted.
pub fn parse_architecture(raw: &[u8]) -> Result<Architecture, ProbeError> {
    Ok(serde_json::from_slice(raw)?)
}
