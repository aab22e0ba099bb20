use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;

use crate::error::BatchError;

#[derive(Clone, Debug, PartialEq)]
pub struct ProbeResult {
    pub path: PathBuf,
    /// Container duration in seconds; always finite and positive.
    pub duration: f64,
}

#[derive(Deserialize, Debug)]
struct FFProbeJsonOutput {
    pub format: Option<FFProbeJsonFormat>,
}

#[derive(Deserialize, Debug)]
struct FFProbeJsonFormat {
    pub duration: Option<String>,
}

pub fn probe_duration(ffprobe: &Path, path: &Path) -> Result<ProbeResult, BatchError> {
    let output = Command::new(ffprobe)
        .args([
            Path::new("-v"), Path::new("error"),
            Path::new("-show_entries"), Path::new("format=duration"),
            Path::new("-of"), Path::new("json"),
            path,
        ])
        .stdin(Stdio::null())
        .output()
        .map_err(|e| BatchError::probe(path, &format!("unable to run {:?}: {}", ffprobe, e)))?;
    if output.status.success() {
        let utf8 = String::from_utf8(output.stdout)
            .map_err(|_| BatchError::probe(path, "ffprobe output is not UTF-8."))?;
        parse_duration(path, &utf8)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(BatchError::probe(path, &format!("ffprobe did not exit successfully. {}", stderr.trim())))
    }
}

pub fn parse_duration(path: &Path, json: &str) -> Result<ProbeResult, BatchError> {
    let deserialized = serde_json::from_str::<FFProbeJsonOutput>(json)
        .map_err(|e| BatchError::probe(path, &format!("unexpected ffprobe output: {}", e)))?;
    let raw = deserialized.format
        .and_then(|f| f.duration)
        .ok_or_else(|| BatchError::probe(path, "ffprobe reported no duration."))?;
    match raw.trim().parse::<f64>() {
        Ok(duration) if duration.is_finite() && duration > 0.0 => Ok(ProbeResult {
            path: PathBuf::from(path),
            duration,
        }),
        Ok(duration) => Err(BatchError::probe(path, &format!("duration {} is not usable.", duration))),
        Err(_) => Err(BatchError::probe(path, &format!("duration '{}' is not a number.", raw))),
    }
}
