use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    /// Duration unavailable; progress for this file degrades to indeterminate.
    #[error("Error probing {path:?}: {msg}")]
    Probe { path: PathBuf, msg: String },

    #[error("{path:?} is too short to trim ({duration:.2}s <= {offset:.2}s)")]
    TooShort { path: PathBuf, duration: f64, offset: f64 },

    #[error("ffmpeg failed on {path:?} ({}){}", exit_description(.code), stderr_suffix(.stderr))]
    ProcessExit { path: PathBuf, code: Option<i32>, stderr: Vec<String> },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("unable to launch the batch worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("Error loading config {path:?}: {msg}")]
    Config { path: PathBuf, msg: String },
}

impl BatchError {
    pub fn probe(path: &Path, msg: &str) -> Self {
        BatchError::Probe {
            path: PathBuf::from(path),
            msg: String::from(msg),
        }
    }

    pub fn io(path: &Path, source: io::Error) -> Self {
        BatchError::Io {
            path: PathBuf::from(path),
            source,
        }
    }

    pub fn config(path: &Path, msg: &str) -> Self {
        BatchError::Config {
            path: PathBuf::from(path),
            msg: String::from(msg),
        }
    }

    /// Skips are not failures; the orchestrator files them separately.
    pub fn is_skip(&self) -> bool {
        matches!(self, BatchError::TooShort { .. })
    }
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with {}", code),
        None => String::from("terminated by signal"),
    }
}

fn stderr_suffix(stderr: &[String]) -> String {
    match stderr.last() {
        Some(line) => format!(": {}", line),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_exit_display() {
        let err = BatchError::ProcessExit {
            path: PathBuf::from("a.mp4"),
            code: Some(1),
            stderr: vec![String::from("first"), String::from("Invalid data found")],
        };
        assert_eq!(format!("{}", err), "ffmpeg failed on \"a.mp4\" (exited with 1): Invalid data found");

        let err = BatchError::ProcessExit { path: PathBuf::from("a.mp4"), code: None, stderr: vec![] };
        assert_eq!(format!("{}", err), "ffmpeg failed on \"a.mp4\" (terminated by signal)");
    }

    #[test]
    fn test_is_skip() {
        assert!(BatchError::TooShort { path: PathBuf::from("x"), duration: 1.0, offset: 3.03 }.is_skip());
        assert!(!BatchError::probe(Path::new("x"), "nope").is_skip());
    }
}
