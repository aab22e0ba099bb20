use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::cancel::CancelFlag;
use crate::config::Config;
use crate::error::BatchError;

pub mod command;
pub mod probe;
pub mod progress;
pub mod runner;

use probe::ProbeResult;
use progress::ProgressSample;
use runner::{ProcessOutcome, ProcessRunner};

/// The two external programs a batch needs.
pub trait MediaTools {
    fn probe_duration(&self, path: &Path) -> Result<ProbeResult, BatchError>;

    fn run_ffmpeg(
        &self,
        args: &[PathBuf],
        cancel: &CancelFlag,
        on_sample: &mut dyn FnMut(&ProgressSample),
    ) -> Result<ProcessOutcome, BatchError>;
}

pub struct FFmpeg {
    ffprobe: PathBuf,
    runner: ProcessRunner,
    ffmpeg: PathBuf,
}

impl FFmpeg {
    pub fn new(config: &Config) -> Self {
        FFmpeg {
            ffprobe: config.ffprobe.clone(),
            runner: ProcessRunner::new(&config.ffmpeg, config.stderr_tail_lines),
            ffmpeg: config.ffmpeg.clone(),
        }
    }

    pub fn is_installed(&self) -> bool {
        [&self.ffmpeg, &self.ffprobe].iter().all(|program| {
            let cmd = Command::new(program)
                .arg("-version")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            match cmd {
                Ok(status) => status.success(),
                Err(_) => false,
            }
        })
    }
}

impl MediaTools for FFmpeg {
    fn probe_duration(&self, path: &Path) -> Result<ProbeResult, BatchError> {
        probe::probe_duration(&self.ffprobe, path)
    }

    fn run_ffmpeg(
        &self,
        args: &[PathBuf],
        cancel: &CancelFlag,
        on_sample: &mut dyn FnMut(&ProgressSample),
    ) -> Result<ProcessOutcome, BatchError> {
        self.runner.run(args, cancel, on_sample)
    }
}
