use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::BatchError;

/// Seconds cut from the end of every file in trim mode.
pub const DEFAULT_TRIM_OFFSET: f64 = 3.03;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub video_codec: String,
    pub audio_codec: String,
    pub video_bitrate: String,
    pub audio_bitrate: String,
    pub audio_only: bool,
    pub crf: u8,
    pub pix_fmt: String,
    pub trim_offset: f64,
    pub temp_dir: Option<PathBuf>,
    pub stderr_tail_lines: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            video_codec: String::from("libx264"),
            audio_codec: String::from("aac"),
            video_bitrate: String::from("2M"),
            audio_bitrate: String::from("192k"),
            audio_only: false,
            crf: 23,
            pix_fmt: String::from("yuv420p"),
            trim_offset: DEFAULT_TRIM_OFFSET,
            temp_dir: None,
            stderr_tail_lines: 20,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, BatchError> {
        let json = fs::read_to_string(path).map_err(|e| BatchError::io(path, e))?;
        Config::from_json(path, &json)
    }

    fn from_json(path: &Path, json: &str) -> Result<Self, BatchError> {
        let config = serde_json::from_str::<Config>(json)
            .map_err(|e| BatchError::config(path, &e.to_string()))?;
        if !config.trim_offset.is_finite() || config.trim_offset < 0.0 {
            return Err(BatchError::config(path, &format!("trim_offset must be a non-negative number, got {}", config.trim_offset)));
        }
        Ok(config)
    }

    pub fn audio_only(mut self, audio_only: bool) -> Self {
        self.audio_only = audio_only;
        self
    }

    pub fn bitrate(mut self, bitrate: &str) -> Self {
        if self.audio_only {
            self.audio_bitrate = String::from(bitrate);
        } else {
            self.video_bitrate = String::from(bitrate);
        }
        self
    }

    pub fn trim_offset(mut self, seconds: f64) -> Self {
        self.trim_offset = seconds;
        self
    }

    pub fn crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    pub fn temp_dir(&self) -> PathBuf {
        match &self.temp_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir(),
        }
    }
}
