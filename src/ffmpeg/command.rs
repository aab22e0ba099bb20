use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::config::Config;
use crate::error::BatchError;
use crate::ffmpeg::probe::ProbeResult;
use crate::fstools::absolute;

/// Audio-only transcodes always write mp3, whatever `audio_codec` says.
pub const AUDIO_ONLY_CODEC: &str = "libmp3lame";
pub const AUDIO_ONLY_EXTENSION: &str = "mp3";

/// `-t` is written with millisecond precision; anything shorter would round
/// to an empty output.
const MIN_TRIM_SECONDS: f64 = 0.001;

fn pbs(s: &str) -> PathBuf { PathBuf::from(s) }

/// Machine-readable progress on stdout, overwrite without prompting, and only
/// errors plus the periodic stats line on stderr.
fn common_args() -> Vec<PathBuf> {
    vec![
        pbs("-hide_banner"),
        pbs("-loglevel"), pbs("error"),
        pbs("-progress"), pbs("pipe:1"),
        pbs("-y"),
    ]
}

pub fn transcode_args(config: &Config, input: &Path, output: &Path) -> Vec<PathBuf> {
    let mut args = common_args();
    args.push(pbs("-i")); args.push(PathBuf::from(input));

    if config.audio_only {
        args.push(pbs("-vn"));
        args.push(pbs("-c:a")); args.push(pbs(AUDIO_ONLY_CODEC));
    } else {
        args.push(pbs("-c:v")); args.push(pbs(&config.video_codec));
        args.push(pbs("-b:v")); args.push(pbs(&config.video_bitrate));
        args.push(pbs("-c:a")); args.push(pbs(&config.audio_codec));
    }
    args.push(pbs("-b:a")); args.push(pbs(&config.audio_bitrate));

    args.push(PathBuf::from(output));
    args
}

/// Where a trim ends, or `None` when the offset eats the whole file.
pub fn trim_end(duration: f64, offset: f64) -> Option<f64> {
    let end = duration - offset;
    if end < MIN_TRIM_SECONDS {
        None
    } else {
        Some(end)
    }
}

pub fn trim_args(config: &Config, input: &Path, probe: Option<&ProbeResult>, output: &Path) -> Result<Vec<PathBuf>, BatchError> {
    let Some(probe) = probe else {
        return Err(BatchError::probe(input, "duration unknown; cannot compute trim end."));
    };
    let Some(end) = trim_end(probe.duration, config.trim_offset) else {
        return Err(BatchError::TooShort {
            path: PathBuf::from(input),
            duration: probe.duration,
            offset: config.trim_offset,
        });
    };

    let mut args = common_args();
    args.push(pbs("-i")); args.push(PathBuf::from(input));
    args.push(pbs("-t")); args.push(pbs(&format!("{:.3}", end)));
    args.push(pbs("-c")); args.push(pbs("copy"));
    args.push(pbs("-avoid_negative_ts")); args.push(pbs("make_zero"));
    args.push(PathBuf::from(output));
    Ok(args)
}

pub fn manifest_entry(path: &Path) -> String {
    let path = absolute(path).to_string_lossy().into_owned();
    // backslash is an ordinary filename character outside windows
    #[cfg(windows)]
    let path = path.replace('\\', "/");
    format!("file '{}'", path.replace('\'', "'\\''"))
}

/// Writes the concat list in `dir`. The file is removed when the handle is
/// closed or dropped.
pub fn write_manifest(dir: &Path, inputs: &[PathBuf]) -> Result<NamedTempFile, BatchError> {
    let mut manifest = tempfile::Builder::new()
        .prefix("ffbatch-concat-")
        .suffix(".txt")
        .tempfile_in(dir)
        .map_err(|e| BatchError::io(dir, e))?;
    for input in inputs {
        writeln!(manifest, "{}", manifest_entry(input)).map_err(|e| BatchError::io(manifest.path(), e))?;
    }
    manifest.flush().map_err(|e| BatchError::io(manifest.path(), e))?;
    Ok(manifest)
}

pub fn merge_args(config: &Config, manifest: &Path, output: &Path) -> Vec<PathBuf> {
    let mut args = common_args();
    args.push(pbs("-f")); args.push(pbs("concat"));
    args.push(pbs("-safe")); args.push(pbs("0"));
    args.push(pbs("-i")); args.push(PathBuf::from(manifest));

    args.push(pbs("-c:v")); args.push(pbs(&config.video_codec));
    args.push(pbs("-crf")); args.push(pbs(&config.crf.to_string()));
    args.push(pbs("-pix_fmt")); args.push(pbs(&config.pix_fmt));
    args.push(pbs("-c:a")); args.push(pbs(&config.audio_codec));
    args.push(pbs("-b:a")); args.push(pbs(&config.audio_bitrate));

    // concatenated inputs rarely start at zero
    args.push(pbs("-avoid_negative_ts")); args.push(pbs("make_zero"));
    args.push(pbs("-movflags")); args.push(pbs("+faststart"));

    args.push(PathBuf::from(output));
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use crate::fstools::generate_output_filename;

    fn strs(args: &[PathBuf]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn window(args: &[String], pair: [&str; 2]) -> bool {
        args.windows(2).any(|w| w[0] == pair[0] && w[1] == pair[1])
    }

    #[test]
    fn test_transcode_args() {
        let config = Config::default();
        let args = strs(&transcode_args(&config, Path::new("in.webm"), Path::new("out.mp4")));
        assert_eq!(&args[..7], ["-hide_banner", "-loglevel", "error", "-progress", "pipe:1", "-y", "-i"]);
        assert!(window(&args, ["-b:v", "2M"]));
        assert!(!args.contains(&String::from("-vn")));
        assert_eq!(args.last().unwrap(), "out.mp4");

        let config = Config::default().audio_only(true).bitrate("320k");
        let args = strs(&transcode_args(&config, Path::new("in.webm"), Path::new("out.mp3")));
        assert!(args.contains(&String::from("-vn")));
        assert!(window(&args, ["-b:a", "320k"]));
        assert!(!args.contains(&String::from("-c:v")));
    }

    #[test]
    fn test_audio_only_codec_matches_container() {
        let config = Config::default().audio_only(true);
        assert_eq!(config.audio_codec, "aac");
        let output = generate_output_filename(Path::new("/m/song.webm"), None, "transcoded", Some(AUDIO_ONLY_EXTENSION));
        assert_eq!(output, PathBuf::from("/m/song.transcoded.mp3"));

        let args = strs(&transcode_args(&config, Path::new("/m/song.webm"), &output));
        assert!(window(&args, ["-c:a", "libmp3lame"]));
        assert!(!args.contains(&String::from("aac")));
        assert_eq!(args.iter().filter(|a| *a == "-c:a").count(), 1);
    }

    #[test]
    fn test_trim_args() {
        let config = Config::default();
        let probe = ProbeResult { path: PathBuf::from("a.mp4"), duration: 10.0 };
        let args = strs(&trim_args(&config, Path::new("a.mp4"), Some(&probe), Path::new("b.mp4")).unwrap());
        assert!(window(&args, ["-t", "6.970"]));
        assert!(window(&args, ["-c", "copy"]));
    }

    #[test]
    fn test_trim_too_short() {
        let config = Config::default();
        let probe = ProbeResult { path: PathBuf::from("a.mp4"), duration: 3.03 };
        let result = trim_args(&config, Path::new("a.mp4"), Some(&probe), Path::new("b.mp4"));
        assert!(matches!(result, Err(BatchError::TooShort { .. })));

        let result = trim_args(&config, Path::new("a.mp4"), None, Path::new("b.mp4"));
        assert!(matches!(result, Err(BatchError::Probe { .. })));
    }

    #[test]
    fn test_trim_end() {
        assert_eq!(trim_end(2.0, 3.03), None);
        assert_eq!(trim_end(3.03, 3.03), None);
        assert_eq!(trim_end(5.0, 1.0), Some(4.0));
        assert_eq!(trim_end(3.0304, 3.03), None);
        assert!(trim_end(3.032, 3.03).is_some());
    }

    #[test]
    fn test_trim_rounding_to_zero_is_too_short() {
        let config = Config::default();
        let probe = ProbeResult { path: PathBuf::from("a.mp4"), duration: config.trim_offset + 0.0004 };
        let result = trim_args(&config, Path::new("a.mp4"), Some(&probe), Path::new("b.mp4"));
        assert!(matches!(result, Err(BatchError::TooShort { .. })));
    }

    #[test]
    fn test_manifest_entry_escapes_quotes() {
        assert_eq!(manifest_entry(Path::new("/music/it's.mp4")), "file '/music/it'\\''s.mp4'");
    }

    #[cfg(unix)]
    #[test]
    fn test_manifest_entry_keeps_backslashes() {
        assert_eq!(manifest_entry(Path::new("/music/AC\\DC.mp4")), "file '/music/AC\\DC.mp4'");
    }

    #[test]
    fn test_write_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![PathBuf::from("/a/one.mp4"), PathBuf::from("/b/two.mp4")];
        let manifest = write_manifest(dir.path(), &inputs).unwrap();
        let path = manifest.path().to_path_buf();
        assert_eq!(fs::read_to_string(&path).unwrap(), "file '/a/one.mp4'\nfile '/b/two.mp4'\n");
        manifest.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_merge_args() {
        let config = Config::default();
        let args = strs(&merge_args(&config, Path::new("/tmp/list.txt"), Path::new("merged.mp4")));
        assert!(window(&args, ["-f", "concat"]));
        assert!(window(&args, ["-i", "/tmp/list.txt"]));
        assert!(window(&args, ["-crf", "23"]));
        assert!(window(&args, ["-movflags", "+faststart"]));
        assert_eq!(args.last().unwrap(), "merged.mp4");
    }
}
