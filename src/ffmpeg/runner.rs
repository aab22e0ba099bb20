use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{ChildStderr, ChildStdout, Command, Stdio};
use std::thread;

use tracing::{debug, warn};

use crate::cancel::CancelFlag;
use crate::error::BatchError;
use crate::ffmpeg::progress::{ProgressParser, ProgressSample};

#[derive(Clone, Debug, PartialEq)]
pub struct ProcessOutcome {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub cancelled: bool,
    /// Last lines ffmpeg wrote to stderr, oldest first.
    pub stderr_tail: Vec<String>,
}

impl ProcessOutcome {
    pub fn into_result(self, path: &Path) -> Result<(), BatchError> {
        match self.success {
            true => Ok(()),
            false => Err(BatchError::ProcessExit {
                path: PathBuf::from(path),
                code: self.exit_code,
                stderr: self.stderr_tail,
            }),
        }
    }
}

pub struct ProcessRunner {
    program: PathBuf,
    stderr_tail_lines: usize,
}

impl ProcessRunner {
    pub fn new(program: &Path, stderr_tail_lines: usize) -> Self {
        ProcessRunner {
            program: PathBuf::from(program),
            stderr_tail_lines,
        }
    }

    /// Runs one process to completion. stderr is drained on its own thread
    /// while stdout is parsed here; reading them one after the other stalls
    /// the child once the unread pipe fills.
    pub fn run(
        &self,
        args: &[PathBuf],
        cancel: &CancelFlag,
        on_sample: &mut dyn FnMut(&ProgressSample),
    ) -> Result<ProcessOutcome, BatchError> {
        debug!("{} {}", self.program.display(), args.iter().map(|s| format!("{:?}", s)).collect::<Vec<String>>().join(" "));

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BatchError::io(&self.program, e))?;

        let tail_lines = self.stderr_tail_lines;
        let stderr_thread = child.stderr.take()
            .map(|stderr| thread::spawn(move || drain_stderr(stderr, tail_lines)));

        let mut cancelled = false;
        if let Some(stdout) = child.stdout.take() {
            if consume_stdout(stdout, cancel, on_sample) {
                debug!("cancel requested; killing {} ({})", self.program.display(), child.id());
                if let Err(err) = child.kill() {
                    warn!("error killing process {}: {}", child.id(), err);
                }
                cancelled = true;
            }
        }

        let status = child.wait().map_err(|e| BatchError::io(&self.program, e))?;
        let stderr_tail = match stderr_thread {
            Some(handle) => handle.join().unwrap_or_default(),
            None => vec![],
        };

        Ok(ProcessOutcome {
            exit_code: status.code(),
            success: status.success() && !cancelled,
            cancelled,
            stderr_tail,
        })
    }
}

/// Returns true when reading stopped because of a cancel request.
fn consume_stdout(stdout: ChildStdout, cancel: &CancelFlag, on_sample: &mut dyn FnMut(&ProgressSample)) -> bool {
    let mut parser = ProgressParser::new();
    for chunk in BufReader::new(stdout).split(b'\n') {
        match chunk {
            Ok(bytes) => {
                if let Some(sample) = parser.feed(&String::from_utf8_lossy(&bytes)) {
                    on_sample(&sample);
                }
            },
            Err(err) => {
                warn!("error reading ffmpeg stdout: {}", err);
                return cancel.is_cancelled();
            },
        }

        if cancel.is_cancelled() {
            return true;
        }
    }
    // a terminal Ctrl-C reaches ffmpeg too, which then exits on its own
    cancel.is_cancelled()
}

/// ffmpeg rewrites its stats line in place with `\r`, so both `\r` and `\n`
/// end a line here.
fn drain_stderr(stderr: ChildStderr, tail_lines: usize) -> Vec<String> {
    let mut tail = VecDeque::with_capacity(tail_lines);
    for chunk in BufReader::new(stderr).split(b'\r') {
        let Ok(bytes) = chunk else { break };
        for piece in bytes.split(|b| *b == b'\n') {
            let line = String::from_utf8_lossy(piece);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            debug!("ffmpeg: {}", line);
            if tail_lines == 0 {
                continue;
            }
            if tail.len() == tail_lines {
                tail.pop_front();
            }
            tail.push_back(String::from(line));
        }
    }
    tail.into()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn sh(script: &str) -> Vec<PathBuf> {
        vec![PathBuf::from("-c"), PathBuf::from(script)]
    }

    #[test]
    fn test_run_collects_samples_and_exit() {
        let runner = ProcessRunner::new(Path::new("sh"), 5);
        let script = "printf 'out_time_us=1000000\\nprogress=continue\\n'; \
                      printf 'frame=  10 size=  256kB time=00:00:01.00 speed=2x\\r' >&2; \
                      printf 'out_time_us=2000000\\nprogress=end\\n'";
        let mut samples = vec![];
        let outcome = runner.run(&sh(script), &CancelFlag::new(), &mut |s| samples.push(s.clone())).unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stderr_tail, vec![String::from("frame=  10 size=  256kB time=00:00:01.00 speed=2x")]);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].out_time, 1.0);
        assert!(samples[1].done);
    }

    #[test]
    fn test_nonzero_exit() {
        let runner = ProcessRunner::new(Path::new("sh"), 2);
        let outcome = runner.run(&sh("echo one >&2; echo two >&2; echo boom >&2; exit 3"), &CancelFlag::new(), &mut |_| ()).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stderr_tail, vec![String::from("two"), String::from("boom")]);

        let err = outcome.into_result(Path::new("in.mp4")).unwrap_err();
        assert!(matches!(err, BatchError::ProcessExit { code: Some(3), .. }));
    }

    #[test]
    fn test_heavy_stderr_does_not_block() {
        // well past a pipe buffer of stderr before anything reaches stdout
        let script = "i=0; while [ $i -lt 4000 ]; do \
                      echo \"frame=$i fps=30 q=28.0 size=1024kB time=00:00:10.00 bitrate=800kbits/s speed=1.5x\" >&2; \
                      i=$((i+1)); done; \
                      printf 'out_time_us=5000000\\nprogress=end\\n'";
        let runner = ProcessRunner::new(Path::new("sh"), 1);
        let mut samples = 0;
        let outcome = runner.run(&sh(script), &CancelFlag::new(), &mut |_| samples += 1).unwrap();
        assert!(outcome.success);
        assert_eq!(samples, 1);
        assert_eq!(outcome.stderr_tail.len(), 1);
    }

    #[test]
    fn test_cancel_kills_process() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let runner = ProcessRunner::new(Path::new("sh"), 5);
        let started = Instant::now();
        let outcome = runner.run(&sh("printf 'out_time_us=1000000\\nprogress=continue\\n'; exec sleep 30"), &cancel, &mut |_| ()).unwrap();
        assert!(outcome.cancelled);
        assert!(!outcome.success);
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[test]
    fn test_missing_program() {
        let runner = ProcessRunner::new(Path::new("/nonexistent/ffmpeg"), 5);
        let result = runner.run(&[], &CancelFlag::new(), &mut |_| ());
        assert!(matches!(result, Err(BatchError::Io { .. })));
    }
}
