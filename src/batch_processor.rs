use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::config::Config;
use crate::error::BatchError;
use crate::ffmpeg::command::{merge_args, transcode_args, trim_args, write_manifest, AUDIO_ONLY_EXTENSION};
use crate::ffmpeg::MediaTools;
use crate::ffmpeg::probe::ProbeResult;
use crate::ffmpeg::progress::{Percent, ProgressSample, ProgressTranslator};
use crate::fstools::{classify_file, generate_output_filename, DirEntryCategory};
use crate::summary::{BatchOutcome, BatchSummary, FileStatus, MergeResult, TaskResult};
use crate::task::{Task, TaskKind};

#[derive(Clone, Debug, PartialEq)]
pub enum BatchState {
    Idle,
    Probing,
    Processing { index: usize, total: usize },
    Merging,
    Done,
}

#[derive(Clone, Debug)]
pub enum BatchEvent {
    State(BatchState),
    FileStart { index: usize, total: usize, path: PathBuf },
    /// `path` is the input being processed, or the merge output.
    Progress { path: PathBuf, percent: Percent, sample: ProgressSample },
    FileComplete { index: usize, result: TaskResult },
    MergeStart { inputs: Vec<PathBuf>, output: PathBuf },
    Error { path: PathBuf, message: String },
    BatchComplete(BatchSummary),
}

enum RunStatus {
    Finished,
    Cancelled,
}

/// Runs one `Task` at a time, one ffmpeg process at a time.
pub struct BatchProcessor<T: MediaTools> {
    config: Config,
    tools: T,
    cancel: CancelFlag,
    subscribers: Vec<Sender<BatchEvent>>,
    probes: HashMap<PathBuf, ProbeResult>,
    pub state: BatchState,
}

impl<T: MediaTools> BatchProcessor<T> {
    pub fn new(config: Config, tools: T, cancel: CancelFlag) -> Self {
        BatchProcessor {
            config,
            tools,
            cancel,
            subscribers: vec![],
            probes: HashMap::new(),
            state: BatchState::Idle,
        }
    }

    pub fn subscribe(&mut self) -> Receiver<BatchEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&self, msg: BatchEvent) {
        for tx in &self.subscribers {
            let _ = tx.send(msg.clone());
        }
    }

    fn set_state(&mut self, state: BatchState) {
        self.state = state.clone();
        self.publish(BatchEvent::State(state));
    }

    /// Moves the processor onto its own worker thread.
    pub fn spawn(mut self, task: Task) -> Result<JoinHandle<BatchSummary>, BatchError>
    where
        T: Send + 'static,
    {
        thread::Builder::new()
            .name(String::from("ffbatch-worker"))
            .spawn(move || self.run(task))
            .map_err(BatchError::Spawn)
    }

    pub fn run(&mut self, task: Task) -> BatchSummary {
        let mut summary = BatchSummary::new(task.kind);
        info!("starting {} of {} file(s)", task.kind, task.inputs.len());

        match task.validate() {
            Err(msg) => {
                let err = BatchError::InvalidTask(msg);
                for (index, input) in task.inputs.iter().enumerate() {
                    self.record(&mut summary, index, TaskResult::failed(input, &err));
                }
            },
            Ok(()) => {
                self.probe_inputs(&task.inputs);
                match task.kind {
                    TaskKind::Transcode | TaskKind::Trim => {
                        if let Some(dir) = &task.output {
                            if let Err(err) = fs::create_dir_all(dir) {
                                warn!("unable to create output directory {:?}: {}", dir, err);
                            }
                        }
                        self.process_files(&task, task.output.as_deref(), &mut summary);
                    },
                    TaskKind::Merge => self.merge_files(&task, &mut summary),
                    TaskKind::TrimMerge => self.trim_and_merge(&task, &mut summary),
                }
            },
        }

        if self.cancel.is_cancelled() {
            summary.outcome = BatchOutcome::Cancelled;
        }
        self.probes.clear();
        info!(
            "{} {:?}: {} succeeded, {} failed, {} skipped",
            task.kind,
            summary.outcome,
            summary.succeeded().len(),
            summary.failed().len(),
            summary.skipped().len());
        self.set_state(BatchState::Done);
        self.publish(BatchEvent::BatchComplete(summary.clone()));
        summary
    }

    fn probe_inputs(&mut self, inputs: &[PathBuf]) {
        self.set_state(BatchState::Probing);
        for input in inputs {
            if self.cancel.is_cancelled() {
                break;
            }
            if classify_file(input) != DirEntryCategory::RegularFile || self.probes.contains_key(input) {
                continue;
            }
            match self.tools.probe_duration(input) {
                Ok(probe) => {
                    debug!("{:?} is {:.3}s long", input, probe.duration);
                    self.probes.insert(input.clone(), probe);
                },
                Err(err) => warn!("{}; progress will be indeterminate", err),
            }
        }
    }

    fn record(&self, summary: &mut BatchSummary, index: usize, result: TaskResult) {
        if let (FileStatus::Failed, Some(message)) = (result.status, &result.error) {
            self.publish(BatchEvent::Error { path: result.path.clone(), message: message.clone() });
        }
        self.publish(BatchEvent::FileComplete { index, result: result.clone() });
        summary.results.push(result);
    }

    /// Per-file transcode or trim. Failures are recorded and the loop moves on;
    /// only a cancel stops it.
    fn process_files(&mut self, task: &Task, out_dir: Option<&Path>, summary: &mut BatchSummary) {
        let total = task.inputs.len();
        let outputs = self.plan_outputs(task, out_dir);
        for (index, (input, output)) in task.inputs.iter().zip(outputs).enumerate() {
            if self.cancel.is_cancelled() {
                info!("cancelled before {:?}", input);
                break;
            }
            self.set_state(BatchState::Processing { index, total });
            self.publish(BatchEvent::FileStart { index, total, path: input.clone() });

            let result = match self.process_file(task.kind, input, &output) {
                Ok(RunStatus::Finished) => {
                    info!("{:?} -> {:?}", input, output);
                    TaskResult::succeeded(input, &output)
                },
                Ok(RunStatus::Cancelled) => {
                    info!("cancelled while processing {:?}", input);
                    break;
                },
                Err(err) => {
                    warn!("{}", err);
                    TaskResult::from_error(input, &err)
                },
            };
            self.record(summary, index, result);
        }
    }

    /// One distinct output path per input, decided before anything runs. Inputs
    /// from different directories that share a name would otherwise overwrite
    /// each other in a common output directory; later ones get `-2`, `-3`...
    fn plan_outputs(&self, task: &Task, out_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut claimed = HashSet::new();
        task.inputs.iter().enumerate().map(|(index, input)| {
            let output = self.output_for(task.kind, index, input, out_dir, &claimed);
            claimed.insert(output.clone());
            output
        }).collect()
    }

    fn output_for(&self, kind: TaskKind, index: usize, input: &Path, out_dir: Option<&Path>, claimed: &HashSet<PathBuf>) -> PathBuf {
        let (label, extension) = match kind {
            TaskKind::Transcode if self.config.audio_only => ("transcoded", Some(AUDIO_ONLY_EXTENSION)),
            TaskKind::Transcode => ("transcoded", None),
            // intermediates share one directory, so the index keeps names unique
            TaskKind::TrimMerge => {
                let name = input.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                let dir = out_dir.map(PathBuf::from).unwrap_or_default();
                return dir.join(format!("{:04}-{}", index, name));
            },
            TaskKind::Trim | TaskKind::Merge => ("trimmed", None),
        };

        let mut output = generate_output_filename(input, out_dir, label, extension);
        let mut n = 2;
        while claimed.contains(&output) {
            output = generate_output_filename(input, out_dir, &format!("{}-{}", label, n), extension);
            n += 1;
        }
        if n > 2 {
            debug!("{:?} renamed to {:?} to avoid overwriting another output", input, output);
        }
        output
    }

    fn process_file(&self, kind: TaskKind, input: &Path, output: &Path) -> Result<RunStatus, BatchError> {
        check_regular_file(input)?;
        let probe = self.probes.get(input);
        let args = match kind {
            TaskKind::Transcode => transcode_args(&self.config, input, output),
            _ => trim_args(&self.config, input, probe, output)?,
        };
        self.execute(&args, input, output, probe.map(|p| p.duration))
    }

    /// One ffmpeg run with progress relayed to subscribers. The final 100% is
    /// published before this returns.
    fn execute(&self, args: &[PathBuf], source: &Path, destination: &Path, duration: Option<f64>) -> Result<RunStatus, BatchError> {
        let mut translator = ProgressTranslator::new(duration);
        let mut last_sample = ProgressSample::default();

        let outcome = self.tools.run_ffmpeg(args, &self.cancel, &mut |sample| {
            last_sample = sample.clone();
            if let Some(percent) = translator.translate(sample) {
                self.publish(BatchEvent::Progress {
                    path: PathBuf::from(source),
                    percent,
                    sample: sample.clone(),
                });
            }
        })?;

        if outcome.cancelled {
            remove_partial(destination);
            return Ok(RunStatus::Cancelled);
        }
        if let Err(err) = outcome.into_result(source) {
            remove_partial(destination);
            return Err(err);
        }

        if let Some(percent) = translator.finish() {
            last_sample.done = true;
            self.publish(BatchEvent::Progress { path: PathBuf::from(source), percent, sample: last_sample });
        }
        Ok(RunStatus::Finished)
    }

    fn merge_files(&mut self, task: &Task, summary: &mut BatchSummary) {
        let Some(output) = task.output.clone() else { return };
        let mut inputs = vec![];
        let mut indices = vec![];
        for (index, input) in task.inputs.iter().enumerate() {
            match check_regular_file(input) {
                Ok(()) => {
                    inputs.push(input.clone());
                    indices.push(index);
                },
                Err(err) => self.record(summary, index, TaskResult::failed(input, &err)),
            }
        }

        let duration = total_duration(inputs.iter().map(|i| self.probes.get(i).map(|p| p.duration)));
        // a cancelled merge finished none of its inputs
        let Some(merge) = self.run_merge(&inputs, &output, duration) else { return };

        for (index, input) in indices.into_iter().zip(inputs.iter()) {
            let result = match merge.success {
                true => TaskResult::succeeded(input, &output),
                false => TaskResult {
                    path: input.clone(),
                    status: FileStatus::Failed,
                    error: merge.error.clone(),
                    output: None,
                },
            };
            self.record(summary, index, result);
        }
        summary.results.sort_by_key(|r| task.inputs.iter().position(|i| *i == r.path));
        summary.merge = Some(merge);
    }

    fn trim_and_merge(&mut self, task: &Task, summary: &mut BatchSummary) {
        let Some(output) = task.output.clone() else { return };
        let workdir = match tempfile::Builder::new().prefix("ffbatch-trim-").tempdir_in(self.config.temp_dir()) {
            Ok(dir) => dir,
            Err(source) => {
                let err = BatchError::io(&self.config.temp_dir(), source);
                for (index, input) in task.inputs.iter().enumerate() {
                    self.record(summary, index, TaskResult::failed(input, &err));
                }
                return;
            },
        };

        self.process_files(task, Some(workdir.path()), summary);

        if self.cancel.is_cancelled() {
            info!("cancelled; skipping merge");
            remove_workdir(workdir);
            return;
        }

        let trimmed: Vec<(PathBuf, PathBuf)> = summary.results.iter()
            .filter(|r| r.status == FileStatus::Succeeded)
            .filter_map(|r| r.output.clone().map(|o| (r.path.clone(), o)))
            .collect();

        let merge = if trimmed.is_empty() {
            warn!("no trimmed files to merge");
            Some(MergeResult {
                output: output.clone(),
                inputs: vec![],
                success: false,
                error: Some(String::from("no files were trimmed successfully")),
            })
        } else {
            let inputs: Vec<PathBuf> = trimmed.iter().map(|(_, t)| t.clone()).collect();
            let offset = self.config.trim_offset;
            let duration = total_duration(trimmed.iter().map(|(source, _)| {
                self.probes.get(source).map(|p| p.duration - offset)
            }));
            self.run_merge(&inputs, &output, duration).map(|mut merge| {
                merge.inputs = trimmed.iter().map(|(source, _)| source.clone()).collect();
                merge
            })
        };

        // the intermediates go away with the work directory
        let merged = merge.as_ref().map(|m| m.success).unwrap_or(false);
        for result in summary.results.iter_mut().filter(|r| r.status == FileStatus::Succeeded) {
            result.output = if merged { Some(output.clone()) } else { None };
        }
        summary.merge = merge;
        remove_workdir(workdir);
    }

    /// Concatenates `inputs` in order; `None` when cancelled. The manifest is
    /// removed whatever the outcome.
    fn run_merge(&mut self, inputs: &[PathBuf], output: &Path, duration: Option<f64>) -> Option<MergeResult> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.set_state(BatchState::Merging);
        self.publish(BatchEvent::MergeStart { inputs: inputs.to_vec(), output: PathBuf::from(output) });
        info!("merging {} file(s) into {:?}", inputs.len(), output);

        let failed = |error: String| MergeResult {
            output: PathBuf::from(output),
            inputs: inputs.to_vec(),
            success: false,
            error: Some(error),
        };

        if inputs.is_empty() {
            return Some(failed(String::from("nothing to merge")));
        }

        let manifest = match write_manifest(&self.config.temp_dir(), inputs) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!("{}", err);
                self.publish(BatchEvent::Error { path: PathBuf::from(output), message: err.to_string() });
                return Some(failed(err.to_string()));
            },
        };
        let args = merge_args(&self.config, manifest.path(), output);
        let status = self.execute(&args, output, output, duration);

        let manifest_path = manifest.path().to_path_buf();
        if let Err(err) = manifest.close() {
            warn!("unable to remove manifest {:?}: {}", manifest_path, err);
        }

        match status {
            Ok(RunStatus::Finished) => Some(MergeResult {
                output: PathBuf::from(output),
                inputs: inputs.to_vec(),
                success: true,
                error: None,
            }),
            Ok(RunStatus::Cancelled) => {
                info!("merge into {:?} cancelled", output);
                None
            },
            Err(err) => {
                warn!("{}", err);
                self.publish(BatchEvent::Error { path: PathBuf::from(output), message: err.to_string() });
                Some(failed(err.to_string()))
            },
        }
    }
}

fn check_regular_file(path: &Path) -> Result<(), BatchError> {
    match classify_file(path) {
        DirEntryCategory::RegularFile => Ok(()),
        DirEntryCategory::DoesNotExist => Err(BatchError::io(path, io::Error::new(io::ErrorKind::NotFound, "does not exist"))),
        DirEntryCategory::Directory => Err(BatchError::io(path, io::Error::new(io::ErrorKind::InvalidInput, "is a directory"))),
        DirEntryCategory::Unknown => Err(BatchError::io(path, io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"))),
    }
}

/// Sum of all durations, or `None` if any is unknown.
fn total_duration(durations: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    durations.sum::<Option<f64>>()
}

fn remove_partial(path: &Path) {
    if path.exists() {
        match fs::remove_file(path) {
            Ok(()) => debug!("removed partial output {:?}", path),
            Err(err) => warn!("unable to remove partial output {:?}: {}", path, err),
        }
    }
}

fn remove_workdir(dir: TempDir) {
    let path = dir.path().to_path_buf();
    if let Err(err) = dir.close() {
        warn!("unable to remove {:?}: {}", path, err);
    }
}
