use std::fmt::Display;
use std::path::{Path, PathBuf};

use human_repr::HumanCount;
use serde::Serialize;

use crate::error::BatchError;
use crate::fstools::file_size;
use crate::task::TaskKind;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskResult {
    pub path: PathBuf,
    pub status: FileStatus,
    pub error: Option<String>,
    pub output: Option<PathBuf>,
}

impl TaskResult {
    pub fn succeeded(path: &Path, output: &Path) -> Self {
        TaskResult {
            path: PathBuf::from(path),
            status: FileStatus::Succeeded,
            error: None,
            output: Some(PathBuf::from(output)),
        }
    }

    pub fn failed(path: &Path, err: &BatchError) -> Self {
        TaskResult {
            path: PathBuf::from(path),
            status: FileStatus::Failed,
            error: Some(err.to_string()),
            output: None,
        }
    }

    pub fn skipped(path: &Path, err: &BatchError) -> Self {
        TaskResult {
            path: PathBuf::from(path),
            status: FileStatus::Skipped,
            error: Some(err.to_string()),
            output: None,
        }
    }

    /// Too-short trims are skips, everything else a failure.
    pub fn from_error(path: &Path, err: &BatchError) -> Self {
        match err.is_skip() {
            true => TaskResult::skipped(path, err),
            false => TaskResult::failed(path, err),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MergeResult {
    pub output: PathBuf,
    pub inputs: Vec<PathBuf>,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOutcome {
    Completed,
    Cancelled,
}

/// The one object handed back when a batch ends. Files the batch never got
/// to (after a cancel) have no entry in `results`.
#[derive(Clone, Debug, Serialize)]
pub struct BatchSummary {
    pub kind: TaskKind,
    pub outcome: BatchOutcome,
    pub results: Vec<TaskResult>,
    pub merge: Option<MergeResult>,
}

impl BatchSummary {
    pub fn new(kind: TaskKind) -> Self {
        BatchSummary {
            kind,
            outcome: BatchOutcome::Completed,
            results: vec![],
            merge: None,
        }
    }

    pub fn with_status(&self, status: FileStatus) -> Vec<&TaskResult> {
        self.results.iter().filter(|r| r.status == status).collect()
    }

    pub fn succeeded(&self) -> Vec<&Path> {
        self.with_status(FileStatus::Succeeded).into_iter().map(|r| r.path.as_path()).collect()
    }

    pub fn failed(&self) -> Vec<&Path> {
        self.with_status(FileStatus::Failed).into_iter().map(|r| r.path.as_path()).collect()
    }

    pub fn skipped(&self) -> Vec<&Path> {
        self.with_status(FileStatus::Skipped).into_iter().map(|r| r.path.as_path()).collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == BatchOutcome::Completed
            && self.failed().is_empty()
            && self.merge.as_ref().map(|m| m.success).unwrap_or(true)
    }
}

impl Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let outcome = match self.outcome {
            BatchOutcome::Completed => "completed",
            BatchOutcome::Cancelled => "cancelled",
        };
        writeln!(
            f,
            "{} {}: {} succeeded, {} failed, {} skipped",
            self.kind,
            outcome,
            self.succeeded().len(),
            self.failed().len(),
            self.skipped().len())?;

        for result in &self.results {
            match result.status {
                FileStatus::Succeeded => {
                    let output = result.output.as_deref().unwrap_or(Path::new(""));
                    writeln!(f, "  ✅ {} -> {}{}", result.path.display(), output.display(), size_suffix(output))?;
                },
                FileStatus::Failed => writeln!(f, "  🚫 {}: {}", result.path.display(), result.error.as_deref().unwrap_or("failed"))?,
                FileStatus::Skipped => writeln!(f, "  ⏭  {}: {}", result.path.display(), result.error.as_deref().unwrap_or("skipped"))?,
            }
        }

        if let Some(merge) = &self.merge {
            match merge.success {
                true => writeln!(f, "merged {} files into {}{}", merge.inputs.len(), merge.output.display(), size_suffix(&merge.output))?,
                false => writeln!(f, "merge into {} failed: {}", merge.output.display(), merge.error.as_deref().unwrap_or("unknown error"))?,
            }
        }
        Ok(())
    }
}

fn size_suffix(path: &Path) -> String {
    match file_size(path) {
        Some(size) => format!(" ({})", size.human_count_bytes()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> BatchSummary {
        let mut summary = BatchSummary::new(TaskKind::Trim);
        summary.results.push(TaskResult::succeeded(Path::new("a.mp4"), Path::new("a.trimmed.mp4")));
        summary.results.push(TaskResult::from_error(
            Path::new("b.mp4"),
            &BatchError::TooShort { path: PathBuf::from("b.mp4"), duration: 1.0, offset: 3.03 }));
        summary.results.push(TaskResult::from_error(
            Path::new("c.mp4"),
            &BatchError::ProcessExit { path: PathBuf::from("c.mp4"), code: Some(1), stderr: vec![] }));
        summary
    }

    #[test]
    fn test_partition() {
        let summary = summary();
        assert_eq!(summary.succeeded(), vec![Path::new("a.mp4")]);
        assert_eq!(summary.skipped(), vec![Path::new("b.mp4")]);
        assert_eq!(summary.failed(), vec![Path::new("c.mp4")]);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_is_success() {
        let mut summary = BatchSummary::new(TaskKind::TrimMerge);
        summary.results.push(TaskResult::succeeded(Path::new("a.mp4"), Path::new("t/a.mp4")));
        assert!(summary.is_success());

        summary.merge = Some(MergeResult {
            output: PathBuf::from("out.mp4"),
            inputs: vec![PathBuf::from("t/a.mp4")],
            success: false,
            error: Some(String::from("boom")),
        });
        assert!(!summary.is_success());

        summary.merge = None;
        summary.outcome = BatchOutcome::Cancelled;
        assert!(!summary.is_success());
    }

    #[test]
    fn test_display() {
        let text = format!("{}", summary());
        assert!(text.starts_with("trim completed: 1 succeeded, 1 failed, 1 skipped\n"));
        assert!(text.contains("a.mp4 -> a.trimmed.mp4"));
        assert!(text.contains("too short"));
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_value(summary()).unwrap();
        assert_eq!(json["kind"], "trim");
        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["results"][1]["status"], "skipped");
    }
}
