use std::fmt::Display;
use std::path::PathBuf;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    Transcode,
    Trim,
    Merge,
    TrimMerge,
}

impl TaskKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "transcode" | "compress" => Some(TaskKind::Transcode),
            "trim" => Some(TaskKind::Trim),
            "merge" | "concat" => Some(TaskKind::Merge),
            "trim-merge" | "trim_merge" => Some(TaskKind::TrimMerge),
            _ => None,
        }
    }

    pub fn merges(&self) -> bool {
        matches!(self, TaskKind::Merge | TaskKind::TrimMerge)
    }
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskKind::Transcode => "transcode",
            TaskKind::Trim => "trim",
            TaskKind::Merge => "merge",
            TaskKind::TrimMerge => "trim-merge",
        };
        write!(f, "{}", s)
    }
}

/// One submitted batch operation. `output` is the merged file for merging
/// kinds and an optional output directory otherwise.
#[derive(Clone, Debug)]
pub struct Task {
    pub kind: TaskKind,
    pub inputs: Vec<PathBuf>,
    pub output: Option<PathBuf>,
}

impl Task {
    pub fn new(kind: TaskKind, inputs: Vec<PathBuf>, output: Option<PathBuf>) -> Self {
        Task { kind, inputs, output }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.inputs.is_empty() {
            return Err(String::from("no input files given"));
        }
        if self.kind.merges() && self.output.is_none() {
            return Err(format!("{} needs an output file", self.kind));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        assert_eq!(TaskKind::from_str("Trim-Merge"), Some(TaskKind::TrimMerge));
        assert_eq!(TaskKind::from_str("compress"), Some(TaskKind::Transcode));
        assert_eq!(TaskKind::from_str("shuffle"), None);
        assert_eq!(format!("{}", TaskKind::TrimMerge), "trim-merge");
    }

    #[test]
    fn test_validate() {
        assert!(Task::new(TaskKind::Trim, vec![], None).validate().is_err());
        assert!(Task::new(TaskKind::Merge, vec![PathBuf::from("a.mp4")], None).validate().is_err());
        assert!(Task::new(TaskKind::Merge, vec![PathBuf::from("a.mp4")], Some(PathBuf::from("out.mp4"))).validate().is_ok());
        assert!(Task::new(TaskKind::Transcode, vec![PathBuf::from("a.mp4")], None).validate().is_ok());
    }
}
