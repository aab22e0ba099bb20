use std::path::Path;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

use human_repr::HumanCount;
use kdam::{term, tqdm, Bar, BarExt};
use tracing::{info, warn};

use crate::batch_processor::BatchEvent;
use crate::ffmpeg::progress::{Percent, ProgressSample};
use crate::summary::FileStatus;

/// Draws batch progress on the terminal from its own thread, so the worker
/// never waits on rendering.
pub fn spawn_reporter(events: Receiver<BatchEvent>) -> JoinHandle<()> {
    thread::spawn(move || report(events))
}

fn report(events: Receiver<BatchEvent>) {
    term::init(false);
    let mut pbar: Option<Bar> = None;

    for event in events {
        match event {
            BatchEvent::FileStart { index, total, path } => {
                finish_bar(&mut pbar);
                pbar = Some(new_bar(format!("[{}/{}] {}", index + 1, total, file_name(&path))));
            },
            BatchEvent::MergeStart { inputs, output } => {
                finish_bar(&mut pbar);
                pbar = Some(new_bar(format!("merging {} → {}", inputs.len(), file_name(&output))));
            },
            BatchEvent::Progress { percent, sample, .. } => {
                if let Some(bar) = pbar.as_mut() {
                    bar.set_postfix(postfix(&sample));
                    let _ = match percent {
                        Percent::Determinate(p) => bar.update_to(p.round() as usize).map(|_| ()),
                        Percent::Indeterminate => bar.refresh(),
                    };
                }
            },
            BatchEvent::FileComplete { result, .. } => {
                finish_bar(&mut pbar);
                match result.status {
                    FileStatus::Succeeded => info!("done: {}", result.path.display()),
                    FileStatus::Skipped => info!("skipped: {}", result.error.as_deref().unwrap_or_default()),
                    FileStatus::Failed => (),
                }
            },
            BatchEvent::Error { path, message } => {
                finish_bar(&mut pbar);
                warn!("{}: {}", path.display(), message);
            },
            BatchEvent::BatchComplete(_) => finish_bar(&mut pbar),
            BatchEvent::State(_) => (),
        }
    }
    finish_bar(&mut pbar);
}

fn new_bar(desc: String) -> Bar {
    tqdm!(
        total = 100,
        desc = desc,
        position = 0,
        force_refresh = true
    )
}

fn finish_bar(pbar: &mut Option<Bar>) {
    if let Some(mut bar) = pbar.take() {
        let _ = bar.refresh();
        eprintln!();
    }
}

fn file_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.display().to_string(),
    }
}

fn postfix(sample: &ProgressSample) -> String {
    match sample.speed {
        Some(speed) => format!("{} @ {:.2}x", sample.total_size.human_count_bytes(), speed),
        None => format!("{}", sample.total_size.human_count_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_postfix() {
        let sample = ProgressSample { total_size: 2_000_000, speed: Some(1.5), ..Default::default() };
        assert!(postfix(&sample).ends_with("@ 1.50x"));
        let sample = ProgressSample { total_size: 0, speed: None, ..Default::default() };
        assert!(!postfix(&sample).contains('@'));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name(&PathBuf::from("/music/song.webm")), "song.webm");
        assert_eq!(file_name(&PathBuf::from("/")), "/");
    }
}
