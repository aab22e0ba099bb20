pub mod batch_processor;
pub mod cancel;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod fstools;
pub mod reporter;
pub mod summary;
pub mod task;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use rustop::opts;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use batch_processor::BatchProcessor;
use cancel::CancelFlag;
use config::Config;
use ffmpeg::FFmpeg;
use reporter::spawn_reporter;
use task::{Task, TaskKind};

fn main() -> ExitCode {
    let (args, _rest) = opts! {
        synopsis "Transcode, trim and merge media files with ffmpeg, one file at a time.";
        opt mode:String=String::from("transcode"), desc:"Operation to run. [transcode, trim, merge, trim-merge]";
        opt output:Option<String>, desc:"Output file (merge, trim-merge) or output directory (transcode, trim).";
        opt config:Option<String>, desc:"JSON configuration file.";
        opt bitrate:Option<String>, desc:"Output bitrate, e.g. 2M or 192k.";
        opt audio_only:bool=false, desc:"Drop video and write mp3 when transcoding.";
        opt offset:Option<f64>, desc:"Seconds cut from the end of each file when trimming.";
        opt crf:Option<u8>, desc:"Constant rate factor of merged output.";
        opt json:bool=false, desc:"Print the batch summary as JSON.";
        opt verbose:bool=false, desc:"Log debug output.";
        param inputs:Vec<String>, desc:"Input files, in order.";
    }.parse_or_exit();

    init_logging(args.verbose);

    let Some(kind) = TaskKind::from_str(&args.mode) else {
        eprintln!("Unknown mode {:?}.", args.mode);
        return ExitCode::FAILURE;
    };

    let mut config = match &args.config {
        Some(path) => match Config::from_file(Path::new(path)) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{}", err);
                return ExitCode::FAILURE;
            },
        },
        None => Config::default(),
    };
    if args.audio_only {
        config = config.audio_only(true);
    }
    if let Some(bitrate) = &args.bitrate {
        config = config.bitrate(bitrate);
    }
    if let Some(offset) = args.offset {
        if !offset.is_finite() || offset < 0.0 {
            eprintln!("--offset must be a non-negative number of seconds.");
            return ExitCode::FAILURE;
        }
        config = config.trim_offset(offset);
    }
    if let Some(crf) = args.crf {
        config = config.crf(crf);
    }

    let tools = FFmpeg::new(&config);
    if !tools.is_installed() {
        eprintln!("ffmpeg and ffprobe are required ({:?}, {:?}).", config.ffmpeg, config.ffprobe);
        return ExitCode::FAILURE;
    }

    let task = Task::new(
        kind,
        args.inputs.iter().map(PathBuf::from).collect(),
        args.output.as_ref().map(PathBuf::from));
    if let Err(msg) = task.validate() {
        eprintln!("{}", msg);
        return ExitCode::FAILURE;
    }

    let cancel = CancelFlag::new();
    for signal in [SIGINT, SIGTERM] {
        if let Err(err) = signal_hook::flag::register(signal, cancel.handle()) {
            warn!("unable to register handler for signal {}: {}", signal, err);
        }
    }

    let mut processor = BatchProcessor::new(config, tools, cancel);
    let reporter = spawn_reporter(processor.subscribe());
    let worker = match processor.spawn(task) {
        Ok(handle) => handle,
        Err(err) => {
            error!("{}", err);
            return ExitCode::FAILURE;
        },
    };

    let summary = match worker.join() {
        Ok(summary) => summary,
        Err(_) => {
            error!("batch worker panicked");
            return ExitCode::FAILURE;
        },
    };
    let _ = reporter.join();

    if args.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(err) => error!("unable to serialize summary: {}", err),
        }
    } else {
        print!("{}", summary);
    }

    match summary.is_success() {
        true => ExitCode::SUCCESS,
        false => ExitCode::FAILURE,
    }
}

fn init_logging(verbose: bool) {
    let filter = match verbose {
        true => EnvFilter::new("debug"),
        false => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
