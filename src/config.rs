use clap::{ArgAction, Parser};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::input::parse_path_list;
use crate::processor::{ProcessOptions, DEFAULT_SUFFIX};
use crate::session::DEFAULT_MODEL;

/// Removes the background of images and writes `<name>_bgtx.png` next to each one.
#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Images or directories to process. Comma-separated lists are accepted.
    /// Prompts for paths when none are given.
    pub paths: Vec<String>,

    /// Segmentation model to load
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Explicit `.onnx` file, bypassing the model cache lookup
    #[arg(long)]
    pub model_path: Option<PathBuf>,

    /// Directory holding `<model>.onnx` files [default: $HOME/.u2net]
    #[arg(long, env = "U2NET_HOME")]
    pub model_home: Option<PathBuf>,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    /// Appended to the file stem of every output
    #[arg(short, long, default_value = DEFAULT_SUFFIX, value_parser = check_suffix)]
    pub suffix: String,

    /// Images processed concurrently; inference itself stays serialized
    #[arg(short, long, default_value_t = NonZeroUsize::MIN)]
    pub jobs: NonZeroUsize,

    /// Give up on a single image after this many seconds of inference
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Print the report and all results as JSON
    #[arg(long)]
    pub json: bool,

    #[arg(long)]
    pub no_progress: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Config {
    pub fn new() -> Self {
        Self::parse()
    }

    /// Paths given on the command line, split on commas with blanks dropped.
    pub fn input_paths(&self) -> Vec<PathBuf> {
        self.paths
            .iter()
            .flat_map(|arg| parse_path_list(arg))
            .collect()
    }

    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            suffix: self.suffix.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Default `tracing` filter when `RUST_LOG` is not set.
    pub const fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

fn check_suffix(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("suffix must not be empty".to_string());
    }
    if s.contains(std::path::is_separator) {
        return Err(format!("suffix `{s}` must not contain a path separator"));
    }
    Ok(s.to_string())
}
