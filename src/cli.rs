use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "completion-eval",
    version,
    about = "Offline quality and latency metrics for recorded completion sessions"
)]
pub struct Cli {
    /// A log file to evaluate, or a directory to evaluate as one corpus.
    pub path: PathBuf,
}

#[derive(Parser, Debug)]
#[command(
    name = "completion-dataset",
    version,
    about = "Assembles train/dev/test datasets from completion logs and feature archives"
)]
pub struct DatasetArgs {
    /// Export roots, each containing data/files/jsons and features.
    #[arg(required = true)]
    pub roots: Vec<PathBuf>,

    #[arg(long, default_value = ".cache/completion-dataset")]
    pub out_dir: PathBuf,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}
