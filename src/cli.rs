use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "qa-quality",
    version,
    about = "Q&A quality regression runner for sandbox configurations"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Run(RunArgs),
    Compare(CompareArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub sandbox: PathBuf,

    #[arg(long, default_value = "test")]
    pub label: String,

    #[arg(long, default_value = "tests/qa_quality")]
    pub config_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    pub baseline: PathBuf,

    pub current: PathBuf,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}
