use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging, even in production mode
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path (default: config-$CONTAINER_ENVIRONMENT.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Also write logs to a daily rotated file in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}
