use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod config;
mod session;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance recorder")]
struct Cli {
    /// Configuration file (default: ./rollcall.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of labeled reference photos (Name_RollNo.ext)
    #[arg(long)]
    known_faces: Option<PathBuf>,

    /// Attendance ledger CSV file
    #[arg(long)]
    attendance_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one attendance session: capture, recognize, record
    Mark,
    /// Load the reference photos and list who is enrolled
    Gallery,
    /// Print recorded attendance rows
    History {
        /// Only rows for this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<chrono::NaiveDate>,
    },
    /// List available capture devices
    Devices,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.known_faces {
        config.known_faces_dir = dir;
    }
    if let Some(file) = cli.attendance_file {
        config.attendance_file = file;
    }

    match cli.command {
        Commands::Mark => session::run_mark(&config),
        Commands::Gallery => session::run_gallery(&config),
        Commands::History { date } => session::run_history(&config, date),
        Commands::Devices => session::run_devices(),
    }
}
