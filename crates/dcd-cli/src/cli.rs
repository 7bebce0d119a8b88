use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "dcd",
    about = "Compare the content of two directories, or of two files",
    version
)]
pub struct Cli {
    /// Reference directory or file
    pub reference_input: PathBuf,

    /// Compared directory or file
    pub compared_input: PathBuf,

    /// Per-path arguments: a JSON string or a .json/.yaml/.yml/.toml file
    #[arg(short, long)]
    pub config: Option<String>,

    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Export formatted compared-side data next to the compared input
    #[arg(short = 'f', long)]
    pub export_formatted_files: bool,

    /// Suffix of the export directory (default: _FORMATTED)
    #[arg(long, requires = "export_formatted_files")]
    pub export_suffix: Option<String>,

    /// Only compare paths matching one of these patterns
    #[arg(long = "include", value_name = "PATTERN")]
    pub include: Vec<String>,

    /// Skip paths matching one of these patterns
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Compare files on this many worker threads
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Descend into symlinked directories
    #[arg(long)]
    pub follow_symlinks: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_tracing(self) -> tracing::Level {
        match self {
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}
