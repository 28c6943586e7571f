use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use talqena_core::Library;
use talqena_db::{BlobStore, MetadataStore};
use talqena_logging::{init_tracing, LogFormat};

mod commands;
mod config;

use commands::Command;
use config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "talqena",
    about = "Personal prompt library with image attachments",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the prompt and image databases
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Path to talqena.toml (default: user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormatChoice,

    /// Log level when RUST_LOG is unset (default: info)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?.unwrap_or_default();

    init_tracing(
        config.log_level(cli.log_level.as_deref()),
        cli.log_format.into(),
    );

    let data_dir = config.data_dir(cli.data_dir.as_deref());
    let metadata = MetadataStore::open_in_dir(&data_dir)
        .with_context(|| format!("Failed to open prompt database in {}", data_dir.display()))?
        .with_quota(config.metadata_quota_bytes());
    let blobs = Arc::new(BlobStore::in_dir(&data_dir));

    let mut library = Library::open(metadata, blobs, config.library_config()).await;
    let result = commands::run(cli.command, &mut library, &config).await;
    library.close();

    result
}
