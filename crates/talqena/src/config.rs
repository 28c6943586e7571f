//! Configuration file support for talqena.
//!
//! Loads configuration from `talqena.toml` in the user config directory,
//! or from the path passed with `--config`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use talqena_core::{LibraryConfig, MAX_IMAGE_SIZE_BYTES};
use talqena_rewrite::CommandRewriter;

/// The config file name
pub const CONFIG_FILE_NAME: &str = "talqena.toml";

const DEFAULT_METADATA_QUOTA_KB: usize = 5 * 1024;

/// User configuration loaded from `talqena.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding both databases
    pub data_dir: Option<PathBuf>,
    /// Largest image accepted for attachment, in KiB
    pub max_image_kb: Option<usize>,
    /// Upper bound for the serialized prompt collection, in KiB
    pub metadata_quota_kb: Option<usize>,
    /// Default log level when `RUST_LOG` is unset
    pub log_level: Option<String>,
    /// Rewrite assistant settings
    #[serde(default)]
    pub rewrite: RewriteConfig,
}

/// Command used to rewrite prompts
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RewriteConfig {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
}

impl Config {
    /// Default location of the config file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("talqena")
            .join(CONFIG_FILE_NAME)
    }

    /// Load configuration from `path`.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(Some(config))
    }

    /// Data directory. Priority: CLI flag > config > platform default
    pub fn data_dir(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.data_dir.clone())
            .unwrap_or_else(talqena_db::default_data_dir)
    }

    /// Log level. Priority: CLI flag > config > "info"
    pub fn log_level<'a>(&'a self, flag: Option<&'a str>) -> &'a str {
        flag.or(self.log_level.as_deref()).unwrap_or("info")
    }

    pub fn metadata_quota_bytes(&self) -> usize {
        self.metadata_quota_kb.unwrap_or(DEFAULT_METADATA_QUOTA_KB) * 1024
    }

    pub fn library_config(&self) -> LibraryConfig {
        LibraryConfig {
            max_image_bytes: self
                .max_image_kb
                .map(|kb| kb * 1024)
                .unwrap_or(MAX_IMAGE_SIZE_BYTES),
        }
    }

    pub fn rewriter(&self) -> CommandRewriter {
        match self.rewrite.command {
            Some(ref command) => {
                CommandRewriter::new(command, self.rewrite.args.clone().unwrap_or_default())
            }
            None => CommandRewriter::default(),
        }
    }
}
