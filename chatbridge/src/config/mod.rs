//! Configuration for the `chatbridge` replay tool.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/chatbridge/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::delivery::policy::{AttachmentPolicy, EngineConfig};
use crate::runtime::RuntimeConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

/// How replay output is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// One human-readable line per event.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    delivery: DeliveryFileConfig,
    transfer: TransferFileConfig,
    output: OutputFileConfig,
    runtime: RuntimeFileConfig,
}

/// `[delivery]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DeliveryFileConfig {
    photo_policy: Option<AttachmentPolicy>,
    document_policy: Option<AttachmentPolicy>,
    long_download_secs: Option<u64>,
    message_cache_capacity: Option<usize>,
}

/// `[transfer]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct TransferFileConfig {
    temp_dir: Option<PathBuf>,
}

/// `[output]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct OutputFileConfig {
    format: Option<OutputFormat>,
    timestamp_format: Option<String>,
}

/// `[runtime]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RuntimeFileConfig {
    channel_capacity: Option<usize>,
    tick_interval_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    // -- Delivery --
    /// Engine tunables.
    pub engine: EngineConfig,

    // -- Transfer --
    /// Directory temporary download files are created in.
    pub temp_dir: PathBuf,

    // -- Output --
    /// How events and requests are printed.
    pub format: OutputFormat,
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,

    // -- Runtime --
    /// Capacity of the engine's input channel.
    pub channel_capacity: usize,
    /// How often the runtime calls `Engine::tick`.
    pub tick_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            temp_dir: std::env::temp_dir(),
            format: OutputFormat::Text,
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
            channel_capacity: 256,
            tick_interval: Duration::from_millis(250),
        }
    }
}

impl BridgeConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// Otherwise the default path (`~/.config/chatbridge/config.toml`) is
    /// tried and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `BridgeConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            engine: EngineConfig {
                photo_policy: file
                    .delivery
                    .photo_policy
                    .unwrap_or(defaults.engine.photo_policy),
                document_policy: file
                    .delivery
                    .document_policy
                    .unwrap_or(defaults.engine.document_policy),
                long_download_after: cli
                    .long_download_secs
                    .or(file.delivery.long_download_secs)
                    .map_or(defaults.engine.long_download_after, Duration::from_secs),
                message_cache_capacity: file
                    .delivery
                    .message_cache_capacity
                    .unwrap_or(defaults.engine.message_cache_capacity),
            },
            temp_dir: cli
                .temp_dir
                .clone()
                .or_else(|| file.transfer.temp_dir.clone())
                .unwrap_or(defaults.temp_dir),
            format: cli
                .format
                .or(file.output.format)
                .unwrap_or(defaults.format),
            timestamp_format: cli
                .timestamp_format
                .clone()
                .or_else(|| file.output.timestamp_format.clone())
                .unwrap_or(defaults.timestamp_format),
            channel_capacity: file
                .runtime
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
            tick_interval: file
                .runtime
                .tick_interval_ms
                .map_or(defaults.tick_interval, Duration::from_millis),
        }
    }

    /// Settings for the engine task.
    #[must_use]
    pub const fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            channel_capacity: self.channel_capacity,
            tick_interval: self.tick_interval,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(
    version,
    about = "Replay a chat backend session through the ordered delivery engine"
)]
pub struct CliArgs {
    /// JSON-lines session script to replay (default: standard input).
    pub script: Option<PathBuf>,

    /// Path to config file (default: `~/.config/chatbridge/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for temporary download files.
    #[arg(long, env = "CHATBRIDGE_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Seconds a download may hold its message back before it is released.
    #[arg(long)]
    pub long_download_secs: Option<u64>,

    /// Output format.
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Timestamp display format (chrono format string).
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "CHATBRIDGE_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/chatbridge.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("chatbridge").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
