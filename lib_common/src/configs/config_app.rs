use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CONFIG_NAME: &str = "server_bits.conf";
const DEFAULT_TOPIC_PREFIX: &str = "channel-bitsevents";
const DEFAULT_WS_HOST: &str = "wss://pubsub-edge.twitch.tv";
const DEFAULT_STORE_NAME: &str = "consolemini.json";
const DEFAULT_KEEP_ALIVE_SECONDS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("You must set a {0} in your configuration")]
    MissingParam(&'static str),
}

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Twitch bits trending tracker", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "BITS_CHANNEL_ID", help = "Numeric channel id of the broadcast channel to watch.")]
    pub channel_id: Option<String>,

    #[clap(long, env = "BITS_AUTH_TOKEN", help = "OAuth token presented in the LISTEN handshake.", hide_env_values = true)]
    pub auth_token: Option<String>,

    #[clap(long, env = "BITS_TOPIC_PREFIX", help = "Topic prefix to subscribe to.")]
    pub topic_prefix: Option<String>,

    #[clap(long, env = "BITS_WS_HOST", help = "PubSub websocket endpoint.")]
    pub ws_host: Option<String>,

    #[clap(long, env = "BITS_STORE_PATH", help = "Path to the trending games JSON store.")]
    pub store_path: Option<PathBuf>,

    #[clap(long, env = "BITS_DISPLAY_DIR", help = "Directory for the trending display text files. Defaults to the store directory.")]
    pub display_dir: Option<PathBuf>,

    #[clap(long, env = "BITS_KEEP_ALIVE_INTERVAL_SECONDS", help = "Seconds between keep-alive PING frames.")]
    pub keep_alive_interval_seconds: Option<u64>,

    #[clap(long, env = "BITS_CLEAR_STALE_RANKS", help = "Remove display files for ranks with no current contender.")]
    pub clear_stale_ranks: Option<bool>,

    #[clap(long, env = "BITS_VERBOSE", help = "Force debug-level logging.")]
    pub verbose: Option<bool>,

    #[clap(long, env = "BITS_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "BITS_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "BITS_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,
}

/// Fully resolved settings: every option has a concrete value once
/// construction succeeds, so downstream code never re-checks defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub channel_id: String,
    pub auth_token: String,
    pub topic_prefix: String,
    pub ws_host: String,
    pub store_path: PathBuf,
    pub display_dir: PathBuf,
    pub keep_alive_interval: Duration,
    pub clear_stale_ranks: bool,
    pub verbose: bool,
    pub log_dir: PathBuf,
    pub log_level: String,
}

impl Settings {
    /// The fully qualified topic this deployment listens on.
    pub fn topic(&self) -> String {
        format!("{}.{}", self.topic_prefix, self.channel_id)
    }
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            channel_id: other.channel_id.or(self.channel_id),
            auth_token: other.auth_token.or(self.auth_token),
            topic_prefix: other.topic_prefix.or(self.topic_prefix),
            ws_host: other.ws_host.or(self.ws_host),
            store_path: other.store_path.or(self.store_path),
            display_dir: other.display_dir.or(self.display_dir),
            keep_alive_interval_seconds: other
                .keep_alive_interval_seconds
                .or(self.keep_alive_interval_seconds),
            clear_stale_ranks: other.clear_stale_ranks.or(self.clear_stale_ranks),
            verbose: other.verbose.or(self.verbose),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            config_path: other.config_path.or(self.config_path),
        }
    }

    /// Resolves this configuration into concrete [`Settings`], applying
    /// defaults and rejecting missing required parameters.
    pub fn validated(self) -> Result<Settings, ConfigError> {
        let channel_id = self
            .channel_id
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingParam("channel_id"))?;
        let auth_token = self
            .auth_token
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingParam("auth_token"))?;

        let store_path = self
            .store_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_NAME));
        // Display files land next to the store unless told otherwise.
        let display_dir = self
            .display_dir
            .or_else(|| store_path.parent().map(|p| p.to_path_buf()))
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Settings {
            channel_id,
            auth_token,
            topic_prefix: self
                .topic_prefix
                .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string()),
            ws_host: self.ws_host.unwrap_or_else(|| DEFAULT_WS_HOST.to_string()),
            store_path,
            display_dir,
            keep_alive_interval: Duration::from_secs(
                self.keep_alive_interval_seconds
                    .unwrap_or(DEFAULT_KEEP_ALIVE_SECONDS),
            ),
            clear_stale_ranks: self.clear_stale_ranks.unwrap_or(false),
            verbose: self.verbose.unwrap_or(false),
            log_dir: self.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: self.log_level.unwrap_or_else(|| "info".to_string()),
        })
    }
}

pub fn load_config() -> Config {
    // CLI arguments (which include env vars) are parsed first so a
    // --config-path override is honored when locating the file.
    let cli_args = Config::parse();

    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_NAME));

    let mut current_config = Config::default();

    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
                Ok(file_config) => current_config = current_config.merge(file_config),
                Err(e) => log::warn!(
                    "Failed to parse config file {}: {}. Falling back to other sources.",
                    config_file_path.display(),
                    e
                ),
            },
            Err(e) => log::warn!(
                "Failed to read config file {}: {}. Falling back to other sources.",
                config_file_path.display(),
                e
            ),
        }
    } else {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            config_file_path.display()
        );
    }

    // CLI and environment variables win over the file.
    current_config.merge(cli_args)
}
