use anyhow::{bail, Result};
use clap::Parser;
use lib_feeds::markets::alpaca::{ClientConfig, Credentials, Subscription};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "server_alpaca.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Alpaca market data stream relay", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "ALPACA_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "ALPACA_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "ALPACA_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "ALPACA_WS_SERVER", help = "Upstream Alpaca stream WebSocket URL.")]
    pub ws_server: Option<String>,

    #[clap(long, env = "ALPACA_API_KEY", help = "Alpaca API key id.")]
    pub api_key: Option<String>,

    #[clap(long, env = "ALPACA_API_SECRET", help = "Alpaca API secret.")]
    pub api_secret: Option<String>,

    #[clap(long, env = "ALPACA_MINUTE_BARS", value_delimiter = ',', help = "Symbols for minute bars (AM.*), comma separated.")]
    pub minute_bars: Option<Vec<String>>,

    #[clap(long, env = "ALPACA_QUOTES", value_delimiter = ',', help = "Symbols for quotes (Q.*), comma separated.")]
    pub quotes: Option<Vec<String>>,

    #[clap(long, env = "ALPACA_TRADES", value_delimiter = ',', help = "Symbols for trades (T.*), comma separated.")]
    pub trades: Option<Vec<String>>,

    #[clap(long, env = "ALPACA_MAX_MESSAGE_SIZE", help = "Largest inbound message accepted, in bytes.")]
    pub max_message_size: Option<usize>,

    #[clap(long, env = "ALPACA_PING_PERIOD_SECONDS", help = "Seconds between keepalive pings.")]
    pub ping_period_seconds: Option<u64>,

    #[clap(long, env = "ALPACA_DIAL_TIMEOUT_MS", help = "Milliseconds allowed for the WebSocket upgrade.")]
    pub dial_timeout_ms: Option<u64>,

    #[clap(long, env = "ALPACA_RECONNECT_BASE_DELAY_MS", help = "Base delay in milliseconds for upstream reconnect attempts.")]
    pub reconnect_base_delay_ms: Option<u64>,

    #[clap(long, env = "ALPACA_RECONNECT_MAX_DELAY_MS", help = "Maximum delay in milliseconds for upstream reconnect attempts.")]
    pub reconnect_max_delay_ms: Option<u64>,

    #[clap(long, env = "ALPACA_OUTPUT_PATH", help = "File receiving one frame per line. Defaults to stdout.")]
    pub output_path: Option<PathBuf>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            ws_server: other.ws_server.or(self.ws_server),
            api_key: other.api_key.or(self.api_key),
            api_secret: other.api_secret.or(self.api_secret),
            minute_bars: other.minute_bars.or(self.minute_bars),
            quotes: other.quotes.or(self.quotes),
            trades: other.trades.or(self.trades),
            max_message_size: other.max_message_size.or(self.max_message_size),
            ping_period_seconds: other.ping_period_seconds.or(self.ping_period_seconds),
            dial_timeout_ms: other.dial_timeout_ms.or(self.dial_timeout_ms),
            reconnect_base_delay_ms: other.reconnect_base_delay_ms.or(self.reconnect_base_delay_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
            output_path: other.output_path.or(self.output_path),
        }
    }

    fn defaults() -> Config {
        Config {
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ws_server: Some("wss://data.alpaca.markets/stream".to_string()),
            max_message_size: Some(2_048_000),
            ping_period_seconds: Some(10),
            dial_timeout_ms: Some(2000),
            reconnect_base_delay_ms: Some(1000),
            reconnect_max_delay_ms: Some(60000),
            ..Default::default()
        }
    }

    pub fn subscription(&self) -> Subscription {
        Subscription {
            minute_bars: self.minute_bars.clone().unwrap_or_default(),
            quotes: self.quotes.clone().unwrap_or_default(),
            trades: self.trades.clone().unwrap_or_default(),
        }
    }

    /// Builds the stream client configuration, rejecting incomplete settings.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let Some(endpoint) = self.ws_server.clone() else {
            bail!("no upstream WebSocket URL configured (wsServer / ALPACA_WS_SERVER)");
        };
        let (Some(key), Some(secret)) = (self.api_key.clone(), self.api_secret.clone()) else {
            bail!("Alpaca credentials missing (apiKey and apiSecret are both required)");
        };

        let topics = self.subscription().as_canonical();
        if topics.is_empty() {
            bail!("no symbols configured; set at least one of minuteBars, quotes or trades");
        }

        let mut client = ClientConfig::new(endpoint, Credentials::new(key, secret), topics);
        if let Some(bytes) = self.max_message_size {
            client = client.with_max_message_size(bytes);
        }
        if let Some(secs) = self.ping_period_seconds {
            if secs == 0 {
                bail!("pingPeriodSeconds must be greater than zero");
            }
            client = client.with_ping_period(Duration::from_secs(secs));
        }
        if let Some(ms) = self.dial_timeout_ms {
            client = client.with_dial_timeout(Duration::from_millis(ms));
        }
        Ok(client)
    }
}

pub fn load_config() -> Config {
    let _ = dotenvy::dotenv();
    resolve(Config::parse())
}

/// Layers defaults, the JSON config file and env/CLI values, in that order.
pub fn resolve(cli: Config) -> Config {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();

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

    current_config.merge(cli)
}
