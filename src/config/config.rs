use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Upstream feed connection settings.
///
/// The reconnect policy is a constant delay with a hard ceiling on
/// consecutive failed attempts; there is no backoff.
#[derive(Debug, Deserialize, Clone)]
pub struct FeedSettings {
    #[serde(default = "default_feed_url")]
    pub url: String,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

fn default_feed_url() -> String {
    "wss://pumpportal.fun/api/data".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

/// In-memory working set bound. Also used as the bulk-load size at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkingSetSettings {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for WorkingSetSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    100
}

/// Descriptor document fetch settings.
#[derive(Debug, Deserialize, Clone)]
pub struct MetadataSettings {
    #[serde(default = "default_metadata_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_metadata_timeout_secs(),
        }
    }
}

fn default_metadata_timeout_secs() -> u64 {
    10
}

/// PostgreSQL database connection configuration.
///
/// Used for storing:
/// - Token launch records
/// - Content links (twitter, telegram, website) per token
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// oEmbed proxy settings.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbedSettings {
    /// How long a failed tweet URL is skipped before being retried
    #[serde(default = "default_failure_ttl_secs")]
    pub failure_ttl_secs: u64,
    #[serde(default = "default_failure_cache_capacity")]
    pub failure_cache_capacity: u64,
    #[serde(default)]
    pub instagram_access_token: Option<String>,
}

impl Default for EmbedSettings {
    fn default() -> Self {
        Self {
            failure_ttl_secs: default_failure_ttl_secs(),
            failure_cache_capacity: default_failure_cache_capacity(),
            instagram_access_token: None,
        }
    }
}

fn default_failure_ttl_secs() -> u64 {
    300
}

fn default_failure_cache_capacity() -> u64 {
    1_000
}

/// Root application configuration.
///
/// Loaded from an optional `config.yaml` at startup, then overridden by
/// `LAUNCHWATCH__SECTION__KEY` environment variables.
/// Without a `postgres` section the service keeps records in memory only.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub working_set: WorkingSetSettings,
    #[serde(default)]
    pub metadata: MetadataSettings,
    #[serde(default)]
    pub postgres: Option<PostgresSettings>,
    #[serde(default)]
    pub embed: EmbedSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("LAUNCHWATCH").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}
