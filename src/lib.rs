use serde::Deserialize;
use std::path::PathBuf;

pub mod adapters;
pub mod sync;

pub use tempo_indexer::IndexerConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/tempo.redb"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,

    #[serde(default)]
    pub challenge_queue: Option<String>,

    #[serde(default)]
    pub refresh_set: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Newline-delimited JSON feed of pull events from the block relay
    pub feed: Option<PathBuf>,

    /// How many blocks of revert snapshots to keep behind the cursor
    pub retention: u64,

    /// Sleep between polls when the feed runs dry
    pub poll_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            feed: None,
            retention: 1_000,
            poll_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub indexer: IndexerConfig,
    pub redis: Option<RedisConfig>,
    pub sync: SyncConfig,
}

impl Config {
    pub fn new(explicit_file: &Option<PathBuf>) -> Result<Self, config::ConfigError> {
        let mut s = config::Config::builder();

        // base config lives in /etc/tempo
        s = s.add_source(config::File::with_name("/etc/tempo/daemon.toml").required(false));

        // a file in the working dir overrides it
        s = s.add_source(config::File::with_name("tempo.toml").required(false));

        // an explicitly passed file is mandatory
        if let Some(explicit) = explicit_file.as_ref().and_then(|x| x.to_str()) {
            s = s.add_source(config::File::with_name(explicit).required(true));
        }

        // env vars make last-step overrides
        s = s.add_source(config::Environment::with_prefix("TEMPO").separator("_"));

        s.build()?.try_deserialize()
    }
}
