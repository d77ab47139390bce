//! Runtime settings, read from an optional TOML file.
//!
//! Every field has a default, so an empty or partial file is valid:
//!
//! ```toml
//! [resolver]
//! min_relax_words = 3
//!
//! [rate_limit.google]
//! requests_per_minute = 100
//!
//! [network]
//! reconnect_command = ["hotspotshield", "connect"]
//! ```

use crate::error::{Error, Result};
use crate::geocode::cache::{DEFAULT_CAPACITY, DEFAULT_TTL};
use crate::geocode::{
    CommandReconnect, NetworkPath, NoReconnect, ProviderConfig, RateLimits, ResolverOptions,
    ResultCache, RetryPolicy,
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Records per checkpoint file.
    pub batch_size: usize,
    /// Pause between items, on top of the rate limiter.
    pub pace_ms: u64,
    pub output_dir: PathBuf,
    /// JSON file with the suggestion and geocoding key pools.
    pub credentials: Option<PathBuf>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            pace_ms: 500,
            output_dir: PathBuf::from("geocode_results"),
            credentials: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Keep the cache on disk between runs.
    pub persist: bool,
    /// Defaults to ~/.addis-geocoder/cache.json.
    pub path: Option<PathBuf>,
    pub capacity: usize,
    /// `None` keeps entries forever.
    pub ttl_days: Option<u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            persist: true,
            path: None,
            capacity: DEFAULT_CAPACITY,
            ttl_days: Some(DEFAULT_TTL.as_secs() / 86_400),
        }
    }
}

impl CacheSettings {
    /// Build the cache these settings describe. `shard` gives each shard its own file.
    pub fn open(&self, shard: Option<usize>) -> ResultCache {
        let cache = if self.persist {
            let mut path = self.path.clone().unwrap_or_else(ResultCache::default_path);
            if let Some(k) = shard {
                let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("cache").to_string();
                path.set_file_name(format!("{}.shard{}.json", stem, k));
            }
            ResultCache::load_from(path)
        } else {
            ResultCache::in_memory()
        };
        cache
            .with_capacity(self.capacity)
            .with_ttl(self.ttl_days.map(|d| Duration::from_secs(d * 86_400)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Command (program and arguments) that switches the network path when
    /// a provider rejects our location.
    pub reconnect_command: Option<Vec<String>>,
    pub settle_secs: Option<u64>,
}

impl NetworkSettings {
    pub fn network_path(&self) -> Box<dyn NetworkPath> {
        match self.reconnect_command.as_deref() {
            Some([program, args @ ..]) => {
                let mut reconnect = CommandReconnect::new(program.clone(), args.to_vec());
                if let Some(secs) = self.settle_secs {
                    reconnect = reconnect.with_settle_time(Duration::from_secs(secs));
                }
                Box::new(reconnect)
            }
            _ => Box::new(NoReconnect),
        }
    }
}

/// All runtime settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: ProviderConfig,
    pub resolver: ResolverOptions,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimits,
    pub batch: BatchSettings,
    pub cache: CacheSettings,
    pub network: NetworkSettings,
}

impl Settings {
    /// Load from `path`, or from ~/.addis-geocoder/config.toml when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from(p),
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::load_from(&default)
                } else {
                    debug!("No config file at {}, using defaults", default.display());
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".addis-geocoder")
            .join("config.toml")
    }

    fn validate(&self) -> Result<()> {
        if self.batch.batch_size == 0 {
            return Err(Error::Config("batch.batch_size must be at least 1".into()));
        }
        if self.resolver.min_relax_words == 0 {
            return Err(Error::Config("resolver.min_relax_words must be at least 1".into()));
        }
        if self.cache.capacity == 0 {
            return Err(Error::Config("cache.capacity must be at least 1".into()));
        }
        Ok(())
    }
}
