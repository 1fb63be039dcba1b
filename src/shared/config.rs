use super::error::AppError;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    pub collection: String,
    pub channel_name: String,
    /// 変更フィードのキュー容量
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    pub threshold: f64,
    pub location: usize,
    pub distance: usize,
    #[serde(default)]
    pub ignore_location: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub default_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            search: SearchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            collection: "forum_posts".to_string(),
            channel_name: "forum_changes".to_string(),
            channel_capacity: 256,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            location: 0,
            distance: 100,
            ignore_location: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "forum_sync=debug,info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("FORUM_SYNC_COLLECTION") {
            if !v.trim().is_empty() {
                cfg.remote.collection = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("FORUM_SYNC_CHANNEL") {
            if !v.trim().is_empty() {
                cfg.remote.channel_name = v.trim().to_string();
            }
        }
        if let Some(v) = parse_env::<usize>("FORUM_SYNC_CHANNEL_CAPACITY") {
            cfg.remote.channel_capacity = v;
        }
        if let Some(v) = parse_env::<f64>("FORUM_SYNC_SEARCH_THRESHOLD") {
            cfg.search.threshold = v;
        }
        if let Some(v) = parse_env::<usize>("FORUM_SYNC_SEARCH_DISTANCE") {
            cfg.search.distance = v;
        }
        if let Ok(v) = std::env::var("FORUM_SYNC_SEARCH_IGNORE_LOCATION") {
            cfg.search.ignore_location = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("FORUM_SYNC_LOG") {
            if !v.trim().is_empty() {
                cfg.logging.default_filter = v.trim().to_string();
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.remote.collection.is_empty() {
            return Err(AppError::ConfigurationError(
                "remote.collection must not be empty".to_string(),
            ));
        }
        if self.remote.channel_capacity == 0 {
            return Err(AppError::ConfigurationError(
                "remote.channel_capacity must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.search.threshold) {
            return Err(AppError::ConfigurationError(format!(
                "search.threshold must be within [0, 1], got {}",
                self.search.threshold
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value for {}: {}", key, raw);
            None
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
