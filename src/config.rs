//! Run configuration loaded from an optional YAML file.
//!
//! Every key is optional. Per-source sections are overrides layered on top of
//! [`SourceSettings::defaults_for`], so a file only has to mention what it
//! changes:
//!
//! ```yaml
//! snapshot_path: data/latest.json
//! run_timeout_secs: 900
//! sources:
//!   cointelegraph:
//!     concurrency_limit: 1
//!   cryptoslate:
//!     enabled: false
//! ```

use crate::error::ConfigError;
use crate::fetcher::RetryPolicy;
use crate::models::SourceId;
use crate::rank::DEFAULT_TOPIC_KEYWORDS;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_SNAPSHOT_PATH: &str = "data/latest.json";

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub snapshot_path: PathBuf,
    pub run_timeout: Option<Duration>,
    pub topic_keywords: Vec<String>,
    pub sources: BTreeMap<SourceId, SourceSettings>,
}

/// Fully resolved settings for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub enabled: bool,
    pub base_url: String,
    /// Recency window in hours.
    pub hours_back: u32,
    /// Pagination cap; ignored by feed sources.
    pub max_pages: u32,
    /// Simultaneous in-flight requests allowed against this source.
    pub concurrency_limit: usize,
    pub retry_count: u32,
    pub backoff_base: Duration,
    pub jitter: Duration,
    pub page_timeout: Duration,
    pub slow_timeout: Duration,
    pub enrich: bool,
    pub page_delay: Duration,
    pub cooldown: (Duration, Duration),
}

impl SourceSettings {
    pub fn defaults_for(source: SourceId) -> Self {
        let (base_url, concurrency_limit, page_delay_ms, cooldown_ms) = match source {
            SourceId::CoinTelegraph => ("https://cointelegraph.com", 2, 0, (400, 1400)),
            SourceId::CoinDesk => ("https://www.coindesk.com", 4, 400, (0, 0)),
            SourceId::CryptoSlate => ("https://cryptoslate.com", 4, 400, (0, 0)),
        };
        Self {
            enabled: true,
            base_url: base_url.to_string(),
            hours_back: 48,
            max_pages: 5,
            concurrency_limit,
            retry_count: 3,
            backoff_base: Duration::from_secs(1),
            jitter: Duration::from_millis(250),
            page_timeout: Duration::from_secs(15),
            slow_timeout: Duration::from_secs(30),
            enrich: true,
            page_delay: Duration::from_millis(page_delay_ms),
            cooldown: (
                Duration::from_millis(cooldown_ms.0),
                Duration::from_millis(cooldown_ms.1),
            ),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_count,
            backoff_base: self.backoff_base,
            jitter: self.jitter,
            ..RetryPolicy::default()
        }
    }

    fn apply(&mut self, o: SourceOverrides) {
        if let Some(v) = o.enabled {
            self.enabled = v;
        }
        if let Some(v) = o.base_url {
            self.base_url = v;
        }
        if let Some(v) = o.hours_back {
            self.hours_back = v;
        }
        if let Some(v) = o.max_pages {
            self.max_pages = v;
        }
        if let Some(v) = o.concurrency_limit {
            self.concurrency_limit = v;
        }
        if let Some(v) = o.retry_count {
            self.retry_count = v;
        }
        if let Some(v) = o.backoff_base_ms {
            self.backoff_base = Duration::from_millis(v);
        }
        if let Some(v) = o.jitter_ms {
            self.jitter = Duration::from_millis(v);
        }
        if let Some(v) = o.timeout_secs {
            self.page_timeout = Duration::from_secs(v);
        }
        if let Some(v) = o.slow_timeout_secs {
            self.slow_timeout = Duration::from_secs(v);
        }
        if let Some(v) = o.enrich {
            self.enrich = v;
        }
        if let Some(v) = o.page_delay_ms {
            self.page_delay = Duration::from_millis(v);
        }
        if let Some(v) = o.cooldown_min_ms {
            self.cooldown.0 = Duration::from_millis(v);
        }
        if let Some(v) = o.cooldown_max_ms {
            self.cooldown.1 = Duration::from_millis(v);
        }
    }

    fn validate(&self, source: SourceId) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| ConfigError::Invalid {
            source_id: source.to_string(),
            field,
            reason: reason.to_string(),
        };
        if self.concurrency_limit == 0 {
            return Err(invalid("concurrency_limit", "must be at least 1"));
        }
        if self.max_pages == 0 {
            return Err(invalid("max_pages", "must be at least 1"));
        }
        if self.cooldown.0 > self.cooldown.1 {
            return Err(invalid("cooldown_min_ms", "must not exceed cooldown_max_ms"));
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(invalid("base_url", "not an absolute URL"));
        }
        Ok(())
    }
}

/// On-disk shape of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub snapshot_path: Option<PathBuf>,
    pub run_timeout_secs: Option<u64>,
    pub topic_keywords: Option<Vec<String>>,
    pub sources: BTreeMap<SourceId, SourceOverrides>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceOverrides {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    pub hours_back: Option<u32>,
    pub max_pages: Option<u32>,
    pub concurrency_limit: Option<usize>,
    pub retry_count: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub jitter_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub slow_timeout_secs: Option<u64>,
    pub enrich: Option<bool>,
    pub page_delay_ms: Option<u64>,
    pub cooldown_min_ms: Option<u64>,
    pub cooldown_max_ms: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            run_timeout: None,
            topic_keywords: DEFAULT_TOPIC_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            sources: SourceId::ALL
                .into_iter()
                .map(|id| (id, SourceSettings::defaults_for(id)))
                .collect(),
        }
    }
}

impl Settings {
    /// Resolve settings from parsed file contents.
    pub fn from_file_config(file: FileConfig) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();
        if let Some(path) = file.snapshot_path {
            settings.snapshot_path = path;
        }
        settings.run_timeout = file.run_timeout_secs.map(Duration::from_secs);
        if let Some(keywords) = file.topic_keywords {
            settings.topic_keywords = keywords.into_iter().map(|k| k.to_lowercase()).collect();
        }
        for (id, overrides) in file.sources {
            if let Some(s) = settings.sources.get_mut(&id) {
                s.apply(overrides);
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: FileConfig = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_file_config(file)
    }

    /// Load settings from `path`, or defaults when no path is given.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No config file given; using built-in defaults");
            return Ok(Settings::default());
        };
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let settings = Self::from_yaml(&text, path)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(settings)
    }

    /// Apply the same recency window to every source.
    pub fn set_hours_back(&mut self, hours: u32) {
        self.sources.values_mut().for_each(|s| s.hours_back = hours);
    }

    /// Apply the same pagination cap to every source.
    pub fn set_max_pages(&mut self, pages: u32) {
        self.sources.values_mut().for_each(|s| s.max_pages = pages);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sources.iter().try_for_each(|(id, s)| s.validate(*id))
    }
}
