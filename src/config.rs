//! Configuration types for planet-mirrors

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::ReconcileOptions;

/// One mirror entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Country label (attribution only)
    pub country: String,

    /// Directory URL for multi-file mirrors, file URL otherwise
    pub url: String,

    /// Deprioritize this mirror when enough other mirrors carry the snapshot
    #[serde(default)]
    pub primary: bool,

    /// The mirror lists several dated planets rather than one `latest` file
    #[serde(default)]
    pub multi_file: bool,
}

impl MirrorConfig {
    /// A mirror exposing a directory listing of dated planet files
    pub fn multi(country: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            url: url.into(),
            primary: false,
            multi_file: true,
        }
    }

    /// A mirror whose URL is the `planet-latest.osm.pbf` file itself
    pub fn single(country: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            url: url.into(),
            primary: false,
            multi_file: false,
        }
    }

    /// Flag the mirror as primary
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }
}

/// HTTP client settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (default: 10 seconds)
    #[serde(default = "default_http_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Idle connections kept per host (default: 100)
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout: default_http_timeout(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
        }
    }
}

/// Retry configuration for transient fetch failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Mirror probing settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Mirrors probed at the same time (default: 16)
    #[serde(default = "default_max_concurrent_mirrors")]
    pub max_concurrent_mirrors: usize,

    /// Upper bound on one mirror's whole probe (default: 120 seconds, None = unbounded)
    ///
    /// A mirror exceeding it contributes no sources instead of stalling the run.
    #[serde(
        default = "default_mirror_timeout",
        with = "optional_duration_serde"
    )]
    pub mirror_timeout: Option<Duration>,

    /// Dated files kept per multi-file mirror besides `latest` (default: 2)
    #[serde(default = "default_recent_dated_files")]
    pub recent_dated_files: usize,

    /// Suffix appended to a file URL to find its hash file (default: ".md5")
    #[serde(default = "default_hash_suffix")]
    pub hash_suffix: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_mirrors: default_max_concurrent_mirrors(),
            mirror_timeout: default_mirror_timeout(),
            recent_dated_files: default_recent_dated_files(),
            hash_suffix: default_hash_suffix(),
        }
    }
}

/// Snapshot selection policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Mirrors the newest snapshot needs before it is preferred (default: 2)
    #[serde(default = "default_min_mirror_count")]
    pub min_mirror_count: usize,

    /// Fall back when `newest * ratio < runner_up` (default: 1.5, None = disabled)
    #[serde(default = "default_runner_up_ratio")]
    pub runner_up_ratio: Option<f64>,

    /// Treat contradictory length evidence as fatal instead of discarding
    /// hashless sources (default: false)
    #[serde(default)]
    pub strict_length_conflicts: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_mirror_count: default_min_mirror_count(),
            runner_up_ratio: default_runner_up_ratio(),
            strict_length_conflicts: false,
        }
    }
}

/// Main configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Mirrors to probe
    #[serde(default = "default_mirrors")]
    pub mirrors: Vec<MirrorConfig>,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Retry policy for hash and length fetches
    #[serde(default)]
    pub retry: RetryConfig,

    /// Probing behaviour
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Selection policy
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Driver options
    #[serde(default)]
    pub options: ReconcileOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mirrors: default_mirrors(),
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
            probe: ProbeConfig::default(),
            selection: SelectionConfig::default(),
            options: ReconcileOptions::default(),
        }
    }
}

impl Config {
    /// Parse a JSON document, filling omitted fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Reject settings the prober or engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.mirrors.is_empty() {
            return Err(Error::config("mirrors", "at least one mirror is required"));
        }
        for mirror in &self.mirrors {
            if let Err(e) = url::Url::parse(&mirror.url) {
                return Err(Error::config(
                    "mirrors.url",
                    format!("invalid mirror url {}: {}", mirror.url, e),
                ));
            }
        }
        if self.probe.max_concurrent_mirrors == 0 {
            return Err(Error::config(
                "probe.max_concurrent_mirrors",
                "must be at least 1",
            ));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !(multiplier.is_finite() && multiplier >= 1.0) {
            return Err(Error::config(
                "retry.backoff_multiplier",
                format!("must be a finite number of at least 1, got {multiplier}"),
            ));
        }
        if let Some(ratio) = self.selection.runner_up_ratio
            && !(ratio.is_finite() && ratio > 0.0)
        {
            return Err(Error::config(
                "selection.runner_up_ratio",
                format!("must be a positive number, got {ratio}"),
            ));
        }
        Ok(())
    }
}

/// Well-known public planet mirrors; the main site is primary
pub fn default_mirrors() -> Vec<MirrorConfig> {
    vec![
        MirrorConfig::multi("gb", "https://planet.openstreetmap.org/pbf/").primary(),
        MirrorConfig::multi("de", "https://ftp.fau.de/osm-planet/pbf/"),
        MirrorConfig::multi(
            "de",
            "https://ftp5.gwdg.de/pub/misc/openstreetmap/planet.openstreetmap.org/pbf/",
        ),
        MirrorConfig::multi("de", "https://ftp.spline.de/pub/openstreetmap/pbf/"),
        MirrorConfig::multi("nl", "https://ftp.nluug.nl/maps/planet.openstreetmap.org/pbf/"),
        MirrorConfig::multi("us", "https://ftp.osuosl.org/pub/openstreetmap/pbf/"),
        MirrorConfig::single(
            "de",
            "https://download.bbbike.org/osm/planet/planet-latest.osm.pbf",
        ),
    ]
}

fn default_user_agent() -> String {
    format!("planet-mirrors/{}", env!("CARGO_PKG_VERSION"))
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_pool_max_idle_per_host() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_concurrent_mirrors() -> usize {
    16
}

fn default_mirror_timeout() -> Option<Duration> {
    Some(Duration::from_secs(120))
}

fn default_recent_dated_files() -> usize {
    2
}

fn default_hash_suffix() -> String {
    ".md5".to_string()
}

fn default_min_mirror_count() -> usize {
    2
}

fn default_runner_up_ratio() -> Option<f64> {
    Some(1.5)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
