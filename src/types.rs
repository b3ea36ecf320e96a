//! Core data model: mirrors, the sources they advertise, and the engine's outputs

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MirrorConfig;
use crate::error::Result;
use crate::utils::format_size;

/// Label used when a snapshot has no publish date
pub const UNKNOWN_DATE: &str = "latest (unknown date)";

/// Index of a [`Mirror`] in the registry it was built from
///
/// Sources refer back to their mirror through this id rather than by owning
/// a reference, so the registry stays the single owner of mirror state.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MirrorId(pub usize);

impl MirrorId {
    /// Get the inner index
    pub fn get(&self) -> usize {
        self.0
    }
}

impl From<usize> for MirrorId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

impl fmt::Display for MirrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A configured server believed to host copies of the planet
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mirror {
    /// Position of this mirror in the registry
    pub id: MirrorId,
    /// Country label, for attribution only
    pub country: String,
    /// Directory URL (multi-file) or file URL (single-file)
    pub url: String,
    /// Primary mirrors are dropped from plans when enough redundancy exists
    pub primary: bool,
    /// Whether the mirror hosts several dated files instead of one alias
    pub multi_file: bool,
    /// Sources discovered while probing
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl Mirror {
    /// Build a mirror with no sources from its configuration entry
    pub fn from_config(id: MirrorId, config: &MirrorConfig) -> Self {
        Self {
            id,
            country: config.country.clone(),
            url: config.url.clone(),
            primary: config.primary,
            multi_file: config.multi_file,
            sources: Vec::new(),
        }
    }

    /// Build the registry for a list of mirror configurations, ids following list order
    pub fn registry(configs: &[MirrorConfig]) -> Vec<Mirror> {
        configs
            .iter()
            .enumerate()
            .map(|(i, config)| Mirror::from_config(MirrorId(i), config))
            .collect()
    }
}

/// One candidate file as advertised by one mirror
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// File name, e.g. `planet-240102.osm.pbf`
    pub name: String,
    /// Download URL
    pub url: String,
    /// URL of the companion hash file
    pub hash_url: String,
    /// Publish time parsed from the file name; `None` for the `latest` alias
    pub timestamp: Option<DateTime<Utc>>,
    /// Lowercase md5 hex digest, empty when unavailable
    #[serde(default)]
    pub hash: String,
    /// Byte length, 0 when unknown
    #[serde(default)]
    pub length: u64,
    /// Owning mirror
    pub mirror: MirrorId,
}

impl Source {
    /// Create a source whose hash file lives next to it with an `.md5` suffix
    pub fn new(name: impl Into<String>, url: impl Into<String>, mirror: MirrorId) -> Self {
        let url = url.into();
        Self {
            name: name.into(),
            hash_url: format!("{url}.md5"),
            url,
            timestamp: None,
            hash: String::new(),
            length: 0,
            mirror,
        }
    }

    /// Set the publish timestamp
    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Override the hash-file URL
    pub fn with_hash_url(mut self, hash_url: impl Into<String>) -> Self {
        self.hash_url = hash_url.into();
        self
    }

    /// Whether the source carries a usable hash
    pub fn has_hash(&self) -> bool {
        !self.hash.is_empty()
    }

    /// Human-readable size
    pub fn size(&self) -> String {
        format_size(self.length)
    }

    /// Sort key under which a missing timestamp is newer than any real one
    pub fn recency(&self) -> Recency {
        Recency(self.timestamp)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.name, self.url)
    }
}

/// Publish-time ordering where "unknown" means "latest"
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Recency(pub Option<DateTime<Utc>>);

impl Ord for Recency {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0, other.0) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(&b),
        }
    }
}

impl PartialOrd for Recency {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Calendar date of a timestamp, or [`UNKNOWN_DATE`]
pub fn date_label(timestamp: Option<DateTime<Utc>>) -> String {
    match timestamp {
        Some(ts) => ts.format("%Y-%m-%d").to_string(),
        None => UNKNOWN_DATE.to_string(),
    }
}

/// Summary of one hash group
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Newest publish date among the group's members, `None` if none is dated
    pub timestamp: Option<DateTime<Utc>>,
    /// Number of distinct mirrors carrying the snapshot
    pub mirror_count: usize,
    /// Snapshot hash
    pub hash: String,
    /// Byte length of the representative source, 0 when unknown
    pub size: u64,
}

impl Stat {
    /// Sort key under which a missing timestamp is newer than any real one
    pub fn recency(&self) -> Recency {
        Recency(self.timestamp)
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hash: {} | mirrors: {} | timestamp: {} | size: {}",
            self.hash,
            self.mirror_count,
            date_label(self.timestamp),
            format_size(self.size)
        )
    }
}

/// Options the driver passes to the engine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Keep primary-mirror URLs in the plan
    #[serde(default)]
    pub use_primary: bool,
    /// Always pick the newest snapshot, however few mirrors carry it
    #[serde(default)]
    pub force_latest: bool,
    /// Log per-source detail
    #[serde(default)]
    pub verbose: bool,
}

/// The snapshot to fetch and the URLs trusted to serve it
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadPlan {
    /// Winning md5 hash
    pub hash: String,
    /// One URL per surviving source, in group order
    pub urls: Vec<String>,
}

impl DownloadPlan {
    /// Write the URLs as a single tab-separated row
    pub async fn save_urls(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut row = self.urls.join("\t");
        row.push('\n');
        tokio::fs::write(path.as_ref(), row).await?;
        tracing::info!(path = %path.as_ref().display(), urls = self.urls.len(), "saved download urls");
        Ok(())
    }
}
