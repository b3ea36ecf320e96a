//! Error types for planet-mirrors
//!
//! Errors fall into three families:
//! - Transport errors raised by the HTTP client ([`Error::Network`], [`Error::HttpStatus`], ...)
//! - Probe-local errors ([`ProbeError`]) which are logged and absorbed by the prober
//! - Reconciliation errors ([`ReconcileError`]) which abort the whole run

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Source;

/// Result type alias for planet-mirrors operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for planet-mirrors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "mirrors")
        key: Option<String>,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server answered with an error status
    #[error("received status {status} from {url}")]
    HttpStatus {
        /// The requested URL
        url: String,
        /// The HTTP status code
        status: u16,
    },

    /// HEAD response carried no usable Content-Length header
    #[error("no content length reported for {url}")]
    MissingContentLength {
        /// The probed URL
        url: String,
    },

    /// A URL could not be parsed or joined
    #[error("invalid url {url}: {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Parser message
        reason: String,
    },

    /// Probe-local failure (normally logged, not propagated)
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Reconciliation failed
    #[error("reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a [`Error::Config`] tied to a configuration key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error aborts reconciliation (as opposed to degrading a single mirror)
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Reconcile(_) | Error::Config { .. })
    }
}

/// Failures confined to a single mirror or a single source on a mirror
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The mirror's directory listing could not be loaded
    #[error("unable to use {country} mirror {url}: {reason}")]
    Listing {
        /// Mirror country label
        country: String,
        /// Mirror base URL
        url: String,
        /// Underlying failure
        reason: String,
    },

    /// The mirror advertised no planet files
    #[error("unable to use {country} mirror {url}: no sources found")]
    NoSources {
        /// Mirror country label
        country: String,
        /// Mirror base URL
        url: String,
    },

    /// The hash file could not be fetched
    #[error("unable to load md5 hash for {name} from {url}: {reason}")]
    HashUnavailable {
        /// Source file name
        name: String,
        /// Hash-file URL
        url: String,
        /// Underlying failure
        reason: String,
    },

    /// The hash file did not start with a 32-character hex digest
    #[error("unable to load md5 hash for {name} from {url}: invalid md5 hash {value:?}")]
    InvalidHash {
        /// Source file name
        name: String,
        /// Hash-file URL
        url: String,
        /// The rejected token
        value: String,
    },

    /// The content length could not be probed
    #[error("unable to load metadata for {name} from {url}: {reason}")]
    LengthUnavailable {
        /// Source file name
        name: String,
        /// File URL
        url: String,
        /// Underlying failure
        reason: String,
    },

    /// The mirror did not finish probing within the configured bound
    #[error("{country} mirror {url} did not respond within {seconds}s")]
    Timeout {
        /// Mirror country label
        country: String,
        /// Mirror base URL
        url: String,
        /// The bound that was exceeded
        seconds: u64,
    },
}

/// Identifies one side of a metadata conflict
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictingSource {
    /// Source file name
    pub name: String,
    /// Source URL
    pub url: String,
    /// Hash reported for the source
    pub hash: String,
}

impl From<&Source> for ConflictingSource {
    fn from(source: &Source) -> Self {
        Self {
            name: source.name.clone(),
            url: source.url.clone(),
            hash: source.hash.clone(),
        }
    }
}

impl fmt::Display for ConflictingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} (hash={})", self.name, self.url, self.hash)
    }
}

/// Errors that abort reconciliation
#[derive(Debug, Error, PartialEq)]
pub enum ReconcileError {
    /// Two sources published at the same instant disagree on their hash
    #[error("multiple files with timestamp {timestamp} have different hashes: {first} vs {second}")]
    TimestampConflict {
        /// The shared timestamp
        timestamp: DateTime<Utc>,
        /// Source indexed first
        first: ConflictingSource,
        /// Source contradicting it
        second: ConflictingSource,
    },

    /// Two sources with the same byte length disagree on their hash
    #[error("multiple files with length {length} have different hashes: {first} vs {second}")]
    LengthConflict {
        /// The shared byte length
        length: u64,
        /// Source indexed first
        first: ConflictingSource,
        /// Source contradicting it
        second: ConflictingSource,
    },

    /// No mirror produced a hashed source
    #[error("no candidate snapshot could be identified from any mirror")]
    NoCandidates,

    /// The selected hash is missing from the grouped sources
    #[error("internal error: selected hash {hash} has no grouped sources")]
    SelectionIntegrity {
        /// The hash that could not be resolved
        hash: String,
    },
}
