//! # planet-mirrors
//!
//! Decides which OpenStreetMap planet snapshot to download, and from which
//! mirrors, when the mirrors disagree about what they host.
//!
//! ## Design Philosophy
//!
//! planet-mirrors is designed to be:
//! - **Evidence-driven** - Only md5 hashes and exact byte lengths identify a snapshot
//! - **Fail-safe** - Contradictory metadata aborts the run instead of guessing
//! - **Sensible defaults** - Ships with the well-known public mirror list
//! - **Library-first** - The engine is pure; probing is behind a trait
//!
//! ## Quick Start
//!
//! ```no_run
//! use planet_mirrors::{Catalog, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Catalog::new(Config::default())?;
//!     let run = catalog.run().await?;
//!
//!     println!("{}", run.reconciliation.summary);
//!     for url in &run.reconciliation.plan.urls {
//!         println!("{url}");
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Probe-then-reconcile entry point
pub mod catalog;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// HTTP metadata fetching
pub mod http;
/// Directory listing parsing
pub mod listing;
/// Concurrent mirror probing
pub mod prober;
/// Reconciliation engine
pub mod reconcile;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogRun, Unreachable};
pub use config::{Config, MirrorConfig, ProbeConfig, SelectionConfig};
pub use error::{ConflictingSource, Error, ProbeError, ReconcileError, Result};
pub use http::{HttpClient, MetadataFetcher};
pub use prober::{ProbeFailure, probe_all};
pub use reconcile::{
    FallbackReason, Reconciliation, Summary, Warning, reconcile, reconcile_sources,
};
pub use types::{DownloadPlan, Mirror, MirrorId, ReconcileOptions, Source, Stat};
