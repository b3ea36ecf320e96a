//! Driver-facing entry point: probe every configured mirror, then reconcile

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::http::{HttpClient, MetadataFetcher};
use crate::prober::{ProbeFailure, probe_all};
use crate::reconcile::{Reconciliation, reconcile};
use crate::types::{Mirror, MirrorId};

/// Mirror registry plus the client used to probe it
pub struct Catalog {
    config: Config,
    fetcher: Arc<dyn MetadataFetcher>,
}

impl Catalog {
    /// Validate `config` and build an HTTP-backed catalog
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = HttpClient::new(&config.http, config.retry.clone())?;
        Ok(Self {
            config,
            fetcher: Arc::new(client),
        })
    }

    /// Build a catalog over a custom fetcher
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn MetadataFetcher>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, fetcher })
    }

    /// The configuration this catalog runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Probe every mirror and wait for all of them to finish
    pub async fn probe(&self) -> (Vec<Mirror>, Vec<ProbeFailure>) {
        let mut mirrors = Mirror::registry(&self.config.mirrors);
        let failures = probe_all(
            self.fetcher.as_ref(),
            &mut mirrors,
            &self.config.probe,
            self.config.options.verbose,
        )
        .await;

        let sources: usize = mirrors.iter().map(|m| m.sources.len()).sum();
        info!(
            mirrors = mirrors.len(),
            failed = failures.len(),
            sources,
            "probing complete"
        );
        (mirrors, failures)
    }

    /// Probe, then decide what to download
    pub async fn run(&self) -> Result<CatalogRun> {
        let (mirrors, failures) = self.probe().await;

        let reconciliation = reconcile(&mirrors, &self.config.options, &self.config.selection)?;

        Ok(CatalogRun {
            unreachable: failures
                .iter()
                .map(|failure| Unreachable {
                    mirror: failure.mirror,
                    reason: failure.error.to_string(),
                })
                .collect(),
            mirrors,
            reconciliation,
        })
    }
}

/// A mirror that contributed no sources
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Unreachable {
    /// Registry id of the mirror
    pub mirror: MirrorId,
    /// Probe error message
    pub reason: String,
}

/// Outcome of [`Catalog::run`]
#[derive(Clone, Debug, Serialize)]
pub struct CatalogRun {
    /// Probed registry, sources attached
    pub mirrors: Vec<Mirror>,
    /// Mirrors whose probe failed
    pub unreachable: Vec<Unreachable>,
    /// The engine's decision
    pub reconciliation: Reconciliation,
}

impl CatalogRun {
    /// Write the winning URLs as one tab-separated row
    pub async fn save_urls(&self, path: impl AsRef<Path>) -> Result<()> {
        self.reconciliation.plan.save_urls(path).await
    }

    /// Write the full run as pretty-printed JSON
    pub async fn save_report(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path.as_ref(), json).await?;
        info!(path = %path.as_ref().display(), "saved report");
        Ok(())
    }
}
