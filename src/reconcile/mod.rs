//! Reconciliation engine
//!
//! Consumes every source attached to the mirror registry and decides which
//! planet snapshot to download and from where:
//!
//! 1. [`grouping`] partitions sources by md5 hash, rejects timestamp
//!    conflicts, and attributes hashless sources by byte length.
//! 2. [`scoring`] orders each group and ranks the groups newest first.
//! 3. [`selection`] picks the newest snapshot, or the runner-up when the
//!    newest is not yet widespread.
//! 4. [`plan`] assembles the URL list, preferring non-primary mirrors.
//!
//! The engine is pure: no I/O, and the same input always yields the same
//! output.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SelectionConfig;
use crate::error::ReconcileError;
use crate::types::{DownloadPlan, Mirror, ReconcileOptions, Source, Stat};
use crate::utils::format_size;

pub mod grouping;
pub mod plan;
pub mod scoring;
pub mod selection;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use grouping::{Grouping, HashGroups, group_sources};
pub use plan::Summary;
pub use scoring::rank;
pub use selection::{FallbackReason, RedundancyPolicy, Selection, select};

/// A non-fatal anomaly met during reconciliation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A hashless source whose length matches no hashed snapshot
    UnmatchedLength {
        /// Source file name
        name: String,
        /// Source URL
        url: String,
        /// Reported byte length, 0 when unknown
        length: u64,
    },
    /// A hashless source dropped because length evidence was contradictory
    DiscardedHashless {
        /// Source file name
        name: String,
        /// Source URL
        url: String,
    },
    /// A primary-mirror URL left out of the plan
    PrimaryExcluded {
        /// Mirror country label
        country: String,
        /// URL that was excluded
        url: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UnmatchedLength { name, url, length } => write!(
                f,
                "unable to use {name} from {url}: no hashed file has size {}",
                format_size(*length)
            ),
            Warning::DiscardedHashless { name, url } => write!(
                f,
                "unable to use {name} from {url}: file lengths are ambiguous"
            ),
            Warning::PrimaryExcluded { country, url } => {
                write!(f, "removing primary mirror {country} : {url}")
            }
        }
    }
}

/// Everything the engine decided
#[derive(Clone, Debug, Serialize)]
pub struct Reconciliation {
    /// What to download and from where
    pub plan: DownloadPlan,
    /// Every snapshot seen, newest first
    pub ranking: Vec<Stat>,
    /// The snapshot that was chosen
    pub selected: Stat,
    /// Why the newest snapshot was skipped, if it was
    pub fallback: Option<FallbackReason>,
    /// Non-fatal anomalies
    pub warnings: Vec<Warning>,
    /// Human-readable account of the decision
    pub summary: Summary,
}

/// Reconcile every source attached to `mirrors`
pub fn reconcile(
    mirrors: &[Mirror],
    options: &ReconcileOptions,
    selection: &SelectionConfig,
) -> Result<Reconciliation, ReconcileError> {
    let sources: Vec<Source> = mirrors
        .iter()
        .flat_map(|mirror| mirror.sources.iter().cloned())
        .collect();
    reconcile_sources(mirrors, sources, options, selection)
}

/// Reconcile an explicit set of sources
///
/// `mirrors` is only consulted for the primary flag and country label of
/// each source's owning mirror.
pub fn reconcile_sources(
    mirrors: &[Mirror],
    sources: impl IntoIterator<Item = Source>,
    options: &ReconcileOptions,
    selection: &SelectionConfig,
) -> Result<Reconciliation, ReconcileError> {
    let Grouping {
        mut groups,
        mut warnings,
    } = group_sources(
        sources,
        selection.strict_length_conflicts,
        options.verbose,
    )?;

    let ranking = rank(&mut groups);
    let Selection { index, fallback } =
        select(&ranking, options, &RedundancyPolicy::from(selection))?;
    let selected = ranking
        .get(index)
        .cloned()
        .ok_or(ReconcileError::NoCandidates)?;

    let assembled = plan::assemble(
        mirrors,
        &groups,
        &selected,
        fallback.clone(),
        options,
        &mut warnings,
    )?;

    Ok(Reconciliation {
        plan: assembled.plan,
        ranking,
        selected,
        fallback,
        warnings,
        summary: assembled.summary,
    })
}
