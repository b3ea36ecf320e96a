//! Turning the chosen snapshot into a download plan

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::Warning;
use super::grouping::HashGroups;
use super::selection::FallbackReason;
use crate::error::ReconcileError;
use crate::types::{DownloadPlan, Mirror, ReconcileOptions, Source, Stat, date_label};
use crate::utils::format_size;

/// Primary mirrors are only dropped when more sources than this remain
const PRIMARY_EXCLUSION_THRESHOLD: usize = 2;

fn is_primary(mirrors: &[Mirror], source: &Source) -> bool {
    mirrors
        .get(source.mirror.get())
        .is_some_and(|mirror| mirror.primary)
}

fn country<'a>(mirrors: &'a [Mirror], source: &Source) -> &'a str {
    mirrors
        .get(source.mirror.get())
        .map_or("?", |mirror| mirror.country.as_str())
}

/// Remove primary-mirror sources when enough redundancy exists
///
/// Nothing is removed when the group has two sources or fewer, or when every
/// source is on a primary mirror.
pub fn exclude_primary(
    mirrors: &[Mirror],
    sources: &mut Vec<Source>,
    warnings: &mut Vec<Warning>,
) {
    if sources.len() <= PRIMARY_EXCLUSION_THRESHOLD {
        return;
    }
    if sources.iter().all(|source| is_primary(mirrors, source)) {
        return;
    }

    sources.retain(|source| {
        if !is_primary(mirrors, source) {
            return true;
        }
        let warning = Warning::PrimaryExcluded {
            country: country(mirrors, source).to_string(),
            url: source.url.clone(),
        };
        warn!("{warning}");
        warnings.push(warning);
        false
    });
}

/// Human-readable account of the decision
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Calendar date of the snapshot, or the unknown-date label
    pub date: String,
    /// Human-readable size
    pub size: String,
    /// Snapshot hash
    pub hash: String,
    /// Mirrors carrying the snapshot
    pub mirror_count: usize,
    /// URLs kept in the plan
    pub sources: usize,
    /// Why the newest snapshot was skipped, if it was
    pub fallback: Option<FallbackReason>,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "will download planet published on {}, size={}, md5={}, available on {} mirrors, using {} sources",
            self.date, self.size, self.hash, self.mirror_count, self.sources
        )?;
        if let Some(reason) = &self.fallback {
            write!(f, " because {reason}")?;
        }
        Ok(())
    }
}

/// A plan with its summary
#[derive(Debug)]
pub struct Assembled {
    /// The URLs to fetch
    pub plan: DownloadPlan,
    /// What was decided
    pub summary: Summary,
}

/// Build the download plan for `selected`
pub fn assemble(
    mirrors: &[Mirror],
    groups: &HashGroups,
    selected: &Stat,
    fallback: Option<FallbackReason>,
    options: &ReconcileOptions,
    warnings: &mut Vec<Warning>,
) -> Result<Assembled, ReconcileError> {
    let mut sources = groups
        .get(&selected.hash)
        .cloned()
        .ok_or_else(|| ReconcileError::SelectionIntegrity {
            hash: selected.hash.clone(),
        })?;

    if !options.use_primary {
        exclude_primary(mirrors, &mut sources, warnings);
    }

    if options.verbose {
        for source in &sources {
            info!(
                "{} : {} : {} : {}",
                country(mirrors, source),
                source.url,
                source.hash,
                source.length
            );
        }
    }

    let summary = Summary {
        date: date_label(selected.timestamp),
        size: format_size(selected.size),
        hash: selected.hash.clone(),
        mirror_count: selected.mirror_count,
        sources: sources.len(),
        fallback,
    };
    info!("{summary}");

    Ok(Assembled {
        plan: DownloadPlan {
            hash: selected.hash.clone(),
            urls: sources.into_iter().map(|source| source.url).collect(),
        },
        summary,
    })
}
