//! Choosing which ranked snapshot to publish
//!
//! The newest snapshot is preferred unless too few mirrors carry it yet, in
//! which case the runner-up is taken. `force_latest` disables the fallback.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SelectionConfig;
use crate::error::ReconcileError;
use crate::types::{ReconcileOptions, Stat, date_label};

/// Why the newest snapshot was passed over
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackReason {
    /// The newest snapshot is on fewer mirrors than required
    NotWidespread {
        /// Timestamp of the skipped snapshot
        timestamp: Option<DateTime<Utc>>,
        /// Mirrors carrying it
        mirrors: usize,
        /// Mirrors required
        required: usize,
    },
    /// The runner-up is carried by disproportionately more mirrors
    OutnumberedByRunnerUp {
        /// Timestamp of the skipped snapshot
        timestamp: Option<DateTime<Utc>>,
        /// Mirrors carrying it
        mirrors: usize,
        /// Mirrors carrying the runner-up
        runner_up_mirrors: usize,
    },
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::NotWidespread {
                timestamp,
                mirrors,
                required,
            } => write!(
                f,
                "newest snapshot ({}) is not widespread yet ({mirrors} of {required} required mirrors)",
                date_label(*timestamp)
            ),
            FallbackReason::OutnumberedByRunnerUp {
                timestamp,
                mirrors,
                runner_up_mirrors,
            } => write!(
                f,
                "newest snapshot ({}) is not widespread yet ({mirrors} mirrors vs {runner_up_mirrors} for the previous one)",
                date_label(*timestamp)
            ),
        }
    }
}

/// Redundancy requirements for the newest snapshot
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RedundancyPolicy {
    /// Mirrors the newest snapshot needs
    pub min_mirror_count: usize,
    /// Fall back when `newest * ratio < runner_up`
    pub runner_up_ratio: Option<f64>,
}

impl From<&SelectionConfig> for RedundancyPolicy {
    fn from(config: &SelectionConfig) -> Self {
        Self {
            min_mirror_count: config.min_mirror_count,
            runner_up_ratio: config.runner_up_ratio,
        }
    }
}

impl RedundancyPolicy {
    /// Explain why `top` is inadequate next to `runner_up`, or `None` if it is fine
    pub fn inadequacy(&self, top: &Stat, runner_up: &Stat) -> Option<FallbackReason> {
        if top.mirror_count < self.min_mirror_count {
            return Some(FallbackReason::NotWidespread {
                timestamp: top.timestamp,
                mirrors: top.mirror_count,
                required: self.min_mirror_count,
            });
        }
        if let Some(ratio) = self.runner_up_ratio
            && (top.mirror_count as f64) * ratio < runner_up.mirror_count as f64
        {
            return Some(FallbackReason::OutnumberedByRunnerUp {
                timestamp: top.timestamp,
                mirrors: top.mirror_count,
                runner_up_mirrors: runner_up.mirror_count,
            });
        }
        None
    }
}

/// Index of the chosen stat and the reason for skipping the newest, if any
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    /// Position in the ranking
    pub index: usize,
    /// Set when the runner-up was chosen
    pub fallback: Option<FallbackReason>,
}

/// Pick a snapshot from a ranking
pub fn select(
    ranking: &[Stat],
    options: &ReconcileOptions,
    policy: &RedundancyPolicy,
) -> Result<Selection, ReconcileError> {
    let top = ranking.first().ok_or(ReconcileError::NoCandidates)?;

    if !options.force_latest
        && let Some(runner_up) = ranking.get(1)
        && let Some(reason) = policy.inadequacy(top, runner_up)
    {
        return Ok(Selection {
            index: 1,
            fallback: Some(reason),
        });
    }

    Ok(Selection {
        index: 0,
        fallback: None,
    })
}
