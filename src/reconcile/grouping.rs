//! Grouping sources into snapshots and cross-validating their metadata
//!
//! Hashed sources are grouped by hash. Two validation passes then check the
//! evidence: sources sharing a publish timestamp must share a hash (fatal
//! otherwise), and a byte-length index is built so hashless sources can be
//! attributed to the one snapshot of the same length.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use super::Warning;
use crate::error::{ConflictingSource, ReconcileError};
use crate::types::Source;
use crate::utils::is_valid_md5;

/// Sources per hash, ordered by hash for deterministic iteration
pub type HashGroups = BTreeMap<String, Vec<Source>>;

/// Publish timestamp -> hash, over hashed sources
pub type TimestampIndex = BTreeMap<DateTime<Utc>, String>;

/// Byte length -> hash, over hashed sources of known length
pub type LengthIndex = BTreeMap<u64, String>;

/// Two hashed sources sharing a key but not a hash
#[derive(Debug)]
pub struct KeyConflict<'a, K> {
    /// The shared key
    pub key: K,
    /// First source indexed under the key
    pub first: &'a Source,
    /// Source that contradicted it
    pub second: &'a Source,
}

/// Split sources into hash groups and hashless sources
///
/// Hashes are lowercased; a non-empty hash that is not a valid md5 digest is
/// treated as missing.
pub fn partition(sources: impl IntoIterator<Item = Source>) -> (HashGroups, Vec<Source>) {
    let mut groups = HashGroups::new();
    let mut hashless = Vec::new();

    for mut source in sources {
        if is_valid_md5(&source.hash) {
            source.hash.make_ascii_lowercase();
            groups.entry(source.hash.clone()).or_default().push(source);
        } else {
            if source.has_hash() {
                warn!(source = %source, hash = %source.hash, "ignoring malformed hash");
                source.hash.clear();
            }
            hashless.push(source);
        }
    }

    (groups, hashless)
}

/// Map every key produced by `key` to the single hash carrying it
///
/// Sources for which `key` returns `None` are skipped. The first pair of
/// sources sharing a key with different hashes is returned as a conflict.
pub fn build_key_index<'a, K, F>(
    groups: &'a HashGroups,
    key: F,
) -> Result<BTreeMap<K, String>, KeyConflict<'a, K>>
where
    K: Ord + Copy,
    F: Fn(&Source) -> Option<K>,
{
    let mut index: BTreeMap<K, (String, &'a Source)> = BTreeMap::new();

    for source in groups.values().flatten() {
        let Some(k) = key(source) else {
            continue;
        };
        match index.get(&k) {
            None => {
                index.insert(k, (source.hash.clone(), source));
            }
            Some((hash, _)) if *hash == source.hash => {}
            Some((_, first)) => {
                return Err(KeyConflict {
                    key: k,
                    first: *first,
                    second: source,
                });
            }
        }
    }

    Ok(index.into_iter().map(|(k, (hash, _))| (k, hash)).collect())
}

/// First pass: identical publish timestamps must carry identical hashes
pub fn timestamp_index(groups: &HashGroups) -> Result<TimestampIndex, ReconcileError> {
    build_key_index(groups, |source| source.timestamp).map_err(|conflict| {
        error!(
            timestamp = %conflict.key,
            first = %conflict.first,
            first_hash = %conflict.first.hash,
            second = %conflict.second,
            second_hash = %conflict.second.hash,
            "multiple files with the same timestamp have different hashes"
        );
        ReconcileError::TimestampConflict {
            timestamp: conflict.key,
            first: ConflictingSource::from(conflict.first),
            second: ConflictingSource::from(conflict.second),
        }
    })
}

/// Second pass: index known byte lengths by hash
///
/// A length of 0 means "unknown" and is never indexed.
pub fn length_index(groups: &HashGroups) -> Result<LengthIndex, ReconcileError> {
    build_key_index(groups, |source| (source.length != 0).then_some(source.length)).map_err(
        |conflict| {
            warn!(
                length = conflict.key,
                first = %conflict.first,
                first_hash = %conflict.first.hash,
                second = %conflict.second,
                second_hash = %conflict.second.hash,
                "multiple files with the same file length have different hashes"
            );
            ReconcileError::LengthConflict {
                length: conflict.key,
                first: ConflictingSource::from(conflict.first),
                second: ConflictingSource::from(conflict.second),
            }
        },
    )
}

/// Attribute hashless sources to hash groups by exact byte length
///
/// Unmatched sources, including those of unknown length, are dropped with a
/// warning.
pub fn absorb_hashless(
    groups: &mut HashGroups,
    hashless: Vec<Source>,
    index: &LengthIndex,
    warnings: &mut Vec<Warning>,
) {
    for mut source in hashless {
        let matched = (source.length != 0)
            .then(|| index.get(&source.length))
            .flatten();
        match matched {
            Some(hash) => {
                debug!(source = %source, hash = %hash, "matched hashless source by length");
                source.hash = hash.clone();
                groups.entry(hash.clone()).or_default().push(source);
            }
            None => {
                let warning = Warning::UnmatchedLength {
                    name: source.name.clone(),
                    url: source.url.clone(),
                    length: source.length,
                };
                warn!("{warning}");
                warnings.push(warning);
            }
        }
    }
}

/// Output of grouping: validated hash groups plus the anomalies met on the way
#[derive(Debug, Default)]
pub struct Grouping {
    /// Sources per snapshot hash
    pub groups: HashGroups,
    /// Non-fatal anomalies
    pub warnings: Vec<Warning>,
}

/// Partition, cross-validate, and resolve hashless sources
///
/// Contradictory length evidence is fatal when `strict_lengths` is set;
/// otherwise every hashless source is discarded and grouping continues with
/// hashed sources only.
pub fn group_sources(
    sources: impl IntoIterator<Item = Source>,
    strict_lengths: bool,
    verbose: bool,
) -> Result<Grouping, ReconcileError> {
    let (mut groups, hashless) = partition(sources);
    let mut warnings = Vec::new();

    timestamp_index(&groups)?;

    if verbose {
        for source in groups.values().flatten() {
            debug!(name = %source.name, url = %source.url, length = source.length, "hashed source");
        }
    }

    match length_index(&groups) {
        Ok(index) => absorb_hashless(&mut groups, hashless, &index, &mut warnings),
        Err(conflict) if strict_lengths => return Err(conflict),
        Err(_) => {
            if !hashless.is_empty() {
                warn!("unable to use sources - unable to match \"latest\" without date/md5");
            }
            for source in hashless {
                let warning = Warning::DiscardedHashless {
                    name: source.name,
                    url: source.url,
                };
                warn!("{warning}");
                warnings.push(warning);
            }
        }
    }

    Ok(Grouping { groups, warnings })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MirrorId;
    use chrono::TimeZone;

    const A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn source(id: usize, hash: &str, day: Option<u32>, length: u64) -> Source {
        let mut s = Source::new(
            "planet.osm.pbf",
            format!("https://m{id}.example/planet.osm.pbf"),
            MirrorId(id),
        )
        .with_timestamp(day.map(|d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()));
        s.hash = hash.to_string();
        s.length = length;
        s
    }

    #[test]
    fn partition_normalizes_and_rejects_bad_hashes() {
        let (groups, hashless) = partition(vec![
            source(0, &A.to_uppercase(), Some(1), 10),
            source(1, A, Some(1), 10),
            source(2, "not-a-hash", Some(1), 10),
            source(3, "", None, 10),
        ]);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[A].len(), 2);
        assert!(groups[A].iter().all(|s| s.hash == A));
        assert_eq!(hashless.len(), 2);
        assert!(hashless.iter().all(|s| !s.has_hash()));
    }

    #[test]
    fn generic_index_skips_missing_keys() {
        let (groups, _) = partition(vec![source(0, A, None, 0), source(1, B, Some(2), 0)]);
        let index = build_key_index(&groups, |s| s.timestamp).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn timestamp_conflict_is_fatal_and_names_both_sources() {
        let (groups, _) = partition(vec![source(0, A, Some(2), 10), source(1, B, Some(2), 11)]);

        let err = timestamp_index(&groups).unwrap_err();

        match err {
            ReconcileError::TimestampConflict { first, second, .. } => {
                assert_eq!(first.hash, A);
                assert_eq!(second.hash, B);
                assert_eq!(second.url, "https://m1.example/planet.osm.pbf");
            }
            other => panic!("expected TimestampConflict, got {other:?}"),
        }
    }

    #[test]
    fn unknown_timestamps_never_conflict() {
        let (groups, _) = partition(vec![source(0, A, None, 10), source(1, B, None, 11)]);
        assert!(timestamp_index(&groups).unwrap().is_empty());
    }

    #[test]
    fn zero_length_is_never_indexed() {
        let (groups, _) = partition(vec![source(0, A, Some(1), 0), source(1, B, Some(2), 0)]);
        assert!(length_index(&groups).unwrap().is_empty());
    }

    #[test]
    fn length_conflict_is_detected() {
        let (groups, _) = partition(vec![source(0, A, Some(1), 10), source(1, B, Some(2), 10)]);
        assert!(matches!(
            length_index(&groups),
            Err(ReconcileError::LengthConflict { length: 10, .. })
        ));
    }

    #[test]
    fn hashless_sources_join_by_exact_length() {
        let grouping = group_sources(
            vec![
                source(0, A, Some(1), 1000),
                source(1, B, Some(9), 1001),
                source(2, "", None, 1001),
                source(3, "", None, 999),
                source(4, "", None, 0),
            ],
            false,
            false,
        )
        .unwrap();

        assert_eq!(grouping.groups[A].len(), 1);
        assert_eq!(grouping.groups[B].len(), 2);
        assert_eq!(grouping.groups[B][1].mirror, MirrorId(2));
        assert_eq!(grouping.groups[B][1].hash, B, "absorbed source adopts the hash");
        assert_eq!(
            grouping.warnings,
            vec![
                Warning::UnmatchedLength {
                    name: "planet.osm.pbf".into(),
                    url: "https://m3.example/planet.osm.pbf".into(),
                    length: 999,
                },
                Warning::UnmatchedLength {
                    name: "planet.osm.pbf".into(),
                    url: "https://m4.example/planet.osm.pbf".into(),
                    length: 0,
                },
            ]
        );
    }

    #[test]
    fn contradictory_lengths_discard_every_hashless_source() {
        let grouping = group_sources(
            vec![
                source(0, A, Some(1), 1000),
                source(1, B, Some(9), 1000),
                source(2, "", None, 1000),
            ],
            false,
            false,
        )
        .unwrap();

        assert_eq!(grouping.groups.values().map(Vec::len).sum::<usize>(), 2);
        assert_eq!(
            grouping.warnings,
            vec![Warning::DiscardedHashless {
                name: "planet.osm.pbf".into(),
                url: "https://m2.example/planet.osm.pbf".into(),
            }]
        );
    }

    #[test]
    fn contradictory_lengths_are_fatal_in_strict_mode() {
        let result = group_sources(
            vec![source(0, A, Some(1), 1000), source(1, B, Some(9), 1000)],
            true,
            false,
        );
        assert!(matches!(result, Err(ReconcileError::LengthConflict { .. })));
    }

    #[test]
    fn contradictory_lengths_without_hashless_sources_are_harmless() {
        let grouping = group_sources(
            vec![source(0, A, Some(1), 1000), source(1, B, Some(9), 1000)],
            false,
            false,
        )
        .unwrap();
        assert_eq!(grouping.groups.len(), 2);
        assert!(grouping.warnings.is_empty());
    }
}
