use chrono::{TimeZone, Utc};

use crate::config::{MirrorConfig, SelectionConfig};
use crate::error::ReconcileError;
use crate::reconcile::*;
use crate::types::{Mirror, MirrorId, ReconcileOptions, Source};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ABC: &str = "abc00000000000000000000000000000";
const DEF: &str = "def00000000000000000000000000000";

/// Registry of `count` mirrors, the ones listed in `primary` flagged primary
fn registry(count: usize, primary: &[usize]) -> Vec<Mirror> {
    let configs: Vec<MirrorConfig> = (0..count)
        .map(|i| {
            let config = MirrorConfig::multi(format!("c{i}"), format!("https://m{i}.example/pbf/"));
            if primary.contains(&i) {
                config.primary()
            } else {
                config
            }
        })
        .collect();
    Mirror::registry(&configs)
}

/// A source on mirror `id` dated 2024-01-`day` (or undated)
fn source(id: usize, hash: &str, day: Option<u32>, length: u64) -> Source {
    let name = match day {
        Some(d) => format!("planet-2401{d:02}.osm.pbf"),
        None => "planet-latest.osm.pbf".to_string(),
    };
    let mut source = Source::new(&name, format!("https://m{id}.example/pbf/{name}"), MirrorId(id))
        .with_timestamp(day.map(|d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()));
    source.hash = hash.to_string();
    source.length = length;
    source
}

fn strict_selection() -> SelectionConfig {
    SelectionConfig {
        min_mirror_count: 2,
        runner_up_ratio: None,
        strict_length_conflicts: false,
    }
}

/// Three mirrors on an older snapshot, one on a newer one
fn lagging_fleet() -> (Vec<Mirror>, Vec<Source>) {
    let mirrors = registry(4, &[]);
    let sources = vec![
        source(0, ABC, Some(2), 1000),
        source(1, ABC, Some(2), 1000),
        source(2, ABC, Some(2), 1000),
        source(3, DEF, Some(10), 1001),
    ];
    (mirrors, sources)
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

#[test]
fn newest_snapshot_on_one_mirror_falls_back_to_widespread_one() {
    let (mirrors, sources) = lagging_fleet();

    let result = reconcile_sources(
        &mirrors,
        sources,
        &ReconcileOptions::default(),
        &strict_selection(),
    )
    .unwrap();

    assert_eq!(result.plan.hash, ABC);
    assert_eq!(result.selected.mirror_count, 3);
    assert_eq!(result.ranking[0].hash, DEF, "newest still ranks first");
    assert!(matches!(
        result.fallback,
        Some(FallbackReason::NotWidespread { mirrors: 1, .. })
    ));
    assert!(result.summary.to_string().contains("not widespread yet"));
    assert_eq!(result.summary.date, "2024-01-02");
}

#[test]
fn force_latest_takes_the_newest_regardless() {
    let (mirrors, sources) = lagging_fleet();
    let options = ReconcileOptions {
        force_latest: true,
        ..Default::default()
    };

    let result = reconcile_sources(&mirrors, sources, &options, &strict_selection()).unwrap();

    assert_eq!(result.plan.hash, DEF);
    assert_eq!(
        result.plan.urls,
        vec!["https://m3.example/pbf/planet-240110.osm.pbf"]
    );
    assert!(result.fallback.is_none());
}

#[test]
fn widespread_newest_is_chosen_directly() {
    let mirrors = registry(4, &[]);
    let sources = vec![
        source(0, ABC, Some(2), 1000),
        source(1, DEF, Some(10), 1001),
        source(2, DEF, Some(10), 1001),
        source(3, ABC, Some(2), 1000),
    ];

    let result = reconcile_sources(
        &mirrors,
        sources,
        &ReconcileOptions::default(),
        &SelectionConfig::default(),
    )
    .unwrap();

    assert_eq!(result.plan.hash, DEF);
    assert!(result.fallback.is_none());
}

#[test]
fn latest_alias_without_date_ranks_newest() {
    let mirrors = registry(3, &[]);
    let sources = vec![
        source(0, ABC, Some(28), 1000),
        source(1, DEF, None, 1001),
        source(2, DEF, None, 1001),
    ];

    let result = reconcile_sources(
        &mirrors,
        sources,
        &ReconcileOptions::default(),
        &strict_selection(),
    )
    .unwrap();

    assert_eq!(result.ranking[0].hash, DEF);
    assert_eq!(result.plan.hash, DEF);
    assert_eq!(result.summary.date, "latest (unknown date)");
}

#[test]
fn stale_alias_does_not_make_an_old_snapshot_look_newest() {
    let mirrors = registry(7, &[]);
    let sources = vec![
        source(0, ABC, Some(2), 1000),
        source(1, ABC, Some(2), 1000),
        source(2, ABC, Some(2), 1000),
        source(3, ABC, None, 1000),
        source(4, DEF, Some(10), 1001),
        source(5, DEF, Some(10), 1001),
        source(6, DEF, Some(10), 1001),
    ];

    let result = reconcile_sources(
        &mirrors,
        sources,
        &ReconcileOptions::default(),
        &SelectionConfig::default(),
    )
    .unwrap();

    assert_eq!(result.ranking[0].hash, DEF);
    assert_eq!(
        result.ranking[1].timestamp,
        Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
    );
    assert_eq!(result.plan.hash, DEF);
    assert_eq!(result.summary.date, "2024-01-10");
}

#[test]
fn alias_and_dated_file_on_one_mirror_count_once() {
    let mirrors = registry(3, &[]);
    let sources = vec![
        source(0, DEF, Some(10), 1001),
        source(0, "", None, 1001),
        source(1, ABC, Some(2), 1000),
        source(2, ABC, Some(2), 1000),
    ];

    let result = reconcile_sources(
        &mirrors,
        sources,
        &ReconcileOptions::default(),
        &strict_selection(),
    )
    .unwrap();

    assert_eq!(result.ranking[0].hash, DEF);
    assert_eq!(result.ranking[0].mirror_count, 1);
    assert_eq!(result.plan.hash, ABC);
    assert!(matches!(
        result.fallback,
        Some(FallbackReason::NotWidespread { mirrors: 1, .. })
    ));
}

#[test]
fn equal_timestamps_rank_smaller_file_first() {
    let mirrors = registry(2, &[]);
    let sources = vec![source(0, ABC, None, 2000), source(1, DEF, None, 1500)];
    let options = ReconcileOptions {
        force_latest: true,
        ..Default::default()
    };

    let result = reconcile_sources(&mirrors, sources, &options, &strict_selection()).unwrap();

    let sizes: Vec<u64> = result.ranking.iter().map(|s| s.size).collect();
    assert_eq!(sizes, vec![1500, 2000]);
    assert_eq!(result.plan.hash, DEF);
}

#[test]
fn no_hashed_sources_means_no_candidates() {
    let mirrors = registry(2, &[]);
    let sources = vec![source(0, "", None, 1000), source(1, "", Some(3), 0)];

    let err = reconcile_sources(
        &mirrors,
        sources,
        &ReconcileOptions::default(),
        &strict_selection(),
    )
    .unwrap_err();

    assert_eq!(err, ReconcileError::NoCandidates);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn timestamp_conflict_aborts_even_with_otherwise_good_data() {
    let mirrors = registry(5, &[]);
    let sources = vec![
        source(0, ABC, Some(2), 1000),
        source(1, ABC, Some(2), 1000),
        source(2, ABC, Some(2), 1000),
        source(3, DEF, Some(10), 1001),
        source(4, ABC, Some(10), 1001),
    ];

    let err = reconcile_sources(
        &mirrors,
        sources,
        &ReconcileOptions::default(),
        &SelectionConfig::default(),
    )
    .unwrap_err();

    match err {
        ReconcileError::TimestampConflict { first, second, .. } => {
            let urls = [first.url.as_str(), second.url.as_str()];
            assert!(urls.contains(&"https://m3.example/pbf/planet-240110.osm.pbf"));
            assert!(urls.contains(&"https://m4.example/pbf/planet-240110.osm.pbf"));
        }
        other => panic!("expected TimestampConflict, got {other:?}"),
    }
}

#[test]
fn hashless_latest_joins_by_length_and_counts_toward_redundancy() {
    let mirrors = registry(3, &[]);
    let sources = vec![
        source(0, ABC, Some(2), 1000),
        source(1, DEF, Some(10), 1001),
        source(2, "", None, 1001),
    ];

    let result = reconcile_sources(
        &mirrors,
        sources,
        &ReconcileOptions::default(),
        &strict_selection(),
    )
    .unwrap();

    assert_eq!(result.plan.hash, DEF);
    assert_eq!(result.selected.mirror_count, 2);
    assert!(result.warnings.is_empty());
}

#[test]
fn unknown_length_hashless_source_is_dropped_with_warning() {
    let mirrors = registry(3, &[]);
    let sources = vec![
        source(0, ABC, Some(2), 0),
        source(1, ABC, Some(2), 0),
        source(2, "", None, 0),
    ];

    let result = reconcile_sources(
        &mirrors,
        sources,
        &ReconcileOptions::default(),
        &strict_selection(),
    )
    .unwrap();

    assert_eq!(result.plan.urls.len(), 2);
    assert!(matches!(
        result.warnings.as_slice(),
        [Warning::UnmatchedLength { length: 0, .. }]
    ));
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[test]
fn primary_mirror_is_removed_when_three_sources_remain() {
    let mirrors = registry(3, &[0]);
    let sources = vec![
        source(0, ABC, Some(2), 1000),
        source(1, ABC, Some(2), 1000),
        source(2, ABC, Some(2), 1000),
    ];

    let result = reconcile_sources(
        &mirrors,
        sources,
        &ReconcileOptions::default(),
        &strict_selection(),
    )
    .unwrap();

    assert_eq!(
        result.plan.urls,
        vec![
            "https://m1.example/pbf/planet-240102.osm.pbf",
            "https://m2.example/pbf/planet-240102.osm.pbf",
        ]
    );
    assert!(matches!(
        result.warnings.as_slice(),
        [Warning::PrimaryExcluded { .. }]
    ));
    assert_eq!(result.selected.mirror_count, 3);
}

#[test]
fn primary_mirror_is_kept_when_only_two_sources_exist() {
    let mirrors = registry(2, &[0]);
    let sources = vec![source(0, ABC, Some(2), 1000), source(1, ABC, Some(2), 1000)];

    let result = reconcile_sources(
        &mirrors,
        sources,
        &ReconcileOptions::default(),
        &strict_selection(),
    )
    .unwrap();

    assert_eq!(result.plan.urls.len(), 2);
    assert!(result.warnings.is_empty());
}

#[test]
fn reconcile_reads_sources_from_the_registry() {
    let mut mirrors = registry(2, &[]);
    mirrors[0].sources.push(source(0, ABC, Some(2), 1000));
    mirrors[1].sources.push(source(1, ABC, Some(2), 1000));

    let result = reconcile(
        &mirrors,
        &ReconcileOptions::default(),
        &strict_selection(),
    )
    .unwrap();

    assert_eq!(result.plan.hash, ABC);
    assert_eq!(result.plan.urls.len(), 2);
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn rerunning_on_identical_input_is_idempotent() {
    let mirrors = registry(6, &[5]);
    let sources = vec![
        source(3, DEF, Some(10), 1001),
        source(0, ABC, Some(2), 1000),
        source(5, ABC, Some(2), 1000),
        source(2, ABC, None, 1000),
        source(1, "", None, 1000),
        source(4, "", None, 7),
    ];

    let first = reconcile_sources(
        &mirrors,
        sources.clone(),
        &ReconcileOptions::default(),
        &SelectionConfig::default(),
    )
    .unwrap();
    let second = reconcile_sources(
        &mirrors,
        sources.clone(),
        &ReconcileOptions::default(),
        &SelectionConfig::default(),
    )
    .unwrap();

    assert_eq!(first.plan, second.plan);
    assert_eq!(first.ranking, second.ranking);
    assert_eq!(first.warnings, second.warnings);
    assert_eq!(first.summary, second.summary);
}

#[test]
fn input_order_does_not_change_the_plan() {
    let mirrors = registry(4, &[]);
    let sources = vec![
        source(0, ABC, Some(2), 1000),
        source(1, ABC, Some(2), 1000),
        source(2, ABC, None, 1000),
        source(3, DEF, Some(10), 1001),
    ];
    let mut reversed = sources.clone();
    reversed.reverse();

    let forward = reconcile_sources(
        &mirrors,
        sources,
        &ReconcileOptions::default(),
        &strict_selection(),
    )
    .unwrap();
    let backward = reconcile_sources(
        &mirrors,
        reversed,
        &ReconcileOptions::default(),
        &strict_selection(),
    )
    .unwrap();

    assert_eq!(forward.plan, backward.plan);
    assert_eq!(forward.ranking, backward.ranking);
    assert_eq!(forward.ranking[0].hash, DEF, "the dated ABC group is older");
    assert_eq!(forward.plan.hash, ABC, "DEF is on one mirror only");
}
