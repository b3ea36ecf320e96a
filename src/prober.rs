//! Mirror probing
//!
//! One task per mirror discovers its candidate sources, then fetches each
//! source's hash file and content length concurrently. All failures stay
//! local: a broken source keeps empty hash/length fields and a broken mirror
//! keeps no sources. [`probe_all`] returns only once every mirror task has
//! finished, which is the barrier the reconciliation engine relies on.

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::http::MetadataFetcher;
use crate::listing::candidate_sources;
use crate::types::{Mirror, MirrorId, Source};
use crate::utils::parse_hash_file;

/// File name assumed for single-file mirrors
pub const LATEST_NAME: &str = "planet-latest.osm.pbf";

/// A mirror whose probe produced no sources
#[derive(Debug)]
pub struct ProbeFailure {
    /// The mirror that failed
    pub mirror: MirrorId,
    /// Why it failed
    pub error: ProbeError,
}

/// Fetch and validate a source's md5 hash
pub async fn load_hash(
    fetcher: &dyn MetadataFetcher,
    source: &Source,
    verbose: bool,
) -> Result<String, ProbeError> {
    if verbose {
        debug!(url = %source.hash_url, "getting md5 checksum");
    }
    let body = fetcher
        .fetch_text(&source.hash_url)
        .await
        .map_err(|e| ProbeError::HashUnavailable {
            name: source.name.clone(),
            url: source.hash_url.clone(),
            reason: e.to_string(),
        })?;

    parse_hash_file(&body).map_err(|value| ProbeError::InvalidHash {
        name: source.name.clone(),
        url: source.hash_url.clone(),
        value,
    })
}

/// Probe a source's byte length without downloading it
pub async fn load_length(
    fetcher: &dyn MetadataFetcher,
    source: &Source,
    verbose: bool,
) -> Result<u64, ProbeError> {
    if verbose {
        debug!(url = %source.url, "getting content length");
    }
    fetcher
        .fetch_content_length(&source.url)
        .await
        .map_err(|e| ProbeError::LengthUnavailable {
            name: source.name.clone(),
            url: source.url.clone(),
            reason: e.to_string(),
        })
}

/// Fill in a source's hash and length, both fetched concurrently, best-effort
pub async fn load_source(fetcher: &dyn MetadataFetcher, mut source: Source, verbose: bool) -> Source {
    debug!(name = %source.name, url = %source.url, "loading source");

    let (hash, length) = tokio::join!(
        load_hash(fetcher, &source, verbose),
        load_length(fetcher, &source, verbose)
    );

    match hash {
        Ok(hash) => source.hash = hash,
        Err(e) => warn!(error = %e, "hash unavailable"),
    }
    match length {
        Ok(length) => source.length = length,
        Err(e) => warn!(error = %e, "length unavailable"),
    }
    source
}

/// List the candidate sources a mirror advertises
pub async fn discover_sources(
    fetcher: &dyn MetadataFetcher,
    mirror: &Mirror,
    config: &ProbeConfig,
    verbose: bool,
) -> Result<Vec<Source>, ProbeError> {
    if !mirror.multi_file {
        let hash_url = format!("{}{}", mirror.url, config.hash_suffix);
        return Ok(vec![
            Source::new(LATEST_NAME, mirror.url.clone(), mirror.id).with_hash_url(hash_url),
        ]);
    }

    let links = fetcher
        .list_links(&mirror.url)
        .await
        .map_err(|e| ProbeError::Listing {
            country: mirror.country.clone(),
            url: mirror.url.clone(),
            reason: e.to_string(),
        })?;

    Ok(candidate_sources(mirror, links, config, verbose))
}

/// Whether the alias and the dated file are evidently one snapshot
///
/// A hashless alias matches on a known, equal length.
fn same_file(alias: &Source, dated: &Source) -> bool {
    if alias.has_hash() {
        alias.hash == dated.hash
    } else {
        alias.length != 0 && alias.length == dated.length
    }
}

/// Probe one mirror: discover its sources, then load them in parallel
///
/// When the `latest` alias and the newest dated file report the same hash,
/// or the alias has no hash but the same length, the alias is dropped so the
/// mirror counts once for that snapshot.
pub async fn probe_mirror(
    fetcher: &dyn MetadataFetcher,
    mirror: &Mirror,
    config: &ProbeConfig,
    verbose: bool,
) -> Result<Vec<Source>, ProbeError> {
    let discovered = discover_sources(fetcher, mirror, config, verbose).await?;
    if discovered.is_empty() {
        return Err(ProbeError::NoSources {
            country: mirror.country.clone(),
            url: mirror.url.clone(),
        });
    }

    let mut sources = join_all(
        discovered
            .into_iter()
            .map(|source| load_source(fetcher, source, verbose)),
    )
    .await;

    if sources.len() > 1
        && sources[0].timestamp.is_none()
        && same_file(&sources[0], &sources[1])
    {
        debug!(mirror = %mirror.url, "latest is the same as the newest dated file");
        sources.remove(0);
    }

    Ok(sources)
}

/// Probe every mirror with bounded concurrency and wait for all of them
///
/// Each mirror's sources are written only into that mirror. Mirrors that fail
/// or exceed `config.mirror_timeout` end up with no sources and are reported
/// in the returned list.
pub async fn probe_all(
    fetcher: &dyn MetadataFetcher,
    mirrors: &mut [Mirror],
    config: &ProbeConfig,
    verbose: bool,
) -> Vec<ProbeFailure> {
    info!(mirrors = mirrors.len(), "retrieving available files");

    let outcomes: Vec<Option<ProbeFailure>> = stream::iter(mirrors.iter_mut())
        .map(|mirror| async move {
            if verbose {
                info!(url = %mirror.url, country = %mirror.country, "initializing mirror");
            }

            let probe = probe_mirror(fetcher, mirror, config, verbose);
            let result = match config.mirror_timeout {
                Some(limit) => match tokio::time::timeout(limit, probe).await {
                    Ok(result) => result,
                    Err(_) => Err(ProbeError::Timeout {
                        country: mirror.country.clone(),
                        url: mirror.url.clone(),
                        seconds: limit.as_secs(),
                    }),
                },
                None => probe.await,
            };

            match result {
                Ok(sources) => {
                    mirror.sources = sources;
                    None
                }
                Err(error) => {
                    warn!(error = %error, "mirror unusable");
                    mirror.sources.clear();
                    Some(ProbeFailure {
                        mirror: mirror.id,
                        error,
                    })
                }
            }
        })
        .buffer_unordered(config.max_concurrent_mirrors.max(1))
        .collect()
        .await;

    let mut failures: Vec<ProbeFailure> = outcomes.into_iter().flatten().collect();
    failures.sort_by_key(|f| f.mirror);
    failures
}
