//! Directory-listing scraping for multi-file mirrors
//!
//! Mirrors publish plain autoindex pages. Every anchor is collected, then
//! filtered down to planet files (`planet-<YYMMDD|YYYYMMDD|latest>.osm.pbf`
//! and their `.md5` companions), deduplicated per date, and capped to the
//! `latest` alias plus the most recent dated files.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::config::ProbeConfig;
use crate::types::{Mirror, Source};

/// One anchor of a directory listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    /// Anchor text, tags stripped and trimmed
    pub name: String,
    /// Raw `href` attribute, trimmed
    pub href: String,
}

impl Link {
    /// Convenience constructor
    pub fn new(name: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            href: href.into(),
        }
    }
}

/// Date component of a planet file name
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DateKey {
    /// A dated snapshot
    Dated(NaiveDate),
    /// The `latest` alias; orders after every date
    Latest,
}

impl DateKey {
    /// Midnight UTC of the date, `None` for `latest`
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            DateKey::Dated(date) => date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
            DateKey::Latest => None,
        }
    }
}

/// A recognised planet file name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanetName {
    /// Which snapshot the file belongs to
    pub date: DateKey,
    /// Whether this is the `.md5` companion
    pub is_md5: bool,
}

#[allow(clippy::unwrap_used)] // literal patterns
fn anchor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?is)<a(?:\s(?:"[^"]*"|'[^']*'|[^'">])*?)?\shref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))(?:"[^"]*"|'[^']*'|[^'">])*>(.*?)</a\s*>"#,
        )
        .unwrap()
    })
}

#[allow(clippy::unwrap_used)]
fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]*>").unwrap())
}

#[allow(clippy::unwrap_used)]
fn planet_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^planet-(\d{6}|\d{8}|latest)\.osm\.pbf(\.md5)?$").unwrap()
    })
}

#[allow(clippy::unwrap_used)]
fn entity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"&(?:#[xX]([0-9a-fA-F]{1,6})|#([0-9]{1,7})|(lt|gt|quot|apos|amp));").unwrap()
    })
}

/// Decode named and numeric character references in one pass
///
/// Unknown names and invalid code points are left as written.
fn decode_entities(text: &str) -> String {
    entity_pattern()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let code = match (caps.get(1), caps.get(2)) {
                (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
                (_, Some(dec)) => dec.as_str().parse().ok(),
                _ => None,
            };
            let decoded = match caps.get(3).map(|m| m.as_str()) {
                Some("lt") => Some('<'),
                Some("gt") => Some('>'),
                Some("quot") => Some('"'),
                Some("apos") => Some('\''),
                Some("amp") => Some('&'),
                _ => code.and_then(char::from_u32),
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Collect every anchor carrying an `href`, in document order
pub fn extract_links(html: &str) -> Vec<Link> {
    anchor_pattern()
        .captures_iter(html)
        .filter_map(|caps| {
            let href = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))?
                .as_str();
            let text = caps.get(4).map(|m| m.as_str()).unwrap_or_default();
            let text = tag_pattern().replace_all(text, "");
            Some(Link::new(
                decode_entities(text.trim()),
                decode_entities(href.trim()),
            ))
        })
        .collect()
}

/// Recognise a planet file name
///
/// Six-digit dates are `YYMMDD` (the convention of the main planet site),
/// eight-digit dates are `YYYYMMDD`. Impossible dates are rejected.
pub fn parse_planet_name(name: &str) -> Option<PlanetName> {
    let caps = planet_pattern().captures(name)?;
    let raw = caps.get(1)?.as_str();
    let date = match raw {
        "latest" => DateKey::Latest,
        _ if raw.len() == 6 => DateKey::Dated(NaiveDate::parse_from_str(raw, "%y%m%d").ok()?),
        _ => DateKey::Dated(NaiveDate::parse_from_str(raw, "%Y%m%d").ok()?),
    };
    Some(PlanetName {
        date,
        is_md5: caps.get(2).is_some(),
    })
}

/// Resolve an href against the mirror's directory URL
fn resolve(base: &Url, href: &str) -> Option<String> {
    base.join(href).ok().map(String::from)
}

/// Turn a mirror's anchors into candidate sources
///
/// Links are processed sorted by (name, href) so a data file is always seen
/// before its `.md5` companion, which then replaces the default
/// `<url><hash_suffix>` hash location. The result holds the `latest` alias
/// first (if listed) followed by up to `probe.recent_dated_files` dated files,
/// newest first.
pub fn candidate_sources(
    mirror: &Mirror,
    mut links: Vec<Link>,
    probe: &ProbeConfig,
    verbose: bool,
) -> Vec<Source> {
    let base = match Url::parse(&mirror.url) {
        Ok(base) => base,
        Err(e) => {
            warn!(mirror = %mirror.url, error = %e, "mirror url is not a valid base url");
            return Vec::new();
        }
    };

    links.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.href.cmp(&b.href)));

    let mut by_date: BTreeMap<DateKey, Source> = BTreeMap::new();
    for link in links {
        let Some(planet) = parse_planet_name(&link.name) else {
            if verbose {
                debug!(name = %link.name, mirror = %mirror.url, "ignoring unexpected name");
            }
            continue;
        };
        let Some(url) = resolve(&base, &link.href) else {
            warn!(href = %link.href, mirror = %mirror.url, "unresolvable link");
            continue;
        };

        if planet.is_md5 {
            match by_date.get_mut(&planet.date) {
                Some(source) => source.hash_url = url,
                None => warn!(
                    name = %link.name,
                    mirror = %mirror.url,
                    "md5 file exists, but data file does not"
                ),
            }
            continue;
        }

        if by_date.contains_key(&planet.date) {
            warn!(name = %link.name, mirror = %mirror.url, "date already listed, ignoring duplicate");
            continue;
        }
        let hash_url = format!("{url}{}", probe.hash_suffix);
        by_date.insert(
            planet.date,
            Source::new(link.name, url, mirror.id)
                .with_hash_url(hash_url)
                .with_timestamp(planet.date.timestamp()),
        );
    }

    let latest = by_date.remove(&DateKey::Latest);
    latest
        .into_iter()
        .chain(by_date.into_values().rev().take(probe.recent_dated_files))
        .collect()
}
