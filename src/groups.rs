use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use crate::error::Result;
use crate::models::{CacheEnvelope, GroupCandidate, GroupRecord, GroupStatus};
use crate::storage::Store;

/// Path segments under `/groups/` that are listing or sub-pages, not groups.
const EXCLUDED_SEGMENTS: [&str; 5] = ["feed", "discover", "about", "members", "permalink"];

fn id_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9A-Za-z._\-]+$").expect("group id regex"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedGroup {
    pub id: String,
    pub url: String,
}

/// Canonicalize an anchor href into a group identity: scheme forced to
/// https, host to the canonical origin, query/fragment stripped, path
/// reduced to `/groups/{id}`. Relative hrefs are resolved against the
/// canonical origin. Returns `None` for anything that is not a group link.
pub fn normalize_group_url(
    href: &str,
    target_host: &str,
    canonical_origin: &str,
) -> Option<NormalizedGroup> {
    let base = Url::parse(canonical_origin).ok()?;
    let parsed = match Url::parse(href) {
        Ok(url) => {
            let host = url.host_str()?;
            if host != target_host && !host.ends_with(&format!(".{target_host}")) {
                return None;
            }
            url
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => base.join(href).ok()?,
        Err(_) => return None,
    };

    let segments: Vec<&str> = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .collect();
    let (first, rest) = segments.split_first()?;
    if *first != "groups" || rest.is_empty() {
        return None;
    }
    if rest.iter().any(|s| EXCLUDED_SEGMENTS.contains(s)) {
        return None;
    }

    let id = rest[0];
    if !id_shape().is_match(id) {
        return None;
    }

    Some(NormalizedGroup {
        id: id.to_string(),
        url: format!("{}/groups/{}", canonical_origin.trim_end_matches('/'), id),
    })
}

/// Overlay validated candidates onto an existing record set, keyed by
/// normalized URL. Existing records keep their position and their fields the
/// candidate does not carry (status); `last_checked` always advances.
/// Merging the same batch twice yields the same set.
pub fn merge(
    existing: &[GroupRecord],
    candidates: &[GroupCandidate],
    target_host: &str,
    canonical_origin: &str,
    now: DateTime<Utc>,
) -> Vec<GroupRecord> {
    let mut merged: Vec<GroupRecord> = existing.to_vec();
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, r)| (r.url.clone(), i))
        .collect();

    for candidate in candidates {
        if candidate.name.trim().is_empty() || candidate.url.trim().is_empty() {
            continue;
        }
        if !candidate.url.contains(target_host) {
            continue;
        }
        let Some(normalized) = normalize_group_url(&candidate.url, target_host, canonical_origin)
        else {
            continue;
        };

        match index.get(&normalized.url) {
            Some(&i) => {
                let record = &mut merged[i];
                record.id = normalized.id;
                record.name = candidate.name.clone();
                record.last_checked = now;
            }
            None => {
                index.insert(normalized.url.clone(), merged.len());
                merged.push(GroupRecord {
                    id: normalized.id,
                    name: candidate.name.clone(),
                    url: normalized.url,
                    status: GroupStatus::Active,
                    last_checked: now,
                });
            }
        }
    }

    merged
}

/// Persisted group cache with a time-to-live. An envelope older than the TTL
/// is treated as empty on read; records are never deleted individually.
pub struct GroupCache {
    store: Store,
    target_host: String,
    canonical_origin: String,
    ttl: chrono::Duration,
}

impl GroupCache {
    pub fn new(
        store: Store,
        target_host: impl Into<String>,
        canonical_origin: impl Into<String>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            store,
            target_host: target_host.into(),
            canonical_origin: canonical_origin.into(),
            ttl,
        }
    }

    /// The cached records, or `None` when nothing fresh is stored.
    pub fn load_fresh(&self) -> Option<Vec<GroupRecord>> {
        let envelope = self.store.load_cache()?;
        if envelope.is_expired(self.ttl, Utc::now()) {
            return None;
        }
        Some(envelope.groups)
    }

    /// Merge a candidate batch into the cache and persist the result with a
    /// fresh envelope timestamp. Safe to call repeatedly with overlapping
    /// batches.
    pub fn merge_and_store(&self, candidates: &[GroupCandidate]) -> Result<Vec<GroupRecord>> {
        let now = Utc::now();
        let existing = self.load_fresh().unwrap_or_default();
        let merged = merge(
            &existing,
            candidates,
            &self.target_host,
            &self.canonical_origin,
            now,
        );
        self.store
            .save_cache(&CacheEnvelope::new(merged.clone(), now))?;
        Ok(merged)
    }

    pub fn clear(&self) -> Result<()> {
        self.store
            .save_cache(&CacheEnvelope::new(Vec::new(), Utc::now()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "facebook.com";
    const ORIGIN: &str = "https://www.facebook.com";

    fn candidate(name: &str, url: &str) -> GroupCandidate {
        GroupCandidate {
            id: String::new(),
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn normalizes_relative_and_absolute_to_same_identity() {
        let a = normalize_group_url("/groups/123abc/", HOST, ORIGIN).unwrap();
        let b = normalize_group_url("https://m.facebook.com/groups/123abc?ref=1", HOST, ORIGIN)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.id, "123abc");
        assert_eq!(a.url, "https://www.facebook.com/groups/123abc");
    }

    #[test]
    fn rejects_non_group_paths() {
        for href in [
            "/groups/feed/",
            "/groups/discover",
            "/groups/123/about",
            "/groups/123/members",
            "/groups/123/permalink/456",
            "/groups/",
            "/marketplace/item/1",
            "https://evil.com/groups/123",
        ] {
            assert!(
                normalize_group_url(href, HOST, ORIGIN).is_none(),
                "{href} should be rejected"
            );
        }
    }

    #[test]
    fn strips_query_and_fragment() {
        let n = normalize_group_url(
            "https://www.facebook.com/groups/abc?multi_permalinks=1#frag",
            HOST,
            ORIGIN,
        )
        .unwrap();
        assert_eq!(n.url, "https://www.facebook.com/groups/abc");
    }

    #[test]
    fn merge_dedups_by_normalized_url() {
        let now = Utc::now();
        let merged = merge(
            &[],
            &[
                candidate("Foo", "https://www.facebook.com/groups/123abc"),
                candidate("Foo Dup", "https://www.facebook.com/groups/123abc?ref=1"),
            ],
            HOST,
            ORIGIN,
            now,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].url, "https://www.facebook.com/groups/123abc");
    }

    #[test]
    fn merge_is_idempotent() {
        let now = Utc::now();
        let batch = vec![
            candidate("Alpha", "https://www.facebook.com/groups/a1"),
            candidate("Beta", "https://www.facebook.com/groups/b2"),
        ];
        let once = merge(&[], &batch, HOST, ORIGIN, now);
        let later = now + chrono::Duration::seconds(5);
        let twice = merge(&once, &batch, HOST, ORIGIN, later);

        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.name, b.name);
            assert_eq!(a.url, b.url);
            assert!(b.last_checked >= a.last_checked);
        }
    }

    #[test]
    fn merge_preserves_status_on_overlay() {
        let now = Utc::now();
        let mut first = merge(
            &[],
            &[candidate("Alpha", "https://www.facebook.com/groups/a1")],
            HOST,
            ORIGIN,
            now,
        );
        first[0].status = GroupStatus::Inactive;

        let second = merge(
            &first,
            &[candidate("Alpha Renamed", "https://www.facebook.com/groups/a1")],
            HOST,
            ORIGIN,
            now + chrono::Duration::seconds(1),
        );
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].name, "Alpha Renamed");
        assert_eq!(second[0].status, GroupStatus::Inactive);
    }

    #[test]
    fn merge_drops_invalid_candidates() {
        let now = Utc::now();
        let merged = merge(
            &[],
            &[
                candidate("", "https://www.facebook.com/groups/a1"),
                candidate("No Url", ""),
                candidate("Wrong Host", "https://example.com/groups/a1"),
                candidate("Ok", "https://www.facebook.com/groups/good"),
            ],
            HOST,
            ORIGIN,
            now,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "good");
    }

    #[test]
    fn cache_ttl_treats_stale_envelope_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let cache = GroupCache::new(store.clone(), HOST, ORIGIN, chrono::Duration::hours(24));

        cache
            .merge_and_store(&[candidate("Alpha", "https://www.facebook.com/groups/a1")])
            .unwrap();
        assert_eq!(cache.load_fresh().unwrap().len(), 1);

        // Age the envelope past the TTL.
        let mut envelope = store.load_cache().unwrap();
        envelope.timestamp = Utc::now() - chrono::Duration::hours(25);
        store.save_cache(&envelope).unwrap();
        assert!(cache.load_fresh().is_none());

        // A merge after expiry starts from empty.
        let merged = cache
            .merge_and_store(&[candidate("Beta", "https://www.facebook.com/groups/b2")])
            .unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "b2");
    }

    #[test]
    fn clear_leaves_a_fresh_empty_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let cache = GroupCache::new(store, HOST, ORIGIN, chrono::Duration::hours(24));

        cache
            .merge_and_store(&[candidate("Alpha", "https://www.facebook.com/groups/a1")])
            .unwrap();
        cache.clear().unwrap();

        // Fresh (not expired) but empty; consumers treat this as a miss so
        // the next fetch repopulates it.
        let groups = cache.load_fresh().unwrap();
        assert!(groups.is_empty());
    }
}
