//! In-memory caches backing candidate lookups and author name resolution.
//!
//! Both caches are scoped by catalog instance (its base URL) because ids and
//! search results are only meaningful for the instance that produced them.
//! Writes are last-write-wins; there is no transactional guarantee across
//! entries.

use std::{
    hash::Hash,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use quire_model::CandidateRecord;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Concurrent map whose entries optionally expire.
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, CacheEntry<V>>,
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let hit = self.entries.get(key).map(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.value.clone())
            }
        });

        match hit {
            Some(Some(value)) => Some(value),
            Some(None) => {
                self.entries.remove_if(key, |_, entry| entry.is_expired(now));
                None
            }
            None => None,
        }
    }

    /// Insert `value`; `ttl == None` keeps it until invalidated.
    pub fn insert(&self, key: K, value: V, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key, CacheEntry { value, expires_at });
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// Author id remembered under a lookup name, with the name the service
/// actually reported for that id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAuthor {
    pub id: i64,
    pub name: String,
}

/// Lookup and author caches shared by every catalog instance of a process.
#[derive(Debug)]
pub struct CatalogCache {
    lookups: TtlCache<String, Vec<CandidateRecord>>,
    authors: TtlCache<String, CachedAuthor>,
    lookup_ttl: Duration,
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::new(quire_config::constants::DEFAULT_LOOKUP_CACHE_TTL)
    }
}

impl CatalogCache {
    pub fn new(lookup_ttl: Duration) -> Self {
        Self {
            lookups: TtlCache::new(),
            authors: TtlCache::new(),
            lookup_ttl,
        }
    }

    pub fn lookup_ttl(&self) -> Duration {
        self.lookup_ttl
    }

    pub fn cached_lookup(&self, scope: &str, term: &str) -> Option<Vec<CandidateRecord>> {
        self.lookups.get(&scoped_key(scope, term))
    }

    pub fn store_lookup(&self, scope: &str, term: &str, records: Vec<CandidateRecord>) {
        if self.lookup_ttl.is_zero() {
            return;
        }
        self.lookups
            .insert(scoped_key(scope, term), records, Some(self.lookup_ttl));
    }

    /// Cached id for `name`, trusted only when the stored author name equals
    /// `name` ignoring ASCII case.
    pub fn author_id(&self, scope: &str, name: &str) -> Option<i64> {
        let cached = self.authors.get(&scoped_key(scope, name))?;
        if cached.name.trim().eq_ignore_ascii_case(name.trim()) {
            Some(cached.id)
        } else {
            debug!(
                lookup = name,
                cached = %cached.name,
                "ignoring cached author mapping for a different name"
            );
            None
        }
    }

    /// Remember `id` for `lookup_name`; `reported_name` is the author name the
    /// service returned for that id.
    pub fn remember_author(&self, scope: &str, lookup_name: &str, id: i64, reported_name: &str) {
        let entry = CachedAuthor {
            id,
            name: reported_name.trim().to_string(),
        };
        self.authors
            .insert(scoped_key(scope, lookup_name), entry.clone(), None);
        if !reported_name.trim().eq_ignore_ascii_case(lookup_name.trim()) {
            self.authors.insert(scoped_key(scope, reported_name), entry, None);
        }
    }

    pub fn invalidate_author(&self, scope: &str, name: &str) -> bool {
        self.authors.invalidate(&scoped_key(scope, name))
    }

    pub fn purge_expired(&self) -> usize {
        self.lookups.purge_expired() + self.authors.purge_expired()
    }

    pub fn clear(&self) {
        self.lookups.clear();
        self.authors.clear();
    }
}

fn scoped_key(scope: &str, term: &str) -> String {
    format!("{}|{}", scope, term.trim().to_lowercase())
}
