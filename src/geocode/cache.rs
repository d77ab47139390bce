//! Provider response cache, optionally persisted at ~/.addis-geocoder/cache.json.
//!
//! Keys are `(provider call, standardized query)`; API keys are never part
//! of a key. Zero-result responses are cached, errors are not.
//! Bounded: inserting past capacity evicts the oldest entry.

use super::types::{ProviderCall, Suggestion};
use crate::address::standardize;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CAPACITY: usize = 50_000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Identity of one provider request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub call: ProviderCall,
    pub query: String,
}

impl CacheKey {
    pub fn new(call: ProviderCall, query: &str) -> Self {
        Self { call, query: standardize(query) }
    }

    fn storage_key(&self) -> String {
        format!("{}::{}", self.call, self.query)
    }
}

/// A memoized provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CachedResponse {
    Results(Vec<Value>),
    Suggestion(Option<Suggestion>),
}

#[derive(Serialize, Deserialize, Clone)]
struct CacheEntry {
    response: CachedResponse,
    timestamp: i64,
    #[serde(default)]
    seq: u64,
}

/// Hit/miss counters for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// The result cache. Owned by one resolver; never shared across shards.
pub struct ResultCache {
    path: Option<PathBuf>,
    entries: HashMap<String, CacheEntry>,
    /// Storage keys by insertion age, oldest first.
    order: BTreeSet<(i64, u64, String)>,
    capacity: usize,
    ttl_ms: Option<i64>,
    next_seq: u64,
    hits: u64,
    misses: u64,
    dirty: bool,
}

impl ResultCache {
    /// A cache that lives only for this process.
    pub fn in_memory() -> Self {
        Self::with_entries(None, HashMap::new())
    }

    /// Load from the default location (~/.addis-geocoder/cache.json).
    pub fn load() -> Self {
        Self::load_from(Self::default_path())
    }

    /// Load from a specific path. A missing or unreadable file starts empty.
    pub fn load_from(path: PathBuf) -> Self {
        let entries = Self::read_file(&path).unwrap_or_default();
        debug!("Loaded {} cached responses from {}", entries.len(), path.display());
        Self::with_entries(Some(path), entries)
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".addis-geocoder")
            .join("cache.json")
    }

    fn with_entries(path: Option<PathBuf>, entries: HashMap<String, CacheEntry>) -> Self {
        let next_seq = entries.values().map(|e| e.seq + 1).max().unwrap_or(0);
        let order = entries
            .iter()
            .map(|(k, e)| (e.timestamp, e.seq, k.clone()))
            .collect();
        Self {
            path,
            entries,
            order,
            capacity: DEFAULT_CAPACITY,
            ttl_ms: Some(DEFAULT_TTL.as_millis() as i64),
            next_seq,
            hits: 0,
            misses: 0,
            dirty: false,
        }
    }

    fn read_file(path: &Path) -> Option<HashMap<String, CacheEntry>> {
        let data = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&data) {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!("Ignoring unreadable cache file {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self.evict_to_capacity();
        self
    }

    /// `None` keeps entries forever.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl_ms = ttl.map(|d| d.as_millis() as i64);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Look up a response. Missing and expired entries count as misses.
    pub fn get(&mut self, key: &CacheKey) -> Option<CachedResponse> {
        let now = chrono::Utc::now().timestamp_millis();
        let found = self
            .entries
            .get(&key.storage_key())
            .filter(|e| self.ttl_ms.map_or(true, |ttl| now - e.timestamp <= ttl))
            .map(|e| e.response.clone());

        match found {
            Some(_) => self.hits += 1,
            None => self.misses += 1,
        }
        found
    }

    pub fn put(&mut self, key: &CacheKey, response: CachedResponse) {
        let entry = CacheEntry {
            response,
            timestamp: chrono::Utc::now().timestamp_millis(),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        let storage_key = key.storage_key();
        self.order.insert((entry.timestamp, entry.seq, storage_key.clone()));
        if let Some(old) = self.entries.insert(storage_key.clone(), entry) {
            self.order.remove(&(old.timestamp, old.seq, storage_key));
        }
        self.dirty = true;
        self.evict_to_capacity();
    }

    fn evict_to_capacity(&mut self) {
        while self.entries.len() > self.capacity {
            match self.order.pop_first() {
                Some((_, _, k)) => {
                    self.entries.remove(&k);
                }
                None => break,
            }
        }
    }

    /// Write pending changes to disk. A no-op for in-memory caches.
    pub fn flush(&mut self) -> io::Result<()> {
        let path = match &self.path {
            Some(p) if self.dirty => p,
            _ => return Ok(()),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(path, json)?;
        self.dirty = false;
        debug!("Flushed {} cached responses to {}", self.entries.len(), path.display());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats { hits: self.hits, misses: self.misses, entries: self.entries.len() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn key(q: &str) -> CacheKey {
        CacheKey::new(ProviderCall::Nominatim, q)
    }

    fn results(n: i64) -> CachedResponse {
        CachedResponse::Results(vec![json!({"osm_id": n})])
    }

    #[test]
    fn test_put_get() {
        let mut cache = ResultCache::in_memory();
        cache.put(&key("bole"), results(1));
        assert_eq!(cache.get(&key("bole")), Some(results(1)));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 0, entries: 1 });
    }

    #[test]
    fn test_key_is_standardized() {
        let mut cache = ResultCache::in_memory();
        cache.put(&key("Bole,  Bulbula"), results(1));
        assert!(cache.get(&key("bole bulbula")).is_some());
    }

    #[test]
    fn test_key_separates_calls() {
        let mut cache = ResultCache::in_memory();
        cache.put(&CacheKey::new(ProviderCall::GoogleGeocode, "gerji"), results(1));
        assert!(cache.get(&CacheKey::new(ProviderCall::Nominatim, "gerji")).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_empty_responses_are_cached() {
        let mut cache = ResultCache::in_memory();
        cache.put(&key("nowhere"), CachedResponse::Results(vec![]));
        let k = CacheKey::new(ProviderCall::GoogleFindPlace, "nowhere");
        cache.put(&k, CachedResponse::Suggestion(None));
        assert_eq!(cache.get(&key("nowhere")), Some(CachedResponse::Results(vec![])));
        assert_eq!(cache.get(&k), Some(CachedResponse::Suggestion(None)));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut cache = ResultCache::in_memory().with_capacity(2);
        cache.put(&key("a"), results(1));
        cache.put(&key("b"), results(2));
        cache.put(&key("c"), results(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("a")).is_none());
        assert!(cache.get(&key("b")).is_some());
        assert!(cache.get(&key("c")).is_some());
    }

    #[test]
    fn test_rewritten_entry_becomes_newest() {
        let mut cache = ResultCache::in_memory().with_capacity(2);
        cache.put(&key("a"), results(1));
        cache.put(&key("b"), results(2));
        cache.put(&key("a"), results(3));
        cache.put(&key("c"), results(4));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("b")).is_none());
        assert_eq!(cache.get(&key("a")), Some(results(3)));
    }

    #[test]
    fn test_loaded_entries_without_sequence_are_evictable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let now = chrono::Utc::now().timestamp_millis();
        let entry = |n: i64| json!({"response": {"kind": "results", "value": [{"osm_id": n}]}, "timestamp": now});
        let file = json!({"nominatim::a": entry(1), "nominatim::b": entry(2), "nominatim::c": entry(3)});
        fs::write(&path, file.to_string()).unwrap();

        let mut cache = ResultCache::load_from(path).with_capacity(1);
        assert_eq!(cache.len(), 1);
        cache.put(&key("d"), results(4));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("d")).is_some());
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        {
            let mut cache = ResultCache::load_from(path.clone());
            cache.put(&key("ayat"), results(9));
            cache.flush().unwrap();
        }

        let mut reloaded = ResultCache::load_from(path);
        assert_eq!(reloaded.get(&key("ayat")), Some(results(9)));
    }

    #[test]
    fn test_expired_entries_miss() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let stale = r#"{
            "nominatim::old": {
                "response": {"kind": "results", "value": [{"osm_id": 1}]},
                "timestamp": 1000
            }
        }"#;
        fs::write(&path, stale).unwrap();

        let mut cache = ResultCache::load_from(path.clone());
        assert!(cache.get(&key("old")).is_none());

        let mut forever = ResultCache::load_from(path).with_ttl(None);
        assert!(forever.get(&key("old")).is_some());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{not json").unwrap();
        let cache = ResultCache::load_from(path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_flush_in_memory_is_noop() {
        let mut cache = ResultCache::in_memory();
        cache.put(&key("x"), results(1));
        assert!(cache.flush().is_ok());
        assert!(cache.path().is_none());
    }
}
