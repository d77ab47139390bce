//! Batch geocoding: input loading, key rotation, sharding, checkpointing
//! and resume.
//!
//! Items are resolved one at a time. Records are written to numbered
//! checkpoint files (`geocoding_results__NN.json`) every `batch_size`
//! records and at the end, so a crash loses at most one batch.

use crate::error::{Error, Result};
use crate::geocode::pacing;
use crate::geocode::{
    AddressQuery, CacheStats, GeocodeError, GeocodingApi, KeyPair, Outcome, ResolutionRecord,
    Resolver, SuggestMode,
};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const CHECKPOINT_PREFIX: &str = "geocoding_results__";

// ─── API keys ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct KeyFile {
    autocomplete: BTreeMap<String, String>,
    geocode: BTreeMap<String, String>,
}

/// Key pools for suggestion and geocoding calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiKeys {
    pub suggest: Vec<String>,
    pub geocode: Vec<String>,
}

impl ApiKeys {
    pub fn new(suggest: Vec<String>, geocode: Vec<String>) -> Self {
        Self { suggest, geocode }
    }

    /// Load `{"autocomplete": {name: key, ..}, "geocode": {name: key, ..}}`.
    pub fn load(path: &Path) -> Result<Self> {
        let credentials = |message: String| Error::Credentials { path: path.to_path_buf(), message };

        let data = fs::read_to_string(path).map_err(|e| credentials(e.to_string()))?;
        let file: KeyFile = serde_json::from_str(&data).map_err(|e| credentials(e.to_string()))?;

        let keys = Self::new(
            file.autocomplete.into_values().collect(),
            file.geocode.into_values().collect(),
        );
        if keys.suggest.is_empty() || keys.geocode.is_empty() {
            return Err(credentials("both 'autocomplete' and 'geocode' need at least one key".into()));
        }
        Ok(keys)
    }

    /// Keys for the item at 1-based `position`, rotating round-robin.
    pub fn key_pair(&self, position: usize) -> KeyPair {
        let pick = |pool: &[String]| {
            if pool.is_empty() {
                String::new()
            } else {
                pool[position % pool.len()].clone()
            }
        };
        KeyPair::new(pick(&self.suggest), pick(&self.geocode))
    }

    /// The keys owned by one shard. A pool smaller than the shard count
    /// lends its `index % len`-th key.
    pub fn for_shard(&self, shard: Shard) -> Self {
        let slice = |pool: &[String]| -> Vec<String> {
            let owned: Vec<String> = pool
                .iter()
                .enumerate()
                .filter(|(i, _)| i % shard.count == shard.index)
                .map(|(_, k)| k.clone())
                .collect();
            if owned.is_empty() && !pool.is_empty() {
                warn!("Fewer keys than shards; shard {} reuses a shared key", shard);
                vec![pool[shard.index % pool.len()].clone()]
            } else {
                owned
            }
        };
        Self::new(slice(&self.suggest), slice(&self.geocode))
    }
}

// ─── Sharding ───────────────────────────────────────────────────

/// Slice `index` of `count`: items whose 0-based position `% count == index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    pub index: usize,
    pub count: usize,
}

impl Shard {
    pub fn owns(&self, position: usize) -> bool {
        position % self.count == self.index
    }
}

impl std::fmt::Display for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.index, self.count)
    }
}

impl FromStr for Shard {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (k, n) = s.split_once('/').ok_or_else(|| format!("expected K/N, got '{}'", s))?;
        let index: usize = k.trim().parse().map_err(|_| format!("bad shard index '{}'", k))?;
        let count: usize = n.trim().parse().map_err(|_| format!("bad shard count '{}'", n))?;
        if count == 0 || index >= count {
            return Err(format!("shard index must be in 0..{}, got {}", count, index));
        }
        Ok(Self { index, count })
    }
}

// ─── Input ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct InputRow {
    address_main: String,
    #[serde(default)]
    address_alt: String,
    use_api: String,
    ids: String,
}

/// Read `address_main,address_alt,use_api,ids` rows. Rows with an unknown
/// `use_api` are skipped with a warning.
pub fn load_addresses(path: &Path) -> Result<Vec<AddressQuery>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut queries = Vec::new();

    for (line, row) in reader.deserialize::<InputRow>().enumerate() {
        let row = row?;
        let mode = match row.use_api.parse::<SuggestMode>() {
            Ok(mode) => mode,
            Err(e) => {
                warn!("Skipping row {}: {}", line + 1, e);
                continue;
            }
        };
        let ids = row
            .ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect::<Vec<_>>();

        queries.push(AddressQuery {
            main: row.address_main,
            alternative: row.address_alt,
            mode,
            ids,
        });
    }

    info!("Loaded {} address queries from {}", queries.len(), path.display());
    Ok(queries)
}

// ─── Checkpoints ────────────────────────────────────────────────

/// The number after the last `__` in a checkpoint file name.
fn checkpoint_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix(CHECKPOINT_PREFIX)?;
    stem.rsplit("__").next()?.parse().ok()
}

/// All checkpoint files in `dir`, ordered by their number.
pub fn checkpoint_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<(u32, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
        .filter_map(|p| checkpoint_number(&p).map(|n| (n, p)))
        .collect();
    files.sort();
    Ok(files.into_iter().map(|(_, p)| p).collect())
}

pub fn load_checkpoints(dir: &Path) -> Result<Vec<ResolutionRecord>> {
    let mut records = Vec::new();
    for path in checkpoint_files(dir)? {
        let data = fs::read_to_string(&path)?;
        let batch: Vec<ResolutionRecord> = serde_json::from_str(&data)?;
        debug!("Read {} records from {}", batch.len(), path.display());
        records.extend(batch);
    }
    Ok(records)
}

/// Every id that already has a record.
pub fn resolved_ids(records: &[ResolutionRecord]) -> HashSet<String> {
    records.iter().flat_map(|r| r.ids.iter().cloned()).collect()
}

/// Writes numbered checkpoint files, continuing after any already present.
pub struct CheckpointWriter {
    dir: PathBuf,
    prefix: String,
    next: u32,
}

impl CheckpointWriter {
    /// `tag` separates the files of concurrent shards.
    pub fn new(dir: &Path, tag: Option<&str>) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let prefix = match tag {
            Some(t) => format!("{}{}__", CHECKPOINT_PREFIX, t),
            None => CHECKPOINT_PREFIX.to_string(),
        };

        let mut last = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let rest = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix(prefix.as_str()))
                .map(String::from);
            if let Some(n) = rest.and_then(|r| r.parse::<u32>().ok()) {
                last = last.max(n);
            }
        }
        Ok(Self { dir: dir.to_path_buf(), prefix, next: last + 1 })
    }

    pub fn write(&mut self, records: &[ResolutionRecord]) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}{:02}.json", self.prefix, self.next));
        let json = serde_json::to_string_pretty(records)?;
        fs::write(&path, json)?;
        self.next += 1;
        info!("Checkpoint: {} records -> {}", records.len(), path.display());
        Ok(path)
    }
}

// ─── Runner ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub pace: Duration,
    pub output_dir: PathBuf,
    pub shard: Option<Shard>,
    /// Skip queries whose ids all appear in existing checkpoints.
    pub resume: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            pace: Duration::from_millis(500),
            output_dir: PathBuf::from("geocode_results"),
            shard: None,
            resume: false,
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub empty: usize,
    pub invalid: usize,
    /// Already resolved in an earlier run.
    pub skipped: usize,
    pub cancelled: bool,
    pub checkpoints: Vec<PathBuf>,
    pub cache: CacheStats,
}

pub struct BatchRunner<A: GeocodingApi> {
    resolver: Resolver<A>,
    keys: ApiKeys,
    options: BatchOptions,
}

impl<A: GeocodingApi> BatchRunner<A> {
    pub fn new(resolver: Resolver<A>, keys: ApiKeys, options: BatchOptions) -> Self {
        let keys = match options.shard {
            Some(shard) => keys.for_shard(shard),
            None => keys,
        };
        Self { resolver, keys, options }
    }

    pub fn resolver(&self) -> &Resolver<A> {
        &self.resolver
    }

    /// Resolve every query this runner owns. Per-item failures are recorded
    /// and the run continues; cancellation stops it after flushing.
    pub fn run(&mut self, queries: Vec<AddressQuery>) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();

        let owned: Vec<AddressQuery> = match self.options.shard {
            Some(shard) => queries
                .into_iter()
                .enumerate()
                .filter(|(i, _)| shard.owns(*i))
                .map(|(_, q)| q)
                .collect(),
            None => queries,
        };

        let done = if self.options.resume {
            resolved_ids(&load_checkpoints(&self.options.output_dir)?)
        } else {
            HashSet::new()
        };
        let pending_queries: Vec<AddressQuery> = owned
            .into_iter()
            .filter(|q| {
                let resolved = !q.ids.is_empty() && q.ids.iter().all(|id| done.contains(id));
                if resolved {
                    summary.skipped += 1;
                }
                !resolved
            })
            .collect();
        if summary.skipped > 0 {
            info!("Resuming: {} queries already resolved", summary.skipped);
        }

        let tag = self.options.shard.map(|s| format!("shard{}of{}", s.index, s.count));
        let mut writer = CheckpointWriter::new(&self.options.output_dir, tag.as_deref())?;
        let cancel = self.resolver.cancel_token().clone();
        let total = pending_queries.len();
        let mut batch: Vec<ResolutionRecord> = Vec::with_capacity(self.options.batch_size);

        for (i, query) in pending_queries.iter().enumerate() {
            let position = i + 1;
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let keys = self.keys.key_pair(position);
            match self.resolver.resolve(query, &keys) {
                Ok(record) => {
                    match record.status {
                        Outcome::Success => summary.succeeded += 1,
                        Outcome::Empty => summary.empty += 1,
                        Outcome::Invalid => summary.invalid += 1,
                    }
                    summary.processed += 1;
                    batch.push(record);
                }
                Err(GeocodeError::Cancelled) => {
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    error!("Skipping '{}': {}", query.main, e);
                    continue;
                }
            }
            debug!("[{}/{}] {}", position, total, query.main);

            if batch.len() >= self.options.batch_size {
                self.checkpoint(&mut writer, &mut batch, &mut summary)?;
            }
            if position < total && pacing::sleep(self.options.pace, &cancel).is_err() {
                summary.cancelled = true;
                break;
            }
        }

        if !batch.is_empty() {
            self.checkpoint(&mut writer, &mut batch, &mut summary)?;
        }
        if summary.cancelled {
            warn!("Run cancelled after {} queries; progress saved", summary.processed);
        }
        summary.cache = self.resolver.cache().stats();
        Ok(summary)
    }

    fn checkpoint(
        &mut self,
        writer: &mut CheckpointWriter,
        batch: &mut Vec<ResolutionRecord>,
        summary: &mut BatchSummary,
    ) -> Result<()> {
        summary.checkpoints.push(writer.write(batch)?);
        batch.clear();
        if let Err(e) = self.resolver.cache_mut().flush() {
            warn!("Failed to persist the response cache: {}", e);
        }
        Ok(())
    }
}
