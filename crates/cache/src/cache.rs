//! Durable sample cache keyed by expression identity.
//!
//! Every entry lives in its own JSON file under `<working dir>/cache/`, so a
//! crash while writing one entry can never damage another. Files are written
//! to a temporary sibling, synced, and renamed into place.

use anyhow::{Context, Result};
use fpbench_core::{ExprKey, Sample};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

pub const CACHE_DIR: &str = "cache";
const ENTRY_EXTENSION: &str = "json";
const ENTRY_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(default = "legacy_version")]
    pub version: u32,
    pub key: ExprKey,
    /// Expression text at the time the sample was taken.
    #[serde(default)]
    pub text: String,
    pub sample: Sample,
    #[serde(default)]
    pub stored_at_unix_ms: u64,
}

fn legacy_version() -> u32 {
    0
}

#[derive(Debug)]
pub struct SampleCache {
    dir: PathBuf,
    entries: HashMap<ExprKey, CacheEntry>,
}

impl SampleCache {
    /// An empty cache rooted at `<working_dir>/cache`. Nothing is read until
    /// [`SampleCache::restore`] is called.
    pub fn new(working_dir: &Path) -> Self {
        Self {
            dir: working_dir.join(CACHE_DIR),
            entries: HashMap::new(),
        }
    }

    /// Creates the cache and eagerly restores whatever is on disk.
    pub fn open(working_dir: &Path) -> Self {
        let mut cache = Self::new(working_dir);
        cache.restore();
        cache
    }

    /// Loads every persisted entry, replacing the in-memory contents.
    ///
    /// Never fails: an unreadable store yields an empty cache and a
    /// warning, and individual corrupt entries are skipped.
    pub fn restore(&mut self) -> usize {
        self.entries.clear();
        match self.load_entries() {
            Ok(count) => {
                info!(dir = %self.dir.display(), entries = count, "restored sample cache");
                count
            }
            Err(error) => {
                warn!(dir = %self.dir.display(), error = %error, "sample cache unreadable; starting empty");
                self.entries.clear();
                0
            }
        }
    }

    fn load_entries(&mut self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        for dirent in fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            match read_entry(&path) {
                Ok(entry) => {
                    self.entries.insert(entry.key.clone(), entry);
                }
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "skipping corrupt cache entry");
                }
            }
        }
        Ok(self.entries.len())
    }

    pub fn get(&self, key: &ExprKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Upserts an entry and persists it before returning.
    pub fn put(&mut self, key: &ExprKey, text: &str, sample: Sample) -> Result<()> {
        let entry = CacheEntry {
            version: ENTRY_VERSION,
            key: key.clone(),
            text: text.to_string(),
            sample,
            stored_at_unix_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        };

        let path = self.entry_path(key);
        write_entry(&path, &entry)
            .with_context(|| format!("failed to persist cache entry {key} to {}", path.display()))?;
        debug!(key = %key, points = entry.sample.len(), "cached sample");

        self.entries.insert(key.clone(), entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, key: &ExprKey) -> PathBuf {
        self.dir
            .join(format!("{}.{}", key.file_stem(), ENTRY_EXTENSION))
    }
}

fn read_entry(path: &Path) -> Result<CacheEntry> {
    let data = fs::read(path)?;
    let entry = serde_json::from_slice(&data)?;
    Ok(entry)
}

fn write_entry(path: &Path, entry: &CacheEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let blob = serde_json::to_vec(entry)?;

    let staging = path.with_extension(format!("{ENTRY_EXTENSION}.tmp"));
    let mut file = fs::File::create(&staging)?;
    file.write_all(&blob)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&staging, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpbench_core::KeySpace;

    fn sample_of(n: usize) -> Sample {
        let xs = (0..n).map(|i| i as f64 * 0.5).collect::<Vec<_>>();
        let gts = (0..n).map(|i| (i as f64).sqrt()).collect::<Vec<_>>();
        Sample::new(vec![xs], gts)
    }

    #[test]
    fn put_then_restore_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let key = ExprKey::new(KeySpace::Synthesized, "sqrt");

        let mut cache = SampleCache::open(dir.path());
        assert!(cache.is_empty());
        cache
            .put(&key, "(FPCore (x0) :name \"sqrt\" (sqrt x0))", sample_of(100))
            .unwrap();

        let restored = SampleCache::open(dir.path());
        let entry = restored.get(&key).unwrap();
        assert_eq!(entry.sample.len(), 100);
        assert!(entry.sample.same_bits(&sample_of(100)));
        assert_eq!(entry.version, ENTRY_VERSION);
        assert!(entry.text.contains("sqrt"));
    }

    #[test]
    fn unnamed_core_with_long_body_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let body = (0..120).fold("x0".to_string(), |acc, i| format!("(+ {acc} {i})"));
        let text = format!("(FPCore (x0) {body})");
        let core = fpbench_core::parse_core(&text).unwrap();
        assert!(core.key.as_str().len() > 300);

        let mut cache = SampleCache::new(dir.path());
        cache.put(&core.key, &text, sample_of(8)).unwrap();
        assert!(cache.entry_path(&core.key).file_name().unwrap().len() < 255);

        let restored = SampleCache::open(dir.path());
        let entry = restored.get(&core.key).unwrap();
        assert_eq!(entry.key, core.key);
        assert_eq!(entry.text, text);
        assert!(entry.sample.same_bits(&sample_of(8)));
    }

    #[test]
    fn put_overwrites_previous_entry() {
        let dir = tempfile::tempdir().unwrap();
        let key = ExprKey::new(KeySpace::Synthesized, "exp");
        let mut cache = SampleCache::new(dir.path());
        cache.put(&key, "a", sample_of(10)).unwrap();
        cache.put(&key, "b", sample_of(20)).unwrap();

        let restored = SampleCache::open(dir.path());
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.get(&key).unwrap().sample.len(), 20);
        assert_eq!(restored.get(&key).unwrap().text, "b");
    }

    #[test]
    fn missing_store_restores_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SampleCache::new(&dir.path().join("does-not-exist"));
        assert_eq!(cache.restore(), 0);
    }

    #[test]
    fn corrupt_entry_does_not_hide_others() {
        let dir = tempfile::tempdir().unwrap();
        let key = ExprKey::new(KeySpace::Synthesized, "log");
        let mut cache = SampleCache::new(dir.path());
        cache.put(&key, "log", sample_of(5)).unwrap();
        fs::write(cache.dir().join("synth-broken.json"), b"{ not json").unwrap();
        fs::write(cache.dir().join("synth-half.json.tmp"), b"{").unwrap();

        let restored = SampleCache::open(dir.path());
        assert_eq!(restored.len(), 1);
        assert!(restored.get(&key).is_some());
    }

    #[test]
    fn tolerates_missing_and_extra_fields() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join(CACHE_DIR);
        fs::create_dir_all(&cache_dir).unwrap();
        fs::write(
            cache_dir.join("synth-cos.json"),
            br#"{"key": "synth:cos", "sample": {"points": [[1.0, "+inf.0"]]}, "origin": "older build"}"#,
        )
        .unwrap();

        let restored = SampleCache::open(dir.path());
        let entry = restored
            .get(&ExprKey::new(KeySpace::Synthesized, "cos"))
            .unwrap();
        assert_eq!(entry.version, 0);
        assert_eq!(entry.sample.points[0][1], f64::INFINITY);
        assert!(entry.text.is_empty());
    }
}
