//! Content-addressed package cache (component F): optimized local tier plus
//! a shared multi-process tier, with compression, TTL, statistics, and
//! coarse file-lock coordination.
//!
//! The on-disk shard layout (`objects/{ab}/{cdef...}/name-version.bin`)
//! reuses the two-level hex sharding from `pantry_hash::two_level_shard`,
//! the same scheme the teacher's sparse-index client uses for crates.io
//! index paths. The advisory process lock for the shared tier is the same
//! atomic-lock-file idiom the teacher uses for its run lock: a lock file
//! written via temp-file-then-rename, with stale-lock detection by age.
//!
//! Time is threaded explicitly (`now: i64`, unix seconds) rather than read
//! from a global clock, so TTL behavior is deterministic in tests and so
//! the cache has no hidden global state (spec §9's "explicit context
//! object" design note).

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use pantry_hash::two_level_shard;
use pantry_types::{CacheCodec, CacheEntry, CacheStatistics, PantryError, Result};
use sha2::{Digest, Sha256};

/// Configuration for one cache root.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub max_age_seconds: Option<u64>,
    pub codec: CacheCodec,
    pub enable_locking: bool,
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_age_seconds: None,
            codec: CacheCodec::None,
            enable_locking: false,
        }
    }
}

/// A content-addressed package cache. `enable_locking` in its config
/// switches it between the "optimized" (single-process, unlocked) and
/// "shared" (multi-process, advisory-locked) tiers described in spec §4.F
/// -- the same type models both; only the locking discipline differs.
pub struct Cache {
    config: CacheConfig,
    stats: Mutex<CacheStatistics>,
}

fn key_of(name: &str, version: &str) -> String {
    format!("{name}@{version}")
}

fn object_paths(root: &Path, name: &str, version: &str) -> (PathBuf, PathBuf) {
    let hex = pantry_hash::hash_key_hex(&key_of(name, version));
    let (head, tail) = two_level_shard(&hex);
    let object = root
        .join("objects")
        .join(&head)
        .join(&tail)
        .join(format!("{name}-{version}.bin"));
    let meta = root
        .join("meta")
        .join(&head)
        .join(&tail)
        .join(format!("{name}-{version}.json"));
    (object, meta)
}

/// Atomically write `data` to `path`: temp file in the same directory,
/// `sync_all`, then `rename`. A cancelled or crashed write leaves `path`
/// either absent or the previous complete value -- never a partial file.
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let tmp = dir.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("entry")
    ));
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(data)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn compress(codec: CacheCodec, body: &[u8]) -> Result<Vec<u8>> {
    match codec {
        CacheCodec::None => Ok(body.to_vec()),
        CacheCodec::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(body)?;
            Ok(encoder.finish()?)
        }
    }
}

fn decompress(codec: CacheCodec, body: &[u8]) -> Result<Vec<u8>> {
    match codec {
        CacheCodec::None => Ok(body.to_vec()),
        CacheCodec::Gzip => {
            let mut decoder = GzDecoder::new(body);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            Ok(out)
        }
    }
}

impl Cache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(CacheStatistics::default()),
        }
    }

    fn lock_guard(&self) -> Option<CacheLock> {
        if self.config.enable_locking {
            Some(CacheLock::acquire(&self.config.root))
        } else {
            None
        }
    }

    /// Write metadata and body for `(name, version)`, compressing the body
    /// first if a codec is configured, then update statistics.
    pub fn put(
        &self,
        name: &str,
        version: &str,
        url: &str,
        sha256: &str,
        body: &[u8],
        now: i64,
    ) -> Result<()> {
        let _lock = self.lock_guard();
        let (object_path, meta_path) = object_paths(&self.config.root, name, version);

        let was_present = object_path.exists();
        let stored = compress(self.config.codec, body)?;
        atomic_write(&object_path, &stored)?;

        let entry = CacheEntry {
            name: name.to_string(),
            version: version.to_string(),
            url: url.to_string(),
            sha256: sha256.to_string(),
            body_len: stored.len() as u64,
            inserted_at: now,
            compressed: self.config.codec,
        };
        let meta_json = serde_json::to_vec_pretty(&entry).map_err(|_| PantryError::CacheCorrupted {
            name: name.to_string(),
            version: version.to_string(),
        })?;
        atomic_write(&meta_path, &meta_json)?;

        let mut stats = self.stats.lock().unwrap();
        if !was_present {
            stats.total_packages += 1;
        }
        stats.total_size += entry.body_len;
        stats.avg_package_size = if stats.total_packages > 0 {
            stats.total_size / stats.total_packages
        } else {
            0
        };
        Ok(())
    }

    fn read_metadata(&self, name: &str, version: &str) -> Result<Option<CacheEntry>> {
        let (_, meta_path) = object_paths(&self.config.root, name, version);
        if !meta_path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&meta_path)?;
        let entry: CacheEntry = serde_json::from_str(&data)
            .map_err(|_| PantryError::CacheCorrupted {
                name: name.to_string(),
                version: version.to_string(),
            })?;
        Ok(Some(entry))
    }

    fn is_expired(&self, entry: &CacheEntry, now: i64) -> bool {
        match self.config.max_age_seconds {
            Some(max_age) => (now - entry.inserted_at) as u64 > max_age,
            None => false,
        }
    }

    /// Metadata lookup respecting TTL. An expired entry is evicted and
    /// reported as a miss.
    pub fn get(&self, name: &str, version: &str, now: i64) -> Result<Option<CacheEntry>> {
        let Some(entry) = self.read_metadata(name, version)? else {
            self.record_miss();
            return Ok(None);
        };
        if self.is_expired(&entry, now) {
            self.evict(name, version)?;
            self.record_miss();
            return Ok(None);
        }
        self.record_hit();
        Ok(Some(entry))
    }

    /// Cheap existence check (metadata only), respecting TTL.
    pub fn has(&self, name: &str, version: &str, now: i64) -> bool {
        match self.read_metadata(name, version) {
            Ok(Some(entry)) => !self.is_expired(&entry, now),
            _ => false,
        }
    }

    /// Read and decompress the stored body, respecting TTL and verifying
    /// the recorded sha256 checksum; a mismatch is treated as a miss.
    pub fn read(&self, name: &str, version: &str, now: i64) -> Result<Option<Vec<u8>>> {
        let Some(entry) = self.get(name, version, now)? else {
            return Ok(None);
        };
        let (object_path, _) = object_paths(&self.config.root, name, version);
        let stored = fs::read(&object_path)?;
        let body = decompress(entry.compressed, &stored)?;

        let mut hasher = Sha256::new();
        hasher.update(&body);
        let actual = hex::encode(hasher.finalize());
        if actual != entry.sha256 {
            self.evict(name, version)?;
            return Ok(None);
        }
        Ok(Some(body))
    }

    fn evict(&self, name: &str, version: &str) -> Result<()> {
        let (object_path, meta_path) = object_paths(&self.config.root, name, version);
        if object_path.exists() {
            let size = fs::metadata(&object_path).map(|m| m.len()).unwrap_or(0);
            fs::remove_file(&object_path).ok();
            let mut stats = self.stats.lock().unwrap();
            stats.total_packages = stats.total_packages.saturating_sub(1);
            stats.total_size = stats.total_size.saturating_sub(size);
            stats.avg_package_size = if stats.total_packages > 0 {
                stats.total_size / stats.total_packages
            } else {
                0
            };
        }
        fs::remove_file(&meta_path).ok();
        Ok(())
    }

    fn record_hit(&self) {
        self.stats.lock().unwrap().hits += 1;
    }

    fn record_miss(&self) {
        self.stats.lock().unwrap().misses += 1;
    }

    /// Remove all entries and reset size/package counters (hit/miss
    /// counters are also reset; pantry keeps no separate lifetime-counter
    /// tier).
    pub fn clean(&self) -> Result<()> {
        let _lock = self.lock_guard();
        let objects = self.config.root.join("objects");
        let meta = self.config.root.join("meta");
        if objects.exists() {
            fs::remove_dir_all(&objects)?;
        }
        if meta.exists() {
            fs::remove_dir_all(&meta)?;
        }
        *self.stats.lock().unwrap() = CacheStatistics::default();
        Ok(())
    }

    pub fn statistics(&self) -> CacheStatistics {
        *self.stats.lock().unwrap()
    }
}

/// Advisory, process-wide file lock keyed on the cache root, used by the
/// shared tier to serialize writers across processes. Grounded on the
/// teacher's run-lock idiom: a small JSON sidecar recording pid/acquired-at,
/// written atomically, with stale-lock detection by age rather than a
/// liveness check (a dead process's lock simply expires).
pub struct CacheLock {
    path: PathBuf,
}

const STALE_LOCK_SECONDS: u64 = 60;

impl CacheLock {
    pub fn acquire(cache_root: &Path) -> Self {
        let path = cache_root.join(".cache.lock");
        let _ = fs::create_dir_all(cache_root);

        loop {
            if !path.exists() {
                let info = format!("{{\"pid\":{}}}", std::process::id());
                if atomic_write(&path, info.as_bytes()).is_ok() {
                    break;
                }
            }
            if let Ok(meta) = fs::metadata(&path) {
                if let Ok(modified) = meta.modified() {
                    if modified.elapsed().map(|e| e.as_secs()).unwrap_or(0) > STALE_LOCK_SECONDS {
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                }
            }
            break;
        }

        Self { path }
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
