//! Environment manager (component G): maps a project's dependency-file
//! fingerprint to an on-disk environment directory, and supports creation,
//! lookup, removal, listing, scanning, garbage collection, and inspection.
//!
//! The fingerprint is `MD5(dep_file_path)` per spec §4.G -- a path-based
//! content address, not a hash of the file's bytes, so two projects whose
//! manifests happen to have identical contents still get distinct
//! environments. `pantry_hash::md5_bytes`/`fingerprint_hex` do the actual
//! hashing; this crate only owns the directory lifecycle built on top of
//! them.

use std::fs;
use std::path::{Path, PathBuf};

use pantry_hash::{fingerprint_hex, md5_bytes};
use pantry_types::{Environment, EnvironmentSummary, PantryError, Result};
use serde::{Deserialize, Serialize};

/// Sidecar metadata written alongside each environment directory so the
/// scanner can report a project name without re-deriving it from the
/// fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EnvMeta {
    dep_file: PathBuf,
    created_at: i64,
}

const META_FILE: &str = ".pantry-env.json";

pub struct EnvironmentManager {
    envs_dir: PathBuf,
}

impl EnvironmentManager {
    pub fn new(envs_dir: impl Into<PathBuf>) -> Self {
        Self {
            envs_dir: envs_dir.into(),
        }
    }

    fn dir_for(&self, hash: &[u8; 16]) -> PathBuf {
        self.envs_dir.join(fingerprint_hex(hash))
    }

    /// Allocate (or reuse) the environment directory for `dep_file`.
    /// Creation is idempotent: if the directory already exists it is
    /// reused rather than recreated.
    pub fn create(&self, dep_file: &Path, now: i64) -> Result<Environment> {
        let hash = md5_bytes(&dep_file.to_string_lossy());
        let dir = self.dir_for(&hash);

        let is_new = !dir.exists();
        fs::create_dir_all(dir.join("bin"))?;
        fs::create_dir_all(dir.join("pkgs"))?;
        fs::create_dir_all(dir.join("stubs"))?;

        if is_new {
            let meta = EnvMeta {
                dep_file: dep_file.to_path_buf(),
                created_at: now,
            };
            let bytes = serde_json::to_vec_pretty(&meta).map_err(anyhow::Error::from)?;
            fs::write(dir.join(META_FILE), bytes)?;
        }

        Ok(Environment {
            hash,
            dep_file: dep_file.to_path_buf(),
            path: dir,
            env_vars: Default::default(),
            packages: list_dir_entries(&self.dir_for(&hash).join("pkgs")),
        })
    }

    /// `None` if the directory for `hash` is absent.
    pub fn load(&self, hash: &[u8; 16]) -> Option<Environment> {
        let dir = self.dir_for(hash);
        if !dir.is_dir() {
            return None;
        }
        let dep_file = read_meta(&dir)
            .map(|m| m.dep_file)
            .unwrap_or_else(|| PathBuf::from(""));
        Some(Environment {
            hash: *hash,
            dep_file,
            path: dir.clone(),
            env_vars: Default::default(),
            packages: list_dir_entries(&dir.join("pkgs")),
        })
    }

    /// Best-effort recursive removal; a missing directory is not an error.
    pub fn remove(&self, hash: &[u8; 16]) -> Result<()> {
        let dir = self.dir_for(hash);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Enumerate subdirectories of `envs/` whose name is a 32-char hex
    /// string.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.envs_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut hashes = Vec::new();
        for entry in fs::read_dir(&self.envs_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if is_32_char_hex(&name) {
                hashes.push(name);
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    /// Compute the scanner record for one environment.
    pub fn scan(&self, hash_hex: &str, now: i64) -> Result<Option<EnvironmentSummary>> {
        let dir = self.envs_dir.join(hash_hex);
        if !dir.is_dir() {
            return Ok(None);
        }

        let meta = read_meta(&dir);
        let project_name = meta
            .as_ref()
            .and_then(|m| m.dep_file.parent())
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string());

        let size_bytes = dir_size(&dir)?;
        let packages = count_entries(&dir.join("pkgs"));
        let binaries = count_entries(&dir.join("bin"));
        let fs_meta = fs::metadata(&dir)?;
        let modified = fs_meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(now);
        let created = meta.map(|m| m.created_at).unwrap_or(modified);

        Ok(Some(EnvironmentSummary {
            hash_hex: hash_hex.to_string(),
            project_name,
            path: dir,
            size_bytes,
            packages,
            binaries,
            created,
            modified,
        }))
    }

    /// Inspect one environment: its scanner record plus directory
    /// listings of `bin/` and `stubs/`.
    pub fn inspect(&self, hash_hex: &str, now: i64) -> Result<Option<Inspection>> {
        let Some(summary) = self.scan(hash_hex, now)? else {
            return Ok(None);
        };
        let dir = self.envs_dir.join(hash_hex);
        Ok(Some(Inspection {
            bin_entries: list_dir_entries(&dir.join("bin")),
            stub_entries: list_dir_entries(&dir.join("stubs")),
            summary,
        }))
    }

    /// List environments whose `modified` predates `now - older_than_days
    /// * 86400`. In `dry_run`, nothing is removed. Without `force`, the
    /// candidates are reported but not removed either -- the caller
    /// (CLI) decides whether to confirm and re-invoke with `force`.
    pub fn clean(
        &self,
        older_than_days: u64,
        dry_run: bool,
        force: bool,
        now: i64,
    ) -> Result<GcReport> {
        let cutoff = now - (older_than_days as i64) * 86_400;
        let mut report = GcReport {
            candidates: Vec::new(),
            removed: Vec::new(),
            freed_bytes: 0,
            needs_confirmation: false,
        };

        for hash_hex in self.list()? {
            let Some(summary) = self.scan(&hash_hex, now)? else {
                continue;
            };
            if summary.modified >= cutoff {
                continue;
            }
            report.candidates.push(hash_hex.clone());

            if dry_run {
                continue;
            }
            if !force {
                report.needs_confirmation = true;
                continue;
            }

            let hash_bytes = decode_hex_32(&hash_hex);
            self.remove(&hash_bytes)?;
            report.removed.push(hash_hex);
            report.freed_bytes += summary.size_bytes;
        }

        Ok(report)
    }
}

/// Scanner + directory-listing result for one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    pub summary: EnvironmentSummary,
    pub bin_entries: Vec<String>,
    pub stub_entries: Vec<String>,
}

/// Result of a garbage-collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcReport {
    pub candidates: Vec<String>,
    pub removed: Vec<String>,
    pub freed_bytes: u64,
    pub needs_confirmation: bool,
}

/// Sort by `modified`, descending.
pub fn sort_by_modified_desc(summaries: &mut [EnvironmentSummary]) {
    summaries.sort_by(|a, b| b.modified.cmp(&a.modified));
}

/// Sort by `size_bytes`, descending.
pub fn sort_by_size_desc(summaries: &mut [EnvironmentSummary]) {
    summaries.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
}

/// Sort by project name (falling back to the fingerprint hex), ascending.
pub fn sort_by_name_asc(summaries: &mut [EnvironmentSummary]) {
    summaries.sort_by(|a, b| {
        let a_key = a.project_name.as_deref().unwrap_or(&a.hash_hex);
        let b_key = b.project_name.as_deref().unwrap_or(&b.hash_hex);
        a_key.cmp(b_key)
    });
}

fn read_meta(dir: &Path) -> Option<EnvMeta> {
    let data = fs::read_to_string(dir.join(META_FILE)).ok()?;
    serde_json::from_str(&data).ok()
}

fn is_32_char_hex(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

fn decode_hex_32(hex_str: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (i, byte) in out.iter_mut().enumerate() {
        let slice = &hex_str[i * 2..i * 2 + 2];
        *byte = u8::from_str_radix(slice, 16).unwrap_or(0);
    }
    out
}

fn list_dir_entries(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn count_entries(dir: &Path) -> usize {
    fs::read_dir(dir).map(|rd| rd.count()).unwrap_or(0)
}

fn dir_size(dir: &Path) -> Result<u64> {
    let mut total = 0u64;
    if !dir.is_dir() {
        return Ok(0);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += dir_size(&entry.path())?;
        } else if file_type.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}
