//! Lockfile protocol (component E): durable record of a resolved
//! dependency graph, with atomic writes, round-trip reads, equality
//! modulo `generated_at`, and validation against an installed-package map.
//!
//! Writes follow the teacher's atomic-write idiom: serialize to a temp
//! file in the same directory, `sync_all`, then `rename` over the target,
//! so a crash mid-write never leaves a partial lockfile on disk (spec §5).

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use pantry_types::{Lockfile, PantryError, Result, CURRENT_LOCKFILE_VERSION};

/// Canonical lockfile filename.
pub const LOCKFILE_FILENAME: &str = ".freezer";

/// Write `lockfile` to `path` atomically: `packages` keys are already kept
/// sorted by `Lockfile`'s `BTreeMap`, so serialization alone gives the
/// canonical, sorted form the spec requires.
pub fn write(lockfile: &Lockfile, path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(lockfile)
        .map_err(|e| PantryError::LockfileParse(e.to_string()))?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let tmp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("lockfile")
    ));
    {
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(&json)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read and parse a previously written lockfile.
pub fn read(path: &Path) -> Result<Lockfile> {
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|e| PantryError::LockfileParse(e.to_string()))
}

/// Build a fresh lockfile with `generated_at` set to `now` (unix seconds).
pub fn new_lockfile(packages: BTreeMap<String, pantry_types::LockfileEntry>, now: i64) -> Lockfile {
    Lockfile {
        version: env!("CARGO_PKG_VERSION").to_string(),
        lockfile_version: CURRENT_LOCKFILE_VERSION,
        generated_at: now,
        packages,
    }
}

/// Two lockfiles are equal iff `version`, `lockfile_version`, and
/// `packages` agree entry-by-entry; `generated_at` is excluded.
pub fn lockfiles_equal(a: &Lockfile, b: &Lockfile) -> bool {
    a.version == b.version && a.lockfile_version == b.lockfile_version && a.packages == b.packages
}

/// Outcome of validating a lockfile against an installed-package map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub missing: Vec<String>,
    pub version_mismatch: Vec<(String, String, String)>,
}

/// Validate `lockfile` against `installed: pkg -> version`.
/// `valid <=> missing.is_empty() && version_mismatch.is_empty()`.
pub fn validate(lockfile: &Lockfile, installed: &BTreeMap<String, String>) -> ValidationResult {
    let mut result = ValidationResult::default();

    for entry in lockfile.packages.values() {
        match installed.get(&entry.name) {
            None => result.missing.push(entry.name.clone()),
            Some(actual) if actual != &entry.version => result.version_mismatch.push((
                entry.name.clone(),
                entry.version.clone(),
                actual.clone(),
            )),
            Some(_) => {}
        }
    }

    result.valid = result.missing.is_empty() && result.version_mismatch.is_empty();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_types::{LockfileEntry, PackageSource};
    use tempfile::tempdir;

    fn sample_lockfile(generated_at: i64) -> Lockfile {
        let mut packages = BTreeMap::new();
        packages.insert(
            "lodash@4.17.21".to_string(),
            LockfileEntry {
                name: "lodash".into(),
                version: "4.17.21".into(),
                source: PackageSource::Npm,
                url: Some("https://registry.npmjs.org/lodash/-/lodash-4.17.21.tgz".into()),
                resolved: None,
                integrity: Some("sha512-abc".into()),
                dependencies: None,
            },
        );
        new_lockfile(packages, generated_at)
    }

    #[test]
    fn invariant_lockfile_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOCKFILE_FILENAME);
        let original = sample_lockfile(1_700_000_000);
        write(&original, &path).unwrap();
        let read_back = read(&path).unwrap();
        assert!(lockfiles_equal(&original, &read_back));
    }

    #[test]
    fn lockfiles_equal_is_reflexive_symmetric_transitive() {
        let a = sample_lockfile(1);
        let b = sample_lockfile(2);
        let c = sample_lockfile(3);
        assert!(lockfiles_equal(&a, &a));
        assert_eq!(lockfiles_equal(&a, &b), lockfiles_equal(&b, &a));
        assert!(lockfiles_equal(&a, &b) && lockfiles_equal(&b, &c));
        assert!(lockfiles_equal(&a, &c));
    }

    #[test]
    fn write_never_leaves_a_temp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOCKFILE_FILENAME);
        write(&sample_lockfile(1), &path).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn s4_lockfile_validate() {
        let mut packages = BTreeMap::new();
        packages.insert(
            "lodash@4.17.21".to_string(),
            LockfileEntry {
                name: "lodash".into(),
                version: "4.17.21".into(),
                source: PackageSource::Npm,
                url: None,
                resolved: None,
                integrity: None,
                dependencies: None,
            },
        );
        packages.insert(
            "react@18.2.0".to_string(),
            LockfileEntry {
                name: "react".into(),
                version: "18.2.0".into(),
                source: PackageSource::Npm,
                url: None,
                resolved: None,
                integrity: None,
                dependencies: None,
            },
        );
        let lockfile = new_lockfile(packages, 1);

        let mut installed = BTreeMap::new();
        installed.insert("lodash".to_string(), "4.17.21".to_string());

        let result = validate(&lockfile, &installed);
        assert!(!result.valid);
        assert_eq!(result.missing, vec!["react".to_string()]);
        assert!(result.version_mismatch.is_empty());
    }

    #[test]
    fn invariant_validation_soundness() {
        let lockfile = sample_lockfile(1);
        let mut installed = BTreeMap::new();
        installed.insert("lodash".to_string(), "4.17.21".to_string());
        let result = validate(&lockfile, &installed);
        assert_eq!(
            result.valid,
            result.missing.is_empty() && result.version_mismatch.is_empty()
        );

        installed.insert("lodash".to_string(), "3.0.0".to_string());
        let result = validate(&lockfile, &installed);
        assert_eq!(
            result.valid,
            result.missing.is_empty() && result.version_mismatch.is_empty()
        );
    }
}
