//! Path/platform resolution, short/long key hashing, and string interning.
//!
//! This crate implements component A of the pantry core: the primitives every
//! other component builds on. Nothing here talks to a registry or parses a
//! manifest; it only answers "where do things live on disk" and "how do we
//! turn a key into a stable hash".
//!
//! # Example
//!
//! ```
//! use pantry_hash::hash_key_hex;
//!
//! let short = hash_key_hex("lodash");
//! assert_eq!(short.len(), 16); // FNV-1a, 8 bytes -> 16 hex chars
//!
//! let long = hash_key_hex(&"x".repeat(40));
//! assert_eq!(long.len(), 32); // MD5, 16 bytes -> 32 hex chars
//! ```

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use fnv::FnvHasher;
use md5::{Digest, Md5};
use std::hash::Hasher;

/// Keys shorter than this many bytes use FNV-1a; longer keys use MD5.
///
/// The split is purely about throughput on short keys, not security. See
/// the design notes: neither hash is a cryptographic choice, and integrity
/// / signing elsewhere in pantry always uses SHA-256 and Ed25519.
pub const HASH_SPLIT_THRESHOLD: usize = 32;

/// Hash `key`, picking FNV-1a for keys under [`HASH_SPLIT_THRESHOLD`] bytes
/// and MD5 otherwise, and return the raw bytes.
pub fn hash_key(key: &str) -> Vec<u8> {
    if key.len() < HASH_SPLIT_THRESHOLD {
        let mut hasher = FnvHasher::default();
        hasher.write(key.as_bytes());
        hasher.finish().to_be_bytes().to_vec()
    } else {
        let mut hasher = Md5::new();
        hasher.update(key.as_bytes());
        hasher.finalize().to_vec()
    }
}

/// Same as [`hash_key`], but returns lowercase hex.
pub fn hash_key_hex(key: &str) -> String {
    hex::encode(hash_key(key))
}

/// MD5 a path (or any string) and return the 16-byte digest, as used by the
/// environment manager's fingerprint (`env.hash := MD5(dep_file_path)`).
pub fn md5_bytes(data: &str) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data.as_bytes());
    hasher.finalize().into()
}

/// Render a fingerprint as the 32-lowercase-hex-character directory name
/// pantry uses under `{data_dir}/envs/`.
pub fn fingerprint_hex(bytes: &[u8; 16]) -> String {
    hex::encode(bytes)
}

/// Split a hex digest into a two-level shard path, e.g. `ab/cdef0123...`,
/// matching the on-disk cache layout `{cache_dir}/objects/{ab}/{cdef...}/`.
///
/// Panics if `hex_digest` is shorter than 2 characters; callers always pass
/// a real hash output so this never happens in practice.
pub fn two_level_shard(hex_digest: &str) -> (String, String) {
    assert!(hex_digest.len() >= 2, "digest too short to shard");
    let (head, tail) = hex_digest.split_at(2);
    (head.to_string(), tail.to_string())
}

/// Platform-appropriate PATH-list separator: `:` on macOS/Linux, `;` on
/// Windows.
pub fn path_list_separator() -> char {
    if cfg!(windows) { ';' } else { ':' }
}

/// Name of the platform's dynamic-linker search-path environment variable:
/// `DYLD_LIBRARY_PATH` on macOS, `LD_LIBRARY_PATH` on Linux, `PATH` on
/// Windows.
pub fn dynamic_linker_path_var() -> &'static str {
    if cfg!(target_os = "macos") {
        "DYLD_LIBRARY_PATH"
    } else if cfg!(windows) {
        "PATH"
    } else {
        "LD_LIBRARY_PATH"
    }
}

/// Resolved set of base directories pantry operates against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PantryPaths {
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub config_dir: PathBuf,
}

impl PantryPaths {
    /// Resolve base directories from the environment, honoring
    /// `XDG_CACHE_HOME` / `XDG_CONFIG_HOME` overrides and falling back to
    /// platform conventions (via `dirs`) otherwise. `HOME` (POSIX) and
    /// `USERPROFILE` (Windows) are consulted only as a last resort when the
    /// `dirs` crate cannot resolve a home directory at all.
    pub fn resolve() -> Result<Self, HomeNotFoundError> {
        let home = dirs::home_dir()
            .or_else(|| env::var_os("HOME").map(PathBuf::from))
            .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
            .ok_or(HomeNotFoundError)?;

        let cache_dir = env::var_os("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .or_else(dirs::cache_dir)
            .unwrap_or_else(|| home.join(".cache"))
            .join("pantry");

        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(dirs::config_dir)
            .unwrap_or_else(|| home.join(".config"))
            .join("pantry");

        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| home.join(".local").join("share"))
            .join("pantry");

        Ok(Self {
            data_dir,
            cache_dir,
            config_dir,
        })
    }

    pub fn envs_dir(&self) -> PathBuf {
        self.data_dir.join("envs")
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.cache_dir.join("objects")
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.cache_dir.join("meta")
    }
}

/// Raised when no home directory can be determined on this platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("could not determine a home directory")]
pub struct HomeNotFoundError;

/// A small append-only string interner. Hot lookups (catalog names, package
/// names inside large dependency graphs) hash once at insertion and compare
/// `u32` ids thereafter instead of repeatedly hashing/comparing strings.
#[derive(Debug, Default)]
pub struct StringInterner {
    arena: Vec<String>,
    ids: HashMap<String, u32>,
}

/// Opaque handle into a [`StringInterner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternedId(u32);

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `s`, returning the same id for repeated calls with an equal
    /// string.
    pub fn intern(&mut self, s: &str) -> InternedId {
        if let Some(&id) = self.ids.get(s) {
            return InternedId(id);
        }
        let id = self.arena.len() as u32;
        self.arena.push(s.to_string());
        self.ids.insert(s.to_string(), id);
        InternedId(id)
    }

    pub fn resolve(&self, id: InternedId) -> &str {
        &self.arena[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_keys_use_fnv_eight_bytes() {
        let h = hash_key("react");
        assert_eq!(h.len(), 8);
    }

    #[test]
    fn long_keys_use_md5_sixteen_bytes() {
        let key = "a".repeat(64);
        let h = hash_key(&key);
        assert_eq!(h.len(), 16);
    }

    #[test]
    fn threshold_boundary_is_exclusive_on_fnv_side() {
        let exactly_32 = "a".repeat(32);
        assert_eq!(hash_key(&exactly_32).len(), 16); // MD5, not FNV
        let just_under = "a".repeat(31);
        assert_eq!(hash_key(&just_under).len(), 8); // FNV
    }

    #[test]
    fn hash_key_hex_is_deterministic() {
        assert_eq!(hash_key_hex("lodash"), hash_key_hex("lodash"));
        assert_ne!(hash_key_hex("lodash"), hash_key_hex("react"));
    }

    #[test]
    fn fingerprint_hex_is_32_lowercase_chars() {
        let bytes = md5_bytes("/repo/package.json");
        let hex = fingerprint_hex(&bytes);
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn two_level_shard_splits_first_two_chars() {
        let (head, tail) = two_level_shard("ab12ef");
        assert_eq!(head, "ab");
        assert_eq!(tail, "12ef");
    }

    #[test]
    fn interner_returns_stable_ids_for_equal_strings() {
        let mut interner = StringInterner::new();
        let a = interner.intern("lodash");
        let b = interner.intern("react");
        let a2 = interner.intern("lodash");
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(interner.resolve(a), "lodash");
        assert_eq!(interner.resolve(b), "react");
    }

    #[cfg(unix)]
    #[test]
    fn dynamic_linker_var_is_platform_specific() {
        let var = dynamic_linker_path_var();
        assert!(var == "DYLD_LIBRARY_PATH" || var == "LD_LIBRARY_PATH");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn hash_key_hex_length_matches_threshold(s in ".{0,80}") {
                let hex = hash_key_hex(&s);
                if s.len() < HASH_SPLIT_THRESHOLD {
                    prop_assert_eq!(hex.len(), 16);
                } else {
                    prop_assert_eq!(hex.len(), 32);
                }
            }

            #[test]
            fn interner_roundtrips_any_string(s in "\\PC{0,40}") {
                let mut interner = StringInterner::new();
                let id = interner.intern(&s);
                prop_assert_eq!(interner.resolve(id), s.as_str());
            }
        }
    }
}
