//! User/system configuration for a pantry invocation.

use std::path::{Path, PathBuf};

use pantry_types::{CacheCodec, PackageSource, PantryError, Result, SignaturePolicy};

use crate::manifest::strip_jsonc_comments;

/// Default config file name, consulted inside `config_dir`.
pub const CONFIG_FILE: &str = "pantry-config.json";

/// Typed, merged configuration handed to component constructors.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PantryConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub config_dir: Option<PathBuf>,
    #[serde(default = "default_registry_priority")]
    pub registry_priority: Vec<PackageSource>,
    #[serde(default)]
    pub default_signature_policy: SignaturePolicy,
    #[serde(default)]
    pub default_trusted_packages: Vec<String>,
    #[serde(default = "default_cache_max_age_seconds")]
    pub cache_max_age_seconds: i64,
    #[serde(default)]
    pub cache_codec: CacheCodec,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

fn default_registry_priority() -> Vec<PackageSource> {
    vec![PackageSource::Npm, PackageSource::Pkgx, PackageSource::Github]
}

fn default_cache_max_age_seconds() -> i64 {
    7 * 24 * 60 * 60
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

impl Default for PantryConfig {
    fn default() -> Self {
        PantryConfig {
            data_dir: None,
            cache_dir: None,
            config_dir: None,
            registry_priority: default_registry_priority(),
            default_signature_policy: SignaturePolicy::default(),
            default_trusted_packages: Vec::new(),
            cache_max_age_seconds: default_cache_max_age_seconds(),
            cache_codec: CacheCodec::default(),
            parallelism: default_parallelism(),
        }
    }
}

impl PantryConfig {
    pub fn new() -> PantryConfig {
        PantryConfig::default()
    }

    /// Loads a JSON/JSONC config file. Missing fields fall back to their
    /// defaults via `#[serde(default)]`.
    pub fn load_from_file(path: &Path) -> Result<PantryConfig> {
        let raw = std::fs::read_to_string(path)?;
        let stripped = strip_jsonc_comments(&raw);
        serde_json::from_str(&stripped).map_err(|e| PantryError::InvalidManifest(format!("{}: {e}", path.display())))
    }

    /// Merges this config with `other`, which takes precedence for any
    /// field it explicitly overrides (non-default value).
    pub fn merge(&self, other: &PantryConfig) -> PantryConfig {
        PantryConfig {
            data_dir: other.data_dir.clone().or_else(|| self.data_dir.clone()),
            cache_dir: other.cache_dir.clone().or_else(|| self.cache_dir.clone()),
            config_dir: other.config_dir.clone().or_else(|| self.config_dir.clone()),
            registry_priority: if other.registry_priority != default_registry_priority() {
                other.registry_priority.clone()
            } else {
                self.registry_priority.clone()
            },
            default_signature_policy: other.default_signature_policy.clone(),
            default_trusted_packages: if other.default_trusted_packages.is_empty() {
                self.default_trusted_packages.clone()
            } else {
                other.default_trusted_packages.clone()
            },
            cache_max_age_seconds: if other.cache_max_age_seconds != default_cache_max_age_seconds() {
                other.cache_max_age_seconds
            } else {
                self.cache_max_age_seconds
            },
            cache_codec: other.cache_codec,
            parallelism: if other.parallelism != default_parallelism() {
                other.parallelism
            } else {
                self.parallelism
            },
        }
    }
}
