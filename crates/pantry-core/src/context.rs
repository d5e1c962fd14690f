//! Ties manifest, configuration, cache, environment, and registry access
//! together behind a single entry point for one invocation.

use std::path::PathBuf;

use pantry_cache::Cache;
use pantry_catalog::CatalogManager;
use pantry_environment::EnvironmentManager;
use pantry_override::OverrideMap;
use pantry_resolver::ResolutionContext;
use pantry_types::{ConflictPolicy, Diagnostic, Manifest, Result};

use crate::config::PantryConfig;
use crate::manifest::load_manifest;
use crate::registry::RegistryManager;

/// Everything a single pantry command needs: resolved paths, configuration,
/// and the subsystem managers built from them.
pub struct PantryContext {
    pub config: PantryConfig,
    pub registries: RegistryManager,
    pub cache: Cache,
    pub environments: EnvironmentManager,
}

impl PantryContext {
    /// Builds a context from a resolved [`PantryConfig`], constructing the
    /// cache and environment managers from its directories.
    pub fn new(config: PantryConfig) -> PantryContext {
        let paths = pantry_hash::PantryPaths::resolve().ok();

        let data_dir = config
            .data_dir
            .clone()
            .or_else(|| paths.as_ref().map(|p| p.data_dir.clone()))
            .unwrap_or_else(|| PathBuf::from(".pantry/data"));
        let cache_dir = config
            .cache_dir
            .clone()
            .or_else(|| paths.as_ref().map(|p| p.cache_dir.clone()))
            .unwrap_or_else(|| PathBuf::from(".pantry/cache"));

        let cache = Cache::new(pantry_cache::CacheConfig {
            root: cache_dir,
            max_age_seconds: Some(config.cache_max_age_seconds.max(0) as u64),
            codec: config.cache_codec,
            enable_locking: true,
        });
        let environments = EnvironmentManager::new(data_dir.join("envs"));

        PantryContext {
            config,
            registries: RegistryManager::new(),
            cache,
            environments,
        }
    }

    /// Loads the workspace manifest from `path` and builds the catalog,
    /// override map, and a fresh [`ResolutionContext`] from it.
    pub fn load_workspace(
        &self,
        path: &std::path::Path,
        current_platform: impl Into<String>,
    ) -> Result<(Manifest, CatalogManager, OverrideMap, ResolutionContext, Vec<Diagnostic>)> {
        let manifest = load_manifest(path)?;
        let (catalog, mut diagnostics) = CatalogManager::from_manifest(&manifest);
        let (overrides, override_diagnostics) = OverrideMap::from_manifest(&manifest);
        diagnostics.extend(override_diagnostics);

        let policy = if manifest.overrides.is_empty() && manifest.resolutions.is_empty() {
            ConflictPolicy::HighestCompatible
        } else {
            ConflictPolicy::FirstWins
        };
        let resolution = ResolutionContext::new(policy, current_platform);

        Ok((manifest, catalog, overrides, resolution, diagnostics))
    }
}
