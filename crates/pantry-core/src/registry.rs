//! Registry backends: a capability interface implemented per upstream
//! (npm, pkgx, GitHub releases, local), composed behind a priority-ordered,
//! failover-capable manager.

use std::time::Duration;

use pantry_retry::{RetryExecutor, RetryPolicy, RetryStrategyConfig};
use pantry_types::{PackageSource, PantryError, Result};
use serde::Deserialize;

/// Default request timeout for registry HTTP calls.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User agent sent with every registry HTTP request.
pub const USER_AGENT: &str = concat!("pantry/", env!("CARGO_PKG_VERSION"));

/// Metadata describing a package as reported by a registry backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryMetadata {
    pub name: String,
    pub latest_version: String,
    pub versions: Vec<String>,
}

/// A single capability a registry adapter exposes: resolve metadata,
/// fetch a tarball body, search by query, or list known versions.
pub trait RegistryBackend: Send + Sync {
    fn source(&self) -> PackageSource;
    fn fetch_metadata(&self, name: &str) -> Result<RegistryMetadata>;
    fn download_tarball(&self, name: &str, version: &str) -> Result<Vec<u8>>;
    fn search(&self, query: &str) -> Result<Vec<String>>;
    fn list_versions(&self, name: &str) -> Result<Vec<String>>;
}

fn http_client(timeout: Duration) -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::blocking::Client::new())
}

/// npm-registry-compatible backend (registry.npmjs.org or a mirror).
#[derive(Debug, Clone)]
pub struct NpmRegistryBackend {
    base_url: String,
    client: reqwest::blocking::Client,
    retry: RetryStrategyConfig,
}

#[derive(Debug, Deserialize)]
struct NpmPackageDoc {
    name: String,
    #[serde(rename = "dist-tags")]
    dist_tags: NpmDistTags,
    versions: std::collections::BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct NpmDistTags {
    latest: String,
}

impl NpmRegistryBackend {
    pub fn new(base_url: impl Into<String>) -> NpmRegistryBackend {
        NpmRegistryBackend {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            retry: RetryPolicy::Default.to_config(),
        }
    }

    pub fn public() -> NpmRegistryBackend {
        NpmRegistryBackend::new("https://registry.npmjs.org")
    }
}

impl RegistryBackend for NpmRegistryBackend {
    fn source(&self) -> PackageSource {
        PackageSource::Npm
    }

    fn fetch_metadata(&self, name: &str) -> Result<RegistryMetadata> {
        let url = format!("{}/{}", self.base_url, name);
        let doc: NpmPackageDoc = RetryExecutor::new(self.retry.clone()).run(|_attempt| {
            let response = self
                .client
                .get(&url)
                .send()
                .map_err(|e| PantryError::NetworkUnavailable(e.to_string()))?;

            if response.status().as_u16() == 404 {
                return Err(PantryError::NetworkUnavailable(format!("{name} not found on npm registry")));
            }
            response.json().map_err(|e| PantryError::NetworkUnavailable(e.to_string()))
        })?;

        Ok(RegistryMetadata {
            name: doc.name,
            latest_version: doc.dist_tags.latest,
            versions: doc.versions.into_keys().collect(),
        })
    }

    fn download_tarball(&self, name: &str, version: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}/-/{}-{}.tgz", self.base_url, name, name, version);
        RetryExecutor::new(self.retry.clone()).run(|_attempt| {
            let response = self
                .client
                .get(&url)
                .send()
                .map_err(|e| PantryError::NetworkUnavailable(e.to_string()))?;
            if !response.status().is_success() {
                return Err(PantryError::NetworkUnavailable(format!(
                    "unexpected status {} fetching {name}@{version}",
                    response.status()
                )));
            }
            response
                .bytes()
                .map(|b| b.to_vec())
                .map_err(|e| PantryError::NetworkUnavailable(e.to_string()))
        })
    }

    fn search(&self, query: &str) -> Result<Vec<String>> {
        let url = format!("{}/-/v1/search?text={query}", self.base_url);
        let value: serde_json::Value = RetryExecutor::new(self.retry.clone()).run(|_attempt| {
            let response = self
                .client
                .get(&url)
                .send()
                .map_err(|e| PantryError::NetworkUnavailable(e.to_string()))?;
            response.json().map_err(|e| PantryError::NetworkUnavailable(e.to_string()))
        })?;
        Ok(value["objects"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|o| o["package"]["name"].as_str().map(str::to_string))
            .collect())
    }

    fn list_versions(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.fetch_metadata(name)?.versions)
    }
}

/// Backend for GitHub Releases used as a package source.
#[derive(Debug, Clone)]
pub struct GithubRegistryBackend {
    client: reqwest::blocking::Client,
    retry: RetryStrategyConfig,
}

impl GithubRegistryBackend {
    pub fn new() -> GithubRegistryBackend {
        GithubRegistryBackend {
            client: http_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            retry: RetryPolicy::Default.to_config(),
        }
    }

    fn releases_url(owner_repo: &str) -> String {
        format!("https://api.github.com/repos/{owner_repo}/releases")
    }
}

impl Default for GithubRegistryBackend {
    fn default() -> Self {
        GithubRegistryBackend::new()
    }
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
}

impl RegistryBackend for GithubRegistryBackend {
    fn source(&self) -> PackageSource {
        PackageSource::Github
    }

    fn fetch_metadata(&self, name: &str) -> Result<RegistryMetadata> {
        let versions = self.list_versions(name)?;
        let latest_version = versions.first().cloned().unwrap_or_default();
        Ok(RegistryMetadata {
            name: name.to_string(),
            latest_version,
            versions,
        })
    }

    fn download_tarball(&self, name: &str, version: &str) -> Result<Vec<u8>> {
        let url = format!("https://github.com/{name}/archive/refs/tags/{version}.tar.gz");
        RetryExecutor::new(self.retry.clone()).run(|_attempt| {
            let response = self
                .client
                .get(&url)
                .send()
                .map_err(|e| PantryError::NetworkUnavailable(e.to_string()))?;
            if !response.status().is_success() {
                return Err(PantryError::NetworkUnavailable(format!(
                    "unexpected status {} fetching {name}@{version}",
                    response.status()
                )));
            }
            response
                .bytes()
                .map(|b| b.to_vec())
                .map_err(|e| PantryError::NetworkUnavailable(e.to_string()))
        })
    }

    fn search(&self, _query: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn list_versions(&self, name: &str) -> Result<Vec<String>> {
        RetryExecutor::new(self.retry.clone()).run(|_attempt| {
            let response = self
                .client
                .get(Self::releases_url(name))
                .send()
                .map_err(|e| PantryError::NetworkUnavailable(e.to_string()))?;
            let releases: Vec<GithubRelease> = response
                .json()
                .map_err(|e| PantryError::NetworkUnavailable(e.to_string()))?;
            Ok(releases.iter().map(|r| r.tag_name.clone()).collect())
        })
    }
}

/// Backend for pkgx-style package manifests.
#[derive(Debug, Clone)]
pub struct PkgxRegistryBackend {
    base_url: String,
    client: reqwest::blocking::Client,
    retry: RetryStrategyConfig,
}

impl PkgxRegistryBackend {
    pub fn new(base_url: impl Into<String>) -> PkgxRegistryBackend {
        PkgxRegistryBackend {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            retry: RetryPolicy::Default.to_config(),
        }
    }
}

impl RegistryBackend for PkgxRegistryBackend {
    fn source(&self) -> PackageSource {
        PackageSource::Pkgx
    }

    fn fetch_metadata(&self, name: &str) -> Result<RegistryMetadata> {
        let url = format!("{}/{}/metadata.json", self.base_url, name);
        let value: serde_json::Value = RetryExecutor::new(self.retry.clone()).run(|_attempt| {
            let response = self
                .client
                .get(&url)
                .send()
                .map_err(|e| PantryError::NetworkUnavailable(e.to_string()))?;
            response.json().map_err(|e| PantryError::NetworkUnavailable(e.to_string()))
        })?;
        let versions: Vec<String> = value["versions"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        let latest_version = versions.first().cloned().unwrap_or_default();
        Ok(RegistryMetadata {
            name: name.to_string(),
            latest_version,
            versions,
        })
    }

    fn download_tarball(&self, name: &str, version: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}/{}.tar.gz", self.base_url, name, version);
        RetryExecutor::new(self.retry.clone()).run(|_attempt| {
            let response = self
                .client
                .get(&url)
                .send()
                .map_err(|e| PantryError::NetworkUnavailable(e.to_string()))?;
            response
                .bytes()
                .map(|b| b.to_vec())
                .map_err(|e| PantryError::NetworkUnavailable(e.to_string()))
        })
    }

    fn search(&self, _query: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn list_versions(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.fetch_metadata(name)?.versions)
    }
}

/// A backend entry inside a [`RegistryManager`]: a backend plus whether it
/// currently participates in lookups.
struct BackendEntry {
    backend: Box<dyn RegistryBackend>,
    enabled: bool,
}

/// Priority-ordered collection of registry backends with enable/disable and
/// failover-on-error semantics.
pub struct RegistryManager {
    entries: Vec<BackendEntry>,
}

impl RegistryManager {
    pub fn new() -> RegistryManager {
        RegistryManager { entries: Vec::new() }
    }

    /// Adds a backend at the end of the current priority order.
    pub fn add_backend(&mut self, backend: Box<dyn RegistryBackend>) {
        self.entries.push(BackendEntry { backend, enabled: true });
    }

    pub fn enable(&mut self, source: PackageSource) {
        for entry in &mut self.entries {
            if entry.backend.source() == source {
                entry.enabled = true;
            }
        }
    }

    pub fn disable(&mut self, source: PackageSource) {
        for entry in &mut self.entries {
            if entry.backend.source() == source {
                entry.enabled = false;
            }
        }
    }

    fn enabled_backends(&self) -> impl Iterator<Item = &dyn RegistryBackend> {
        self.entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.backend.as_ref())
    }

    /// Tries each enabled backend in priority order, returning the first
    /// success. If all fail, returns the last error encountered.
    pub fn fetch_metadata(&self, name: &str) -> Result<RegistryMetadata> {
        let mut last_err = None;
        for backend in self.enabled_backends() {
            match backend.fetch_metadata(name) {
                Ok(meta) => return Ok(meta),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| PantryError::NetworkUnavailable(format!("no registry backend available for {name}"))))
    }

    pub fn download_tarball(&self, name: &str, version: &str) -> Result<Vec<u8>> {
        let mut last_err = None;
        for backend in self.enabled_backends() {
            match backend.download_tarball(name, version) {
                Ok(bytes) => return Ok(bytes),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err
            .unwrap_or_else(|| PantryError::NetworkUnavailable(format!("no registry backend available for {name}@{version}"))))
    }

    pub fn list_versions(&self, name: &str) -> Result<Vec<String>> {
        let mut last_err = None;
        for backend in self.enabled_backends() {
            match backend.list_versions(name) {
                Ok(versions) => return Ok(versions),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| PantryError::NetworkUnavailable(format!("no registry backend available for {name}"))))
    }

    pub fn search(&self, query: &str) -> Result<Vec<String>> {
        let mut all = Vec::new();
        for backend in self.enabled_backends() {
            if let Ok(mut results) = backend.search(query) {
                all.append(&mut results);
            }
        }
        Ok(all)
    }
}

impl Default for RegistryManager {
    fn default() -> Self {
        RegistryManager::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubBackend {
        source: PackageSource,
        fail: bool,
    }

    impl RegistryBackend for StubBackend {
        fn source(&self) -> PackageSource {
            self.source
        }

        fn fetch_metadata(&self, name: &str) -> Result<RegistryMetadata> {
            if self.fail {
                return Err(PantryError::NetworkUnavailable("stub failure".to_string()));
            }
            Ok(RegistryMetadata {
                name: name.to_string(),
                latest_version: "1.0.0".to_string(),
                versions: vec!["1.0.0".to_string()],
            })
        }

        fn download_tarball(&self, _name: &str, _version: &str) -> Result<Vec<u8>> {
            Ok(vec![1, 2, 3])
        }

        fn search(&self, _query: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn list_versions(&self, _name: &str) -> Result<Vec<String>> {
            Ok(vec!["1.0.0".to_string()])
        }
    }

    #[test]
    fn manager_fails_over_to_next_backend() {
        let mut manager = RegistryManager::new();
        manager.add_backend(Box::new(StubBackend {
            source: PackageSource::Npm,
            fail: true,
        }));
        manager.add_backend(Box::new(StubBackend {
            source: PackageSource::Github,
            fail: false,
        }));

        let meta = manager.fetch_metadata("widgets").unwrap();
        assert_eq!(meta.latest_version, "1.0.0");
    }

    #[test]
    fn disabling_a_backend_excludes_it() {
        let mut manager = RegistryManager::new();
        manager.add_backend(Box::new(StubBackend {
            source: PackageSource::Npm,
            fail: false,
        }));
        manager.disable(PackageSource::Npm);

        let err = manager.fetch_metadata("widgets").unwrap_err();
        assert!(matches!(err, PantryError::NetworkUnavailable(_)));
    }

    #[test]
    fn all_backends_failing_surfaces_last_error() {
        let mut manager = RegistryManager::new();
        manager.add_backend(Box::new(StubBackend {
            source: PackageSource::Npm,
            fail: true,
        }));
        let err = manager.fetch_metadata("widgets").unwrap_err();
        assert!(matches!(err, PantryError::NetworkUnavailable(_)));
    }

    #[test]
    fn re_enabling_restores_participation() {
        let mut manager = RegistryManager::new();
        manager.add_backend(Box::new(StubBackend {
            source: PackageSource::Npm,
            fail: false,
        }));
        manager.disable(PackageSource::Npm);
        manager.enable(PackageSource::Npm);
        assert!(manager.fetch_metadata("widgets").is_ok());
    }
}
