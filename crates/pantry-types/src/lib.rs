//! Shared data model for pantry: manifest shape, requirement records,
//! lockfile/cache/environment/workspace/trust structs, and the stable error
//! taxonomy every component returns.
//!
//! Nothing in this crate does I/O or algorithmic work; it only defines the
//! types that flow between `pantry-catalog`, `pantry-resolver`,
//! `pantry-lockfile`, `pantry-cache`, `pantry-environment`,
//! `pantry-workspace`, `pantry-lifecycle`, and `pantry-trust`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Stable error taxonomy (design doc §7). Every fallible public operation
/// in a pantry component returns `Result<T, PantryError>`.
#[derive(Debug, thiserror::Error)]
pub enum PantryError {
    // --- Input errors ---
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("unparseable version range {range:?} for package {package:?}")]
    UnparseableRange { package: String, range: String },
    #[error("unknown lifecycle script: {0}")]
    UnknownLifecycle(String),

    // --- Resolution errors ---
    #[error("conflict unresolved for {package}: {details}")]
    ConflictUnresolved { package: String, details: String },
    #[error("unsatisfied peer dependency {peer} required by {required_by}")]
    UnsatisfiedPeer { peer: String, required_by: String },
    #[error("circular dependency detected: {0}")]
    CircularDependency(String),

    // --- Storage errors ---
    #[error("cache entry corrupted for {name}@{version}")]
    CacheCorrupted { name: String, version: String },
    #[error("checksum mismatch for {name}@{version}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        version: String,
        expected: String,
        actual: String,
    },
    #[error("failed to parse lockfile: {0}")]
    LockfileParse(String),
    #[error("lockfile is stale relative to the manifest")]
    LockfileStale,

    // --- Environment errors ---
    #[error("environment not found: {0}")]
    EnvironmentNotFound(String),
    #[error("could not determine a home directory")]
    HomeNotFound,

    // --- Trust errors ---
    #[error("signature verification failed for {0}")]
    SignatureVerificationFailed(String),
    #[error("untrusted key id: {0}")]
    UntrustedKey(String),
    #[error("policy violation: {0}")]
    PolicyViolation(String),
    #[error("token expired at {exp}, now is {now}")]
    TokenExpired { exp: i64, now: i64 },
    #[error("untrusted publisher for package {0}")]
    UntrustedPublisher(String),

    // --- I/O errors ---
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("path too long: {0}")]
    PathTooLong(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PantryError {
    /// Stable machine-readable kind, matching the variant name, for
    /// CLI/diagnostic rendering that wants a kind separate from the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidManifest(_) => "InvalidManifest",
            Self::UnparseableRange { .. } => "UnparseableRange",
            Self::UnknownLifecycle(_) => "UnknownLifecycle",
            Self::ConflictUnresolved { .. } => "ConflictUnresolved",
            Self::UnsatisfiedPeer { .. } => "UnsatisfiedPeer",
            Self::CircularDependency(_) => "CircularDependency",
            Self::CacheCorrupted { .. } => "CacheCorrupted",
            Self::ChecksumMismatch { .. } => "ChecksumMismatch",
            Self::LockfileParse(_) => "LockfileParse",
            Self::LockfileStale => "LockfileStale",
            Self::EnvironmentNotFound(_) => "EnvironmentNotFound",
            Self::HomeNotFound => "HomeNotFound",
            Self::SignatureVerificationFailed(_) => "SignatureVerificationFailed",
            Self::UntrustedKey(_) => "UntrustedKey",
            Self::PolicyViolation(_) => "PolicyViolation",
            Self::TokenExpired { .. } => "TokenExpired",
            Self::UntrustedPublisher(_) => "UntrustedPublisher",
            Self::NetworkUnavailable(_) => "NetworkUnavailable",
            Self::PermissionDenied(_) => "PermissionDenied",
            Self::PathTooLong(_) => "PathTooLong",
            Self::Io(_) => "Io",
            Self::Other(_) => "Other",
        }
    }
}

pub type Result<T> = std::result::Result<T, PantryError>;

/// A soft diagnostic emitted alongside a successfully-parsed value (catalog
/// parsing never hard-fails; offending entries are dropped with one of
/// these instead).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    pub path: Option<PathBuf>,
    pub line: Option<u32>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            line: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

// ---------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------

/// The workspace manifest, parsed from JSON/JSONC. Fields mirror spec.md §3
/// exactly; unrecognized fields are ignored by serde's default behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "peerDependencies")]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "optionalDependencies")]
    pub optional_dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "trustedDependencies")]
    pub trusted_dependencies: Vec<String>,
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
    #[serde(default)]
    pub resolutions: BTreeMap<String, String>,
    #[serde(default)]
    pub catalog: BTreeMap<String, String>,
    #[serde(default)]
    pub catalogs: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub workspaces: Option<WorkspacesSection>,
}

/// The `workspaces` object, which may carry its own `catalog`/`catalogs`
/// and the list of member package globs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspacesSection {
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub catalog: BTreeMap<String, String>,
    #[serde(default)]
    pub catalogs: BTreeMap<String, BTreeMap<String, String>>,
}

/// The lifecycle scripts pantry recognizes and will auto-execute when the
/// owning package is trusted. See `pantry-lifecycle`.
pub const LIFECYCLE_SCRIPT_NAMES: &[&str] = &[
    "preinstall",
    "postinstall",
    "preuninstall",
    "postuninstall",
    "prepublishOnly",
];

// ---------------------------------------------------------------------
// Requirement / resolution records (component D)
// ---------------------------------------------------------------------

/// One dependent's requirement on a package's version range, gathered
/// while walking the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub package: String,
    pub dependent: String,
    pub range: String,
}

/// Conflict-resolution policy (spec.md §3/§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    HighestCompatible,
    FirstWins,
    LastWins,
    Strict,
}

/// A declared peer-dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRequirement {
    pub peer_name: String,
    pub range: String,
    pub required_by: String,
    pub optional: bool,
}

/// A declared optional dependency, possibly gated to specific platforms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalDependency {
    pub name: String,
    pub version: String,
    pub platform_specific: bool,
    #[serde(default)]
    pub platforms: Option<Vec<String>>,
}

/// Outcome of attempting to install one optional dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OptionalOutcome {
    Installed,
    Failed { reason: String },
    Skipped { reason: String },
}

// ---------------------------------------------------------------------
// Lockfile (component E)
// ---------------------------------------------------------------------

/// Where a resolved package came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageSource {
    Local,
    Pkgx,
    Github,
    Npm,
}

/// One resolved package, as recorded in the lockfile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockfileEntry {
    pub name: String,
    pub version: String,
    pub source: PackageSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeMap<String, String>>,
}

/// The durable, canonical record of a resolved dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lockfile {
    pub version: String,
    pub lockfile_version: u32,
    pub generated_at: i64,
    /// Keyed by `"{name}@{version}"`. A `BTreeMap` keeps serialization
    /// lexicographically sorted automatically, matching §4.E's write
    /// contract.
    pub packages: BTreeMap<String, LockfileEntry>,
}

pub const CURRENT_LOCKFILE_VERSION: u32 = 1;

// ---------------------------------------------------------------------
// Cache (component F)
// ---------------------------------------------------------------------

/// Compression codec for a cache entry's stored body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCodec {
    #[default]
    None,
    Gzip,
}

/// On-disk metadata for one cache entry, keyed by `(name, version)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub name: String,
    pub version: String,
    pub url: String,
    pub sha256: String,
    pub body_len: u64,
    pub inserted_at: i64,
    #[serde(default)]
    pub compressed: CacheCodec,
}

/// Aggregate cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub total_packages: u64,
    pub total_size: u64,
    pub avg_package_size: u64,
    pub hits: u64,
    pub misses: u64,
}

// ---------------------------------------------------------------------
// Environment (component G)
// ---------------------------------------------------------------------

/// A materialized, per-project isolated environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// 16-byte MD5 fingerprint of the dependency file's path.
    pub hash: [u8; 16],
    pub dep_file: PathBuf,
    pub path: PathBuf,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub packages: Vec<String>,
}

/// Scanner record for one on-disk environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSummary {
    pub hash_hex: String,
    pub project_name: Option<String>,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub packages: usize,
    pub binaries: usize,
    pub created: i64,
    pub modified: i64,
}

// ---------------------------------------------------------------------
// Workspace (component H)
// ---------------------------------------------------------------------

/// One discovered workspace member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceMember {
    pub name: String,
    pub path: String,
    pub abs_path: PathBuf,
    #[serde(default)]
    pub config_path: Option<PathBuf>,
    #[serde(default)]
    pub deps_file_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------
// Trust layer (component J)
// ---------------------------------------------------------------------

/// An Ed25519 signature over a package body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub algorithm: String,
    pub key_id: String,
    pub signature_b64: String,
    pub signed_at: i64,
}

impl Signature {
    pub const ALGORITHM: &'static str = "ed25519";
}

/// Decoded (not verified) OIDC JWT claims.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OidcClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub repository_owner: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub workflow_ref: Option<String>,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub runner_environment: Option<String>,
    /// GitLab CI analogues, kept alongside the GitHub-shaped fields above
    /// rather than as a separate enum, since both are optional and a given
    /// token only ever populates one family.
    #[serde(default)]
    pub ci_project_path: Option<String>,
    #[serde(default)]
    pub ci_job_id: Option<String>,
    #[serde(default)]
    pub ci_pipeline_ref: Option<String>,
}

/// A (owner, repository, workflow) triple a registry accepts as allowed to
/// sign for a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedPublisher {
    #[serde(rename = "type")]
    pub publisher_type: String,
    pub owner: String,
    pub repository: String,
    pub workflow: String,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub allowed_refs: Option<Vec<String>>,
}

/// Enforcement level for the signature policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyLevel {
    Off,
    #[default]
    Warn,
    Strict,
}

/// A declarative signature-verification policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePolicy {
    #[serde(default)]
    pub level: PolicyLevel,
    #[serde(default)]
    pub required_for: Vec<String>,
    #[serde(default)]
    pub exempt: Vec<String>,
    #[serde(default)]
    pub trusted_keys: Vec<String>,
}

/// Result of running the policy engine against one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResult {
    pub allowed: bool,
    pub violations: Vec<String>,
}

/// An in-toto provenance statement bound to a package digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceStatement {
    #[serde(rename = "_type")]
    pub statement_type: String,
    pub subject: Vec<ProvenanceSubject>,
    #[serde(rename = "predicateType")]
    pub predicate_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceSubject {
    pub name: String,
    pub digest: ProvenanceDigest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceDigest {
    pub sha256: String,
}

pub const SLSA_PREDICATE_TYPE: &str = "https://slsa.dev/provenance/v0.2";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_defaults_to_empty_sections() {
        let m: Manifest = serde_json::from_str("{}").unwrap();
        assert!(m.dependencies.is_empty());
        assert!(m.catalogs.is_empty());
        assert!(m.workspaces.is_none());
    }

    #[test]
    fn manifest_roundtrips_through_json() {
        let json = r#"{
            "dependencies": {"react": "^19.0.0"},
            "overrides": {"lodash": "4.17.21"},
            "catalog": {"typescript": "5.0.0"},
            "workspaces": {"packages": ["packages/*"], "catalog": {"react": "^18.0.0"}}
        }"#;
        let m: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(m.dependencies["react"], "^19.0.0");
        assert_eq!(m.overrides["lodash"], "4.17.21");
        assert_eq!(m.catalog["typescript"], "5.0.0");
        let ws = m.workspaces.unwrap();
        assert_eq!(ws.packages, vec!["packages/*"]);
        assert_eq!(ws.catalog["react"], "^18.0.0");
    }

    #[test]
    fn error_kind_is_stable_name() {
        let err = PantryError::LockfileStale;
        assert_eq!(err.kind(), "LockfileStale");
    }

    #[test]
    fn lockfile_entries_serialize_without_none_fields() {
        let entry = LockfileEntry {
            name: "react".into(),
            version: "19.0.0".into(),
            source: PackageSource::Npm,
            url: None,
            resolved: None,
            integrity: Some("sha512-abc".into()),
            dependencies: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("\"url\""));
        assert!(json.contains("sha512-abc"));
    }
}
