//! Core library behind the `pantry` CLI: manifest loading, configuration,
//! registry access, and orchestration across the resolution, lockfile,
//! cache, environment, lifecycle, and trust subsystems.

pub mod config;
pub mod context;
pub mod manifest;
pub mod registry;

pub use config::PantryConfig;
pub use context::PantryContext;
pub use manifest::{load_manifest, strip_jsonc_comments, MANIFEST_FILE};
pub use registry::{GithubRegistryBackend, NpmRegistryBackend, PkgxRegistryBackend, RegistryBackend, RegistryManager, RegistryMetadata};
