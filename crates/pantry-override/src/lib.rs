//! Top-level override map (component C): pins that rewrite transitive
//! versions, produced from a manifest's `overrides` and `resolutions`
//! fields (spec §3/§4.C). Shares the version-range grammar with
//! `pantry-catalog`; overrides are applied after catalog resolution and
//! before conflict reconciliation (§4.C).

use indexmap::IndexMap;
use pantry_catalog::is_valid_range;
use pantry_types::{Diagnostic, Manifest};

/// `package -> replacement version-range`.
#[derive(Debug, Clone, Default)]
pub struct OverrideMap {
    overrides: IndexMap<String, String>,
}

impl OverrideMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_override(&self, pkg: &str) -> bool {
        self.overrides.contains_key(pkg)
    }

    pub fn get(&self, pkg: &str) -> Option<&str> {
        self.overrides.get(pkg).map(String::as_str)
    }

    pub fn insert(&mut self, pkg: impl Into<String>, range: impl Into<String>) {
        self.overrides.insert(pkg.into(), range.into());
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    /// `applyOverride`: if `pkg` has an override, return the mapped range;
    /// otherwise return `original` unchanged.
    pub fn apply_override<'a>(&'a self, pkg: &str, original: &'a str) -> &'a str {
        self.get(pkg).unwrap_or(original)
    }

    /// Build an `OverrideMap` from a manifest's `overrides` and
    /// `resolutions` sections (`resolutions` is an alias for `overrides`).
    /// On a name collision between the two sections within one manifest,
    /// `overrides` is applied first and `resolutions` is layered on top,
    /// an order-preserving merge as required by spec §3; invalid ranges
    /// are dropped with a diagnostic rather than failing the parse.
    pub fn from_manifest(manifest: &Manifest) -> (Self, Vec<Diagnostic>) {
        let mut map = Self::new();
        let mut diagnostics = Vec::new();
        for (pkg, range) in manifest.overrides.iter().chain(manifest.resolutions.iter()) {
            if is_valid_range(range) {
                map.insert(pkg.clone(), range.clone());
            } else {
                diagnostics.push(Diagnostic::new(format!(
                    "dropping invalid override range {range:?} for package {pkg:?}"
                )));
            }
        }
        (map, diagnostics)
    }
}
