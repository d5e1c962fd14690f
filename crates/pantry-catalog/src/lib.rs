//! Catalog model (component B): named version tables shared across a
//! workspace, the version-range grammar validator shared with overrides,
//! and the manifest-parsing precedence rules of spec §3/§4.B.
//!
//! # Example
//!
//! ```
//! use pantry_catalog::{CatalogManager, is_catalog_reference};
//! use pantry_types::Manifest;
//!
//! let manifest: Manifest = serde_json::from_str(r#"{
//!     "workspaces": { "catalog": { "react": "^19.0.0" } }
//! }"#).unwrap();
//!
//! let (mgr, diagnostics) = CatalogManager::from_manifest(&manifest);
//! assert!(diagnostics.is_empty());
//! assert_eq!(mgr.resolve_catalog_reference("react", "catalog:"), Some("^19.0.0".to_string()));
//! assert!(is_catalog_reference("catalog:testing"));
//! ```

use indexmap::IndexMap;
use pantry_types::{Diagnostic, Manifest};

/// The exact byte prefix that marks a version-range string as a catalog
/// reference.
pub const CATALOG_PREFIX: &str = "catalog:";

/// The reserved name of the default (unnamed) catalog.
pub const DEFAULT_CATALOG_NAME: &str = "";

/// `true` iff `s` begins with the exact 8-byte prefix `catalog:`.
pub fn is_catalog_reference(s: &str) -> bool {
    s.starts_with(CATALOG_PREFIX)
}

/// Return the whitespace-trimmed catalog name for a reference string, or
/// `None` if `s` is not a catalog reference at all. This keeps invariant 2
/// (`isCatalogReference(s) <=> getCatalogName(s) != null`) true by
/// construction: an empty/all-whitespace suffix still yields `Some("")`,
/// the default catalog's name.
pub fn get_catalog_name(s: &str) -> Option<String> {
    if !is_catalog_reference(s) {
        return None;
    }
    let rest = &s[CATALOG_PREFIX.len()..];
    Some(rest.trim_matches(is_ascii_ws).to_string())
}

fn is_ascii_ws(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Validate a version-range string against the grammar of spec §4.B: exact
/// `M.N.P`, a comparator-prefixed range, one of the bare keywords, a GitHub
/// URL form, or a `workspace:` protocol range. Empty strings are always
/// invalid.
pub fn is_valid_range(range: &str) -> bool {
    if range.is_empty() {
        return false;
    }
    if is_exact_version(range) {
        return true;
    }
    if let Some(rest) = strip_comparator_prefix(range) {
        return !rest.is_empty();
    }
    if matches!(range, "latest" | "next" | "*") {
        return true;
    }
    if range.starts_with("github:") && range.len() > "github:".len() {
        return true;
    }
    if range.starts_with("https://github.com/") && range.len() > "https://github.com/".len() {
        return true;
    }
    if range.starts_with("git+https://") && range.len() > "git+https://".len() {
        return true;
    }
    if let Some(rest) = range.strip_prefix("workspace:") {
        return matches!(rest, "*" | "^" | "~") || is_valid_range(rest);
    }
    false
}

fn is_exact_version(s: &str) -> bool {
    let parts: Vec<&str> = s.splitn(3, '.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Strip a leading comparator (`^`, `~`, `>=`, `<=`, `>`, `<`, `=`) from a
/// range string, longest-prefix first so `>=` is not mistaken for `>`.
fn strip_comparator_prefix(s: &str) -> Option<&str> {
    const OPERATORS: &[&str] = &[">=", "<=", "^", "~", ">", "<", "="];
    OPERATORS.iter().find_map(|op| s.strip_prefix(op))
}

/// A named version table: `(name, versions: package -> range)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub name: String,
    versions: IndexMap<String, String>,
}

impl Catalog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: IndexMap::new(),
        }
    }

    /// Insert or replace `pkg`'s range. Idempotent for the entry count;
    /// overwrites the stored value on repeat insertion.
    pub fn add_version(&mut self, pkg: impl Into<String>, range: impl Into<String>) {
        self.versions.insert(pkg.into(), range.into());
    }

    pub fn get_version(&self, pkg: &str) -> Option<&str> {
        self.versions.get(pkg).map(String::as_str)
    }

    pub fn has_package(&self, pkg: &str) -> bool {
        self.versions.contains_key(pkg)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Holds at most one default catalog plus zero or more named catalogs.
#[derive(Debug, Clone, Default)]
pub struct CatalogManager {
    default: Option<Catalog>,
    named: IndexMap<String, Catalog>,
}

impl CatalogManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default(&mut self, catalog: Catalog) {
        self.default = Some(catalog);
    }

    pub fn insert_named(&mut self, catalog: Catalog) {
        self.named.insert(catalog.name.clone(), catalog);
    }

    pub fn default_catalog(&self) -> Option<&Catalog> {
        self.default.as_ref()
    }

    pub fn named_catalog(&self, name: &str) -> Option<&Catalog> {
        self.named.get(name)
    }

    /// Resolve a `catalog:[name]` reference to a version range. Returns
    /// `None` if `ref_str` is not a catalog reference, or if the selected
    /// catalog or package is absent.
    pub fn resolve_catalog_reference(&self, pkg: &str, ref_str: &str) -> Option<String> {
        let name = get_catalog_name(ref_str)?;
        let catalog = if name.is_empty() {
            self.default.as_ref()?
        } else {
            self.named.get(&name)?
        };
        catalog.get_version(pkg).map(str::to_string)
    }

    /// Build a `CatalogManager` from a manifest, following the precedence
    /// rules of spec §3: `workspaces.catalog` wins over top-level `catalog`
    /// for the default catalog; named catalogs merge by name with
    /// `workspaces.catalogs` winning on collision. Invalid ranges are
    /// dropped with a diagnostic rather than failing the parse; catalogs
    /// that end up empty are not materialized.
    pub fn from_manifest(manifest: &Manifest) -> (Self, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let mut mgr = Self::new();

        let ws = manifest.workspaces.as_ref();
        let ws_catalog = ws.map(|w| &w.catalog);
        let default_source = match ws_catalog {
            Some(c) if !c.is_empty() => c,
            _ => &manifest.catalog,
        };
        if let Some(catalog) =
            build_catalog(DEFAULT_CATALOG_NAME, default_source, &mut diagnostics)
        {
            mgr.set_default(catalog);
        }

        let mut merged_named: IndexMap<String, &std::collections::BTreeMap<String, String>> =
            IndexMap::new();
        for (name, versions) in &manifest.catalogs {
            merged_named.insert(name.clone(), versions);
        }
        if let Some(w) = ws {
            for (name, versions) in &w.catalogs {
                merged_named.insert(name.clone(), versions);
            }
        }
        for (name, versions) in merged_named {
            if let Some(catalog) = build_catalog(&name, versions, &mut diagnostics) {
                mgr.insert_named(catalog);
            }
        }

        (mgr, diagnostics)
    }
}

fn build_catalog(
    name: &str,
    versions: &std::collections::BTreeMap<String, String>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Catalog> {
    let mut catalog = Catalog::new(name);
    for (pkg, range) in versions {
        if is_valid_range(range) {
            catalog.add_version(pkg.clone(), range.clone());
        } else {
            diagnostics.push(Diagnostic::new(format!(
                "dropping invalid version range {range:?} for package {pkg:?} in catalog {name:?}"
            )));
        }
    }
    if catalog.is_empty() {
        None
    } else {
        Some(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn manifest_from(json: &str) -> Manifest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn s1_default_catalog() {
        let m = manifest_from(
            r#"{"workspaces":{"catalog":{"react":"^19.0.0","react-dom":"^19.0.0"}}}"#,
        );
        let (mgr, diags) = CatalogManager::from_manifest(&m);
        assert!(diags.is_empty());
        assert_eq!(
            mgr.resolve_catalog_reference("react", "catalog:"),
            Some("^19.0.0".into())
        );
        assert_eq!(
            mgr.resolve_catalog_reference("react", "catalog: "),
            Some("^19.0.0".into())
        );
        assert_eq!(mgr.resolve_catalog_reference("missing", "catalog:"), None);
    }

    #[test]
    fn s2_named_catalog_case_sensitive() {
        let m = manifest_from(r#"{"workspaces":{"catalogs":{"testing":{"jest":"30.0.0"}}}}"#);
        let (mgr, _) = CatalogManager::from_manifest(&m);
        assert_eq!(
            mgr.resolve_catalog_reference("jest", "catalog:testing"),
            Some("30.0.0".into())
        );
        assert_eq!(mgr.resolve_catalog_reference("jest", "catalog:Testing"), None);
    }

    #[test]
    fn workspaces_catalog_wins_over_top_level() {
        let m = manifest_from(
            r#"{"catalog":{"react":"^18.0.0"},"workspaces":{"catalog":{"react":"^19.0.0"}}}"#,
        );
        let (mgr, _) = CatalogManager::from_manifest(&m);
        assert_eq!(
            mgr.resolve_catalog_reference("react", "catalog:"),
            Some("^19.0.0".into())
        );
    }

    #[test]
    fn named_catalogs_merge_workspaces_wins_on_collision() {
        let m = manifest_from(
            r#"{
                "catalogs": {"testing": {"jest": "29.0.0"}, "linting": {"eslint": "8.0.0"}},
                "workspaces": {"catalogs": {"testing": {"jest": "30.0.0"}}}
            }"#,
        );
        let (mgr, _) = CatalogManager::from_manifest(&m);
        assert_eq!(
            mgr.resolve_catalog_reference("jest", "catalog:testing"),
            Some("30.0.0".into())
        );
        assert_eq!(
            mgr.resolve_catalog_reference("eslint", "catalog:linting"),
            Some("8.0.0".into())
        );
    }

    #[test]
    fn invalid_ranges_are_dropped_with_diagnostics() {
        let mut versions = BTreeMap::new();
        versions.insert("broken".to_string(), "".to_string());
        versions.insert("ok".to_string(), "1.2.3".to_string());
        let mut diags = Vec::new();
        let catalog = build_catalog("", &versions, &mut diags).unwrap();
        assert_eq!(diags.len(), 1);
        assert!(!catalog.has_package("broken"));
        assert!(catalog.has_package("ok"));
    }

    #[test]
    fn all_invalid_catalog_is_not_materialized() {
        let mut versions = BTreeMap::new();
        versions.insert("broken".to_string(), "".to_string());
        let mut diags = Vec::new();
        assert!(build_catalog("empty", &versions, &mut diags).is_none());
    }

    #[test]
    fn invariant_catalog_symmetry() {
        let mut catalog = Catalog::new("");
        catalog.add_version("lodash", "^4.17.21");
        assert!(catalog.has_package("lodash") == catalog.get_version("lodash").is_some());
        assert!(catalog.has_package("missing") == catalog.get_version("missing").is_some());
    }

    #[test]
    fn invariant_reference_name_consistency() {
        for s in ["catalog:", "catalog:testing", "catalog:  ", "not-a-ref", ""] {
            assert_eq!(is_catalog_reference(s), get_catalog_name(s).is_some());
        }
    }

    #[test]
    fn invariant_catalog_idempotence() {
        let mut a = Catalog::new("");
        a.add_version("lodash", "^4.17.20");
        a.add_version("lodash", "^4.17.21");
        let mut b = Catalog::new("");
        b.add_version("lodash", "^4.17.21");
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn range_grammar_accepts_documented_forms() {
        for valid in [
            "1.2.3",
            "^1.2.3",
            "~1.2.3",
            ">1.2.3",
            "<1.2.3",
            ">=1.2.3",
            "<=1.2.3",
            "=1.2.3",
            "latest",
            "next",
            "*",
            "github:owner/repo",
            "github:owner/repo#branch",
            "https://github.com/owner/repo.git",
            "git+https://example.com/repo.git",
            "workspace:*",
            "workspace:^",
            "workspace:~",
            "workspace:^1.2.3",
        ] {
            assert!(is_valid_range(valid), "expected {valid:?} to be valid");
        }
        for invalid in ["", "banana", "1.2", "workspace:"] {
            assert!(!is_valid_range(invalid), "expected {invalid:?} to be invalid");
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn whitespace_is_canonicalized(name in "[a-zA-Z]{0,8}") {
                let padded = format!("catalog: {name} \t");
                let plain = format!("catalog:{name}");
                prop_assert_eq!(get_catalog_name(&padded), get_catalog_name(&plain));
            }

            #[test]
            fn exact_versions_always_valid(maj in 0u32..1000, min in 0u32..1000, patch in 0u32..1000) {
                let v = format!("{maj}.{min}.{patch}");
                prop_assert!(is_valid_range(&v));
            }
        }
    }
}
