//! Resolution engine (component D): conflict reconciliation, peer-dependency
//! validation, optional-dependency gating, and the `VersionChecker` semver
//! comparator.
//!
//! # Example
//!
//! ```
//! use pantry_resolver::{ConflictResolver};
//! use pantry_types::ConflictPolicy;
//!
//! let mut resolver = ConflictResolver::new(ConflictPolicy::HighestCompatible);
//! resolver.record_requirement("lodash", "A", "^4.17.20");
//! resolver.record_requirement("lodash", "B", "^4.17.21");
//! resolver.record_requirement("lodash", "C", "^4.17.19");
//! let outcome = resolver.resolve_all().unwrap();
//! assert_eq!(outcome.chosen.get("lodash").map(String::as_str), Some("^4.17.21"));
//! ```

use indexmap::IndexMap;
use pantry_types::{ConflictPolicy, OptionalDependency, OptionalOutcome, PantryError, PeerRequirement, Requirement, Result};

// ---------------------------------------------------------------------
// VersionChecker
// ---------------------------------------------------------------------

/// `true` iff `range` is one of the protocols that are satisfied by any
/// version: bare keywords, `workspace:` ranges, or a GitHub/git source URL
/// (these pin a source, not a semver range, so version comparison does not
/// apply).
fn is_always_satisfied(range: &str) -> bool {
    matches!(range, "latest" | "next" | "*")
        || range.starts_with("workspace:")
        || range.starts_with("github:")
        || range.starts_with("https://github.com/")
        || range.starts_with("git+https://")
}

/// `VersionChecker.satisfies`: does `version` satisfy `range`?
///
/// Implemented as a full semver comparator via the `semver` crate rather
/// than the source's minimal caret handling (spec.md §9 explicitly permits
/// this upgrade; see `DESIGN.md`). Returns `None` if `version` or `range`
/// cannot be parsed as semver at all.
pub fn satisfies(version: &str, range: &str) -> Option<bool> {
    if is_always_satisfied(range) {
        return Some(true);
    }
    let v = semver::Version::parse(version).ok()?;
    let req = semver::VersionReq::parse(range).ok()?;
    Some(req.matches(&v))
}

/// Extract a representative "base version" from a range for the purposes
/// of `highest_compatible` ranking: the first comparator's
/// `(major, minor, patch)` triple, missing segments defaulting to zero.
/// Returns `None` for ranges with no concrete comparator (`latest`, `*`,
/// `workspace:*`, unparseable strings) so they never outrank a concrete
/// range under `highest_compatible`.
fn base_version(range: &str) -> Option<semver::Version> {
    let req = semver::VersionReq::parse(range).ok()?;
    let cmp = req.comparators.first()?;
    Some(semver::Version::new(
        cmp.major,
        cmp.minor.unwrap_or(0),
        cmp.patch.unwrap_or(0),
    ))
}

// ---------------------------------------------------------------------
// ConflictResolver
// ---------------------------------------------------------------------

/// Result of `ConflictResolver::resolve_all`.
#[derive(Debug, Clone, Default)]
pub struct ResolutionOutcome {
    /// Final chosen range per package.
    pub chosen: IndexMap<String, String>,
    /// Packages with more than one distinct recorded range, each paired
    /// with every `(dependent, range)` that contributed to the conflict.
    /// Populated regardless of policy, for diagnostic rendering.
    pub conflicts: IndexMap<String, Vec<(String, String)>>,
}

impl ResolutionOutcome {
    /// Human-readable conflict report, stable-sorted by package name.
    pub fn conflict_report(&self) -> String {
        let mut names: Vec<&String> = self.conflicts.keys().collect();
        names.sort();
        let mut out = String::new();
        for name in names {
            let pairs = &self.conflicts[name];
            out.push_str(&format!("{name}:\n"));
            for (dependent, range) in pairs {
                out.push_str(&format!("  {dependent} requires {range}\n"));
            }
        }
        out
    }
}

/// Accumulates requirements from many dependents and reconciles them per
/// an 4-way policy (spec §3/§4.D).
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    policy: ConflictPolicy,
    requirements: Vec<Requirement>,
}

impl ConflictResolver {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            requirements: Vec::new(),
        }
    }

    pub fn record_requirement(
        &mut self,
        package: impl Into<String>,
        dependent: impl Into<String>,
        range: impl Into<String>,
    ) {
        self.requirements.push(Requirement {
            package: package.into(),
            dependent: dependent.into(),
            range: range.into(),
        });
    }

    fn grouped(&self) -> IndexMap<&str, Vec<&Requirement>> {
        let mut groups: IndexMap<&str, Vec<&Requirement>> = IndexMap::new();
        for req in &self.requirements {
            groups.entry(&req.package).or_default().push(req);
        }
        groups
    }

    /// Reconcile all recorded requirements. Under `strict`, a package with
    /// more than one distinct range is left out of `chosen` and, if any
    /// such package exists, the call returns
    /// `Err(PantryError::ConflictUnresolved)` (carrying the full report);
    /// packages with a single agreed-upon range still resolve normally
    /// even under `strict`.
    ///
    /// Each requirement's range is validated against the catalog/override
    /// range grammar before reconciliation begins; the first invalid range,
    /// in insertion order, is returned as `Err(PantryError::UnparseableRange)`
    /// (spec §4.D).
    pub fn resolve_all(&self) -> Result<ResolutionOutcome> {
        for req in &self.requirements {
            if !pantry_catalog::is_valid_range(&req.range) {
                return Err(PantryError::UnparseableRange {
                    package: req.package.clone(),
                    range: req.range.clone(),
                });
            }
        }

        let mut outcome = ResolutionOutcome::default();

        for (package, reqs) in self.grouped() {
            let distinct: std::collections::HashSet<&str> =
                reqs.iter().map(|r| r.range.as_str()).collect();

            if distinct.len() > 1 {
                outcome.conflicts.insert(
                    package.to_string(),
                    reqs.iter()
                        .map(|r| (r.dependent.clone(), r.range.clone()))
                        .collect(),
                );
            }

            let chosen_range = match self.policy {
                ConflictPolicy::Strict => {
                    (distinct.len() == 1).then(|| reqs[0].range.clone())
                }
                ConflictPolicy::FirstWins => reqs.first().map(|r| r.range.clone()),
                ConflictPolicy::LastWins => reqs.last().map(|r| r.range.clone()),
                ConflictPolicy::HighestCompatible => pick_highest_compatible(&reqs),
            };

            if let Some(range) = chosen_range {
                outcome.chosen.insert(package.to_string(), range);
            }
        }

        if matches!(self.policy, ConflictPolicy::Strict) && !outcome.conflicts.is_empty() {
            return Err(PantryError::ConflictUnresolved {
                package: outcome
                    .conflicts
                    .keys()
                    .min()
                    .cloned()
                    .unwrap_or_default(),
                details: outcome.conflict_report(),
            });
        }

        Ok(outcome)
    }
}

fn pick_highest_compatible(reqs: &[&Requirement]) -> Option<String> {
    let mut best: Option<(&Requirement, Option<semver::Version>)> = None;
    for req in reqs {
        let v = base_version(&req.range);
        let better = match &best {
            None => true,
            Some((_, best_v)) => v > *best_v,
        };
        if better {
            best = Some((req, v));
        }
    }
    best.map(|(req, _)| req.range.clone())
}

// ---------------------------------------------------------------------
// PeerDependencyManager
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerValidation {
    pub satisfied: bool,
    pub missing: Vec<String>,
    pub incompatible: Vec<(String, String, String)>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PeerDependencyManager {
    installed: IndexMap<String, String>,
    peers: Vec<PeerRequirement>,
}

impl PeerDependencyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_installed(&mut self, name: impl Into<String>, version: impl Into<String>) {
        self.installed.insert(name.into(), version.into());
    }

    pub fn record_peer(&mut self, peer: PeerRequirement) {
        self.peers.push(peer);
    }

    /// Validate all recorded peer requirements against installed versions.
    /// A missing *optional* peer downgrades to a warning rather than a
    /// hard miss (spec §4.D).
    pub fn validate(&self) -> PeerValidation {
        let mut result = PeerValidation {
            satisfied: true,
            ..Default::default()
        };

        for peer in &self.peers {
            match self.installed.get(&peer.peer_name) {
                Some(installed_version) => {
                    match satisfies(installed_version, &peer.range) {
                        Some(true) => {}
                        _ => {
                            result.incompatible.push((
                                peer.peer_name.clone(),
                                peer.range.clone(),
                                installed_version.clone(),
                            ));
                            if !peer.optional {
                                result.satisfied = false;
                            }
                        }
                    }
                }
                None => {
                    if peer.optional {
                        result.warnings.push(format!(
                            "optional peer {} (required by {}) is not installed",
                            peer.peer_name, peer.required_by
                        ));
                    } else {
                        result.missing.push(peer.peer_name.clone());
                        result.satisfied = false;
                    }
                }
            }
        }

        result
    }
}

// ---------------------------------------------------------------------
// OptionalDependencyManager
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionalSummary {
    pub installed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct OptionalDependencyManager {
    current_platform: String,
    outcomes: IndexMap<String, OptionalOutcome>,
}

impl OptionalDependencyManager {
    pub fn new(current_platform: impl Into<String>) -> Self {
        Self {
            current_platform: current_platform.into(),
            outcomes: IndexMap::new(),
        }
    }

    /// `true` iff `dep` is not platform-specific, or the current platform
    /// is in its allowed set.
    pub fn should_install(&self, dep: &OptionalDependency) -> bool {
        if !dep.platform_specific {
            return true;
        }
        dep.platforms
            .as_ref()
            .is_some_and(|platforms| platforms.iter().any(|p| p == &self.current_platform))
    }

    pub fn record_outcome(&mut self, name: impl Into<String>, outcome: OptionalOutcome) {
        self.outcomes.insert(name.into(), outcome);
    }

    pub fn summary(&self) -> OptionalSummary {
        let mut summary = OptionalSummary::default();
        for outcome in self.outcomes.values() {
            match outcome {
                OptionalOutcome::Installed => summary.installed += 1,
                OptionalOutcome::Failed { .. } => summary.failed += 1,
                OptionalOutcome::Skipped { .. } => summary.skipped += 1,
            }
        }
        summary
    }
}

// ---------------------------------------------------------------------
// ResolutionContext
// ---------------------------------------------------------------------

/// Ties the three managers plus an optional lockfile for one resolve/
/// install operation.
pub struct ResolutionContext {
    pub conflict_resolver: ConflictResolver,
    pub peer_manager: PeerDependencyManager,
    pub optional_manager: OptionalDependencyManager,
    pub lockfile: Option<pantry_types::Lockfile>,
}

impl ResolutionContext {
    pub fn new(policy: ConflictPolicy, current_platform: impl Into<String>) -> Self {
        Self {
            conflict_resolver: ConflictResolver::new(policy),
            peer_manager: PeerDependencyManager::new(),
            optional_manager: OptionalDependencyManager::new(current_platform),
            lockfile: None,
        }
    }

    pub fn resolve_all(&self) -> Result<(ResolutionOutcome, PeerValidation, OptionalSummary)> {
        let conflict_resolutions = self.conflict_resolver.resolve_all()?;
        let peer_validation = self.peer_manager.validate();
        let optional_summary = self.optional_manager.summary();
        Ok((conflict_resolutions, peer_validation, optional_summary))
    }
}
