//! Workspace member discovery, filter/glob matching, and dependency graph
//! topological sort.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use pantry_types::WorkspaceMember;

/// Which part of a [`WorkspaceMember`] a filter atom matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomKind {
    /// Glob over the package name.
    Name,
    /// Prefix `./` or `/`; glob over the member's relative path.
    Path,
    /// Exactly `./`; matches only the workspace root member.
    Root,
}

/// A single parsed filter atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterAtom {
    pub kind: AtomKind,
    pub pattern: String,
    pub negated: bool,
}

impl FilterAtom {
    fn parse(raw: &str) -> Option<FilterAtom> {
        let (negated, body) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        if body.is_empty() {
            return None;
        }
        let kind = if body == "./" {
            AtomKind::Root
        } else if body.starts_with("./") || body.starts_with('/') {
            AtomKind::Path
        } else {
            AtomKind::Name
        };
        Some(FilterAtom {
            kind,
            pattern: body.to_string(),
            negated,
        })
    }

    fn matches(&self, member: &WorkspaceMember, is_root: bool) -> bool {
        match self.kind {
            AtomKind::Root => is_root,
            AtomKind::Name => glob_match(&self.pattern, &member.name),
            AtomKind::Path => {
                let rel = normalize_path(&member.path);
                glob_match(&normalize_path(&self.pattern), &rel)
            }
        }
    }
}

fn normalize_path(p: &str) -> String {
    let mut s = p.to_string();
    if !s.starts_with('/') && !s.starts_with("./") {
        s = format!("./{s}");
    }
    s
}

/// A parsed, comma-or-space separated list of filter atoms.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    atoms: Vec<FilterAtom>,
}

impl Filter {
    /// Parses a raw filter string into atoms. An empty atom (e.g. from `,,`)
    /// is silently dropped, matching nothing on its own.
    pub fn parse(raw: &str) -> Filter {
        let atoms = raw
            .split([',', ' '])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(FilterAtom::parse)
            .collect();
        Filter { atoms }
    }

    pub fn atoms(&self) -> &[FilterAtom] {
        &self.atoms
    }

    /// Empty pattern list matches all names and matches root.
    pub fn matches(&self, member: &WorkspaceMember, is_root: bool) -> bool {
        if self.atoms.is_empty() {
            return true;
        }
        let (positive, negative): (Vec<_>, Vec<_>) =
            self.atoms.iter().partition(|a| !a.negated);

        if negative.iter().any(|a| a.matches(member, is_root)) {
            return false;
        }
        if positive.is_empty() {
            // Only negations present: everything not excluded matches.
            return true;
        }
        positive.iter().any(|a| a.matches(member, is_root))
    }
}

/// Matches `text` against a glob `pattern` supporting `*` (greedy, any
/// substring) and `?` (single character). Trailing slash in the pattern must
/// match a trailing slash in the text.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_trailing_slash = pattern.ends_with('/');
    let text_trailing_slash = text.ends_with('/');
    if pattern_trailing_slash != text_trailing_slash {
        return false;
    }

    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_chars(&p, &t)
}

fn glob_match_chars(p: &[char], t: &[char]) -> bool {
    // Standard DP for glob matching with * and ?.
    let (plen, tlen) = (p.len(), t.len());
    let mut dp = vec![vec![false; tlen + 1]; plen + 1];
    dp[0][0] = true;
    for i in 1..=plen {
        if p[i - 1] == '*' {
            dp[i][0] = dp[i - 1][0];
        }
    }
    for i in 1..=plen {
        for j in 1..=tlen {
            dp[i][j] = match p[i - 1] {
                '*' => dp[i - 1][j] || dp[i][j - 1],
                '?' => dp[i - 1][j - 1],
                c => dp[i - 1][j - 1] && c == t[j - 1],
            };
        }
    }
    dp[plen][tlen]
}

/// A node in the dependency graph: a workspace member plus its dependency
/// edges, indexed by insertion order.
#[derive(Debug, Clone)]
struct Node {
    member: WorkspaceMember,
    /// Indices of in-workspace dependencies (edges point to dependencies).
    deps: Vec<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("dependency cycle detected among workspace members")]
    Cycle,
}

/// Directed graph over workspace members, keyed by insertion-ordered index
/// rather than owning references, so cycles can be represented safely.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    index_by_name: HashMap<String, usize>,
}

impl DependencyGraph {
    pub fn new() -> DependencyGraph {
        DependencyGraph::default()
    }

    /// Registers a workspace member as a node. Re-adding a member with the
    /// same name is a no-op (the original node and its edges are kept).
    pub fn add_package(&mut self, member: WorkspaceMember) -> usize {
        if let Some(&idx) = self.index_by_name.get(&member.name) {
            return idx;
        }
        let idx = self.nodes.len();
        self.index_by_name.insert(member.name.clone(), idx);
        self.nodes.push(Node {
            member,
            deps: Vec::new(),
        });
        idx
    }

    /// Derives an edge `from -> to` (meaning `from` depends on `to`) when
    /// both names are registered nodes and `dep_names` (the `dependencies`
    /// of `from`) names another in-workspace package. Unknown dependency
    /// names (external packages) are silently ignored.
    pub fn set_dependencies<I, S>(&mut self, from: &str, dep_names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(&from_idx) = self.index_by_name.get(from) else {
            return;
        };
        let mut deps = Vec::new();
        for name in dep_names {
            if let Some(&to_idx) = self.index_by_name.get(name.as_ref()) {
                if to_idx != from_idx {
                    deps.push(to_idx);
                }
            }
        }
        self.nodes[from_idx].deps = deps;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn member(&self, idx: usize) -> Option<&WorkspaceMember> {
        self.nodes.get(idx).map(|n| &n.member)
    }

    /// Yields a stable order where each package appears after all of its
    /// in-workspace dependencies. Ties (multiple packages simultaneously
    /// ready) are broken by insertion order. Total: returns `Err` rather
    /// than panicking when a cycle exists.
    pub fn topological_sort(&self) -> Result<Vec<usize>, GraphError> {
        let n = self.nodes.len();
        let mut indegree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (idx, node) in self.nodes.iter().enumerate() {
            indegree[idx] = node.deps.len();
            for &dep in &node.deps {
                dependents[dep].push(idx);
            }
        }

        // Ready set ordered by insertion index, so ties resolve to
        // insertion order.
        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut out = Vec::with_capacity(n);

        while let Some(&idx) = ready.iter().next() {
            ready.remove(&idx);
            out.push(idx);
            for &dependent in &dependents[idx] {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if out.len() != n {
            return Err(GraphError::Cycle);
        }
        Ok(out)
    }

    /// True iff a topological sort would fail. Never panics.
    pub fn has_circular_dependencies(&self) -> bool {
        self.topological_sort().is_err()
    }
}

/// Discovers workspace members under a root by scanning the `packages` glob
/// patterns declared in a manifest's `workspaces` section, matching any
/// subdirectory containing a manifest file named `pantry.json`.
pub fn discover_members(root: &std::path::Path, patterns: &[String]) -> std::io::Result<Vec<WorkspaceMember>> {
    let mut members = Vec::new();
    let patterns: Vec<String> = if patterns.is_empty() {
        vec!["packages/*".to_string()]
    } else {
        patterns.to_vec()
    };

    for pattern in &patterns {
        let (base, leaf_pattern) = split_glob_dir(pattern);
        let scan_dir = root.join(&base);
        if !scan_dir.is_dir() {
            continue;
        }
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&scan_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        entries.sort();

        for dir in entries {
            let leaf_name = dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            if !glob_match(&leaf_pattern, leaf_name) {
                continue;
            }
            let config_path = dir.join("pantry.json");
            if !config_path.is_file() {
                continue;
            }
            let name = read_member_name(&config_path).unwrap_or_else(|| leaf_name.to_string());
            let rel_path = dir
                .strip_prefix(root)
                .unwrap_or(&dir)
                .to_string_lossy()
                .to_string();
            members.push(WorkspaceMember {
                name,
                path: rel_path,
                abs_path: dir.clone(),
                config_path: Some(config_path),
                deps_file_path: None,
            });
        }
    }

    Ok(members)
}

fn split_glob_dir(pattern: &str) -> (String, String) {
    match pattern.rsplit_once('/') {
        Some((base, leaf)) => (base.to_string(), leaf.to_string()),
        None => (String::new(), pattern.to_string()),
    }
}

fn read_member_name(config_path: &std::path::Path) -> Option<String> {
    let text = std::fs::read_to_string(config_path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&text).ok()?;
    value.get("name")?.as_str().map(str::to_string)
}
