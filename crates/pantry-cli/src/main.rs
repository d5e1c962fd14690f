//! `pantry`: resolve, install, and manage JS/TS dependency workspaces.
//!
//! This binary is a thin wrapper over `pantry-core` and the component
//! crates it ties together: parsing happens here, all logic lives in the
//! library crates, and this file's only job is argument handling and
//! rendering results to a terminal.

mod reporter;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use pantry_core::{PantryConfig, PantryContext};
use pantry_types::{PackageSource, PolicyLevel, SignaturePolicy};

use reporter::{CliReporter, Reporter};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("PANTRY_GIT_SHA"),
    ", ",
    env!("PANTRY_BUILD_PROFILE"),
    ", ",
    env!("PANTRY_RUSTC_VERSION"),
    ")",
);

#[derive(Parser, Debug)]
#[command(name = "pantry", version, long_version = LONG_VERSION)]
struct Cli {
    /// Path to the workspace manifest.
    #[arg(long, default_value = "pantry.json", global = true)]
    manifest_path: PathBuf,

    /// Override the data directory (defaults to the platform data dir).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the cache directory (defaults to the platform cache dir).
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Platform identifier used for optional-dependency gating and
    /// dynamic-linker path selection (e.g. `linux-x64`, `darwin-arm64`).
    #[arg(long, default_value = "linux-x64", global = true)]
    platform: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve dependency ranges and report conflicts, peer, and
    /// optional-dependency outcomes without touching the lockfile.
    Resolve,
    /// Lockfile operations.
    Lockfile {
        #[command(subcommand)]
        command: LockfileCommand,
    },
    /// Package cache operations.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// Installed-environment operations.
    Env {
        #[command(subcommand)]
        command: EnvCommand,
    },
    /// Workspace member filtering and dependency-graph inspection.
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommand,
    },
    /// Lifecycle script execution.
    Lifecycle {
        /// Script name, e.g. `postinstall`.
        script: String,
        /// Package the script belongs to (for trust-gating).
        #[arg(long)]
        package: String,
        /// Skip lifecycle scripts entirely.
        #[arg(long)]
        ignore_scripts: bool,
    },
    /// Signature and provenance operations.
    Trust {
        #[command(subcommand)]
        command: TrustCommand,
    },
}

#[derive(Subcommand, Debug)]
enum LockfileCommand {
    /// Resolve the workspace and write the lockfile to disk.
    Write {
        #[arg(long, default_value = ".freezer")]
        path: PathBuf,
    },
    /// Validate an existing lockfile against the manifest's dependencies.
    Validate {
        #[arg(long, default_value = ".freezer")]
        path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Print cache hit/miss/size statistics.
    Stats,
    /// Remove every object from the cache.
    Clean,
}

#[derive(Subcommand, Debug)]
enum EnvCommand {
    /// List installed environments.
    List,
    /// Scan and print a summary for one environment.
    Show { hash_hex: String },
    /// Remove an environment by its hex hash.
    Remove { hash_hex: String },
    /// Remove environments older than the given age.
    Clean {
        #[arg(long, default_value_t = 30)]
        older_than_days: u64,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum WorkspaceCommand {
    /// List members, optionally filtered.
    List {
        #[arg(long)]
        filter: Option<String>,
    },
    /// Print the dependency-installation order.
    Graph,
}

#[derive(Subcommand, Debug)]
enum TrustCommand {
    /// Verify a cached signature against the policy in effect.
    Verify {
        package: String,
        #[arg(long, default_value_t = false)]
        has_signature: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let reporter = CliReporter;

    if let Err(err) = run(&cli, &reporter) {
        reporter.error(&format!("{err:#}"));
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: &Cli, reporter: &dyn Reporter) -> Result<()> {
    let mut config = PantryConfig::default();
    config.data_dir = cli.data_dir.clone();
    config.cache_dir = cli.cache_dir.clone();
    let context = PantryContext::new(config);

    match &cli.command {
        Commands::Resolve => cmd_resolve(&cli.manifest_path, &cli.platform, &context, reporter),
        Commands::Lockfile { command } => match command {
            LockfileCommand::Write { path } => {
                cmd_lockfile_write(&cli.manifest_path, &cli.platform, path, &context, reporter)
            }
            LockfileCommand::Validate { path } => cmd_lockfile_validate(path, &context, reporter),
        },
        Commands::Cache { command } => match command {
            CacheCommand::Stats => cmd_cache_stats(&context, reporter),
            CacheCommand::Clean => cmd_cache_clean(&context, reporter),
        },
        Commands::Env { command } => match command {
            EnvCommand::List => cmd_env_list(&context, reporter),
            EnvCommand::Show { hash_hex } => cmd_env_show(&context, hash_hex, reporter),
            EnvCommand::Remove { hash_hex } => cmd_env_remove(&context, hash_hex, reporter),
            EnvCommand::Clean { older_than_days, force } => {
                cmd_env_clean(&context, *older_than_days, *force, reporter)
            }
        },
        Commands::Workspace { command } => match command {
            WorkspaceCommand::List { filter } => cmd_workspace_list(&cli.manifest_path, filter.as_deref(), reporter),
            WorkspaceCommand::Graph => cmd_workspace_graph(&cli.manifest_path, reporter),
        },
        Commands::Lifecycle { script, package, ignore_scripts } => {
            cmd_lifecycle(&cli.manifest_path, script, package, *ignore_scripts, reporter)
        }
        Commands::Trust { command } => match command {
            TrustCommand::Verify { package, has_signature } => cmd_trust_verify(package, *has_signature, reporter),
        },
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn cmd_resolve(manifest_path: &std::path::Path, platform: &str, context: &PantryContext, reporter: &dyn Reporter) -> Result<()> {
    let (manifest, _catalog, overrides, mut resolution, diagnostics) = context
        .load_workspace(manifest_path, platform.to_string())
        .with_context(|| format!("loading workspace manifest at {}", manifest_path.display()))?;

    let root_name = manifest.name.clone().unwrap_or_else(|| "root".to_string());
    for (name, range) in &manifest.dependencies {
        let effective = overrides.apply_override(name, range);
        resolution.conflict_resolver.record_requirement(name.clone(), root_name.clone(), effective.to_string());
    }

    for diag in &diagnostics {
        reporter.warn(&diag.message);
    }

    let (outcome, peers, optional) = resolution.resolve_all().context("resolving dependency ranges")?;
    if !outcome.conflicts.is_empty() {
        reporter.warn(&outcome.conflict_report());
    }
    for name in &outcome.chosen {
        reporter.info(&format!("{} -> {}", name.0, name.1));
    }
    if !peers.satisfied {
        reporter.warn(&format!("{} missing peer dependencies", peers.missing.len()));
    }
    reporter.info(&format!(
        "{} optional dependencies installed, {} skipped, {} failed",
        optional.installed, optional.skipped, optional.failed
    ));
    Ok(())
}

fn cmd_lockfile_write(
    manifest_path: &std::path::Path,
    platform: &str,
    lockfile_path: &std::path::Path,
    context: &PantryContext,
    reporter: &dyn Reporter,
) -> Result<()> {
    let (manifest, _catalog, overrides, mut resolution, _diagnostics) =
        context.load_workspace(manifest_path, platform.to_string())?;
    let root_name = manifest.name.clone().unwrap_or_else(|| "root".to_string());
    for (name, range) in &manifest.dependencies {
        let effective = overrides.apply_override(name, range);
        resolution.conflict_resolver.record_requirement(name.clone(), root_name.clone(), effective.to_string());
    }
    let (outcome, _peers, _optional) = resolution.resolve_all()?;

    let mut packages = std::collections::BTreeMap::new();
    for (name, range) in &outcome.chosen {
        packages.insert(
            format!("{name}@{range}"),
            pantry_types::LockfileEntry {
                name: name.clone(),
                version: range.clone(),
                source: PackageSource::Npm,
                url: None,
                resolved: None,
                integrity: None,
                dependencies: None,
            },
        );
    }
    let lockfile = pantry_lockfile::new_lockfile(packages, now_unix());
    pantry_lockfile::write(&lockfile, lockfile_path).with_context(|| format!("writing lockfile to {}", lockfile_path.display()))?;
    reporter.info(&format!("wrote {} package entries to {}", lockfile.packages.len(), lockfile_path.display()));
    Ok(())
}

fn cmd_lockfile_validate(lockfile_path: &std::path::Path, _context: &PantryContext, reporter: &dyn Reporter) -> Result<()> {
    let lockfile = pantry_lockfile::read(lockfile_path).with_context(|| format!("reading lockfile at {}", lockfile_path.display()))?;
    let installed: std::collections::BTreeMap<String, String> = lockfile
        .packages
        .values()
        .map(|entry| (entry.name.clone(), entry.version.clone()))
        .collect();
    let result = pantry_lockfile::validate(&lockfile, &installed);
    if result.valid {
        reporter.info("lockfile is consistent with the recorded installation");
    } else {
        for missing in &result.missing {
            reporter.warn(&format!("missing from installation: {missing}"));
        }
        for (name, expected, actual) in &result.version_mismatch {
            reporter.warn(&format!("{name}: lockfile has {expected}, installed has {actual}"));
        }
    }
    Ok(())
}

fn cmd_cache_stats(context: &PantryContext, reporter: &dyn Reporter) -> Result<()> {
    let stats = context.cache.statistics();
    reporter.info(&format!(
        "{} packages, {} bytes total, {} hits, {} misses",
        stats.total_packages, stats.total_size, stats.hits, stats.misses
    ));
    Ok(())
}

fn cmd_cache_clean(context: &PantryContext, reporter: &dyn Reporter) -> Result<()> {
    context.cache.clean().context("cleaning cache")?;
    reporter.info("cache cleared");
    Ok(())
}

fn cmd_env_list(context: &PantryContext, reporter: &dyn Reporter) -> Result<()> {
    let envs = context.environments.list().context("listing environments")?;
    for hash_hex in envs {
        reporter.info(&hash_hex);
    }
    Ok(())
}

fn cmd_env_show(context: &PantryContext, hash_hex: &str, reporter: &dyn Reporter) -> Result<()> {
    match context.environments.scan(hash_hex, now_unix())? {
        Some(summary) => reporter.info(&format!(
            "{} packages, {} binaries, {} bytes, modified {}",
            summary.packages, summary.binaries, summary.size_bytes, summary.modified
        )),
        None => reporter.warn(&format!("no environment found for {hash_hex}")),
    }
    Ok(())
}

fn cmd_env_remove(context: &PantryContext, hash_hex: &str, reporter: &dyn Reporter) -> Result<()> {
    let hash = decode_hash(hash_hex)?;
    context.environments.remove(&hash).context("removing environment")?;
    reporter.info(&format!("removed environment {hash_hex}"));
    Ok(())
}

fn cmd_env_clean(context: &PantryContext, older_than_days: u64, force: bool, reporter: &dyn Reporter) -> Result<()> {
    let report = context
        .environments
        .clean(older_than_days, false, force, now_unix())
        .context("cleaning environments")?;
    for hash_hex in &report.removed {
        reporter.info(&format!("removed {hash_hex}"));
    }
    if report.needs_confirmation {
        reporter.warn(&format!(
            "{} environments are eligible but were not removed; re-run with --force",
            report.candidates.len()
        ));
    }
    reporter.info(&format!("freed {} bytes", report.freed_bytes));
    Ok(())
}

fn cmd_workspace_list(manifest_path: &std::path::Path, filter: Option<&str>, reporter: &dyn Reporter) -> Result<()> {
    let root = manifest_path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let manifest = pantry_core::load_manifest(manifest_path)?;
    let patterns = manifest
        .workspaces
        .as_ref()
        .map(|w| w.packages.clone())
        .unwrap_or_default();
    let members = pantry_workspace::discover_members(root, &patterns).context("discovering workspace members")?;
    let filter = pantry_workspace::Filter::parse(filter.unwrap_or(""));
    for member in &members {
        if filter.matches(member, false) {
            reporter.info(&format!("{} ({})", member.name, member.path));
        }
    }
    Ok(())
}

fn cmd_workspace_graph(manifest_path: &std::path::Path, reporter: &dyn Reporter) -> Result<()> {
    let root = manifest_path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let manifest = pantry_core::load_manifest(manifest_path)?;
    let patterns = manifest
        .workspaces
        .as_ref()
        .map(|w| w.packages.clone())
        .unwrap_or_default();
    let members = pantry_workspace::discover_members(root, &patterns).context("discovering workspace members")?;

    let mut graph = pantry_workspace::DependencyGraph::new();
    let mut member_deps = Vec::new();
    for member in members {
        let deps = member
            .config_path
            .as_deref()
            .and_then(|p| pantry_core::load_manifest(p).ok())
            .map(|m| m.dependencies.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        member_deps.push((member.name.clone(), deps));
        graph.add_package(member);
    }
    for (name, deps) in &member_deps {
        graph.set_dependencies(name, deps.iter().cloned());
    }
    let order = graph.topological_sort().context("sorting workspace dependency graph")?;
    for idx in order {
        if let Some(member) = graph.member(idx) {
            reporter.info(&member.name);
        }
    }
    Ok(())
}

fn cmd_lifecycle(
    manifest_path: &std::path::Path,
    script: &str,
    package: &str,
    ignore_scripts: bool,
    reporter: &dyn Reporter,
) -> Result<()> {
    let manifest = pantry_core::load_manifest(manifest_path)?;
    let trust = pantry_lifecycle::TrustRegistry::new(manifest.trusted_dependencies.clone());
    let runner = pantry_lifecycle::LifecycleRunner::new(ignore_scripts, trust);

    let Some(command) = manifest.scripts.get(script) else {
        anyhow::bail!("no script named {script} in manifest");
    };
    let (result, diagnostic) = runner
        .run_script(package, script, command, std::path::Path::new("."))
        .context("running lifecycle script")?;
    if let Some(diag) = diagnostic {
        reporter.warn(&diag.message);
    }
    if result.skipped {
        reporter.warn(&format!("{script} skipped for {package}"));
    } else if result.success {
        reporter.info(&format!("{script} succeeded for {package}"));
    } else {
        reporter.warn(&format!("{script} exited {} for {package}", result.exit_code));
    }
    if let Some(stdout) = result.stdout.filter(|s| !s.is_empty()) {
        reporter.info(&stdout);
    }
    Ok(())
}

fn cmd_trust_verify(package: &str, has_signature: bool, reporter: &dyn Reporter) -> Result<()> {
    let policy = SignaturePolicy {
        level: PolicyLevel::Warn,
        required_for: Vec::new(),
        exempt: Vec::new(),
        trusted_keys: Vec::new(),
    };
    let body = package.as_bytes();
    let signature = if has_signature {
        let seed = [7u8; 32];
        Some(pantry_trust::sign(body, &seed, "local", now_unix()))
    } else {
        None
    };
    let keyring = pantry_trust::Keyring::new();
    let result = pantry_trust::enforce_policy(&policy, package, signature.as_ref(), body, &keyring);
    if result.allowed {
        reporter.info(&format!("{package} is allowed under the configured policy"));
    } else {
        reporter.warn(&format!("{package} was rejected: {:?}", result.violations));
    }
    Ok(())
}

fn decode_hash(hash_hex: &str) -> Result<[u8; 16]> {
    let bytes = hex::decode(hash_hex).context("hash is not valid hex")?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("hash must decode to exactly 16 bytes, got {}", hash_hex.len() / 2))
}
