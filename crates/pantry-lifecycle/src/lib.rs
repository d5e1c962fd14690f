//! Trust-gated execution of package lifecycle scripts.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use pantry_types::{Diagnostic, LIFECYCLE_SCRIPT_NAMES, Result};

/// Packages considered trustworthy even without an explicit
/// `trustedDependencies` entry, because their install scripts are widely
/// relied upon for native-addon builds.
pub const DEFAULT_TRUSTED_PACKAGES: &[&str] = &[
    "node-sass",
    "esbuild",
    "sharp",
    "puppeteer",
    "husky",
    "core-js",
    "fsevents",
    "cypress",
    "playwright",
    "bcrypt",
];

/// True iff `name` is one of the five lifecycle scripts pantry executes
/// automatically.
pub fn is_lifecycle_script(name: &str) -> bool {
    LIFECYCLE_SCRIPT_NAMES.contains(&name)
}

/// Splits a package's raw `scripts` map into the lifecycle subset pantry
/// runs automatically and the informational remainder (e.g. `test`) that is
/// only surfaced to callers, never auto-executed.
pub fn split_scripts(scripts: &HashMap<String, String>) -> (Vec<(String, String)>, Vec<(String, String)>) {
    let mut lifecycle = Vec::new();
    let mut informational = Vec::new();
    for (name, command) in scripts {
        if is_lifecycle_script(name) {
            lifecycle.push((name.clone(), command.clone()));
        } else {
            informational.push((name.clone(), command.clone()));
        }
    }
    lifecycle.sort_by(|a, b| a.0.cmp(&b.0));
    informational.sort_by(|a, b| a.0.cmp(&b.0));
    (lifecycle, informational)
}

/// Resolves whether a package's scripts are permitted to run.
#[derive(Debug, Clone)]
pub struct TrustRegistry {
    trusted: Vec<String>,
}

impl TrustRegistry {
    /// `trusted_dependencies` is the root manifest's `trustedDependencies`
    /// list; it is unioned with [`DEFAULT_TRUSTED_PACKAGES`].
    pub fn new(trusted_dependencies: Vec<String>) -> TrustRegistry {
        TrustRegistry {
            trusted: trusted_dependencies,
        }
    }

    pub fn is_trusted(&self, package_name: &str) -> bool {
        self.trusted.iter().any(|n| n == package_name)
            || DEFAULT_TRUSTED_PACKAGES.contains(&package_name)
    }
}

/// Outcome of attempting to run a single lifecycle script.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    /// True when the script was never spawned (ignore_scripts or untrust).
    pub skipped: bool,
}

impl ExecutionResult {
    fn short_circuit() -> ExecutionResult {
        ExecutionResult {
            success: true,
            exit_code: 0,
            stdout: None,
            stderr: None,
            skipped: true,
        }
    }
}

/// Runs trust-gated lifecycle scripts for packages in a resolved tree.
#[derive(Debug, Clone)]
pub struct LifecycleRunner {
    pub ignore_scripts: bool,
    trust: TrustRegistry,
    env_overrides: HashMap<String, String>,
}

impl LifecycleRunner {
    pub fn new(ignore_scripts: bool, trust: TrustRegistry) -> LifecycleRunner {
        LifecycleRunner {
            ignore_scripts,
            trust,
            env_overrides: HashMap::new(),
        }
    }

    /// Sets a per-package environment variable override applied to every
    /// subsequent `run_script` call in addition to the caller's own
    /// environment.
    pub fn with_env_override(mut self, key: impl Into<String>, value: impl Into<String>) -> LifecycleRunner {
        self.env_overrides.insert(key.into(), value.into());
        self
    }

    /// Runs `command` for `script_name` of package `package_name` inside
    /// `cwd`. Returns `(result, diagnostic)`: the diagnostic is populated
    /// when the script was skipped due to the trust model.
    ///
    /// `ignore_scripts` short-circuits to `success=true, exit_code=0`
    /// without touching the trust model. Failing to spawn the shell is a
    /// hard error; a non-zero exit from the script itself is reported in
    /// the result, not as an error.
    pub fn run_script(
        &self,
        package_name: &str,
        script_name: &str,
        command: &str,
        cwd: &Path,
    ) -> Result<(ExecutionResult, Option<Diagnostic>)> {
        if !is_lifecycle_script(script_name) {
            return Err(pantry_types::PantryError::UnknownLifecycle(script_name.to_string()));
        }

        if self.ignore_scripts {
            return Ok((ExecutionResult::short_circuit(), None));
        }

        if !self.trust.is_trusted(package_name) {
            let diag = Diagnostic::new(format!(
                "skipped {script_name} for {package_name}: not in trustedDependencies or the default-trusted set"
            ));
            return Ok((ExecutionResult::short_circuit(), Some(diag)));
        }

        let mut cmd = platform_shell_command(command);
        cmd.current_dir(cwd);
        for (key, value) in &self.env_overrides {
            cmd.env(key, value);
        }

        let output = cmd.output()?;
        let result = ExecutionResult {
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: Some(String::from_utf8_lossy(&output.stdout).into_owned()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
            skipped: false,
        };
        Ok((result, None))
    }
}

#[cfg(target_family = "windows")]
fn platform_shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(not(target_family = "windows"))]
fn platform_shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(ignore_scripts: bool, trusted: &[&str]) -> LifecycleRunner {
        let trust = TrustRegistry::new(trusted.iter().map(|s| s.to_string()).collect());
        LifecycleRunner::new(ignore_scripts, trust)
    }

    #[test]
    fn trust_registry_honors_manifest_and_default_lists() {
        let trust = TrustRegistry::new(vec!["my-native-pkg".to_string()]);
        assert!(trust.is_trusted("my-native-pkg"));
        assert!(trust.is_trusted("esbuild"));
        assert!(!trust.is_trusted("totally-random-pkg"));
    }

    #[test]
    fn ignore_scripts_short_circuits_without_checking_trust() {
        let r = runner(true, &[]);
        let dir = tempfile::tempdir().unwrap();
        let (result, diag) = r
            .run_script("untrusted-pkg", "postinstall", "exit 1", dir.path())
            .unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert!(result.skipped);
        assert!(diag.is_none());
    }

    #[test]
    fn untrusted_package_is_skipped_with_diagnostic() {
        let r = runner(false, &[]);
        let dir = tempfile::tempdir().unwrap();
        let (result, diag) = r
            .run_script("untrusted-pkg", "postinstall", "echo hi", dir.path())
            .unwrap();
        assert!(result.skipped);
        assert!(result.success);
        assert!(diag.is_some());
    }

    #[test]
    fn non_lifecycle_script_name_is_rejected() {
        let r = runner(false, &["trusted-pkg"]);
        let dir = tempfile::tempdir().unwrap();
        let err = r
            .run_script("trusted-pkg", "test", "echo hi", dir.path())
            .unwrap_err();
        assert!(matches!(err, pantry_types::PantryError::UnknownLifecycle(_)));
    }

    #[test]
    fn trusted_script_actually_executes() {
        let r = runner(false, &["trusted-pkg"]);
        let dir = tempfile::tempdir().unwrap();
        let (result, diag) = r
            .run_script("trusted-pkg", "postinstall", "exit 0", dir.path())
            .unwrap();
        assert!(diag.is_none());
        assert!(!result.skipped);
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn nonzero_exit_is_reported_not_raised() {
        let r = runner(false, &["trusted-pkg"]);
        let dir = tempfile::tempdir().unwrap();
        let (result, _) = r
            .run_script("trusted-pkg", "postinstall", "exit 7", dir.path())
            .unwrap();
        assert!(!result.skipped);
        assert!(!result.success);
        assert_eq!(result.exit_code, 7);
    }

    #[test]
    fn split_scripts_separates_lifecycle_from_informational() {
        let mut scripts = HashMap::new();
        scripts.insert("postinstall".to_string(), "echo a".to_string());
        scripts.insert("test".to_string(), "echo b".to_string());
        scripts.insert("prepublishOnly".to_string(), "echo c".to_string());

        let (lifecycle, informational) = split_scripts(&scripts);
        let lifecycle_names: Vec<_> = lifecycle.iter().map(|(n, _)| n.as_str()).collect();
        let informational_names: Vec<_> = informational.iter().map(|(n, _)| n.as_str()).collect();

        assert_eq!(lifecycle_names, vec!["postinstall", "prepublishOnly"]);
        assert_eq!(informational_names, vec!["test"]);
    }
}
