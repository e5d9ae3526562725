//! Miniconda runtime and named-environment provisioning inside WSL.
//!
//! Environment creation and ML package installation are slow, flaky,
//! network-bound operations. Base creation gates the overall result;
//! individual package installs are best-effort and reported per entry so
//! callers can decide whether a missing optional package blocks their job.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use condalink_core::{BridgeConfig, BridgeError};

use crate::command::CommandRunner;

const MINICONDA_URL: &str =
    "https://repo.anaconda.com/miniconda/Miniconda3-latest-Linux-x86_64.sh";
const DOWNLOAD_TRIES: u32 = 3;

/// Pinned base installed before any caller manifest.
const ENV_BASE: [&str; 3] = ["python=3.9", "pip", "numpy-base"];

/// Existence state of a named environment, per probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvState {
    Unknown,
    Missing,
    Present,
}

/// Outcome of one manifest entry install.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PackageOutcome {
    /// The manifest entry as given (pip argument string).
    pub spec: String,
    pub exit_code: i32,
    /// Captured stderr when the install failed; empty on success.
    pub stderr: String,
}

impl PackageOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Structured report of one `ensure_environment` call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProvisionReport {
    pub env_name: String,
    /// Whether this call created the environment (false: already present).
    pub created: bool,
    pub packages: Vec<PackageOutcome>,
}

impl ProvisionReport {
    pub fn failed_packages(&self) -> impl Iterator<Item = &PackageOutcome> {
        self.packages.iter().filter(|p| !p.success())
    }
}

/// Provisions the Miniconda runtime and named conda environments.
///
/// Provisioning for the same name is serialized with a per-name advisory
/// lock; different names are independent.
pub struct EnvironmentProvisioner {
    runner: Arc<dyn CommandRunner>,
    cfg: BridgeConfig,
    states: Mutex<HashMap<String, EnvState>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EnvironmentProvisioner {
    pub fn new(runner: Arc<dyn CommandRunner>, cfg: BridgeConfig) -> Self {
        Self {
            runner,
            cfg,
            states: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.cfg
    }

    /// Ensure the Miniconda runtime exists under the install prefix.
    ///
    /// Present → returns immediately with zero download attempts. Missing →
    /// download (resumable, bounded retries), unattended install, installer
    /// cleanup, shell integration.
    pub fn ensure_runtime(&self) -> Result<(), BridgeError> {
        if self.runtime_present()? {
            tracing::debug!(prefix = %self.cfg.install_prefix, "runtime already installed");
            return Ok(());
        }

        let installer = format!("{}.installer.sh", self.cfg.install_prefix);
        tracing::info!(url = MINICONDA_URL, "downloading Miniconda installer");
        let out = self.runner.run(
            &argv([
                "wget",
                "--continue",
                &format!("--tries={}", DOWNLOAD_TRIES),
                MINICONDA_URL,
                "-O",
                &installer,
            ]),
            None,
        )?;
        if !out.success() {
            return Err(BridgeError::Download {
                url: MINICONDA_URL.to_string(),
                attempts: DOWNLOAD_TRIES,
            });
        }

        self.runner
            .run(&argv(["chmod", "+x", &installer]), None)?;

        tracing::info!(prefix = %self.cfg.install_prefix, "installing Miniconda");
        let out = self.runner.run(
            &argv(["bash", &installer, "-b", "-u", "-p", &self.cfg.install_prefix]),
            None,
        )?;
        if !out.success() {
            return Err(BridgeError::Install {
                stage: "miniconda installer".to_string(),
                exit_code: out.exit_code,
                stderr: out.stderr,
            });
        }

        self.runner.run(&argv(["rm", "-f", &installer]), None)?;

        // Shell integration for subsequent interactive sessions.
        let out = self
            .runner
            .run(&argv([&self.cfg.conda(), "init", "bash"]), None)?;
        if !out.success() {
            tracing::warn!(stderr = %out.stderr, "conda init bash failed");
        }

        tracing::info!("Miniconda installed");
        Ok(())
    }

    /// Ensure the named environment exists with the given package manifest.
    ///
    /// Each manifest entry is one pip argument string (e.g.
    /// `"monai==0.7.0"` or `"torch==1.11.0+cu113 --extra-index-url ..."`),
    /// installed as its own command inside the activated environment.
    pub fn ensure_environment(
        &self,
        name: &str,
        manifest: &[&str],
    ) -> Result<ProvisionReport, BridgeError> {
        let lock = self.name_lock(name);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut created = false;
        if self.probe_environment(name)? == EnvState::Present {
            tracing::debug!(env = name, "environment already exists");
        } else {
            self.create_environment(name)?;
            created = true;
        }

        let mut packages = Vec::with_capacity(manifest.len());
        for spec in manifest {
            packages.push(self.install_package(name, spec)?);
        }

        self.set_state(name, EnvState::Present);
        Ok(ProvisionReport {
            env_name: name.to_string(),
            created,
            packages,
        })
    }

    /// Whether a prior `ensure_environment` for this name succeeded.
    pub fn is_provisioned(&self, name: &str) -> bool {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .is_some_and(|s| *s == EnvState::Present)
    }

    /// Capability probe: can `module` be imported inside the environment?
    pub fn probe_import(&self, name: &str, module: &str) -> Result<bool, BridgeError> {
        let out = self.runner.run(
            &argv([
                &self.cfg.env_python(name),
                "-c",
                &format!("import {}", module),
            ]),
            Some(name),
        )?;
        Ok(out.success())
    }

    /// Non-mutating probe: is the runtime marker directory present?
    pub fn runtime_present(&self) -> Result<bool, BridgeError> {
        let out = self
            .runner
            .run(&argv(["test", "-d", &self.cfg.install_prefix]), None)?;
        Ok(out.success())
    }

    /// Non-mutating probe: list environments and test membership by exact
    /// basename match.
    pub fn probe_environment(&self, name: &str) -> Result<EnvState, BridgeError> {
        let out = self
            .runner
            .run(&argv([&self.cfg.conda(), "info", "--envs"]), None)?;
        if !out.success() {
            // conda itself unusable: environments unknown, treat as missing.
            tracing::warn!(stderr = %out.stderr, "conda info --envs failed");
            self.set_state(name, EnvState::Unknown);
            return Ok(EnvState::Missing);
        }

        let present = out
            .stdout
            .lines()
            .filter(|l| !l.trim_start().starts_with('#'))
            .filter_map(|l| l.split_whitespace().last())
            .any(|path| path.rsplit('/').next() == Some(name));

        let state = if present {
            EnvState::Present
        } else {
            EnvState::Missing
        };
        self.set_state(name, state);
        Ok(state)
    }

    fn create_environment(&self, name: &str) -> Result<(), BridgeError> {
        tracing::info!(env = name, "creating conda environment");
        let mut cmd: Vec<String> = argv([&self.cfg.conda(), "create", "-y", "-n", name]);
        cmd.extend(ENV_BASE.iter().map(|s| s.to_string()));
        let out = self.runner.run(&cmd, None)?;
        if !out.success() {
            return Err(BridgeError::Install {
                stage: format!("conda create '{}'", name),
                exit_code: out.exit_code,
                stderr: out.stderr,
            });
        }
        Ok(())
    }

    fn install_package(&self, name: &str, spec: &str) -> Result<PackageOutcome, BridgeError> {
        let mut cmd = vec![self.cfg.env_pip(name), "install".to_string()];
        cmd.extend(spec.split_whitespace().map(String::from));

        tracing::info!(env = name, spec, "installing package");
        let out = self.runner.run(&cmd, Some(name))?;
        if !out.success() {
            tracing::warn!(
                env = name,
                spec,
                exit_code = out.exit_code,
                stdout = %out.stdout,
                stderr = %out.stderr,
                "package install failed, continuing"
            );
        }
        Ok(PackageOutcome {
            spec: spec.to_string(),
            exit_code: out.exit_code,
            stderr: if out.success() { String::new() } else { out.stderr },
        })
    }

    fn set_state(&self, name: &str, state: EnvState) {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), state);
    }

    fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

fn argv<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}
