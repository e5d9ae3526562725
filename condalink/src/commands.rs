//! Command dispatch: the setup pipeline and the doctor diagnostics.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use condalink_bridge::{EnvironmentProvisioner, WorkerBridge, WslRunner};
use condalink_core::{BridgeConfig, JobDescriptor};

/// ML package manifest for the landmark environment. Each entry is one pip
/// install invocation; failures are reported per entry, not fatal.
pub const ML_MANIFEST: &[&str] = &[
    "torch==1.11.0+cu113 torchvision==0.12.0+cu113 torchaudio==0.11.0+cu113 \
     --extra-index-url https://download.pytorch.org/whl/cu113",
    "monai==0.7.0",
    "fvcore",
    "pytorch3d --no-index --no-cache-dir \
     -f https://dl.fbaipublicfiles.com/pytorch3d/packaging/wheels/py39_cu113_pyt1110/download.html",
    "vtk",
    "scipy",
];

/// Modules the doctor probes inside the environment.
const CAPABILITY_MODULES: &[&str] = &["torch", "monai", "pytorch3d", "vtk", "scipy"];

#[allow(clippy::too_many_arguments)]
pub fn run_setup(
    install_prefix: String,
    input: String,
    dir_models: String,
    lm_types: String,
    teeth: String,
    save_in_folder: String,
    output_dir: String,
) -> Result<()> {
    let cfg = BridgeConfig {
        install_prefix,
        ..BridgeConfig::from_env()
    };

    if !WslRunner::wsl_available() {
        bail!("wsl not found on PATH; install WSL before running setup");
    }

    let job = JobDescriptor::new(
        input,
        dir_models,
        split_list(&lm_types),
        split_list(&teeth),
        save_in_folder == "true",
        output_dir,
    );

    let runner = Arc::new(WslRunner::new(cfg.activate()));
    let provisioner = EnvironmentProvisioner::new(runner.clone(), cfg.clone());

    tracing::info!(prefix = %cfg.install_prefix, "ensuring Miniconda runtime");
    provisioner
        .ensure_runtime()
        .context("runtime install stage failed")?;

    let env_name = cfg.env_name.clone();
    let report = provisioner
        .ensure_environment(&env_name, ML_MANIFEST)
        .with_context(|| format!("environment creation stage failed for '{env_name}'"))?;
    for failed in report.failed_packages() {
        eprintln!(
            "warning: package install failed (exit {}): {}",
            failed.exit_code, failed.spec
        );
    }

    let mut bridge = WorkerBridge::new(runner, cfg);
    bridge
        .run(&provisioner, &env_name, &job)
        .context("job dispatch failed")?;

    println!("job completed");
    Ok(())
}

pub fn run_doctor(env_name: Option<String>) -> Result<()> {
    let cfg = BridgeConfig::from_env();
    let env_name = env_name.unwrap_or_else(|| cfg.env_name.clone());

    let wsl = WslRunner::wsl_available();
    println!("wsl gateway:        {}", check(wsl));
    if !wsl {
        return Ok(());
    }

    let runner = Arc::new(WslRunner::new(cfg.activate()));
    let provisioner = EnvironmentProvisioner::new(runner, cfg.clone());

    let runtime = provisioner.runtime_present()?;
    println!("miniconda runtime:  {}", check(runtime));
    if !runtime {
        return Ok(());
    }

    let state = provisioner.probe_environment(&env_name)?;
    let present = state == condalink_bridge::EnvState::Present;
    println!("environment '{}': {}", env_name, check(present));
    if !present {
        return Ok(());
    }

    for module in CAPABILITY_MODULES {
        let ok = provisioner.probe_import(&env_name, module)?;
        println!("import {:<12} {}", format!("{module}:"), check(ok));
    }
    Ok(())
}

fn check(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "missing"
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_handles_extra_whitespace() {
        assert_eq!(split_list(" O  MB DB "), vec!["O", "MB", "DB"]);
        assert!(split_list("").is_empty());
    }
}
