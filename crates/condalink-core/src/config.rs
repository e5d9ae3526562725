//! Env-driven configuration, grouped by domain.
//!
//! The bridge keeps no config file of its own: the WSL install prefix and
//! the conda package cache are the only durable state, both living inside
//! the subsystem.

use std::time::Duration;

/// Environment variable keys.
pub mod env_keys {
    pub const INSTALL_PREFIX: &str = "CONDALINK_INSTALL_PREFIX";
    pub const ENV_NAME: &str = "CONDALINK_ENV_NAME";
    pub const PORT: &str = "CONDALINK_PORT";
    pub const CONNECT_TIMEOUT_SECS: &str = "CONDALINK_CONNECT_TIMEOUT_SECS";
    pub const CONNECT_BACKOFF_MS: &str = "CONDALINK_CONNECT_BACKOFF_MS";
    pub const WORKER_SCRIPT: &str = "CONDALINK_WORKER_SCRIPT";
    pub const QUIET: &str = "CONDALINK_QUIET";
    pub const LOG_LEVEL: &str = "CONDALINK_LOG_LEVEL";
}

fn env_or<T, F: FnOnce() -> T>(key: &str, parse: impl Fn(&str) -> Option<T>, default: F) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| parse(v.trim()))
        .unwrap_or_else(default)
}

/// Bridge configuration.
///
/// `install_prefix` and `worker_script` live in different namespaces:
/// the prefix is a WSL-side path (a literal `~` is expanded by the WSL
/// shell), the worker script is a host path translated at launch time.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Miniconda install prefix inside WSL.
    pub install_prefix: String,
    /// Default named environment for jobs.
    pub env_name: String,
    /// Worker RPC endpoint host.
    pub host: String,
    /// Worker RPC endpoint port, agreed with the companion script.
    pub port: u16,
    /// Total budget for the readiness connect loop.
    pub connect_timeout_secs: u64,
    /// Backoff between connect attempts.
    pub connect_backoff_ms: u64,
    /// Host path to the companion entry-point script.
    pub worker_script: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            install_prefix: "~/miniconda3".to_string(),
            env_name: "aliIOSCondaCli".to_string(),
            host: "127.0.0.1".to_string(),
            port: 18817,
            connect_timeout_secs: 10,
            connect_backoff_ms: 250,
            worker_script: "worker/link.py".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            install_prefix: env_or(
                env_keys::INSTALL_PREFIX,
                |v| Some(v.to_string()),
                || d.install_prefix.clone(),
            ),
            env_name: env_or(env_keys::ENV_NAME, |v| Some(v.to_string()), || {
                d.env_name.clone()
            }),
            host: d.host.clone(),
            port: env_or(env_keys::PORT, |v| v.parse().ok(), || d.port),
            connect_timeout_secs: env_or(env_keys::CONNECT_TIMEOUT_SECS, |v| v.parse().ok(), || {
                d.connect_timeout_secs
            }),
            connect_backoff_ms: env_or(env_keys::CONNECT_BACKOFF_MS, |v| v.parse().ok(), || {
                d.connect_backoff_ms
            }),
            worker_script: env_or(env_keys::WORKER_SCRIPT, |v| Some(v.to_string()), || {
                d.worker_script.clone()
            }),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }

    /// WSL path to the interpreter of a named environment under this prefix.
    pub fn env_python(&self, name: &str) -> String {
        format!("{}/envs/{}/bin/python", self.install_prefix, name)
    }

    /// WSL path to the pip of a named environment under this prefix.
    pub fn env_pip(&self, name: &str) -> String {
        format!("{}/envs/{}/bin/pip", self.install_prefix, name)
    }

    /// WSL path to the conda executable under this prefix.
    pub fn conda(&self) -> String {
        format!("{}/bin/conda", self.install_prefix)
    }

    /// WSL path to the activation script under this prefix.
    pub fn activate(&self) -> String {
        format!("{}/bin/activate", self.install_prefix)
    }
}

/// Logging configuration for the CLI.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// When set, only WARN and above are logged.
    pub quiet: bool,
    /// Default EnvFilter directive when RUST_LOG is unset.
    pub log_level: String,
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        let quiet = env_or(
            env_keys::QUIET,
            |v| Some(matches!(v, "1" | "true" | "yes")),
            || false,
        );
        let log_level = env_or(env_keys::LOG_LEVEL, |v| Some(v.to_string()), || {
            "condalink=info".to_string()
        });
        Self { quiet, log_level }
    }
}
