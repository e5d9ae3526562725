//! Error taxonomy for the bridge.
//!
//! Package-level install failures are deliberately *not* errors — they are
//! collected into the provisioner's report so callers can decide whether a
//! missing optional package blocks their job.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Artifact fetch exhausted its retry budget.
    #[error("download failed after {attempts} attempts: {url}")]
    Download { url: String, attempts: u32 },

    /// Runtime or environment installer returned a non-zero exit.
    #[error("{stage} failed (exit {exit_code}): {stderr}")]
    Install {
        stage: String,
        exit_code: i32,
        stderr: String,
    },

    /// RPC endpoint unreachable within the connect timeout budget.
    #[error("worker endpoint {host}:{port} unreachable within {timeout_secs}s")]
    Connection {
        host: String,
        port: u16,
        timeout_secs: u64,
    },

    /// A remote call failed or the worker returned an error status.
    #[error("remote '{method}' call failed: {message}")]
    RemoteExecution { method: String, message: String },

    /// Precondition violated, e.g. dispatch before provisioning.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The subsystem gateway itself could not be reached (wsl missing,
    /// spawn failure). Distinct from a command exiting non-zero.
    #[error("subsystem transport failure: {context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl BridgeError {
    pub fn transport(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transport {
            context: context.into(),
            source,
        }
    }
}
