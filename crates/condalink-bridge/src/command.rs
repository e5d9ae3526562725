//! Subsystem command gateway.
//!
//! Every interaction with WSL goes through the [`CommandRunner`] trait: a
//! blocking argv execution with full stream capture, plus a background
//! spawn used for the worker process. The trait is the seam that lets the
//! provisioner and bridge be exercised against a scripted fake in tests.

use std::process::{Child, Command, Stdio};

use condalink_core::BridgeError;

/// Captured result of one subsystem command.
///
/// A non-zero exit is data, not an error: callers interpret the exit code
/// and streams themselves. Only a transport failure (the gateway itself
/// unreachable) surfaces as `Err`.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Handle to a background worker process.
pub trait WorkerHandle: Send {
    /// Terminate the process. Idempotent; killing an exited process is Ok.
    fn kill(&mut self) -> Result<(), BridgeError>;
    /// Reap the process if it has already exited. Best effort.
    fn try_wait(&mut self) -> Result<Option<i32>, BridgeError>;
}

/// Extension seam for subsystem execution.
///
/// `WslRunner` is the production implementation; tests substitute a
/// scripted fake.
pub trait CommandRunner: Send + Sync {
    /// Execute `argv` inside the subsystem, blocking until it exits.
    /// With `env_name`, the command runs with that conda environment
    /// activated first.
    fn run(&self, argv: &[String], env_name: Option<&str>)
        -> Result<CommandOutput, BridgeError>;

    /// Launch `argv` inside the subsystem as a background process.
    fn spawn_worker(&self, argv: &[String]) -> Result<Box<dyn WorkerHandle>, BridgeError>;
}

/// Production runner: executes through `wsl --`, optionally wrapping the
/// command in a `source <prefix>/bin/activate <env> && ...` shell line.
#[derive(Debug, Clone)]
pub struct WslRunner {
    /// WSL-side path to the activation script (`<prefix>/bin/activate`).
    activate_path: String,
}

impl WslRunner {
    pub fn new(activate_path: impl Into<String>) -> Self {
        Self {
            activate_path: activate_path.into(),
        }
    }

    /// Whether the WSL gateway binary is present on the host.
    pub fn wsl_available() -> bool {
        which::which("wsl").is_ok()
    }

    fn wsl_command(&self, argv: &[String], env_name: Option<&str>) -> Command {
        let mut cmd = Command::new("wsl");
        cmd.arg("--");
        match env_name {
            Some(env) => {
                // Activation only works through a shell; quote-join the argv.
                let inner = argv
                    .iter()
                    .map(|a| shell_quote(a))
                    .collect::<Vec<_>>()
                    .join(" ");
                cmd.arg("bash").arg("-c").arg(format!(
                    "source {} {} && {}",
                    self.activate_path, env, inner
                ));
            }
            None => {
                cmd.args(argv);
            }
        }
        cmd
    }
}

impl CommandRunner for WslRunner {
    fn run(&self, argv: &[String], env_name: Option<&str>)
        -> Result<CommandOutput, BridgeError>
    {
        let mut cmd = self.wsl_command(argv, env_name);
        tracing::debug!(?argv, env = ?env_name, "subsystem command");
        capture(&mut cmd)
    }

    fn spawn_worker(&self, argv: &[String]) -> Result<Box<dyn WorkerHandle>, BridgeError> {
        let mut cmd = self.wsl_command(argv, None);
        tracing::info!(?argv, "launching worker process");
        let child = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BridgeError::transport("spawn worker via wsl", e))?;
        Ok(Box::new(ChildHandle { child }))
    }
}

/// Run a prepared command to completion, capturing both streams.
pub(crate) fn capture(cmd: &mut Command) -> Result<CommandOutput, BridgeError> {
    let out = cmd
        .output()
        .map_err(|e| BridgeError::transport(format!("exec {:?}", cmd.get_program()), e))?;
    Ok(CommandOutput {
        exit_code: out.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
    })
}

fn shell_quote(arg: &str) -> String {
    // Paths with spaces are the common case; full POSIX quoting is not
    // needed for the fixed command set we emit.
    if arg.contains(' ') {
        format!("'{}'", arg)
    } else {
        arg.to_string()
    }
}

struct ChildHandle {
    child: Child,
}

impl WorkerHandle for ChildHandle {
    fn kill(&mut self) -> Result<(), BridgeError> {
        match self.child.kill() {
            Ok(()) => Ok(()),
            // InvalidInput: already exited.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(BridgeError::transport("kill worker", e)),
        }
    }

    fn try_wait(&mut self) -> Result<Option<i32>, BridgeError> {
        self.child
            .try_wait()
            .map(|s| s.and_then(|st| st.code()))
            .map_err(|e| BridgeError::transport("wait worker", e))
    }
}
