//! Worker process lifecycle: launch, readiness, dispatch, shutdown.
//!
//! Exactly one job per `run` call, synchronous from the caller's point of
//! view. The host front end may call `run` from a background thread and
//! poll [`WorkerBridge::state`] to keep its progress display responsive.

use std::sync::Arc;

use condalink_core::wslpath::to_wsl_path;
use condalink_core::{BridgeConfig, BridgeError, JobDescriptor};

use crate::command::{CommandRunner, WorkerHandle};
use crate::provision::EnvironmentProvisioner;
use crate::rpc::RpcClient;

/// Bridge lifecycle. `Failed` is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Provisioned,
    Launching,
    ReadinessWait,
    Connected,
    Dispatched,
    Completed,
    Closed,
    Failed,
}

/// Drives one worker process per job. Not reentrant: at most one
/// connection is live at a time, and a failed job leaves the bridge in
/// `Failed` until the next fresh `run`.
pub struct WorkerBridge {
    runner: Arc<dyn CommandRunner>,
    cfg: BridgeConfig,
    state: BridgeState,
}

impl WorkerBridge {
    pub fn new(runner: Arc<dyn CommandRunner>, cfg: BridgeConfig) -> Self {
        Self {
            runner,
            cfg,
            state: BridgeState::Idle,
        }
    }

    /// Current lifecycle state, for UI polling.
    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Run one job inside the named environment.
    ///
    /// Precondition: a successful `ensure_environment(env_name, ..)` on
    /// `provisioner`. Violations fail with a configuration error before any
    /// process is launched. The job descriptor is not retained after the
    /// call returns.
    pub fn run(
        &mut self,
        provisioner: &EnvironmentProvisioner,
        env_name: &str,
        job: &JobDescriptor,
    ) -> Result<(), BridgeError> {
        self.state = BridgeState::Idle;

        if !provisioner.is_provisioned(env_name) {
            self.state = BridgeState::Failed;
            return Err(BridgeError::Configuration(format!(
                "environment '{env_name}' is not provisioned; call ensure_environment first"
            )));
        }
        self.state = BridgeState::Provisioned;

        let job = job.to_wsl();
        let argv = vec![
            self.cfg.env_python(env_name),
            to_wsl_path(&self.cfg.worker_script),
            "--port".to_string(),
            self.cfg.port.to_string(),
        ];

        self.state = BridgeState::Launching;
        let mut handle = self.runner.spawn_worker(&argv)?;

        self.state = BridgeState::ReadinessWait;
        let client = RpcClient::connect_with_retry(
            &self.cfg.host,
            self.cfg.port,
            self.cfg.connect_timeout(),
            self.cfg.connect_backoff(),
        );
        let mut client = match client {
            Ok(c) => c,
            Err(e) => {
                self.fail_and_kill(&mut handle);
                return Err(e);
            }
        };
        self.state = BridgeState::Connected;

        self.state = BridgeState::Dispatched;
        tracing::info!(env = env_name, "dispatching job to worker");
        if let Err(e) = client.run_job(&job) {
            self.fail_and_kill(&mut handle);
            return Err(e);
        }
        self.state = BridgeState::Completed;

        // The stop command is never issued before the run call returns.
        match client.stop() {
            Ok(ack) => {
                if ack != "DISCONNECTING" {
                    tracing::warn!(%ack, "unexpected stop acknowledgement");
                }
                client.close();
            }
            Err(e) => {
                self.fail_and_kill(&mut handle);
                return Err(e);
            }
        }

        if let Ok(None) = handle.try_wait() {
            // Worker acknowledged stop but has not exited yet; it owns its
            // own shutdown from here.
            tracing::debug!("worker still draining after stop");
        }
        self.state = BridgeState::Closed;
        tracing::info!(env = env_name, "job completed, worker connection closed");
        Ok(())
    }

    fn fail_and_kill(&mut self, handle: &mut Box<dyn WorkerHandle>) {
        if let Err(e) = handle.kill() {
            tracing::warn!(error = %e, "failed to kill worker after error");
        }
        self.state = BridgeState::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;
    use serde_json::{json, Value};
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    fn job() -> JobDescriptor {
        JobDescriptor::new(
            r"C:\scans\lower.vtk",
            r"C:\models",
            vec!["O".into()],
            vec!["UR6".into()],
            false,
            r"C:\out",
        )
    }

    fn config(port: u16) -> BridgeConfig {
        BridgeConfig {
            port,
            connect_timeout_secs: 1,
            connect_backoff_ms: 50,
            worker_script: r"C:\ext\worker\link.py".to_string(),
            ..BridgeConfig::default()
        }
    }

    fn provisioned(runner: &Arc<FakeRunner>, cfg: &BridgeConfig) -> EnvironmentProvisioner {
        runner.respond_when(
            "info --envs",
            0,
            "# conda environments:\naliIOSCondaCli  /root/miniconda3/envs/aliIOSCondaCli\n",
            "",
        );
        let prov = EnvironmentProvisioner::new(runner.clone() as Arc<dyn CommandRunner>, cfg.clone());
        prov.ensure_environment("aliIOSCondaCli", &[]).expect("provision");
        prov
    }

    /// One-job mock worker: answers run/stop, records dispatched params.
    fn mock_worker() -> (u16, std::sync::mpsc::Receiver<Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut stream = stream;
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    break;
                }
                let req: Value = serde_json::from_str(line.trim()).unwrap();
                let id = req["id"].as_u64().unwrap();
                match req["method"].as_str().unwrap() {
                    "run" => {
                        let _ = tx.send(req["params"].clone());
                        writeln!(stream, "{}", json!({"id": id, "result": null})).unwrap();
                    }
                    "stop" => {
                        writeln!(stream, "{}", json!({"id": id, "result": "DISCONNECTING"}))
                            .unwrap();
                        break;
                    }
                    other => {
                        writeln!(
                            stream,
                            "{}",
                            json!({"id": id, "error": format!("unknown method {other}")})
                        )
                        .unwrap();
                    }
                }
            }
        });
        (port, rx)
    }

    #[test]
    fn test_unprovisioned_env_fails_before_launch() {
        let runner = Arc::new(FakeRunner::new());
        let cfg = config(18817);
        let prov = EnvironmentProvisioner::new(runner.clone() as Arc<dyn CommandRunner>, cfg.clone());
        let mut bridge = WorkerBridge::new(runner.clone(), cfg);

        let err = bridge
            .run(&prov, "aliIOSCondaCli", &job())
            .expect_err("precondition violated");
        assert!(matches!(err, BridgeError::Configuration(_)));
        assert_eq!(runner.spawn_count(), 0);
        assert_eq!(bridge.state(), BridgeState::Failed);
    }

    #[test]
    fn test_unreachable_worker_is_connection_error_and_kills_process() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let runner = Arc::new(FakeRunner::new());
        let cfg = config(port);
        let prov = provisioned(&runner, &cfg);
        let mut bridge = WorkerBridge::new(runner.clone(), cfg);

        let err = bridge
            .run(&prov, "aliIOSCondaCli", &job())
            .expect_err("nothing listening");
        assert!(matches!(err, BridgeError::Connection { .. }));
        assert_eq!(runner.spawn_count(), 1);
        assert_eq!(runner.kill_count(), 1);
        assert_eq!(bridge.state(), BridgeState::Failed);
    }

    #[test]
    fn test_successful_run_closes_and_translates_paths() {
        let (port, rx) = mock_worker();
        let runner = Arc::new(FakeRunner::new());
        let cfg = config(port);
        let prov = provisioned(&runner, &cfg);
        let mut bridge = WorkerBridge::new(runner.clone(), cfg);

        bridge
            .run(&prov, "aliIOSCondaCli", &job())
            .expect("run succeeds");
        assert_eq!(bridge.state(), BridgeState::Closed);
        assert_eq!(runner.kill_count(), 0);

        let params = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("worker saw the job");
        assert_eq!(params["input"], "/mnt/c/scans/lower.vtk");
        assert_eq!(params["dir_models"], "/mnt/c/models");
        assert_eq!(params["output_dir"], "/mnt/c/out");
        assert_eq!(params["image_size"], 224);
    }

    #[test]
    fn test_bridge_accepts_fresh_run_after_completed_job() {
        let (port1, _rx1) = mock_worker();
        let runner = Arc::new(FakeRunner::new());
        let cfg = config(port1);
        let prov = provisioned(&runner, &cfg);
        let mut bridge = WorkerBridge::new(runner.clone(), cfg);
        bridge.run(&prov, "aliIOSCondaCli", &job()).expect("first run");
        assert_eq!(bridge.state(), BridgeState::Closed);

        // Second job: a fresh worker on a fresh port.
        let (port2, _rx2) = mock_worker();
        bridge.cfg.port = port2;
        bridge.run(&prov, "aliIOSCondaCli", &job()).expect("second run");
        assert_eq!(bridge.state(), BridgeState::Closed);
        assert_eq!(runner.spawn_count(), 2);
    }

    #[test]
    fn test_worker_launch_uses_env_interpreter_and_wsl_script_path() {
        let (port, _rx) = mock_worker();
        let runner = Arc::new(FakeRunner::new());
        let cfg = config(port);
        let prov = provisioned(&runner, &cfg);
        let mut bridge = WorkerBridge::new(runner.clone(), cfg);
        bridge.run(&prov, "aliIOSCondaCli", &job()).expect("run");

        let spawns = runner.spawn_count();
        assert_eq!(spawns, 1);
        assert_eq!(
            runner.last_spawn().unwrap(),
            format!(
                "~/miniconda3/envs/aliIOSCondaCli/bin/python /mnt/c/ext/worker/link.py --port {port}"
            )
        );
    }
}
