//! Line-delimited JSON RPC client for the worker connection.
//!
//! One JSON object per line in each direction. Request:
//! `{"id":1,"method":"run","params":{...}}`. Response:
//! `{"id":1,"result":...}` or `{"id":1,"error":"message"}`. Single client,
//! localhost only; the port is agreed with the companion script at build
//! time.
//!
//! The connection is an owned resource: dropping the client shuts the
//! socket down, so no exit path leaves a dangling connection.

use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream};
use std::time::{Duration, Instant};

use condalink_core::{BridgeError, JobDescriptor};
use serde_json::{json, Value};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Connected,
    /// First round-trip answered; the worker's serving loop is up.
    Ready,
    Closed,
    Failed,
}

/// Worker-reported job status. Explicit tri-state; no bit testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    CompletedOk,
    CompletedWithError,
}

impl JobStatus {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(Self::Running),
            "COMPLETED_OK" => Some(Self::CompletedOk),
            "COMPLETED_WITH_ERROR" => Some(Self::CompletedWithError),
            _ => None,
        }
    }
}

/// Client side of the worker RPC channel.
pub struct RpcClient {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    state: ConnState,
    next_id: u64,
    host: String,
    port: u16,
}

impl RpcClient {
    /// Single connect attempt.
    pub fn connect(host: &str, port: u16) -> Result<Self, BridgeError> {
        let stream = TcpStream::connect((host, port)).map_err(|_| BridgeError::Connection {
            host: host.to_string(),
            port,
            timeout_secs: 0,
        })?;
        Self::from_stream(stream, host, port)
    }

    /// Bounded-retry connect loop: attempt, back off, repeat until the
    /// timeout budget is exhausted. Replaces a fixed readiness sleep with a
    /// deterministic bound.
    pub fn connect_with_retry(
        host: &str,
        port: u16,
        timeout: Duration,
        backoff: Duration,
    ) -> Result<Self, BridgeError> {
        let deadline = Instant::now() + timeout;
        loop {
            match TcpStream::connect((host, port)) {
                Ok(stream) => return Self::from_stream(stream, host, port),
                Err(e) => {
                    if Instant::now() + backoff >= deadline {
                        tracing::warn!(host, port, error = %e, "worker endpoint never became reachable");
                        return Err(BridgeError::Connection {
                            host: host.to_string(),
                            port,
                            timeout_secs: timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(backoff);
                }
            }
        }
    }

    fn from_stream(stream: TcpStream, host: &str, port: u16) -> Result<Self, BridgeError> {
        let reader = BufReader::new(
            stream
                .try_clone()
                .map_err(|e| BridgeError::transport("clone rpc stream", e))?,
        );
        tracing::debug!(host, port, "worker connection established");
        Ok(Self {
            stream,
            reader,
            state: ConnState::Connected,
            next_id: 1,
            host: host.to_string(),
            port,
        })
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Dispatch the job. Blocks until the worker finishes the computation.
    pub fn run_job(&mut self, job: &JobDescriptor) -> Result<(), BridgeError> {
        let params = serde_json::to_value(job).map_err(|e| BridgeError::RemoteExecution {
            method: "run".to_string(),
            message: format!("job descriptor not serializable: {e}"),
        })?;
        self.call("run", params).map(|_| ())
    }

    /// Non-blocking status poll.
    pub fn status(&mut self) -> Result<JobStatus, BridgeError> {
        let result = self.call("status", json!({}))?;
        result
            .as_str()
            .and_then(JobStatus::parse)
            .ok_or_else(|| BridgeError::RemoteExecution {
                method: "status".to_string(),
                message: format!("unrecognized status payload: {result}"),
            })
    }

    /// Signal the worker to end its serving loop. Returns the ack string.
    pub fn stop(&mut self) -> Result<String, BridgeError> {
        let result = self.call("stop", json!({}))?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    /// Close the connection. Also happens on drop.
    pub fn close(mut self) {
        self.state = ConnState::Closed;
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn call(&mut self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = json!({ "id": id, "method": method, "params": params });
        let fail = |message: String| BridgeError::RemoteExecution {
            method: method.to_string(),
            message,
        };

        writeln!(self.stream, "{request}").map_err(|e| {
            self.state = ConnState::Failed;
            fail(format!("write failed: {e}"))
        })?;
        self.stream.flush().map_err(|e| {
            self.state = ConnState::Failed;
            fail(format!("flush failed: {e}"))
        })?;

        let mut line = String::new();
        let n = self.reader.read_line(&mut line).map_err(|e| {
            self.state = ConnState::Failed;
            fail(format!("read failed: {e}"))
        })?;
        if n == 0 {
            self.state = ConnState::Failed;
            return Err(fail("worker closed the connection".to_string()));
        }

        let response: Value = serde_json::from_str(line.trim())
            .map_err(|e| fail(format!("malformed response: {e}")))?;
        if response.get("id").and_then(Value::as_u64) != Some(id) {
            self.state = ConnState::Failed;
            return Err(fail("response id mismatch".to_string()));
        }
        if let Some(err) = response.get("error") {
            return Err(fail(err.as_str().unwrap_or("unknown remote error").to_string()));
        }

        self.state = ConnState::Ready;
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("endpoint", &format!("{}:{}", self.host, self.port))
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        if self.state != ConnState::Closed {
            let _ = self.stream.shutdown(Shutdown::Both);
        }
    }
}
