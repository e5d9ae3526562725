//! Scripted [`CommandRunner`] fake for provisioner and bridge tests.

use std::sync::{Arc, Mutex};

use condalink_core::BridgeError;

use crate::command::{CommandOutput, CommandRunner, WorkerHandle};

struct Rule {
    pattern: String,
    exit_code: i32,
    stdout: String,
    stderr: String,
}

/// Records every invocation and answers from substring-matched rules.
/// Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct FakeRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
    spawns: Mutex<Vec<String>>,
    kills: Arc<Mutex<u32>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_when(&self, pattern: &str, exit_code: i32, stdout: &str, stderr: &str) {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        });
    }

    pub fn ok_when(&self, pattern: &str) {
        self.respond_when(pattern, 0, "", "");
    }

    pub fn fail_when(&self, pattern: &str, exit_code: i32, stderr: &str) {
        self.respond_when(pattern, exit_code, "", stderr);
    }

    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.contains(pattern))
            .count()
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.lock().unwrap().len()
    }

    pub fn last_spawn(&self) -> Option<String> {
        self.spawns.lock().unwrap().last().cloned()
    }

    pub fn kill_count(&self) -> u32 {
        *self.kills.lock().unwrap()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, argv: &[String], env_name: Option<&str>)
        -> Result<CommandOutput, BridgeError>
    {
        let mut joined = argv.join(" ");
        if let Some(env) = env_name {
            joined = format!("[{env}] {joined}");
        }
        self.calls.lock().unwrap().push(joined.clone());

        let rules = self.rules.lock().unwrap();
        let rule = rules.iter().find(|r| joined.contains(&r.pattern));
        Ok(match rule {
            Some(r) => CommandOutput {
                exit_code: r.exit_code,
                stdout: r.stdout.clone(),
                stderr: r.stderr.clone(),
            },
            None => CommandOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            },
        })
    }

    fn spawn_worker(&self, argv: &[String]) -> Result<Box<dyn WorkerHandle>, BridgeError> {
        self.spawns.lock().unwrap().push(argv.join(" "));
        Ok(Box::new(FakeHandle {
            kills: Arc::clone(&self.kills),
        }))
    }
}

struct FakeHandle {
    kills: Arc<Mutex<u32>>,
}

impl WorkerHandle for FakeHandle {
    fn kill(&mut self) -> Result<(), BridgeError> {
        *self.kills.lock().unwrap() += 1;
        Ok(())
    }

    fn try_wait(&mut self) -> Result<Option<i32>, BridgeError> {
        Ok(Some(0))
    }
}
