//! condalink bridge: provisions a Miniconda runtime inside WSL, creates
//! named conda environments, and drives the companion worker process over a
//! localhost RPC channel.
//!
//! Dependency order, leaves first: [`command`] is the subsystem gateway,
//! [`provision`] builds on it, [`worker`] builds on both plus the [`rpc`]
//! client.

pub mod command;
pub mod provision;
pub mod rpc;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{CommandOutput, CommandRunner, WorkerHandle, WslRunner};
pub use provision::{EnvState, EnvironmentProvisioner, PackageOutcome, ProvisionReport};
pub use rpc::{ConnState, JobStatus, RpcClient};
pub use worker::{BridgeState, WorkerBridge};
