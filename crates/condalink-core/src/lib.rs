//! condalink core: shared types for the WSL/conda execution bridge.
//!
//! Leaf crate — no subsystem calls happen here. The bridge crate
//! (`condalink-bridge`) builds on these types to provision environments and
//! drive the worker process.

pub mod config;
pub mod error;
pub mod job;
pub mod wslpath;

pub use config::BridgeConfig;
pub use error::BridgeError;
pub use job::JobDescriptor;
