//! terraprobe - integration tests for infrastructure-as-code modules
//!
//! This library drives Terraform or OpenTofu through fixed lifecycle paths
//! and asserts on the outputs they record, destroying anything it applied.

pub mod cli;
pub mod commands;
pub mod common;
pub mod testing;
pub mod tool;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use tool::{Options, OutputMap, Tool};
