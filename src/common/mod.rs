//! Common utilities shared by the CLI, the tool driver and the runner

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};
