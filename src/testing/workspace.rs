//! Per-scenario working directory
//!
//! Scenarios that share a module directory would also share its
//! `.terraform/` directory and state file. With `isolate` set, the module
//! is copied into a private temp dir that lives as long as the workspace.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::common::{Error, Result};

pub struct ScenarioWorkspace {
    dir: PathBuf,
    _temp: Option<TempDir>,
}

impl ScenarioWorkspace {
    pub fn prepare(module_dir: &Path, isolate: bool) -> Result<Self> {
        if !module_dir.is_dir() {
            return Err(Error::Config(format!(
                "Module directory not found: '{}'",
                module_dir.display()
            )));
        }

        if !isolate {
            return Ok(Self {
                dir: module_dir.to_path_buf(),
                _temp: None,
            });
        }

        let temp = tempfile::Builder::new().prefix("terraprobe-").tempdir()?;
        copy_module(module_dir, temp.path())?;
        tracing::debug!(
            from = %module_dir.display(),
            to = %temp.path().display(),
            "Copied module into isolated workspace"
        );

        Ok(Self {
            dir: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Hidden files that pin the module's provider and tool versions
const PINNING_FILES: &[&str] = &[".terraform.lock.hcl", ".terraform-version"];

/// Tool-managed files that must never be shared between workspaces
fn is_tool_state(name: &str) -> bool {
    (name.starts_with('.') && !PINNING_FILES.contains(&name))
        || name.ends_with(".tfstate")
        || name.ends_with(".tfstate.backup")
        || name == "terraform.tfstate.d"
}

/// Copy a module directory, skipping state and hidden entries other than pins
fn copy_module(from: &Path, to: &Path) -> io::Result<()> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        if is_tool_state(&name.to_string_lossy()) {
            continue;
        }

        let target = to.join(&name);
        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&target)?;
            copy_module(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
