//! Working-root resolution
//!
//! All durable state (event log, lineage log, vault, index) lives under one
//! working root, resolved with the priority order: CLI argument, environment
//! variable, compiled default.

use crate::Result;
use std::path::PathBuf;

/// Environment variable naming the working root
pub const ROOT_ENV_VAR: &str = "RAGSHIELD_ROOT";

/// Default working root relative to the current directory
pub const DEFAULT_ROOT: &str = "ragshield-data";

/// Resolve the working root folder.
///
/// Priority order:
/// 1. Command-line argument (highest priority)
/// 2. `RAGSHIELD_ROOT` environment variable
/// 3. Compiled default (`./ragshield-data`)
pub fn resolve_working_root(cli_arg: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    Ok(PathBuf::from(DEFAULT_ROOT))
}
