//! fcprobe CLI configuration stored at `~/.fcprobe/`.
//!
//! The verification policy is read from a JSON file; every section is
//! optional. Config file resolution (highest priority first):
//! 1. Explicit `--config` flag (or `FCPROBE_CONFIG`)
//! 2. `~/.fcprobe/config.json`, if it exists
//! 3. Built-in defaults
//!
//! The kubeconfig resolution chain (highest priority first):
//! 1. Explicit `--kubeconfig` flag
//! 2. `FCPROBE_KUBECONFIG` environment variable
//! 3. Fall back to kube default (`KUBECONFIG` env / `~/.kube/config`)

use std::path::{Path, PathBuf};

use fcprobe_common::VerifyConfig;
use tracing::debug;

use crate::{Error, Result};

const CONFIG_DIR_NAME: &str = ".fcprobe";
const CONFIG_FILE_NAME: &str = "config.json";
const FCPROBE_KUBECONFIG_ENV: &str = "FCPROBE_KUBECONFIG";

/// Returns `~/.fcprobe/`, if the home directory is known.
pub fn fcprobe_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME))
}

/// Path to `~/.fcprobe/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    fcprobe_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Load the verification policy.
///
/// An explicit path must exist; the default path is only used when present.
pub fn load_verify_config(explicit: Option<&Path>) -> Result<VerifyConfig> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::ConfigNotFound {
                    path: path.to_path_buf(),
                });
            }
            read_config(path)
        }
        None => match default_config_path() {
            Some(path) if path.exists() => read_config(&path),
            _ => Ok(VerifyConfig::default()),
        },
    }
}

fn read_config(path: &Path) -> Result<VerifyConfig> {
    debug!(path = %path.display(), "Loading config file");
    let data = std::fs::read_to_string(path)
        .map_err(|e| Error::command_failed(format!("failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&data)
        .map_err(|e| Error::validation(format!("failed to parse {}: {}", path.display(), e)))
}

/// Resolve a kubeconfig path using the priority chain.
///
/// Returns `Some(path)` if a kubeconfig is selected, `None` to use kube
/// defaults.
pub fn resolve_kubeconfig(explicit: Option<&str>) -> Option<PathBuf> {
    resolve_kubeconfig_from(explicit, std::env::var(FCPROBE_KUBECONFIG_ENV).ok())
}

fn resolve_kubeconfig_from(explicit: Option<&str>, env: Option<String>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    env.filter(|path| !path.is_empty()).map(PathBuf::from)
}
