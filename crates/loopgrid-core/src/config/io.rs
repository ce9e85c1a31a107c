//! YAML file I/O for any serde type
//!
//! [`load_config`] never fails: a missing or broken file falls back to
//! defaults, with the parse error logged.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load a YAML file, falling back to `T::default()` when it is missing or bad
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("load_config: {:?} not found, using defaults", path);
        return T::default();
    }

    match read_yaml(path) {
        Ok(config) => {
            log::info!("load_config: loaded {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("load_config: {:#}, using defaults", e);
            T::default()
        }
    }
}

/// Read and parse a YAML file
fn read_yaml<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let contents = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_yaml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))
}

/// Write `value` as YAML, creating parent directories as needed
pub fn save_config<T>(value: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(value).context("Failed to serialize to YAML")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {:?}", path))?;

    log::info!("save_config: saved {:?}", path);
    Ok(())
}
