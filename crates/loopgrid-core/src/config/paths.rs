//! Standard locations for loopgrid files

use std::path::PathBuf;

const APP_DIR: &str = "loopgrid";

/// Per-user configuration directory
///
/// Returns: `$XDG_CONFIG_HOME/loopgrid` (or the platform equivalent), falling
/// back to `./loopgrid` when no config directory is known.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Default path of the engine preferences file
pub fn default_config_path() -> PathBuf {
    config_dir().join("engine.yaml")
}

/// Default directory for saved projects
///
/// Returns: `~/Music/loopgrid`
pub fn default_project_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_layout() {
        let path = default_config_path();
        assert!(path.ends_with("loopgrid/engine.yaml"));
    }

    #[test]
    fn test_project_dir_ends_with_app_name() {
        assert!(default_project_dir().ends_with(APP_DIR));
    }
}
