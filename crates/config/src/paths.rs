//! Filesystem locations

use std::path::PathBuf;

/// Data directory (`~/.ravel`, or `./.ravel` without a home directory)
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ravel")
}

/// Default config file
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Default working directory for tools
pub fn workspace_path() -> PathBuf {
    data_dir().join("workspace")
}
