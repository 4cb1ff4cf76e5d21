//! XDG Base Directory paths for cohorts.
//!
//! The CLI uses XDG locations on every platform so config and database files
//! live in the same place on Linux servers and developer machines.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "cohorts";

/// Get the cohorts config directory.
///
/// Returns `$XDG_CONFIG_HOME/cohorts` if set, otherwise `~/.config/cohorts`.
///
/// # Examples
///
/// ```
/// use cohorts_paths::config_dir;
///
/// let config = config_dir().join("config.toml");
/// ```
pub fn config_dir() -> PathBuf {
    resolve(std::env::var_os("XDG_CONFIG_HOME"), dirs::home_dir(), ".config")
}

/// Get the cohorts data directory.
///
/// Returns `$XDG_DATA_HOME/cohorts` if set, otherwise `~/.local/share/cohorts`.
/// The local campaign database lives here unless configured elsewhere.
pub fn data_dir() -> PathBuf {
    resolve(std::env::var_os("XDG_DATA_HOME"), dirs::home_dir(), ".local/share")
}

/// User config file: `config_dir()/config.toml`.
pub fn user_config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default local database: `data_dir()/cohorts.db`.
pub fn default_database_path() -> PathBuf {
    data_dir().join("cohorts.db")
}

fn resolve(xdg: Option<std::ffi::OsString>, home: Option<PathBuf>, fallback: &str) -> PathBuf {
    match (xdg.filter(|v| !v.is_empty()), home) {
        (Some(base), _) => PathBuf::from(base).join(APP_DIR),
        (None, Some(home)) => home.join(fallback).join(APP_DIR),
        (None, None) => Path::new(fallback).join(APP_DIR),
    }
}
