//! Centralized environment-variable access, mirroring the fallback style of
//! the teacher's `oj_daemon::env` (each accessor owns one variable's name,
//! parsing, and default).

use std::path::PathBuf;

/// `$TEUTHD_CONFIG` overrides the default on-disk config overlay path.
pub fn config_path_override() -> Option<PathBuf> {
    std::env::var_os("TEUTHD_CONFIG").map(PathBuf::from)
}

/// Default config overlay path when no override is set: `<state_dir>/dispatcher.toml`.
pub fn default_config_path() -> PathBuf {
    state_dir().join("dispatcher.toml")
}

/// `$TEUTHD_STATE_DIR` > `$XDG_STATE_HOME/teuthd` > `~/.local/state/teuthd`.
pub fn state_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("TEUTHD_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(xdg) = std::env::var_os("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("teuthd");
    }
    let home = std::env::var_os("HOME").unwrap_or_else(|| "/tmp".into());
    PathBuf::from(home).join(".local/state/teuthd")
}

/// `$TEUTHD_LOCK_SERVER_URL` fallback for the machine-lease HTTP endpoint.
pub fn lock_server_url_override() -> Option<String> {
    std::env::var("TEUTHD_LOCK_SERVER_URL").ok()
}

/// `$TEUTHD_QUEUE_ADDR` fallback for the beanstalk backend's TCP address.
pub fn queue_addr_override() -> Option<String> {
    std::env::var("TEUTHD_QUEUE_ADDR").ok()
}
