use std::path::PathBuf;

pub fn default_timeout_sec() -> u64 {
    900
}

pub fn default_retry_limit() -> u32 {
    2
}

pub fn default_runs_dir() -> PathBuf {
    PathBuf::from("council-runs")
}

pub fn default_ui_bind() -> String {
    "127.0.0.1".to_string()
}

pub fn default_ui_port() -> u16 {
    4747
}

pub fn default_keep_alive_sec() -> u64 {
    300
}

pub fn default_session_ttl_sec() -> u64 {
    1800
}

/// Directory holding `agents.yaml`.
///
/// `COUNCIL_CONFIG_DIR` wins, then `XDG_CONFIG_HOME/council`, then `~/.config/council`.
pub fn default_config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("COUNCIL_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("council");
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".config").join("council");
    }
    PathBuf::from(".council")
}

pub fn default_agents_path() -> PathBuf {
    default_config_dir().join("agents.yaml")
}
