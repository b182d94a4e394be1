use std::path::PathBuf;

pub const DEFAULT_TCP_PORT: u16 = 8080;

pub fn data_dir() -> PathBuf {
    // ~/.local/share/mspd/ on every unix, including macOS
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("mspd")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mspd")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("mspd")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mspd")
    }
}

/// Directory holding the status files (`pid`, `station`, `url`, `tag`).
pub fn run_dir() -> PathBuf {
    data_dir().join("run")
}
