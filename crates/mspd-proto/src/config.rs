use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::platform;
use super::protocol::Station;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub volume: VolumeConfig,
    #[serde(default)]
    pub stations: StationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Directory for the status files.  Created on startup.
    #[serde(default = "platform::run_dir")]
    pub run_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Player executable, invoked as `<command> -t <tag-file> <url>`.
    #[serde(default = "default_player_command")]
    pub command: String,
    /// Arguments placed before `-t`, e.g. a script for an interpreter.
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Volume executable: no args prints the volume, `set|inc|dec <n>` changes it.
    #[serde(default = "default_volume_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl VolumeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Station catalogue.  `available` maps short names to stations; `selected`
/// lists the short names that make up the playable registry, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationsConfig {
    #[serde(default)]
    pub selected: Vec<String>,
    #[serde(default)]
    pub available: BTreeMap<String, Station>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            run_dir: platform::run_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: default_player_command(),
            args: Vec::new(),
        }
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            command: default_volume_command(),
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for StationsConfig {
    fn default() -> Self {
        let mut available = BTreeMap::new();
        available.insert(
            "fip".to_string(),
            Station {
                name: "FIP".to_string(),
                url: "http://icecast.radiofrance.fr/fip-midfi.mp3".to_string(),
            },
        );
        available.insert(
            "dlf".to_string(),
            Station {
                name: "Deutschlandfunk".to_string(),
                url: "https://st01.sslstream.dlf.de/dlf/01/128/mp3/stream.mp3".to_string(),
            },
        );
        Self {
            selected: vec!["fip".to_string(), "dlf".to_string()],
            available,
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::DEFAULT_TCP_PORT
}

fn default_player_command() -> String {
    "play-stream".to_string()
}

fn default_volume_command() -> String {
    "chvol".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

impl Config {
    /// Load the config at `config_path`, writing defaults if absent.
    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            info!("Wrote default config to {:?}", config_path);
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.volume.timeout(), Duration::from_secs(5));
        assert!(config.daemon.run_dir.ends_with("mspd/run"));
        for name in &config.stations.selected {
            assert!(config.stations.available.contains_key(name));
        }
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [player]
            command = "/usr/local/bin/player"

            [stations]
            selected = ["a"]

            [stations.available.a]
            name = "Alpha"
            url = "http://alpha"
            "#,
        )
        .unwrap();
        assert_eq!(config.player.command, "/usr/local/bin/player");
        assert_eq!(config.volume.command, "chvol");
        assert!(config.player.args.is_empty());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.stations.available["a"].name, "Alpha");
    }
}
