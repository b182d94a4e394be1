//! External player process management.
//!
//! ```text
//!   PlayerManager
//!         ├── children  ← owned handles of players spawned by this daemon
//!         └── store     ← pid list / station / url / tag
//! ```
//!
//! Each player runs in its own process group, so it outlives the daemon and
//! is killed as a unit together with anything it spawned (decoders etc.).
//! `stop_all` also kills pids found in the store that are not owned, which
//! covers players left behind by a previous daemon run.

use crate::store::{StatusStore, StoreError};
use mspd_proto::config::PlayerConfig;
use mspd_proto::protocol::Station;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// How long to wait for a killed child to be reaped.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("Could not start player '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Player '{0}' exited before reporting a pid")]
    NoPid(String),
    #[error("No playable station at index {0}")]
    UnknownStation(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct PlayerManager {
    command: String,
    args: Vec<String>,
    tag_path: PathBuf,
    store: Box<dyn StatusStore>,
    children: Vec<Child>,
}

impl PlayerManager {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        tag_path: PathBuf,
        store: Box<dyn StatusStore>,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            tag_path,
            store,
            children: Vec::new(),
        }
    }

    pub fn from_config(
        config: &PlayerConfig,
        tag_path: PathBuf,
        store: Box<dyn StatusStore>,
    ) -> Self {
        Self::new(config.command.clone(), config.args.clone(), tag_path, store)
    }

    pub fn store(&self) -> &dyn StatusStore {
        self.store.as_ref()
    }

    /// Number of owned player processes.
    pub fn tracked(&self) -> usize {
        self.children.len()
    }

    /// Stop whatever is playing, then start `station`.
    pub async fn play(&mut self, station: &Station) -> Result<u32, PlayerError> {
        self.stop_all().await?;
        self.spawn(station)
    }

    /// Start a player for `station`; `None` is a no-op.
    pub fn start(&mut self, station: Option<&Station>) -> Result<Option<u32>, PlayerError> {
        station.map(|s| self.spawn(s)).transpose()
    }

    /// Spawn `<command> [args] -t <tag-path> <url>` and record it.
    fn spawn(&mut self, station: &Station) -> Result<u32, PlayerError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg("-t")
            .arg(&self.tag_path)
            .arg(&station.url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| PlayerError::Spawn {
            command: self.command.clone(),
            source,
        })?;
        let pid = child
            .id()
            .ok_or_else(|| PlayerError::NoPid(self.command.clone()))?;
        self.children.push(child);
        info!("player: started pid {} for '{}' ({})", pid, station.name, station.url);

        // the process is already running, so the record must be written even
        // if the caller goes away
        self.store.record_playback_start(station, pid)?;
        Ok(pid)
    }

    /// Kill every owned child and every pid in the store, then mark the store
    /// stopped.  Kill failures are logged and skipped; only store errors fail.
    pub async fn stop_all(&mut self) -> Result<(), PlayerError> {
        let stored = self.store.snapshot()?.pids;
        let mut killed = HashSet::new();

        for mut child in self.children.drain(..) {
            if let Some(pid) = child.id() {
                kill_process_group(pid);
                killed.insert(pid);
            }
            let _ = child.start_kill();
            match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => debug!("player: reaped child ({})", status),
                Ok(Err(e)) => warn!("player: wait failed: {}", e),
                Err(_) => warn!("player: child not reaped after {:?}", REAP_TIMEOUT),
            }
        }

        for entry in &stored {
            match entry.trim().parse::<u32>() {
                Ok(pid) if killed.insert(pid) => {
                    info!("player: killing stale pid {}", pid);
                    kill_pid(pid);
                }
                Ok(_) => {}
                Err(_) => debug!("player: skipping unparsable pid entry '{}'", entry),
            }
        }

        self.store.record_playback_stop()?;
        Ok(())
    }
}

/// SIGKILL the process group led by an owned child, falling back to the
/// single process.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Some(pid) = signalable(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions
    if unsafe { libc::kill(-pid, libc::SIGKILL) } != 0 {
        kill_pid_raw(pid);
    }
}

/// SIGKILL a single pid read back from the store.  The pid may have been
/// reused since, so its group is left alone.
#[cfg(unix)]
fn kill_pid(pid: u32) {
    if let Some(pid) = signalable(pid) {
        kill_pid_raw(pid);
    }
}

#[cfg(unix)]
fn kill_pid_raw(pid: libc::pid_t) {
    // SAFETY: as above
    if unsafe { libc::kill(pid, libc::SIGKILL) } != 0 {
        debug!(
            "player: kill {} failed: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

/// 0 and 1 would address our own group or init.
#[cfg(unix)]
fn signalable(pid: u32) -> Option<libc::pid_t> {
    libc::pid_t::try_from(pid).ok().filter(|pid| *pid > 1)
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[cfg(not(unix))]
fn kill_pid(_pid: u32) {}
