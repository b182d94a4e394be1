//! Status store: what is playing right now, kept as four line-oriented files.
//!
//! ```text
//!   pid      appended on play, deleted on stop   (empty/absent == stopped)
//!   station  one line, overwritten on play
//!   url      one line, overwritten on play
//!   tag      written by the player, emptied on stop
//! ```
//!
//! The store itself does no locking.  Callers serialise mutations through
//! the `DaemonCore` player lock, which also covers the snapshot reads.

use mspd_proto::protocol::Station;
use mspd_proto::stations::StationRegistry;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

pub const PID_FILE_NAME: &str = "pid";
pub const STATION_FILE_NAME: &str = "station";
pub const URL_FILE_NAME: &str = "url";
pub const TAG_FILE_NAME: &str = "tag";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Could not get station name.")]
    MissingStation,
    #[error("Could not get station url.")]
    MissingUrl,
    #[error("Currently playing station '{name}' ({url}) does not match any station in config.")]
    ConfigMismatch { name: String, url: String },
    #[error("status file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Raw contents of the four status files, one entry per line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub pids: Vec<String>,
    pub station: Vec<String>,
    pub url: Vec<String>,
    pub tag: Vec<String>,
}

impl Snapshot {
    pub fn is_stopped(&self) -> bool {
        self.pids.is_empty()
    }

    /// Registry index of the station being played, 0 when stopped.
    ///
    /// Name and url must both match the entry at the same index; anything
    /// else means the files are out of step with the registry.
    pub fn resolve(&self, registry: &StationRegistry) -> Result<usize, StoreError> {
        if self.is_stopped() {
            return Ok(0);
        }
        let name = first_non_empty(&self.station).ok_or(StoreError::MissingStation)?;
        let url = first_non_empty(&self.url).ok_or(StoreError::MissingUrl)?;
        registry
            .position(name, url)
            .ok_or_else(|| StoreError::ConfigMismatch {
                name: name.to_string(),
                url: url.to_string(),
            })
    }

    /// Last reported tag, empty when stopped or none was written.
    pub fn tag(&self) -> &str {
        if self.is_stopped() {
            return "";
        }
        self.tag.first().map(String::as_str).unwrap_or("")
    }
}

fn first_non_empty(lines: &[String]) -> Option<&str> {
    lines.first().map(String::as_str).filter(|l| !l.is_empty())
}

pub trait StatusStore: Send {
    fn snapshot(&self) -> Result<Snapshot, StoreError>;

    /// Append `pid` to the pid list and overwrite station name and url.
    /// The tag is left to the player.
    fn record_playback_start(&mut self, station: &Station, pid: u32) -> Result<(), StoreError>;

    /// Empty the tag, then drop the pid list.  Fine to call when stopped.
    fn record_playback_stop(&mut self) -> Result<(), StoreError>;
}

// ── file-backed store ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path handed to the player for tag updates.
    pub fn tag_path(&self) -> PathBuf {
        self.dir.join(TAG_FILE_NAME)
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl StatusStore for FileStore {
    fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let pids = read_lines(&self.path(PID_FILE_NAME))?
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .collect();
        Ok(Snapshot {
            pids,
            station: read_lines(&self.path(STATION_FILE_NAME))?,
            url: read_lines(&self.path(URL_FILE_NAME))?,
            tag: read_lines(&self.path(TAG_FILE_NAME))?,
        })
    }

    fn record_playback_start(&mut self, station: &Station, pid: u32) -> Result<(), StoreError> {
        write_line(&self.path(PID_FILE_NAME), &pid.to_string(), true)?;
        write_line(&self.path(STATION_FILE_NAME), &station.name, false)?;
        write_line(&self.path(URL_FILE_NAME), &station.url, false)?;
        Ok(())
    }

    fn record_playback_stop(&mut self) -> Result<(), StoreError> {
        let tag_path = self.tag_path();
        open_for_write(&tag_path, false)?;
        debug!("Cleared {:?}", tag_path);

        let pid_path = self.path(PID_FILE_NAME);
        match std::fs::remove_file(&pid_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                path: pid_path,
                source,
            }),
        }
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content.lines().map(str::to_string).collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn open_for_write(path: &Path, append: bool) -> Result<std::fs::File, StoreError> {
    let mut options = std::fs::OpenOptions::new();
    options.create(true).write(true);
    if append {
        options.append(true);
    } else {
        options.truncate(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o660);
    }
    options.open(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_line(path: &Path, entry: &str, append: bool) -> Result<(), StoreError> {
    debug!("Writing to {:?}: '{}'", path, entry);
    let mut file = open_for_write(path, append)?;
    writeln!(file, "{}", entry).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── in-memory store ───────────────────────────────────────────────────────────

/// Store that keeps the snapshot in memory.  Clones share the same contents,
/// so a test can keep one handle while the daemon owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stand-in for the player writing its tag file.
    pub fn set_tag(&self, tag: &str) {
        let mut snapshot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        snapshot.tag = vec![tag.to_string()];
    }

    pub fn contents(&self) -> Snapshot {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StatusStore for MemoryStore {
    fn snapshot(&self) -> Result<Snapshot, StoreError> {
        Ok(self.contents())
    }

    fn record_playback_start(&mut self, station: &Station, pid: u32) -> Result<(), StoreError> {
        let mut snapshot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        snapshot.pids.push(pid.to_string());
        snapshot.station = vec![station.name.clone()];
        snapshot.url = vec![station.url.clone()];
        Ok(())
    }

    fn record_playback_stop(&mut self) -> Result<(), StoreError> {
        let mut snapshot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        snapshot.tag.clear();
        snapshot.pids.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry() -> StationRegistry {
        StationRegistry::new(vec![
            Station {
                name: "A".into(),
                url: "u1".into(),
            },
            Station {
                name: "B".into(),
                url: "u2".into(),
            },
        ])
    }

    #[test]
    fn test_fresh_directory_reads_as_stopped() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let snapshot = store.snapshot().unwrap();
        assert!(snapshot.is_stopped());
        assert_eq!(snapshot.resolve(&registry()).unwrap(), 0);
        assert_eq!(snapshot.tag(), "");
    }

    #[test]
    fn test_start_appends_pid_and_overwrites_station() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::new(dir.path());
        let reg = registry();

        store.record_playback_start(reg.station_at(1).unwrap(), 100).unwrap();
        store.record_playback_start(reg.station_at(2).unwrap(), 200).unwrap();

        let pid = std::fs::read_to_string(dir.path().join(PID_FILE_NAME)).unwrap();
        assert_eq!(pid, "100\n200\n");
        let station = std::fs::read_to_string(dir.path().join(STATION_FILE_NAME)).unwrap();
        assert_eq!(station, "B\n");
        let url = std::fs::read_to_string(dir.path().join(URL_FILE_NAME)).unwrap();
        assert_eq!(url, "u2\n");
        assert!(!dir.path().join(TAG_FILE_NAME).exists());

        assert_eq!(store.snapshot().unwrap().resolve(&reg).unwrap(), 2);
    }

    #[test]
    fn test_stop_clears_tag_and_removes_pid_file() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::new(dir.path());
        let reg = registry();
        store.record_playback_start(reg.station_at(1).unwrap(), 7).unwrap();
        std::fs::write(store.tag_path(), "Artist - Title\n").unwrap();
        assert_eq!(store.snapshot().unwrap().tag(), "Artist - Title");

        store.record_playback_stop().unwrap();
        assert!(!dir.path().join(PID_FILE_NAME).exists());
        assert_eq!(std::fs::read_to_string(store.tag_path()).unwrap(), "");

        // leftovers in station/url do not matter once the pid list is gone
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.station, vec!["A".to_string()]);
        assert_eq!(snapshot.resolve(&reg).unwrap(), 0);

        store.record_playback_stop().unwrap();
        assert!(store.snapshot().unwrap().is_stopped());
    }

    #[test]
    fn test_mismatched_station_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::new(dir.path());
        store
            .record_playback_start(
                &Station {
                    name: "A".into(),
                    url: "u2".into(),
                },
                1,
            )
            .unwrap();
        let err = store.snapshot().unwrap().resolve(&registry()).unwrap_err();
        assert!(matches!(err, StoreError::ConfigMismatch { .. }));
    }

    #[test]
    fn test_pid_without_station_is_incomplete() {
        let snapshot = Snapshot {
            pids: vec!["12".into()],
            url: vec!["u1".into()],
            ..Default::default()
        };
        assert!(matches!(
            snapshot.resolve(&registry()),
            Err(StoreError::MissingStation)
        ));
    }

    #[test]
    fn test_memory_store_shares_contents() {
        let handle = MemoryStore::new();
        let mut store = handle.clone();
        let reg = registry();
        store.record_playback_start(reg.station_at(2).unwrap(), 5).unwrap();
        handle.set_tag("live");
        assert_eq!(store.snapshot().unwrap().tag(), "live");
        assert_eq!(handle.contents().resolve(&reg).unwrap(), 2);
        store.record_playback_stop().unwrap();
        assert!(handle.contents().is_stopped());
        assert!(handle.contents().tag.is_empty());
    }
}
