use crate::player::{PlayerError, PlayerManager};
use crate::store::{FileStore, StoreError};
use crate::volume::VolumeControl;
use mspd_proto::config::Config;
use mspd_proto::protocol::Status;
use mspd_proto::stations::StationRegistry;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Everything a request can touch.  Built once at startup and shared by all
/// connections behind an `Arc`.
///
/// The player lock is the single critical section for playback: every
/// start/stop sequence and every store snapshot runs while holding it, so a
/// reader never sees the files halfway through an update and two `play`
/// requests cannot interleave their writes.
pub struct DaemonCore {
    registry: StationRegistry,
    player: Mutex<PlayerManager>,
    volume: VolumeControl,
}

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("No stations configured.")]
    NoStations,
    #[error(transparent)]
    Status(StoreError),
    #[error(transparent)]
    Player(#[from] PlayerError),
}

/// Station index and tag as found in the store, without the volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub station_id: usize,
    pub tag: String,
}

impl DaemonCore {
    pub fn new(registry: StationRegistry, player: PlayerManager, volume: VolumeControl) -> Self {
        Self {
            registry,
            player: Mutex::new(player),
            volume,
        }
    }

    /// Build the core from configuration: registry from the station table,
    /// file store in the run directory.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let registry = StationRegistry::from_config(&config.stations)?;
        info!(
            "Loaded {} stations ({} available)",
            registry.station_count() - 1,
            config.stations.available.len()
        );

        std::fs::create_dir_all(&config.daemon.run_dir)?;
        let store = FileStore::new(&config.daemon.run_dir);
        info!("Status files in {:?}", store.dir());

        let player = PlayerManager::from_config(&config.player, store.tag_path(), Box::new(store));
        let volume = VolumeControl::from_config(&config.volume);
        Ok(Self::new(registry, player, volume))
    }

    pub fn registry(&self) -> &StationRegistry {
        &self.registry
    }

    pub fn volume(&self) -> &VolumeControl {
        &self.volume
    }

    pub async fn now_playing(&self) -> Result<NowPlaying, StoreError> {
        let snapshot = self.player.lock().await.store().snapshot()?;
        let station_id = snapshot.resolve(&self.registry)?;
        Ok(NowPlaying {
            station_id,
            tag: snapshot.tag().to_string(),
        })
    }

    /// Full status.  The volume is queried after the lock is released; if
    /// that fails the volume reads as -1.
    pub async fn status(&self) -> Result<Status, StoreError> {
        let now = self.now_playing().await?;
        if now.station_id == 0 {
            return Ok(Status::stopped());
        }
        let volume = match self.volume.get().await {
            Ok(v) => v,
            Err(e) => {
                warn!("Could not read volume: {}", e);
                -1
            }
        };
        Ok(Status {
            volume,
            curr_station_id: now.station_id,
            tag: now.tag,
        })
    }

    /// Stop the current player and start the playable station at `index`.
    pub async fn play(&self, index: usize) -> Result<u32, PlayerError> {
        let station = self
            .registry
            .playable_at(index)
            .ok_or(PlayerError::UnknownStation(index))?;
        let pid = self.player.lock().await.play(station).await?;
        info!("Playing {} '{}' as pid {}", index, station.name, pid);
        Ok(pid)
    }

    /// Move `delta` stations from the one playing now and play the result.
    /// Reading the current station and restarting happen under one lock.
    pub async fn step(&self, delta: i64) -> Result<usize, StepError> {
        let mut player = self.player.lock().await;
        let current_id = player
            .store()
            .snapshot()
            .and_then(|snapshot| snapshot.resolve(&self.registry))
            .map_err(StepError::Status)?;
        let new_id = step_station(current_id, self.registry.station_count(), delta)
            .ok_or(StepError::NoStations)?;
        let station = self
            .registry
            .playable_at(new_id)
            .ok_or(PlayerError::UnknownStation(new_id))?;
        let pid = player.play(station).await?;
        info!(
            "Station change by {} from {} to {} '{}' as pid {}",
            delta, current_id, new_id, station.name, pid
        );
        Ok(new_id)
    }

    pub async fn stop(&self) -> Result<(), PlayerError> {
        self.player.lock().await.stop_all().await?;
        info!("Playback stopped");
        Ok(())
    }
}

/// New registry index after moving `delta` stations from `current_id`.
///
/// Index 0 is the sentinel, so the arithmetic runs on `id - 1` modulo the
/// number of playable stations and shifts back afterwards.  From the stopped
/// state (`current_id == 0`) `next` lands on 1.  `None` when nothing is
/// playable.
pub fn step_station(current_id: usize, station_count: usize, delta: i64) -> Option<usize> {
    let length = station_count.checked_sub(1).filter(|l| *l > 0)? as i64;
    let current = current_id as i64 - 1;
    let new_id = (current + delta).rem_euclid(length);
    Some(new_id as usize + 1)
}
