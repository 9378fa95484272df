//! Checkpoint load/save (spec §4.7, §6): a JSON snapshot of all process
//! state, written atomically via write-temp-then-rename.

use crate::model::{AggregatorState, Observation, ProducerLiveness, StationBucket};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// On-disk shape, matching the field names in spec §6 exactly (camelCase,
/// predating this crate's own naming conventions).
#[derive(Serialize, Deserialize)]
struct CheckpointFile {
    #[serde(rename = "weatherDataMap")]
    weather_data_map: HashMap<String, Vec<Observation>>,
    #[serde(rename = "serverTimestampMap")]
    server_timestamp_map: HashMap<String, u64>,
    #[serde(rename = "mostRecentStationId")]
    most_recent_station_id: Option<String>,
    #[serde(rename = "latestPutTimestamp")]
    latest_put_timestamp: u64,
    #[serde(rename = "lamportTime")]
    lamport_time: u64,
}

fn system_time_to_epoch_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn epoch_ms_to_system_time(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

/// Loads a checkpoint from `path`. Absent file or parse error both resolve
/// to fresh empty state rather than aborting startup (spec §4.7 step 1).
pub fn load(path: &Path, expiry_window: Duration) -> AggregatorState {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            tracing::info!(path = %path.display(), error = %e, "no checkpoint loaded, starting empty");
            return AggregatorState::new(expiry_window);
        }
    };

    let file: CheckpointFile = match serde_json::from_slice(&bytes) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "checkpoint parse failed, starting empty");
            return AggregatorState::new(expiry_window);
        }
    };

    let buckets = file
        .weather_data_map
        .into_iter()
        .map(|(station, observations)| (station, StationBucket::from_sorted(observations)))
        .collect();

    let liveness = ProducerLiveness::from_map(
        file.server_timestamp_map
            .into_iter()
            .map(|(producer, ms)| (producer, epoch_ms_to_system_time(ms)))
            .collect(),
    );

    let most_recent = file
        .most_recent_station_id
        .map(|station| (station, file.latest_put_timestamp));

    tracing::info!(path = %path.display(), "checkpoint restored");
    AggregatorState::restore(file.lamport_time, buckets, liveness, most_recent, expiry_window)
}

/// Snapshots `state` to `path` via write-temp-then-rename (spec §9:
/// "not truncating writes").
pub fn save(path: &Path, state: &AggregatorState) -> std::io::Result<()> {
    let weather_data_map = state
        .buckets
        .iter()
        .map(|(station, bucket)| (station.clone(), bucket.iter().cloned().collect()))
        .collect();

    let server_timestamp_map = state
        .liveness
        .iter()
        .map(|(producer, seen)| (producer.clone(), system_time_to_epoch_ms(*seen)))
        .collect();

    let (most_recent_station_id, latest_put_timestamp) = match &state.most_recent {
        Some((station, t)) => (Some(station.clone()), *t),
        None => (None, 0),
    };

    let file = CheckpointFile {
        weather_data_map,
        server_timestamp_map,
        most_recent_station_id,
        latest_put_timestamp,
        lamport_time: state.clock.current(),
    };

    let bytes = serde_json::to_vec_pretty(&file)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Briefly locks `state`, clones what's needed, then serializes outside the
/// lock (spec §4.7: "takes the state mutex just long enough to clone the
/// maps").
pub fn checkpoint_once(
    path: &Path,
    state: &parking_lot::Mutex<AggregatorState>,
) -> std::io::Result<()> {
    let snapshot = {
        let guard = state.lock();
        clone_for_snapshot(&guard)
    };
    save(path, &snapshot)
}

fn clone_for_snapshot(state: &AggregatorState) -> AggregatorState {
    AggregatorState::restore(
        state.clock.current(),
        state.buckets.clone(),
        state.liveness.clone(),
        state.most_recent.clone(),
        state.expiry_window,
    )
}
