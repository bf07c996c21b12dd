// src/evidence/episode.rs

use crate::types::{MovementSample, SharedFrame, TrackId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An open violation for one track, from confirmation until it is persisted.
#[derive(Debug, Clone)]
pub struct ViolationEpisode {
    pub episode_id: String,
    pub track_id: TrackId,
    /// Unix seconds at confirmation
    pub start_time: f64,
    pub snapshot_data: MovementSample,
    pub event_frames: Vec<SharedFrame>,
    pub persist_attempts: u32,
}

impl ViolationEpisode {
    pub fn open(track_id: TrackId, sample: MovementSample) -> Self {
        Self {
            episode_id: uuid::Uuid::new_v4().to_string(),
            track_id,
            start_time: unix_seconds_now(),
            snapshot_data: sample,
            event_frames: Vec::new(),
            persist_attempts: 0,
        }
    }
}

pub fn unix_seconds_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// The three files written per episode, side by side.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub clip: PathBuf,
    pub snapshot: PathBuf,
    pub metadata: PathBuf,
}

impl ArtifactPaths {
    pub fn new(output_dir: &Path, episode_id: &str, clip_extension: &str) -> Self {
        let stem = format!("violation_{}", episode_id);
        Self {
            clip: output_dir.join(format!("{}.{}", stem, clip_extension)),
            snapshot: output_dir.join(format!("{}.jpg", stem)),
            metadata: output_dir.join(format!("{}.json", stem)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleData {
    #[serde(rename = "box")]
    pub bbox: [f64; 4],
    pub vector: [f64; 2],
    pub centroid: [f64; 2],
}

/// Metadata file contents, and the body posted to the evidence sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub event_id: String,
    pub timestamp: f64,
    pub track_id: i64,
    pub vehicle_data: VehicleData,
    pub evidence_path: String,
    pub camera_id: String,
}

impl EvidenceRecord {
    pub fn from_episode(episode: &ViolationEpisode, clip_path: &Path, camera_id: &str) -> Self {
        let s = &episode.snapshot_data;
        Self {
            event_id: episode.episode_id.clone(),
            timestamp: portable(episode.start_time),
            track_id: episode.track_id,
            vehicle_data: VehicleData {
                bbox: s.bbox.map(widen),
                vector: [widen(s.vector.0), widen(s.vector.1)],
                centroid: [widen(s.centroid.0), widen(s.centroid.1)],
            },
            evidence_path: clip_path.to_string_lossy().into_owned(),
            camera_id: camera_id.to_string(),
        }
    }
}

fn widen(v: f32) -> f64 {
    portable(v as f64)
}

/// JSON has no NaN/inf; those leaves become 0.0.
fn portable(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MovementSample {
        MovementSample {
            track_id: 42,
            bbox: [80.5, 0.25, 120.5, 20.25],
            centroid: (100.5, 10.25),
            vector: (0.0, -40.0),
        }
    }

    #[test]
    fn test_episode_ids_are_unique() {
        let a = ViolationEpisode::open(1, sample());
        let b = ViolationEpisode::open(1, sample());
        assert_ne!(a.episode_id, b.episode_id);
        assert!(a.start_time > 1_600_000_000.0);
    }

    #[test]
    fn test_record_uses_box_key_and_plain_numbers() {
        let episode = ViolationEpisode::open(42, sample());
        let record = EvidenceRecord::from_episode(&episode, Path::new("/tmp/x.mp4"), "CAM-01");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["track_id"], serde_json::json!(42));
        assert_eq!(json["vehicle_data"]["box"][0], serde_json::json!(80.5));
        assert_eq!(json["vehicle_data"]["vector"][1], serde_json::json!(-40.0));
        assert_eq!(json["evidence_path"], serde_json::json!("/tmp/x.mp4"));
        assert_eq!(json["camera_id"], serde_json::json!("CAM-01"));
        assert!(json["event_id"].is_string());
        assert!(json["timestamp"].is_f64());
    }

    #[test]
    fn test_non_finite_values_are_zeroed() {
        let mut s = sample();
        s.vector = (f32::NAN, f32::INFINITY);
        let episode = ViolationEpisode::open(1, s);
        let record = EvidenceRecord::from_episode(&episode, Path::new("a"), "CAM-01");
        assert_eq!(record.vehicle_data.vector, [0.0, 0.0]);
        assert!(serde_json::to_string(&record).is_ok());
    }

    #[test]
    fn test_artifact_names_share_stem() {
        let paths = ArtifactPaths::new(Path::new("out"), "abc", "mp4");
        assert_eq!(paths.clip, Path::new("out/violation_abc.mp4"));
        assert_eq!(paths.snapshot, Path::new("out/violation_abc.jpg"));
        assert_eq!(paths.metadata, Path::new("out/violation_abc.json"));
    }
}
