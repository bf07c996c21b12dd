use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub violation: ViolationConfig,
    pub evidence: EvidenceConfig,
    pub sink: SinkConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub camera_id: String,
    /// Image-sequence directory, or a video file / stream URL with `opencv`
    pub source: String,
    /// JSON-lines tracker output, one object per frame
    pub tracks: String,
    /// Used when the source cannot report its own frame rate
    pub fps: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            camera_id: "CAM-01".to_string(),
            source: "input_frames".to_string(),
            tracks: "tracks.jsonl".to_string(),
            fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViolationConfig {
    /// Max centroids kept per track (H)
    pub history_length: usize,
    /// Observations needed before a displacement vector is produced
    pub min_history: usize,
    /// Consecutive instantaneous hits needed to confirm (P)
    pub persistence_frames: u32,
    /// Minimum |dy| in pixels over the history window
    pub noise_threshold_px: f32,
    /// Divider position as a fraction of frame width
    pub divider_ratio: f32,
    /// When set, `noise_threshold_px` is scaled by frame_width / reference_width
    pub reference_width: Option<u32>,
    /// Tracks unseen for this many frames are dropped
    pub stale_track_frames: u64,
}

impl Default for ViolationConfig {
    fn default() -> Self {
        Self {
            history_length: 30,
            min_history: 5,
            persistence_frames: 5,
            noise_threshold_px: 5.0,
            divider_ratio: 0.5,
            reference_width: None,
            stale_track_frames: 90, // 3s at 30fps
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    pub output_dir: String,
    /// Pre-event frames kept in the rolling buffer
    pub buffer_capacity: usize,
    pub clip_fps: u32,
    /// Snapshot JPEG quality
    pub jpeg_quality: u8,
    pub max_persist_attempts: u32,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            output_dir: "output_evidence".to_string(),
            buffer_capacity: 300, // 10s at 30fps
            clip_fps: 30,
            jpeg_quality: 85,
            max_persist_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub enabled: bool,
    pub url: String,
    pub timeout_secs: u64,
    pub queue_capacity: usize,
    pub shutdown_grace_secs: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:8000/violation".to_string(),
            timeout_secs: 5,
            queue_capacity: 64,
            shutdown_grace_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Stable identity assigned by the external multi-object tracker.
pub type TrackId = i64;

/// RGB8 frame. Immutable once read; buffers share it through [`SharedFrame`].
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp_ms: f64,
}

pub type SharedFrame = Arc<Frame>;

/// One tracked box as delivered by the tracker. Untracked boxes never get here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedDetection {
    pub track_id: TrackId,
    pub bbox: [f32; 4], // [x1, y1, x2, y2] pixels
}

impl TrackedDetection {
    pub fn centroid(&self) -> (f32, f32) {
        (
            (self.bbox[0] + self.bbox[2]) * 0.5,
            (self.bbox[1] + self.bbox[3]) * 0.5,
        )
    }
}

/// Per-frame movement of a track over its history window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementSample {
    pub track_id: TrackId,
    pub bbox: [f32; 4],
    pub centroid: (f32, f32),
    pub vector: (f32, f32),
}

/// A confirmed violation on the current frame, for the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViolationRecord {
    pub track_id: TrackId,
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
    pub vector: (f32, f32),
    pub centroid: (f32, f32),
}

impl From<&MovementSample> for ViolationRecord {
    fn from(sample: &MovementSample) -> Self {
        Self {
            track_id: sample.track_id,
            bbox: sample.bbox,
            vector: sample.vector,
            centroid: sample.centroid,
        }
    }
}
