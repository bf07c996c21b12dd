// src/analysis/track_history.rs
//
// Bounded centroid history per tracker id. The displacement vector is
// taken over the whole window (oldest -> newest), so it grows until the
// window is full and then slides with the track.

use crate::types::{MovementSample, TrackId, TrackedDetection, ViolationConfig};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct TrackState {
    pub track_id: TrackId,
    history: VecDeque<(f32, f32)>,
    capacity: usize,
    /// Consecutive frames with an instantaneous violation
    pub violation_streak: u32,
    pub last_seen_frame: u64,
}

impl TrackState {
    fn new(track_id: TrackId, capacity: usize, frame_index: u64) -> Self {
        Self {
            track_id,
            history: VecDeque::with_capacity(capacity),
            capacity,
            violation_streak: 0,
            last_seen_frame: frame_index,
        }
    }

    fn push(&mut self, centroid: (f32, f32)) {
        if self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(centroid);
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// newest - oldest; None until two points exist
    pub fn displacement(&self) -> Option<(f32, f32)> {
        if self.history.len() < 2 {
            return None;
        }
        let first = self.history.front()?;
        let last = self.history.back()?;
        Some((last.0 - first.0, last.1 - first.1))
    }
}

pub struct TrackHistoryStore {
    tracks: HashMap<TrackId, TrackState>,
    history_length: usize,
    min_history: usize,
    stale_after_frames: u64,
}

impl TrackHistoryStore {
    pub fn new(config: &ViolationConfig) -> Self {
        Self {
            tracks: HashMap::new(),
            history_length: config.history_length.max(1),
            min_history: config.min_history.max(2),
            stale_after_frames: config.stale_track_frames,
        }
    }

    /// Record a sighting of `det.track_id` and return its movement once the
    /// history holds at least `min_history` centroids.
    pub fn observe(&mut self, det: &TrackedDetection, frame_index: u64) -> Option<MovementSample> {
        let track_id = det.track_id;
        let capacity = self.history_length;
        let track = self.tracks.entry(track_id).or_insert_with(|| {
            debug!("New track {} at frame {}", track_id, frame_index);
            TrackState::new(track_id, capacity, frame_index)
        });

        let centroid = det.centroid();
        track.push(centroid);
        track.last_seen_frame = frame_index;

        if track.history_len() < self.min_history {
            return None;
        }

        let vector = track.displacement()?;
        Some(MovementSample {
            track_id,
            bbox: det.bbox,
            centroid,
            vector,
        })
    }

    /// Drop tracks not seen for more than `stale_track_frames` frames.
    pub fn sweep_stale(&mut self, current_frame: u64) -> usize {
        let stale_after = self.stale_after_frames;
        let before = self.tracks.len();
        self.tracks
            .retain(|_, t| current_frame.saturating_sub(t.last_seen_frame) <= stale_after);
        let removed = before - self.tracks.len();
        if removed > 0 {
            debug!(
                "Swept {} stale track(s) at frame {}, {} remain",
                removed,
                current_frame,
                self.tracks.len()
            );
        }
        removed
    }

    #[cfg(test)]
    pub fn track(&self, track_id: TrackId) -> Option<&TrackState> {
        self.tracks.get(&track_id)
    }

    pub fn track_mut(&mut self, track_id: TrackId) -> Option<&mut TrackState> {
        self.tracks.get_mut(&track_id)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}
