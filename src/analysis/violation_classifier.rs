// src/analysis/violation_classifier.rs
//
// Direction rule + persistence debounce.
//
// Image coordinates: y grows downward. Left of the divider traffic is
// expected to move down (dy > 0), right of it up (dy < 0). A track moving
// against that by more than the noise threshold is an instantaneous
// violation; P consecutive ones confirm it. Any clean frame resets.

use super::track_history::TrackState;
use crate::types::ViolationConfig;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneSide {
    /// Expected flow: downward
    Left,
    /// Expected flow: upward
    Right,
}

impl LaneSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViolationClassifier {
    divider_ratio: f32,
    noise_threshold_px: f32,
    reference_width: Option<u32>,
    persistence_frames: u32,
}

impl ViolationClassifier {
    pub fn new(config: &ViolationConfig) -> Self {
        Self {
            divider_ratio: config.divider_ratio,
            noise_threshold_px: config.noise_threshold_px,
            reference_width: config.reference_width,
            persistence_frames: config.persistence_frames.max(1),
        }
    }

    pub fn persistence_frames(&self) -> u32 {
        self.persistence_frames
    }

    pub fn divider_x(&self, frame_width: u32) -> f32 {
        frame_width as f32 * self.divider_ratio
    }

    pub fn side_of(&self, centroid_x: f32, frame_width: u32) -> LaneSide {
        if centroid_x < self.divider_x(frame_width) {
            LaneSide::Left
        } else {
            LaneSide::Right
        }
    }

    /// Noise threshold for this resolution.
    pub fn noise_threshold(&self, frame_width: u32) -> f32 {
        match self.reference_width {
            Some(reference) if reference > 0 => {
                self.noise_threshold_px * frame_width as f32 / reference as f32
            }
            _ => self.noise_threshold_px,
        }
    }

    /// Single-frame verdict, before debouncing.
    pub fn instantaneous_violation(
        &self,
        centroid_x: f32,
        vector: (f32, f32),
        frame_width: u32,
    ) -> bool {
        let dy = vector.1;
        let threshold = self.noise_threshold(frame_width);
        match self.side_of(centroid_x, frame_width) {
            LaneSide::Left => dy < -threshold,
            LaneSide::Right => dy > threshold,
        }
    }

    /// Update the track's streak; true once it has reached P.
    pub fn confirm(&self, track: &mut TrackState, instantaneous: bool) -> bool {
        if !instantaneous {
            track.violation_streak = 0;
            return false;
        }

        track.violation_streak = track.violation_streak.saturating_add(1);
        if track.violation_streak == self.persistence_frames {
            debug!(
                "Track {} confirmed after {} consecutive frames",
                track.track_id, track.violation_streak
            );
        }
        track.violation_streak >= self.persistence_frames
    }
}
