// src/pipeline/frame_report.rs
//
// Everything one frame produced: the confirmed violations for the overlay
// (this frame only, not cumulative), the episodes that were persisted, and
// any persistence failures, which the caller must surface.

use crate::error::EvidenceError;
use crate::evidence::EvidenceRecord;
use crate::types::ViolationRecord;

#[derive(Debug)]
pub struct FrameReport {
    pub frame_index: u64,
    pub timestamp_ms: f64,
    pub violations: Vec<ViolationRecord>,
    pub finalized: Vec<EvidenceRecord>,
    pub persistence_errors: Vec<EvidenceError>,
}

impl FrameReport {
    pub fn new(frame_index: u64, timestamp_ms: f64) -> Self {
        Self {
            frame_index,
            timestamp_ms,
            violations: Vec::new(),
            finalized: Vec::new(),
            persistence_errors: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    #[cfg(test)]
    pub fn is_violating(&self, track_id: i64) -> bool {
        self.violations.iter().any(|v| v.track_id == track_id)
    }
}
