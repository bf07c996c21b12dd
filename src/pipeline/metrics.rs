// src/pipeline/metrics.rs
//
// Counters shared between the frame loop and the sink worker.
// Cloning shares the same counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub frames_processed: Arc<AtomicU64>,
    pub movement_samples: Arc<AtomicU64>,
    pub instantaneous_hits: Arc<AtomicU64>,
    pub confirmed_detections: Arc<AtomicU64>,
    pub stale_tracks_swept: Arc<AtomicU64>,
    pub episodes_opened: Arc<AtomicU64>,
    pub episodes_persisted: Arc<AtomicU64>,
    pub episodes_empty: Arc<AtomicU64>,
    pub persistence_failures: Arc<AtomicU64>,
    pub episodes_abandoned: Arc<AtomicU64>,
    pub sink_sent: Arc<AtomicU64>,
    pub sink_failed: Arc<AtomicU64>,
    pub sink_dropped: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            frames_processed: Arc::new(AtomicU64::new(0)),
            movement_samples: Arc::new(AtomicU64::new(0)),
            instantaneous_hits: Arc::new(AtomicU64::new(0)),
            confirmed_detections: Arc::new(AtomicU64::new(0)),
            stale_tracks_swept: Arc::new(AtomicU64::new(0)),
            episodes_opened: Arc::new(AtomicU64::new(0)),
            episodes_persisted: Arc::new(AtomicU64::new(0)),
            episodes_empty: Arc::new(AtomicU64::new(0)),
            persistence_failures: Arc::new(AtomicU64::new(0)),
            episodes_abandoned: Arc::new(AtomicU64::new(0)),
            sink_sent: Arc::new(AtomicU64::new(0)),
            sink_failed: Arc::new(AtomicU64::new(0)),
            sink_dropped: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn fps(&self) -> f64 {
        let frames = Self::get(&self.frames_processed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            frames_processed: Self::get(&self.frames_processed),
            fps: self.fps(),
            movement_samples: Self::get(&self.movement_samples),
            instantaneous_hits: Self::get(&self.instantaneous_hits),
            confirmed_detections: Self::get(&self.confirmed_detections),
            stale_tracks_swept: Self::get(&self.stale_tracks_swept),
            episodes_opened: Self::get(&self.episodes_opened),
            episodes_persisted: Self::get(&self.episodes_persisted),
            episodes_empty: Self::get(&self.episodes_empty),
            persistence_failures: Self::get(&self.persistence_failures),
            episodes_abandoned: Self::get(&self.episodes_abandoned),
            sink_sent: Self::get(&self.sink_sent),
            sink_failed: Self::get(&self.sink_failed),
            sink_dropped: Self::get(&self.sink_dropped),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub frames_processed: u64,
    pub fps: f64,
    pub movement_samples: u64,
    pub instantaneous_hits: u64,
    pub confirmed_detections: u64,
    pub stale_tracks_swept: u64,
    pub episodes_opened: u64,
    pub episodes_persisted: u64,
    pub episodes_empty: u64,
    pub persistence_failures: u64,
    pub episodes_abandoned: u64,
    pub sink_sent: u64,
    pub sink_failed: u64,
    pub sink_dropped: u64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let metrics = PipelineMetrics::new();
        let worker_view = metrics.clone();
        worker_view.inc(&worker_view.sink_sent);
        metrics.add(&metrics.frames_processed, 3);
        let summary = metrics.summary();
        assert_eq!(summary.sink_sent, 1);
        assert_eq!(summary.frames_processed, 3);
    }
}
