// src/pipeline/orchestrator.rs
//
// Per-frame wiring:
//   frame → rolling buffer
//   tracked boxes → history → movement sample → direction rule → debounce
//   confirmed ids → begin + accumulate; open but unconfirmed ids → end
//   stale tracks swept
// One instance per stream; frames are processed strictly in order.

use super::frame_report::FrameReport;
use super::metrics::PipelineMetrics;
use crate::analysis::{TrackHistoryStore, ViolationClassifier};
use crate::evidence::{DrainSummary, EvidenceManager};
use crate::types::{
    Frame, SharedFrame, TrackId, TrackedDetection, ViolationConfig, ViolationRecord,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub struct PipelineOrchestrator {
    history: TrackHistoryStore,
    classifier: ViolationClassifier,
    evidence: EvidenceManager,
    frame_width: u32,
    next_frame_index: u64,
    metrics: PipelineMetrics,
}

impl PipelineOrchestrator {
    pub fn new(
        config: &ViolationConfig,
        frame_width: u32,
        evidence: EvidenceManager,
        metrics: PipelineMetrics,
    ) -> Self {
        let classifier = ViolationClassifier::new(config);
        info!(
            "✓ Violation engine ready: width={}px divider={:.0}px threshold={:.1}px P={} H={}",
            frame_width,
            classifier.divider_x(frame_width),
            classifier.noise_threshold(frame_width),
            classifier.persistence_frames(),
            config.history_length
        );
        Self {
            history: TrackHistoryStore::new(config),
            classifier,
            evidence,
            frame_width,
            next_frame_index: 0,
            metrics,
        }
    }

    pub fn process_frame(&mut self, frame: Frame, detections: &[TrackedDetection]) -> FrameReport {
        let frame_index = self.next_frame_index;
        self.next_frame_index += 1;

        let frame: SharedFrame = Arc::new(frame);
        self.evidence.update_buffer(Arc::clone(&frame));

        let mut report = FrameReport::new(frame_index, frame.timestamp_ms);
        let mut seen: HashSet<TrackId> = HashSet::new();
        let mut confirmed: HashSet<TrackId> = HashSet::new();

        for det in detections {
            // A tracker should not repeat an id within a frame; keep the first.
            if !seen.insert(det.track_id) {
                debug!("Frame {}: duplicate track {} ignored", frame_index, det.track_id);
                continue;
            }
            let Some(sample) = self.history.observe(det, frame_index) else {
                continue;
            };
            self.metrics.inc(&self.metrics.movement_samples);

            let instantaneous = self.classifier.instantaneous_violation(
                sample.centroid.0,
                sample.vector,
                self.frame_width,
            );
            if instantaneous {
                self.metrics.inc(&self.metrics.instantaneous_hits);
                debug!(
                    "Potential violation {}: track {} dy={:.2}",
                    self.classifier
                        .side_of(sample.centroid.0, self.frame_width)
                        .as_str(),
                    det.track_id,
                    sample.vector.1
                );
            }

            let Some(track) = self.history.track_mut(det.track_id) else {
                continue;
            };
            if !self.classifier.confirm(track, instantaneous) {
                continue;
            }
            confirmed.insert(det.track_id);

            self.metrics.inc(&self.metrics.confirmed_detections);
            self.evidence.begin(det.track_id, &sample);
            self.evidence.accumulate(det.track_id, &frame);
            report.violations.push(ViolationRecord::from(&sample));
        }

        for track_id in self.evidence.open_track_ids() {
            if confirmed.contains(&track_id) {
                continue;
            }
            match self.evidence.end(track_id) {
                Ok(Some(record)) => report.finalized.push(record),
                Ok(None) => {}
                Err(e) => report.persistence_errors.push(e),
            }
        }

        let swept = self.history.sweep_stale(frame_index);
        self.metrics.add(&self.metrics.stale_tracks_swept, swept as u64);
        self.metrics.inc(&self.metrics.frames_processed);

        report
    }

    /// Stream is over: persist every episode still open.
    pub fn finish(&mut self) -> DrainSummary {
        let open = self.evidence.open_count();
        if open > 0 {
            info!("Stream ended with {} open episode(s), draining", open);
        }
        self.evidence.drain()
    }

    pub fn frames_processed(&self) -> u64 {
        self.next_frame_index
    }

    pub fn active_tracks(&self) -> usize {
        self.history.track_count()
    }

    pub fn evidence(&self) -> &EvidenceManager {
        &self.evidence
    }

    #[cfg(test)]
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::manager::tests::{CountingWriter, RecordingNotifier};
    use crate::types::EvidenceConfig;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    const WIDTH: u32 = 800;

    fn frame(index: u64) -> Frame {
        Frame {
            data: vec![(index % 250) as u8; 8 * 8 * 3],
            width: 8,
            height: 8,
            timestamp_ms: index as f64 * 1000.0 / 30.0,
        }
    }

    fn det(track_id: TrackId, cx: f32, cy: f32) -> TrackedDetection {
        TrackedDetection {
            track_id,
            bbox: [cx - 30.0, cy - 20.0, cx + 30.0, cy + 20.0],
        }
    }

    struct Harness {
        _dir: TempDir,
        pipeline: PipelineOrchestrator,
        writer: CountingWriter,
        notifier: RecordingNotifier,
    }

    fn harness(config: ViolationConfig) -> Harness {
        let dir = TempDir::new().unwrap();
        let evidence_config = EvidenceConfig {
            output_dir: dir.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        let writer = CountingWriter::default();
        let notifier = RecordingNotifier::default();
        let metrics = PipelineMetrics::new();
        let evidence = EvidenceManager::new(
            &evidence_config,
            "CAM-01",
            Box::new(writer.clone()),
            Some(Box::new(notifier.clone())),
            metrics.clone(),
        )
        .unwrap();
        Harness {
            _dir: dir,
            pipeline: PipelineOrchestrator::new(&config, WIDTH, evidence, metrics),
            writer,
            notifier,
        }
    }

    #[test]
    fn test_wrong_way_track_opens_and_closes_episode() {
        let mut h = harness(ViolationConfig::default());

        // Left half, moving up 8px per frame: against the expected flow
        let mut first_confirmed = None;
        for i in 0..12u64 {
            let y = 400.0 - 8.0 * i as f32;
            let report = h.pipeline.process_frame(frame(i), &[det(1, 100.0, y)]);
            if report.is_violating(1) && first_confirmed.is_none() {
                first_confirmed = Some(i);
            }
            assert!(report.finalized.is_empty());
        }
        assert_eq!(first_confirmed, Some(8));
        assert!(h.pipeline.evidence().is_open(1));

        // Vehicle vanishes: episode ends on the very next frame
        let report = h.pipeline.process_frame(frame(12), &[]);
        assert!(report.violations.is_empty());
        assert_eq!(report.finalized.len(), 1);
        assert_eq!(report.finalized[0].track_id, 1);
        assert!(!h.pipeline.evidence().is_open(1));

        // 13 buffered frames + 4 event frames (8..=11)
        let frames = h.writer.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 17);
        assert_eq!(h.notifier.records.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_repeated_track_id_counts_once_per_frame() {
        let mut h = harness(ViolationConfig::default());

        // Same id twice per frame, left half moving up 8px per frame
        let mut first_confirmed = None;
        for i in 0..12u64 {
            let y = 400.0 - 8.0 * i as f32;
            let report = h
                .pipeline
                .process_frame(frame(i), &[det(1, 100.0, y), det(1, 100.0, y)]);
            assert!(report.violations.len() <= 1);
            if report.is_violating(1) && first_confirmed.is_none() {
                first_confirmed = Some(i);
            }
        }
        assert_eq!(first_confirmed, Some(8));

        let report = h.pipeline.process_frame(frame(12), &[]);
        assert_eq!(report.finalized.len(), 1);
        // One accumulated frame per confirmed frame: 13 buffered + 4 event
        assert_eq!(h.writer.frames.lock().unwrap()[0].len(), 17);
    }

    #[test]
    fn test_expected_direction_never_flags() {
        let mut h = harness(ViolationConfig::default());
        for i in 0..40u64 {
            let down = det(1, 100.0, 100.0 + 6.0 * i as f32);
            let up = det(2, 700.0, 600.0 - 6.0 * i as f32);
            let report = h.pipeline.process_frame(frame(i), &[down, up]);
            assert!(!report.has_violations());
        }
        assert_eq!(h.pipeline.evidence().open_count(), 0);
        assert_eq!(h.pipeline.finish(), DrainSummary::default());
    }

    #[test]
    fn test_each_episode_finalized_once() {
        let mut h = harness(ViolationConfig::default());
        for i in 0..20u64 {
            h.pipeline
                .process_frame(frame(i), &[det(5, 650.0, 100.0 + 10.0 * i as f32)]);
        }
        for i in 20..25u64 {
            h.pipeline.process_frame(frame(i), &[]);
        }
        assert_eq!(h.writer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.pipeline.finish().persisted, 0);
        assert_eq!(h.writer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_finish_drains_all_open_episodes() {
        let mut h = harness(ViolationConfig::default());
        for i in 0..15u64 {
            let a = det(1, 100.0, 500.0 - 8.0 * i as f32);
            let b = det(2, 700.0, 100.0 + 8.0 * i as f32);
            h.pipeline.process_frame(frame(i), &[a, b]);
        }
        assert_eq!(h.pipeline.evidence().open_count(), 2);
        assert_eq!(h.writer.calls.load(Ordering::SeqCst), 0);

        let summary = h.pipeline.finish();
        assert_eq!(summary.persisted, 2);
        assert_eq!(h.writer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.pipeline.evidence().open_count(), 0);
        assert_eq!(h.notifier.records.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_violations_are_per_frame_not_cumulative() {
        let mut h = harness(ViolationConfig::default());
        for i in 0..10u64 {
            h.pipeline
                .process_frame(frame(i), &[det(3, 100.0, 500.0 - 8.0 * i as f32)]);
        }
        let report = h
            .pipeline
            .process_frame(frame(10), &[det(4, 700.0, 300.0)]);
        assert!(!report.has_violations());
    }

    #[test]
    fn test_stale_tracks_are_swept() {
        let config = ViolationConfig {
            stale_track_frames: 5,
            ..Default::default()
        };
        let mut h = harness(config);
        h.pipeline.process_frame(frame(0), &[det(1, 10.0, 10.0)]);
        assert_eq!(h.pipeline.active_tracks(), 1);
        for i in 1..=5u64 {
            h.pipeline.process_frame(frame(i), &[]);
        }
        assert_eq!(h.pipeline.active_tracks(), 1);
        h.pipeline.process_frame(frame(6), &[]);
        assert_eq!(h.pipeline.active_tracks(), 0);
        assert_eq!(h.pipeline.metrics().summary().stale_tracks_swept, 1);
    }

    #[test]
    fn test_persistence_error_is_reported_and_retried() {
        let mut h = harness(ViolationConfig::default());
        h.writer.fail.store(true, Ordering::SeqCst);
        for i in 0..10u64 {
            h.pipeline
                .process_frame(frame(i), &[det(1, 100.0, 500.0 - 8.0 * i as f32)]);
        }
        let report = h.pipeline.process_frame(frame(10), &[]);
        assert_eq!(report.persistence_errors.len(), 1);
        assert!(h.pipeline.evidence().is_open(1));

        h.writer.fail.store(false, Ordering::SeqCst);
        let report = h.pipeline.process_frame(frame(11), &[]);
        assert!(report.persistence_errors.is_empty());
        assert_eq!(report.finalized.len(), 1);
        assert!(!h.pipeline.evidence().is_open(1));
    }
}
