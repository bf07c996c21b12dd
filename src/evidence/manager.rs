// src/evidence/manager.rs
//
// Episode lifecycle per track: NoEpisode -> Open -> Closed.
//
// begin() opens (idempotent), accumulate() appends frames while open,
// end() finalizes and closes. Finalization writes clip, snapshot and
// metadata synchronously; only then is the sink notified. A failed write
// leaves the episode open so the next end() retries it, up to
// `max_persist_attempts`.

use super::clip_writer::{write_snapshot, ClipWriter};
use super::episode::{ArtifactPaths, EvidenceRecord, ViolationEpisode};
use super::rolling_buffer::RollingFrameBuffer;
use super::sink::EvidenceNotifier;
use crate::error::EvidenceError;
use crate::pipeline::metrics::PipelineMetrics;
use crate::types::{EvidenceConfig, MovementSample, SharedFrame, TrackId};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub persisted: usize,
    pub empty: usize,
    pub failed: usize,
}

pub struct EvidenceManager {
    buffer: RollingFrameBuffer,
    active: HashMap<TrackId, ViolationEpisode>,
    output_dir: PathBuf,
    camera_id: String,
    clip_fps: u32,
    jpeg_quality: u8,
    max_persist_attempts: u32,
    writer: Box<dyn ClipWriter>,
    notifier: Option<Box<dyn EvidenceNotifier>>,
    metrics: PipelineMetrics,
}

impl EvidenceManager {
    pub fn new(
        config: &EvidenceConfig,
        camera_id: &str,
        writer: Box<dyn ClipWriter>,
        notifier: Option<Box<dyn EvidenceNotifier>>,
        metrics: PipelineMetrics,
    ) -> Result<Self, EvidenceError> {
        let output_dir = PathBuf::from(&config.output_dir);
        fs::create_dir_all(&output_dir).map_err(|source| EvidenceError::CreateDir {
            path: output_dir.clone(),
            source,
        })?;

        Ok(Self {
            buffer: RollingFrameBuffer::with_capacity(config.buffer_capacity),
            active: HashMap::new(),
            output_dir,
            camera_id: camera_id.to_string(),
            clip_fps: config.clip_fps.max(1),
            jpeg_quality: config.jpeg_quality,
            max_persist_attempts: config.max_persist_attempts.max(1),
            writer,
            notifier,
            metrics,
        })
    }

    /// Feed the pre-event buffer. Once per incoming frame.
    pub fn update_buffer(&mut self, frame: SharedFrame) {
        self.buffer.push(frame);
    }

    /// Open an episode for `track_id`. Returns false if one is already open.
    pub fn begin(&mut self, track_id: TrackId, sample: &MovementSample) -> bool {
        if self.active.contains_key(&track_id) {
            return false;
        }
        let episode = ViolationEpisode::open(track_id, *sample);
        info!(
            "🚨 Violation started: track {} (episode {}), vector=({:.1}, {:.1})",
            track_id, episode.episode_id, sample.vector.0, sample.vector.1
        );
        self.active.insert(track_id, episode);
        self.metrics.inc(&self.metrics.episodes_opened);
        true
    }

    /// Append a frame to the open episode. Never opens one.
    pub fn accumulate(&mut self, track_id: TrackId, frame: &SharedFrame) -> bool {
        match self.active.get_mut(&track_id) {
            Some(episode) => {
                episode.event_frames.push(SharedFrame::clone(frame));
                true
            }
            None => false,
        }
    }

    /// Close the episode for `track_id`, persisting it first.
    ///
    /// `Ok(None)` when nothing was open or the episode had no frames.
    pub fn end(&mut self, track_id: TrackId) -> Result<Option<EvidenceRecord>, EvidenceError> {
        let Some(mut episode) = self.active.remove(&track_id) else {
            return Ok(None);
        };

        match self.finalize(&episode) {
            Ok(record) => Ok(record),
            Err(e) => {
                episode.persist_attempts += 1;
                self.metrics.inc(&self.metrics.persistence_failures);
                if episode.persist_attempts < self.max_persist_attempts {
                    warn!(
                        "Persisting episode {} failed (attempt {}/{}), keeping it open: {}",
                        episode.episode_id,
                        episode.persist_attempts,
                        self.max_persist_attempts,
                        e
                    );
                    self.active.insert(track_id, episode);
                } else {
                    error!(
                        "Giving up on episode {} (track {}) after {} attempts: {}",
                        episode.episode_id, track_id, episode.persist_attempts, e
                    );
                    self.metrics.inc(&self.metrics.episodes_abandoned);
                }
                Err(e)
            }
        }
    }

    /// End every open episode. Used when the stream stops.
    pub fn drain(&mut self) -> DrainSummary {
        let mut summary = DrainSummary::default();
        let mut ids: Vec<TrackId> = self.active.keys().copied().collect();
        ids.sort_unstable();

        for track_id in ids {
            // No retries here: a failure at shutdown drops the episode.
            let Some(episode) = self.active.remove(&track_id) else {
                continue;
            };
            match self.finalize(&episode) {
                Ok(Some(_)) => summary.persisted += 1,
                Ok(None) => summary.empty += 1,
                Err(e) => {
                    summary.failed += 1;
                    self.metrics.inc(&self.metrics.persistence_failures);
                    self.metrics.inc(&self.metrics.episodes_abandoned);
                    error!(
                        "Failed to persist episode {} (track {}) at shutdown: {}",
                        episode.episode_id, track_id, e
                    );
                }
            }
        }

        if summary != DrainSummary::default() {
            info!(
                "Drained open episodes: {} persisted, {} empty, {} failed",
                summary.persisted, summary.empty, summary.failed
            );
        }
        summary
    }

    /// Write clip + snapshot + metadata, then hand the record to the sink.
    fn finalize(
        &self,
        episode: &ViolationEpisode,
    ) -> Result<Option<EvidenceRecord>, EvidenceError> {
        let mut all_frames = self.buffer.snapshot();
        all_frames.extend(episode.event_frames.iter().cloned());

        if all_frames.is_empty() {
            debug!("Episode {} has no frames, nothing to save", episode.episode_id);
            self.metrics.inc(&self.metrics.episodes_empty);
            return Ok(None);
        }

        let paths = ArtifactPaths::new(
            &self.output_dir,
            &episode.episode_id,
            self.writer.extension(),
        );

        let written = self
            .writer
            .write_clip(&paths.clip, &all_frames, self.clip_fps)?;

        let snapshot_frame = episode
            .event_frames
            .first()
            .or_else(|| all_frames.last())
            .ok_or_else(|| EvidenceError::Clip {
                path: paths.snapshot.clone(),
                reason: "no frame for snapshot".to_string(),
            })?;
        write_snapshot(&paths.snapshot, snapshot_frame, self.jpeg_quality)?;

        let record = EvidenceRecord::from_episode(episode, &paths.clip, &self.camera_id);
        write_metadata(&paths.metadata, &record)?;

        self.metrics.inc(&self.metrics.episodes_persisted);
        info!(
            "💾 Evidence saved: {} ({} frames: {} pre-event, {} event)",
            paths.clip.display(),
            written,
            all_frames.len() - episode.event_frames.len(),
            episode.event_frames.len()
        );

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify(&record) {
                self.metrics.inc(&self.metrics.sink_dropped);
                warn!("📡 Evidence sink not notified: {}", e);
            }
        }

        Ok(Some(record))
    }

    #[cfg(test)]
    pub fn is_open(&self, track_id: TrackId) -> bool {
        self.active.contains_key(&track_id)
    }

    pub fn open_track_ids(&self) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = self.active.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn open_count(&self) -> usize {
        self.active.len()
    }

    #[cfg(test)]
    pub fn episode(&self, track_id: TrackId) -> Option<&ViolationEpisode> {
        self.active.get(&track_id)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

fn write_metadata(path: &Path, record: &EvidenceRecord) -> Result<(), EvidenceError> {
    let json = serde_json::to_vec_pretty(record).map_err(|source| EvidenceError::Metadata {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|source| EvidenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}
