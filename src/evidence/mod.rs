// src/evidence/mod.rs
//
// Evidence capture for confirmed violations:
//   rolling_buffer: pre-event frames, always fed
//   episode: one open violation per track + the metadata record
//   manager: begin / accumulate / end / drain, persistence
//   clip_writer: mp4 clip via OpenCV + JPEG snapshot
//   sink: fire-and-forget HTTP notification

pub mod clip_writer;
pub mod episode;
pub mod manager;
pub mod rolling_buffer;
pub mod sink;

pub use clip_writer::OpenCvMp4Writer;
pub use episode::EvidenceRecord;
pub use manager::{DrainSummary, EvidenceManager};
pub use sink::{EvidenceNotifier, HttpEvidenceSink};
