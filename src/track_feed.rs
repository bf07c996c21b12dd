// src/track_feed.rs
//
// Tracker output as JSON lines, one line per frame:
//   {"frame": 12, "detections": [{"box": [x1, y1, x2, y2], "track_id": 7}, ...]}
// Frames without a line have no detections. Detections the tracker did not
// assign an id to are dropped here.

use crate::types::{TrackId, TrackedDetection};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct FeedLine {
    frame: u64,
    #[serde(default)]
    detections: Vec<FeedDetection>,
}

#[derive(Debug, Deserialize)]
struct FeedDetection {
    #[serde(rename = "box")]
    bbox: [f32; 4],
    track_id: Option<TrackId>,
}

pub struct TrackFeed<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
    pending: Option<FeedLine>,
    last_frame: Option<u64>,
    exhausted: bool,
}

impl TrackFeed<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open track feed {}", path.display()))?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> TrackFeed<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            pending: None,
            last_frame: None,
            exhausted: false,
        }
    }

    /// Detections for `frame_index`. Must be called with non-decreasing
    /// frame indices; lines for frames already passed are skipped.
    pub fn detections_for(&mut self, frame_index: u64) -> Result<Vec<TrackedDetection>> {
        loop {
            if self.pending.is_none() {
                match self.read_line()? {
                    Some(line) => self.pending = Some(line),
                    None => return Ok(Vec::new()),
                }
            }

            let Some(line) = self.pending.take() else {
                return Ok(Vec::new());
            };
            if line.frame > frame_index {
                self.pending = Some(line);
                return Ok(Vec::new());
            }
            if line.frame < frame_index {
                debug!("Skipping track feed line for past frame {}", line.frame);
                continue;
            }
            return Ok(into_detections(line));
        }
    }

    fn read_line(&mut self) -> Result<Option<FeedLine>> {
        while !self.exhausted {
            let Some(raw) = self.lines.next() else {
                self.exhausted = true;
                break;
            };
            self.line_no += 1;
            let raw =
                raw.with_context(|| format!("Failed to read track feed line {}", self.line_no))?;
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }

            let line: FeedLine = serde_json::from_str(trimmed)
                .with_context(|| format!("Malformed track feed line {}", self.line_no))?;
            if let Some(last) = self.last_frame {
                if line.frame <= last {
                    warn!(
                        "Track feed line {} repeats or rewinds frame {} (last {}), ignored",
                        self.line_no, line.frame, last
                    );
                    continue;
                }
            }
            self.last_frame = Some(line.frame);
            return Ok(Some(line));
        }
        Ok(None)
    }
}

fn into_detections(line: FeedLine) -> Vec<TrackedDetection> {
    line.detections
        .into_iter()
        .filter_map(|d| {
            d.track_id.map(|track_id| TrackedDetection {
                track_id,
                bbox: d.bbox,
            })
        })
        .collect()
}
