// src/video_processor.rs
//
// Frame sources. Capture is outside the engine; these adapters only turn
// a directory of images, or a video file / stream read through OpenCV, into
// an ordered sequence of RGB frames.

use crate::types::Frame;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub trait FrameSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn fps(&self) -> f64;
    /// Next frame in stream order, `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Open `source`: a directory means an image sequence, anything else goes
/// to OpenCV.
pub fn open_source(source: &str, fallback_fps: f64) -> Result<Box<dyn FrameSource>> {
    let path = Path::new(source);
    if path.is_dir() {
        return Ok(Box::new(ImageSequenceSource::open(path, fallback_fps)?));
    }
    Ok(Box::new(opencv_source::VideoReader::open(source, fallback_fps)?))
}

// ============================================================================
// IMAGE SEQUENCE
// ============================================================================

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "ppm"];

pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    next: usize,
    width: u32,
    height: u32,
    fps: f64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, fps: f64) -> Result<Self> {
        let files = find_image_files(dir);
        let first = files
            .first()
            .with_context(|| format!("No image frames found in {}", dir.display()))?;
        let (width, height) = image::image_dimensions(first)
            .with_context(|| format!("Failed to read {}", first.display()))?;

        info!(
            "Image sequence: {} frame(s), {}x{} @ {:.1} FPS from {}",
            files.len(),
            width,
            height,
            fps,
            dir.display()
        );

        Ok(Self {
            files,
            next: 0,
            width,
            height,
            fps: if fps > 0.0 { fps } else { 30.0 },
        })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.files.len()
    }
}

impl FrameSource for ImageSequenceSource {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        let index = self.next;
        self.next += 1;

        let rgb = image::open(path)
            .with_context(|| format!("Failed to decode frame {}", path.display()))?
            .to_rgb8();
        if rgb.width() != self.width || rgb.height() != self.height {
            warn!(
                "Frame {} is {}x{}, stream is {}x{}",
                path.display(),
                rgb.width(),
                rgb.height(),
                self.width,
                self.height
            );
        }

        Ok(Some(Frame {
            width: rgb.width() as usize,
            height: rgb.height() as usize,
            data: rgb.into_raw(),
            timestamp_ms: index as f64 * 1000.0 / self.fps,
        }))
    }
}

fn find_image_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

// ============================================================================
// OPENCV VIDEO
// ============================================================================

mod opencv_source {
    use super::FrameSource;
    use crate::types::Frame;
    use anyhow::Result;
    use opencv::{
        core::Mat,
        imgproc,
        prelude::*,
        videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
    };
    use tracing::info;

    pub struct VideoReader {
        cap: VideoCapture,
        fps: f64,
        current_frame: u64,
        width: i32,
        height: i32,
    }

    impl VideoReader {
        pub fn open(source: &str, fallback_fps: f64) -> Result<Self> {
            info!("Opening video: {}", source);

            let cap = VideoCapture::from_file(source, videoio::CAP_ANY)?;
            if !cap.is_opened()? {
                anyhow::bail!("Could not open video source: {}", source);
            }

            let reported_fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
            let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
            let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
            let fps = if reported_fps > 0.0 {
                reported_fps
            } else {
                fallback_fps
            };

            info!("Video properties: {}x{} @ {:.1} FPS", width, height, fps);

            Ok(Self {
                cap,
                fps,
                current_frame: 0,
                width,
                height,
            })
        }
    }

    impl FrameSource for VideoReader {
        fn width(&self) -> u32 {
            self.width.max(0) as u32
        }

        fn height(&self) -> u32 {
            self.height.max(0) as u32
        }

        fn fps(&self) -> f64 {
            self.fps
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            let mut mat = Mat::default();
            if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
                return Ok(None);
            }

            let timestamp_ms = (self.current_frame as f64 / self.fps) * 1000.0;
            self.current_frame += 1;

            let mut rgb_mat = Mat::default();
            imgproc::cvt_color(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)?;
            let data = rgb_mat.data_bytes()?.to_vec();

            Ok(Some(Frame {
                data,
                width: rgb_mat.cols() as usize,
                height: rgb_mat.rows() as usize,
                timestamp_ms,
            }))
        }
    }
}
