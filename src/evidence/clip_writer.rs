// src/evidence/clip_writer.rs
//
// Clip and snapshot encoding for evidence.
//
// Clips go through OpenCV's VideoWriter as mp4v/MP4; frames arrive as RGB
// and are converted to BGR on the way in. Snapshots are single JPEGs
// encoded with the `image` crate.

use crate::error::EvidenceError;
use crate::types::{Frame, SharedFrame};
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio::VideoWriter,
};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

pub trait ClipWriter: Send {
    fn extension(&self) -> &'static str;

    /// Encode `frames` in order at `fps`. Returns the number of frames written.
    fn write_clip(
        &self,
        path: &Path,
        frames: &[SharedFrame],
        fps: u32,
    ) -> Result<usize, EvidenceError>;
}

/// Encode an RGB frame to JPEG bytes using the `image` crate.
pub fn encode_rgb_to_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    use image::error::{ParameterError, ParameterErrorKind};
    use image::{ImageBuffer, RgbImage};
    use std::io::Cursor;

    let expected_len = frame.width * frame.height * 3;
    let img: Option<RgbImage> = if frame.data.len() >= expected_len {
        ImageBuffer::from_raw(
            frame.width as u32,
            frame.height as u32,
            frame.data[..expected_len].to_vec(),
        )
    } else {
        None
    };
    let img = img.ok_or_else(|| {
        image::ImageError::Parameter(ParameterError::from_kind(
            ParameterErrorKind::DimensionMismatch,
        ))
    })?;

    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    img.write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}

pub fn write_snapshot(path: &Path, frame: &Frame, quality: u8) -> Result<(), EvidenceError> {
    let jpeg = encode_rgb_to_jpeg(frame, quality).map_err(|source| EvidenceError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, jpeg).map_err(|source| EvidenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// mp4v clips through OpenCV `VideoWriter`.
pub struct OpenCvMp4Writer;

impl OpenCvMp4Writer {
    fn to_bgr(frame: &Frame) -> opencv::Result<Mat> {
        let mut rgb = Mat::new_rows_cols_with_default(
            frame.height as i32,
            frame.width as i32,
            core::CV_8UC3,
            core::Scalar::all(0.0),
        )?;
        let len = frame.width * frame.height * 3;
        rgb.data_bytes_mut()?.copy_from_slice(&frame.data[..len]);

        let mut bgr = Mat::default();
        imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
        Ok(bgr)
    }
}

impl ClipWriter for OpenCvMp4Writer {
    fn extension(&self) -> &'static str {
        "mp4"
    }

    fn write_clip(
        &self,
        path: &Path,
        frames: &[SharedFrame],
        fps: u32,
    ) -> Result<usize, EvidenceError> {
        let clip_err = |reason: String| EvidenceError::Clip {
            path: path.to_path_buf(),
            reason,
        };
        let first = frames
            .first()
            .ok_or_else(|| clip_err("no frames".to_string()))?;
        let (width, height) = (first.width, first.height);

        let fourcc =
            VideoWriter::fourcc('m', 'p', '4', 'v').map_err(|e| clip_err(e.to_string()))?;
        let mut writer = VideoWriter::new(
            &path.to_string_lossy(),
            fourcc,
            fps.max(1) as f64,
            core::Size::new(width as i32, height as i32),
            true,
        )
        .map_err(|e| clip_err(e.to_string()))?;
        if !writer.is_opened().map_err(|e| clip_err(e.to_string()))? {
            return Err(clip_err("VideoWriter failed to open".to_string()));
        }

        let mut written = 0;
        for (i, frame) in frames.iter().enumerate() {
            if frame.width != width
                || frame.height != height
                || frame.data.len() < width * height * 3
            {
                warn!(
                    "Skipping frame {} of {}: {}x{} does not match clip size {}x{}",
                    i,
                    path.display(),
                    frame.width,
                    frame.height,
                    width,
                    height
                );
                continue;
            }
            let bgr = Self::to_bgr(frame).map_err(|e| clip_err(e.to_string()))?;
            writer.write(&bgr).map_err(|e| clip_err(e.to_string()))?;
            written += 1;
        }
        writer.release().map_err(|e| clip_err(e.to_string()))?;

        debug!("Wrote {} frame(s) to {}", written, path.display());
        Ok(written)
    }
}
