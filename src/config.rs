use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Overrides `sink.url` when set.
pub const SINK_URL_ENV: &str = "EVIDENCE_API_URL";

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
        Self::from_yaml(&contents).with_context(|| format!("Invalid config {}", path))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Missing file means built-in defaults; a present but broken file is an error.
    /// Runs before logging is up, so reporting is left to the caller.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(SINK_URL_ENV) {
            if !url.trim().is_empty() {
                self.sink.url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let v = &self.violation;
        if v.history_length < 2 {
            bail!("violation.history_length must be at least 2");
        }
        if v.min_history < 2 || v.min_history > v.history_length {
            bail!(
                "violation.min_history must be in 2..={}, got {}",
                v.history_length,
                v.min_history
            );
        }
        if v.persistence_frames == 0 {
            bail!("violation.persistence_frames must be positive");
        }
        if !(v.noise_threshold_px.is_finite() && v.noise_threshold_px >= 0.0) {
            bail!("violation.noise_threshold_px must be a non-negative number");
        }
        if !(0.0..=1.0).contains(&v.divider_ratio) {
            bail!("violation.divider_ratio must be within [0, 1]");
        }
        if v.reference_width == Some(0) {
            bail!("violation.reference_width must be positive when set");
        }

        let e = &self.evidence;
        if e.buffer_capacity == 0 {
            bail!("evidence.buffer_capacity must be positive");
        }
        if e.clip_fps == 0 {
            bail!("evidence.clip_fps must be positive");
        }
        if e.jpeg_quality == 0 || e.jpeg_quality > 100 {
            bail!("evidence.jpeg_quality must be in 1..=100");
        }
        if e.max_persist_attempts == 0 {
            bail!("evidence.max_persist_attempts must be positive");
        }

        if self.sink.enabled && self.sink.queue_capacity == 0 {
            bail!("sink.queue_capacity must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "violation:\n  persistence_frames: 8\nevidence:\n  jpeg_quality: 70\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.violation.persistence_frames, 8);
        assert_eq!(config.violation.history_length, 30);
        assert_eq!(config.evidence.jpeg_quality, 70);
        assert_eq!(config.evidence.buffer_capacity, 300);
        assert_eq!(config.camera.camera_id, "CAM-01");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.violation.min_history, 5);
        assert!((config.violation.noise_threshold_px - 5.0).abs() < f32::EPSILON);
        assert_eq!(config.sink.url, "http://localhost:8000/violation");
    }

    #[test]
    fn test_rejects_zero_buffer() {
        let yaml = "evidence:\n  buffer_capacity: 0\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_rejects_min_history_above_capacity() {
        let yaml = "violation:\n  history_length: 10\n  min_history: 11\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_present_file_is_loaded_and_validated() {
        let dir = tempfile::TempDir::new().unwrap();
        let good = dir.path().join("good.yaml");
        std::fs::write(&good, "camera:\n  camera_id: CAM-07\n").unwrap();
        let config = Config::load_or_default(good.to_str().unwrap()).unwrap();
        assert_eq!(config.camera.camera_id, "CAM-07");

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "violation:\n  persistence_frames: 0\n").unwrap();
        assert!(Config::load_or_default(bad.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("absent.yaml");
        let config = Config::load_or_default(path.to_str().unwrap()).unwrap();
        assert_eq!(config.evidence.clip_fps, 30);
    }
}
