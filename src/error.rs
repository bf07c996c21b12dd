// src/error.rs
//
// Persistence failures and sink failures are kept apart: the first one
// keeps an episode open, the second one is only ever logged.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("failed to create evidence directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode image for {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode clip {}: {reason}", .path.display())]
    Clip { path: PathBuf, reason: String },

    #[error("failed to serialize metadata {}: {source}", .path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("notification queue full, record {0} dropped")]
    QueueFull(String),

    #[error("notification worker stopped, record {0} dropped")]
    Closed(String),

    #[error("evidence sink returned {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("evidence sink request failed: {0}")]
    Transport(#[from] reqwest::Error),
}
