// Error types for the fallible edges of the core: audio output, settings files
// and outbound collaborators. Nothing here is fatal to the host.

use std::io;

use thiserror::Error;

/// Failure reported by an audio output backend.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio output device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("audio backend has shut down")]
    BackendGone,
    #[error("playback rejected: {0}")]
    Rejected(String),
}

/// Failure while reading or writing the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("settings file I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reported by a persistence or notification collaborator.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}
