//! Error types for the engine crate

use thiserror::Error;

use crate::audio_io::AudioOutputError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Output(#[from] AudioOutputError),
    #[error("Audio output is not running")]
    AudioUnavailable,
    #[error("Audio output is already running")]
    AlreadyRunning,
    #[error("Render failed: {0}")]
    RenderFailed(String),
    #[error("WAV export failed: {0}")]
    Export(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
