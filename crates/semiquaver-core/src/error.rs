//! Error types for semiquaver

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SemiquaverError {
    #[error("Pitch out of MIDI range: {0}")]
    InvalidPitch(u8),
    #[error("Velocity must be in (0, 1]: {0}")]
    InvalidVelocity(f32),
    #[error("Note duration must be at least one tick")]
    EmptyDuration,
    #[error("Tick {tick} outside grid of {total} ticks")]
    TickOutOfRange { tick: u64, total: u64 },
}

pub type Result<T> = std::result::Result<T, SemiquaverError>;
