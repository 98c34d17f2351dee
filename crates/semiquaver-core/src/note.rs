//! Note and percussion events on the sequencer grid

use serde::{Deserialize, Serialize};

use crate::error::{Result, SemiquaverError};

/// Convert a MIDI note number to its frequency in Hz
///
/// Equal temperament around A4 = 440 Hz (MIDI note 69).
///
/// # Example
/// ```
/// use semiquaver_core::midi_note_to_hz;
/// assert_eq!(midi_note_to_hz(69), 440.0);
/// ```
pub fn midi_note_to_hz(pitch: u8) -> f64 {
    440.0 * 2.0_f64.powf((pitch as f64 - 69.0) / 12.0)
}

/// A single pitched note on the grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// MIDI note number (0-127, 60 = middle C)
    pub pitch: u8,
    /// Start position in ticks (one tick = one sixteenth note)
    pub start_tick: u64,
    /// Duration in ticks, at least 1
    pub duration_ticks: u64,
    /// Velocity in (0.0, 1.0]
    pub velocity: f32,
}

impl NoteEvent {
    pub fn new(pitch: u8, start_tick: u64, duration_ticks: u64, velocity: f32) -> Result<Self> {
        if pitch > 127 {
            return Err(SemiquaverError::InvalidPitch(pitch));
        }
        if duration_ticks == 0 {
            return Err(SemiquaverError::EmptyDuration);
        }
        if !(velocity > 0.0 && velocity <= 1.0) {
            return Err(SemiquaverError::InvalidVelocity(velocity));
        }
        Ok(Self {
            pitch,
            start_tick,
            duration_ticks,
            velocity,
        })
    }

    /// End tick (start + duration)
    pub fn end_tick(&self) -> u64 {
        self.start_tick + self.duration_ticks
    }
}

/// The four percussion voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrumKind {
    Kick,
    Snare,
    HiHat,
    Clap,
}

impl DrumKind {
    pub const ALL: [DrumKind; 4] = [
        DrumKind::Kick,
        DrumKind::Snare,
        DrumKind::HiHat,
        DrumKind::Clap,
    ];
}

/// A percussion hit on the grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrumHit {
    pub drum: DrumKind,
    pub start_tick: u64,
    /// Velocity in (0.0, 1.0]
    pub velocity: f32,
}

impl DrumHit {
    pub fn new(drum: DrumKind, start_tick: u64, velocity: f32) -> Result<Self> {
        if !(velocity > 0.0 && velocity <= 1.0) {
            return Err(SemiquaverError::InvalidVelocity(velocity));
        }
        Ok(Self {
            drum,
            start_tick,
            velocity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_pitch_is_exact() {
        assert_eq!(midi_note_to_hz(69), 440.0);
    }

    #[test]
    fn test_note_to_hz_monotonic() {
        for pitch in 0..127u8 {
            assert!(midi_note_to_hz(pitch) < midi_note_to_hz(pitch + 1));
        }
    }

    #[test]
    fn test_octave_doubles_frequency() {
        let a3 = midi_note_to_hz(57);
        let a4 = midi_note_to_hz(69);
        assert!((a4 / a3 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_note_validation() {
        assert!(NoteEvent::new(60, 0, 4, 0.8).is_ok());
        assert!(matches!(
            NoteEvent::new(200, 0, 4, 0.8),
            Err(SemiquaverError::InvalidPitch(200))
        ));
        assert!(matches!(
            NoteEvent::new(60, 0, 0, 0.8),
            Err(SemiquaverError::EmptyDuration)
        ));
        assert!(NoteEvent::new(60, 0, 4, 0.0).is_err());
        assert!(NoteEvent::new(60, 0, 4, 1.5).is_err());
        // 1.0 is the inclusive upper bound
        assert!(NoteEvent::new(60, 0, 4, 1.0).is_ok());
    }

    #[test]
    fn test_end_tick() {
        let note = NoteEvent::new(64, 12, 4, 0.5).unwrap();
        assert_eq!(note.end_tick(), 16);
    }

    #[test]
    fn test_drum_hit_validation() {
        assert!(DrumHit::new(DrumKind::Kick, 0, 1.0).is_ok());
        assert!(DrumHit::new(DrumKind::Snare, 0, 0.0).is_err());
    }
}
