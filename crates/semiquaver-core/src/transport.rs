//! Transport state and tick/time conversions

use serde::{Deserialize, Serialize};

/// Slowest allowed tempo
pub const MIN_BPM: f64 = 20.0;
/// Fastest allowed tempo
pub const MAX_BPM: f64 = 300.0;

/// Ticks per beat (a tick is one sixteenth note)
pub const TICKS_PER_BEAT: f64 = 4.0;

/// Clamp a tempo into the supported range
pub fn clamp_bpm(bpm: f64) -> f64 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

/// Duration of one tick in seconds at the given tempo
pub fn seconds_per_tick(bpm: f64) -> f64 {
    60.0 / bpm / TICKS_PER_BEAT
}

/// Transport playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Transport position, tempo, and mode flags
///
/// Position is measured in ticks and may be fractional between dispatches.
/// The scheduler owns the live instance; hosts read cloned snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transport {
    pub state: PlaybackState,
    /// Current position in ticks
    pub position: f64,
    /// Tempo in BPM, kept within [MIN_BPM, MAX_BPM]
    bpm: f64,
    pub loop_enabled: bool,
    pub metronome_enabled: bool,
    pub record_enabled: bool,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            state: PlaybackState::Stopped,
            position: 0.0,
            bpm: 120.0,
            loop_enabled: true,
            metronome_enabled: false,
            record_enabled: false,
        }
    }
}

impl Transport {
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm: clamp_bpm(bpm),
            ..Default::default()
        }
    }

    pub fn play(&mut self) {
        self.state = PlaybackState::Playing;
    }

    pub fn pause(&mut self) {
        self.state = PlaybackState::Paused;
    }

    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.position = 0.0;
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Set tempo, clamping into [MIN_BPM, MAX_BPM]
    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = clamp_bpm(bpm);
    }

    /// Duration of one tick at the current tempo
    pub fn seconds_per_tick(&self) -> f64 {
        seconds_per_tick(self.bpm)
    }

    /// Convert a tick position to seconds from arrangement start
    pub fn position_to_secs(&self, position: f64) -> f64 {
        position * self.seconds_per_tick()
    }

    /// Convert seconds from arrangement start to a tick position
    pub fn secs_to_position(&self, secs: f64) -> f64 {
        secs / self.seconds_per_tick()
    }
}
