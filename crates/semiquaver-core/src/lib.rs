//! semiquaver-core: Domain types for the semiquaver sequencer engine

mod arrangement;
mod effects;
mod error;
mod instrument;
mod note;
mod registry;
mod transport;

pub use arrangement::{Arrangement, GridConfig, SequenceSource, SharedSequence};
pub use effects::{
    DelayPatch, DelaySettings, EffectSettings, ReverbPatch, ReverbSettings, MAX_DELAY_SECS,
    MAX_FEEDBACK,
};
pub use error::{Result, SemiquaverError};
pub use instrument::{
    EnvelopeSpec, FilterKind, FilterSpec, InstrumentDefinition, OscillatorSpec, Waveform,
};
pub use note::{midi_note_to_hz, DrumHit, DrumKind, NoteEvent};
pub use registry::{InstrumentRegistry, DEFAULT_INSTRUMENT};
pub use transport::{
    clamp_bpm, seconds_per_tick, PlaybackState, Transport, MAX_BPM, MIN_BPM, TICKS_PER_BEAT,
};
