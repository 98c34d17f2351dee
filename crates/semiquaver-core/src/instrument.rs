//! Instrument definitions interpreted by the synthesizer

use serde::{Deserialize, Serialize};

/// Oscillator waveform shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// One oscillator in an instrument's voice graph
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OscillatorSpec {
    pub waveform: Waveform,
    /// Detune from the note frequency in cents
    pub detune_cents: f32,
    /// Linear gain of this oscillator's contribution
    pub gain: f32,
}

impl OscillatorSpec {
    pub fn new(waveform: Waveform, gain: f32) -> Self {
        Self {
            waveform,
            detune_cents: 0.0,
            gain,
        }
    }

    pub fn detuned(waveform: Waveform, detune_cents: f32, gain: f32) -> Self {
        Self {
            waveform,
            detune_cents,
            gain,
        }
    }

    /// Frequency multiplier for the configured detune
    pub fn detune_ratio(&self) -> f64 {
        2.0_f64.powf(self.detune_cents as f64 / 1200.0)
    }
}

/// Four-stage amplitude envelope parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeSpec {
    pub attack_secs: f64,
    pub decay_secs: f64,
    /// Sustain level as a fraction of peak, 0.0..=1.0
    pub sustain_level: f64,
    pub release_secs: f64,
}

impl EnvelopeSpec {
    pub fn new(attack_secs: f64, decay_secs: f64, sustain_level: f64, release_secs: f64) -> Self {
        Self {
            attack_secs,
            decay_secs,
            sustain_level: sustain_level.clamp(0.0, 1.0),
            release_secs,
        }
    }
}

impl Default for EnvelopeSpec {
    fn default() -> Self {
        Self {
            attack_secs: 0.01,
            decay_secs: 0.1,
            sustain_level: 0.8,
            release_secs: 0.3,
        }
    }
}

/// Filter response shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
}

/// Per-voice filter stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub cutoff_hz: f32,
    /// Resonance (0.707 = no peak)
    pub q: f32,
}

impl FilterSpec {
    pub fn lowpass(cutoff_hz: f32) -> Self {
        Self {
            kind: FilterKind::Lowpass,
            cutoff_hz,
            q: 0.707,
        }
    }

    pub fn highpass(cutoff_hz: f32) -> Self {
        Self {
            kind: FilterKind::Highpass,
            cutoff_hz,
            q: 0.707,
        }
    }

    pub fn bandpass(cutoff_hz: f32, q: f32) -> Self {
        Self {
            kind: FilterKind::Bandpass,
            cutoff_hz,
            q,
        }
    }
}

/// Declarative recipe for building one voice per note
///
/// Oscillators are summed, passed through the optional filter and
/// distortion stage, then scaled by the envelope. Definitions are
/// immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentDefinition {
    pub id: String,
    pub name: String,
    /// Oscillators in summing order
    pub oscillators: Vec<OscillatorSpec>,
    pub envelope: EnvelopeSpec,
    pub filter: Option<FilterSpec>,
    /// Soft-clip the oscillator sum before the envelope
    pub distortion: bool,
}

impl InstrumentDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            oscillators: vec![OscillatorSpec::new(Waveform::Sine, 1.0)],
            envelope: EnvelopeSpec::default(),
            filter: None,
            distortion: false,
        }
    }

    pub fn with_oscillators(mut self, oscillators: Vec<OscillatorSpec>) -> Self {
        self.oscillators = oscillators;
        self
    }

    pub fn with_envelope(mut self, envelope: EnvelopeSpec) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn with_filter(mut self, filter: FilterSpec) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_distortion(mut self) -> Self {
        self.distortion = true;
        self
    }
}
