//! Instrument registry with the builtin bank

use std::collections::HashMap;

use crate::instrument::{
    EnvelopeSpec, FilterSpec, InstrumentDefinition, OscillatorSpec, Waveform,
};

/// Instrument used when a requested id is unknown
pub const DEFAULT_INSTRUMENT: &str = "piano";

/// Read-only id -> definition map
///
/// Lookups never fail: unknown ids resolve to the default instrument so a
/// stale id in a sequence still makes sound.
#[derive(Debug, Clone)]
pub struct InstrumentRegistry {
    instruments: HashMap<String, InstrumentDefinition>,
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl InstrumentRegistry {
    /// Empty registry (the default instrument is still always present)
    pub fn new() -> Self {
        let mut registry = Self {
            instruments: HashMap::new(),
        };
        registry.register(piano());
        registry
    }

    /// Registry preloaded with the builtin bank
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for def in builtin_bank() {
            registry.register(def);
        }
        registry
    }

    /// Add or replace a definition under its id
    pub fn register(&mut self, def: InstrumentDefinition) {
        self.instruments.insert(def.id.clone(), def);
    }

    pub fn get(&self, id: &str) -> Option<&InstrumentDefinition> {
        self.instruments.get(id)
    }

    pub fn default_instrument(&self) -> &InstrumentDefinition {
        // The constructor guarantees this entry exists
        &self.instruments[DEFAULT_INSTRUMENT]
    }

    /// Definition for `id`, falling back to the default instrument
    pub fn resolve(&self, id: &str) -> &InstrumentDefinition {
        self.get(id).unwrap_or_else(|| self.default_instrument())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.instruments.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Ids in sorted order (for host-side listing)
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.instruments.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

fn piano() -> InstrumentDefinition {
    InstrumentDefinition::new("piano", "Piano")
        .with_oscillators(vec![
            OscillatorSpec::new(Waveform::Triangle, 0.7),
            OscillatorSpec::new(Waveform::Sine, 0.3),
        ])
        .with_envelope(EnvelopeSpec::new(0.005, 0.3, 0.4, 0.5))
        .with_filter(FilterSpec::lowpass(5000.0))
}

fn builtin_bank() -> Vec<InstrumentDefinition> {
    vec![
        piano(),
        InstrumentDefinition::new("epiano", "Electric Piano")
            .with_oscillators(vec![
                OscillatorSpec::new(Waveform::Sine, 0.6),
                OscillatorSpec::detuned(Waveform::Sine, 7.0, 0.35),
            ])
            .with_envelope(EnvelopeSpec::new(0.01, 0.4, 0.5, 0.6))
            .with_filter(FilterSpec::lowpass(3500.0)),
        InstrumentDefinition::new("lead", "Synth Lead")
            .with_oscillators(vec![
                OscillatorSpec::new(Waveform::Sawtooth, 0.5),
                OscillatorSpec::detuned(Waveform::Square, -5.0, 0.3),
            ])
            .with_envelope(EnvelopeSpec::new(0.02, 0.1, 0.7, 0.2))
            .with_filter(FilterSpec::bandpass(2500.0, 1.2))
            .with_distortion(),
        InstrumentDefinition::new("bass", "Synth Bass")
            .with_oscillators(vec![
                OscillatorSpec::new(Waveform::Sine, 0.6),
                OscillatorSpec::new(Waveform::Sawtooth, 0.4),
            ])
            .with_envelope(EnvelopeSpec::new(0.008, 0.15, 0.6, 0.2))
            .with_filter(FilterSpec::lowpass(900.0))
            .with_distortion(),
        InstrumentDefinition::new("pluck", "Pluck")
            .with_oscillators(vec![
                OscillatorSpec::new(Waveform::Triangle, 0.8),
                OscillatorSpec::new(Waveform::Square, 0.2),
            ])
            .with_envelope(EnvelopeSpec::new(0.002, 0.18, 0.0, 0.25))
            .with_filter(FilterSpec::lowpass(6000.0)),
        InstrumentDefinition::new("strings", "Strings")
            .with_oscillators(vec![
                OscillatorSpec::detuned(Waveform::Sawtooth, -6.0, 0.45),
                OscillatorSpec::detuned(Waveform::Sawtooth, 6.0, 0.45),
            ])
            .with_envelope(EnvelopeSpec::new(0.25, 0.3, 0.8, 0.8))
            .with_filter(FilterSpec::lowpass(3000.0)),
        InstrumentDefinition::new("bell", "Bell")
            .with_oscillators(vec![
                OscillatorSpec::new(Waveform::Sine, 0.6),
                // Inharmonic upper partial, octave plus a fifth
                OscillatorSpec::detuned(Waveform::Sine, 1902.0, 0.3),
            ])
            .with_envelope(EnvelopeSpec::new(0.002, 1.2, 0.0, 0.8))
            .with_filter(FilterSpec::highpass(400.0)),
    ]
}
