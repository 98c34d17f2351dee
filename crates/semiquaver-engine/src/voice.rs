//! Per-note voices
//!
//! A voice owns everything one sounding note needs: oscillator phase
//! state, an optional filter, and an amplitude envelope with absolute-time
//! breakpoints computed once at creation. Evaluation is a pure function of
//! audio time, so a voice can be shipped to the audio thread ahead of its
//! onset and start sample-accurately.

use std::f64::consts::TAU;
use std::fmt;

use fundsp::hacker::{
    bandpass_hz, highpass_hz, lowpass_hz, An, BandpassMode, FixedSvf, Frame, HighpassMode,
    LowpassMode,
};
use semiquaver_core::{
    midi_note_to_hz, EffectSettings, EnvelopeSpec, FilterKind, FilterSpec, InstrumentDefinition,
    Waveform,
};

/// Early-stop fade length
pub(crate) const STOP_RAMP_SECS: f64 = 0.05;
/// Extra time a voice lives past its envelope end before reclamation
pub(crate) const RECLAIM_MARGIN_SECS: f64 = 0.1;

/// Drive into the soft clipper for instruments with distortion
const DISTORTION_DRIVE: f32 = 1.5;

fn ramp(from: f32, to: f32, t0: f64, t1: f64, t: f64) -> f32 {
    if t1 <= t0 {
        return to;
    }
    let progress = (((t - t0) / (t1 - t0)) as f32).clamp(0.0, 1.0);
    from + (to - from) * progress
}

#[derive(Debug, Clone, Copy)]
struct StopRamp {
    at: f64,
    from: f32,
}

/// Four-stage amplitude envelope with absolute breakpoints
///
/// Breakpoints are non-decreasing: a note shorter than attack+decay holds
/// its boundary at the decay end instead of ending mid-ramp.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EnvelopePlan {
    start: f64,
    attack_end: f64,
    decay_end: f64,
    hold_end: f64,
    release_end: f64,
    peak: f32,
    sustain: f32,
    stop: Option<StopRamp>,
}

impl EnvelopePlan {
    pub fn new(spec: &EnvelopeSpec, start: f64, duration_secs: f64, velocity: f32) -> Self {
        let attack_end = start + spec.attack_secs.max(0.0);
        let decay_end = attack_end + spec.decay_secs.max(0.0);
        let hold_end = (start + duration_secs.max(0.0)).max(decay_end);
        let release_end = hold_end + spec.release_secs.max(0.0);
        Self {
            start,
            attack_end,
            decay_end,
            hold_end,
            release_end,
            peak: velocity,
            sustain: spec.sustain_level as f32 * velocity,
            stop: None,
        }
    }

    fn base_value(&self, t: f64) -> f32 {
        if t < self.start {
            0.0
        } else if t < self.attack_end {
            ramp(0.0, self.peak, self.start, self.attack_end, t)
        } else if t < self.decay_end {
            ramp(self.peak, self.sustain, self.attack_end, self.decay_end, t)
        } else if t < self.hold_end {
            self.sustain
        } else {
            ramp(self.sustain, 0.0, self.hold_end, self.release_end, t)
        }
    }

    /// Envelope gain at audio time `t`
    pub fn value(&self, t: f64) -> f32 {
        if let Some(stop) = self.stop {
            if t >= stop.at {
                return ramp(stop.from, 0.0, stop.at, stop.at + STOP_RAMP_SECS, t);
            }
        }
        self.base_value(t)
    }

    /// Replace the remaining plan with a fade to silence starting at `at`
    ///
    /// The fade starts from the value the envelope would have had at `at`,
    /// so repeated stops compose without jumps.
    pub fn schedule_stop(&mut self, at: f64) {
        let from = self.value(at);
        self.stop = Some(StopRamp { at, from });
    }

    pub fn start_time(&self) -> f64 {
        self.start
    }

    /// Time the envelope reaches (and stays at) zero
    pub fn end_time(&self) -> f64 {
        match self.stop {
            Some(stop) => (stop.at + STOP_RAMP_SECS).min(self.release_end),
            None => self.release_end,
        }
    }

    pub fn finished(&self, t: f64) -> bool {
        t > self.end_time() + RECLAIM_MARGIN_SECS
    }
}

#[derive(Debug, Clone)]
struct VoiceOscillator {
    waveform: Waveform,
    frequency_hz: f64,
    gain: f32,
    phase: f64,
}

impl VoiceOscillator {
    fn tick(&mut self, dt: f64) -> f32 {
        let sample = match self.waveform {
            Waveform::Sine => (self.phase * TAU).sin(),
            Waveform::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * self.phase - 1.0,
            Waveform::Triangle => {
                let p = self.phase;
                if p < 0.25 {
                    4.0 * p
                } else if p < 0.75 {
                    2.0 - 4.0 * p
                } else {
                    4.0 * p - 4.0
                }
            }
        };
        self.phase += self.frequency_hz * dt;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        sample as f32 * self.gain
    }
}

/// State-variable filter matching the instrument's FilterSpec
pub(crate) enum VoiceFilter {
    Lowpass(An<FixedSvf<f64, LowpassMode<f64>>>),
    Highpass(An<FixedSvf<f64, HighpassMode<f64>>>),
    Bandpass(An<FixedSvf<f64, BandpassMode<f64>>>),
}

impl VoiceFilter {
    fn new(spec: FilterSpec, sample_rate: u32) -> Self {
        match spec.kind {
            FilterKind::Lowpass => {
                let mut filter = lowpass_hz(spec.cutoff_hz, spec.q);
                filter.set_sample_rate(sample_rate as f64);
                Self::Lowpass(filter)
            }
            FilterKind::Highpass => {
                let mut filter = highpass_hz(spec.cutoff_hz, spec.q);
                filter.set_sample_rate(sample_rate as f64);
                Self::Highpass(filter)
            }
            FilterKind::Bandpass => {
                let mut filter = bandpass_hz(spec.cutoff_hz, spec.q);
                filter.set_sample_rate(sample_rate as f64);
                Self::Bandpass(filter)
            }
        }
    }

    fn tick(&mut self, sample: f32) -> f32 {
        let input = Frame::from([sample]);
        match self {
            Self::Lowpass(filter) => filter.tick(&input)[0],
            Self::Highpass(filter) => filter.tick(&input)[0],
            Self::Bandpass(filter) => filter.tick(&input)[0],
        }
    }
}

/// One sounding note and its owned state
pub(crate) struct Voice {
    pub id: u64,
    oscillators: Vec<VoiceOscillator>,
    filter: Option<VoiceFilter>,
    distortion: bool,
    envelope: EnvelopePlan,
    /// Send routing decided from the settings snapshot at creation
    pub reverb_send: bool,
    pub delay_send: bool,
}

impl fmt::Debug for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("oscillators", &self.oscillators.len())
            .field("end_time", &self.envelope.end_time())
            .finish()
    }
}

impl Voice {
    /// Next output sample at audio time `t`
    ///
    /// Oscillator phases stay idle until the onset so a voice queued ahead
    /// of time begins exactly at its scheduled start.
    pub fn sample(&mut self, t: f64, dt: f64) -> f32 {
        if t < self.envelope.start_time() {
            return 0.0;
        }
        let mut sum = 0.0f32;
        for osc in &mut self.oscillators {
            sum += osc.tick(dt);
        }
        if let Some(filter) = &mut self.filter {
            sum = filter.tick(sum);
        }
        if self.distortion {
            sum = (sum * DISTORTION_DRIVE).tanh();
        }
        sum * self.envelope.value(t)
    }

    pub fn schedule_stop(&mut self, at: f64) {
        self.envelope.schedule_stop(at);
    }

    pub fn finished(&self, t: f64) -> bool {
        self.envelope.finished(t)
    }

    pub fn end_time(&self) -> f64 {
        self.envelope.end_time()
    }

    #[cfg(test)]
    pub fn envelope(&self) -> &EnvelopePlan {
        &self.envelope
    }
}

/// Build the voice graph for one note from its instrument definition
pub(crate) fn build_voice(
    id: u64,
    def: &InstrumentDefinition,
    pitch: u8,
    start_time: f64,
    duration_secs: f64,
    velocity: f32,
    sample_rate: u32,
    settings: &EffectSettings,
) -> Voice {
    let base_hz = midi_note_to_hz(pitch);
    let oscillators = def
        .oscillators
        .iter()
        .map(|spec| VoiceOscillator {
            waveform: spec.waveform,
            frequency_hz: base_hz * spec.detune_ratio(),
            gain: spec.gain,
            phase: 0.0,
        })
        .collect();
    Voice {
        id,
        oscillators,
        filter: def.filter.map(|spec| VoiceFilter::new(spec, sample_rate)),
        distortion: def.distortion,
        envelope: EnvelopePlan::new(&def.envelope, start_time, duration_secs, velocity),
        reverb_send: settings.reverb.enabled,
        delay_send: settings.delay.enabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use semiquaver_core::InstrumentRegistry;

    fn piano_plan(duration_secs: f64, velocity: f32) -> EnvelopePlan {
        let registry = InstrumentRegistry::with_builtins();
        let env = registry.resolve("piano").envelope;
        EnvelopePlan::new(&env, 0.0, duration_secs, velocity)
    }

    #[test]
    fn test_envelope_piano_scenario() {
        // One 4-tick note at 120 BPM is half a second long
        let plan = piano_plan(0.5, 0.8);

        assert_eq!(plan.value(-0.001), 0.0);
        assert_eq!(plan.value(0.0), 0.0);
        assert_relative_eq!(plan.value(0.005), 0.8, max_relative = 1e-6);
        // Decayed to sustain by 0.305s
        assert_relative_eq!(plan.value(0.305), 0.32, max_relative = 1e-6);
        // Holds through the note body
        assert_relative_eq!(plan.value(0.45), 0.32, max_relative = 1e-6);
        // Gone by 1.0s (0.5 hold + 0.5 release)
        assert_eq!(plan.value(1.0001), 0.0);
    }

    #[test]
    fn test_envelope_exact_at_duration_boundary() {
        let plan = piano_plan(0.5, 0.8);
        // Exactly sustain*velocity at the boundary
        assert_eq!(plan.value(0.5), 0.4 * 0.8);
        // Ramping toward zero immediately after
        assert!(plan.value(0.51) < 0.4 * 0.8);
        assert!(plan.value(0.51) > 0.0);
    }

    #[test]
    fn test_envelope_short_note_collapses_hold() {
        // Duration shorter than attack+decay: hold boundary moves to the
        // decay end instead of cutting a ramp short
        let plan = piano_plan(0.1, 1.0);
        assert_eq!(plan.value(0.305), 0.4);
        assert!(plan.value(0.31) < 0.4);
    }

    #[test]
    fn test_envelope_zero_length_phases() {
        let spec = EnvelopeSpec::new(0.0, 0.0, 0.5, 0.0);
        let plan = EnvelopePlan::new(&spec, 1.0, 0.2, 1.0);
        assert_eq!(plan.value(0.999), 0.0);
        // Attack and decay collapse straight to sustain
        assert_eq!(plan.value(1.0), 0.5);
        assert_eq!(plan.value(1.1), 0.5);
        // Zero release drops to silence at the boundary
        assert_eq!(plan.value(1.2), 0.0);
    }

    #[test]
    fn test_stop_ramp_fades_from_current_value() {
        let mut plan = piano_plan(2.0, 1.0);
        plan.schedule_stop(1.0);
        let at_stop = plan.value(1.0);
        assert_relative_eq!(at_stop, 0.4, max_relative = 1e-6);
        // Halfway down the 50ms ramp
        assert_relative_eq!(plan.value(1.025), 0.2, max_relative = 1e-4);
        assert_eq!(plan.value(1.05), 0.0);
        assert!(plan.end_time() <= 1.0 + STOP_RAMP_SECS);
    }

    #[test]
    fn test_finished_after_release_plus_margin() {
        let plan = piano_plan(0.5, 0.8);
        assert!(!plan.finished(1.0));
        assert!(!plan.finished(1.05));
        assert!(plan.finished(1.11));
    }

    #[test]
    fn test_voice_silent_before_start() {
        let registry = InstrumentRegistry::with_builtins();
        let def = registry.resolve("piano");
        let settings = EffectSettings::default();
        let mut voice = build_voice(1, def, 60, 1.0, 0.5, 0.8, 44100, &settings);
        let dt = 1.0 / 44100.0;
        assert_eq!(voice.sample(0.5, dt), 0.0);
        // Produces signal once the onset passes
        let mut heard = false;
        let mut t = 1.0;
        for _ in 0..4410 {
            if voice.sample(t, dt).abs() > 0.01 {
                heard = true;
                break;
            }
            t += dt;
        }
        assert!(heard);
    }

    #[test]
    fn test_send_flags_snapshot_settings() {
        let registry = InstrumentRegistry::with_builtins();
        let def = registry.resolve("piano");
        let mut settings = EffectSettings::default();
        settings.reverb.enabled = true;
        let voice = build_voice(1, def, 60, 0.0, 0.5, 0.8, 44100, &settings);
        assert!(voice.reverb_send);
        assert!(!voice.delay_send);
    }

    #[test]
    fn test_detune_shifts_frequency() {
        use semiquaver_core::OscillatorSpec;
        let def = InstrumentDefinition::new("test", "Test").with_oscillators(vec![
            OscillatorSpec::detuned(Waveform::Sine, 1200.0, 1.0),
        ]);
        let settings = EffectSettings::default();
        let voice = build_voice(1, &def, 69, 0.0, 0.1, 1.0, 44100, &settings);
        assert_relative_eq!(voice.oscillators[0].frequency_hz, 880.0, max_relative = 1e-9);
    }
}
