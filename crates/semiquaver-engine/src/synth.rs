//! Note and drum triggering
//!
//! [`Synth`] is the control-side handle onto a running engine. It owns no
//! audio state itself; every call builds a complete voice and ships it to
//! the rack over the command channel, stamped with a start time on the
//! audio clock so onsets land sample-accurately.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;
use semiquaver_core::{DelayPatch, DrumKind, EffectSettings, InstrumentRegistry, ReverbPatch};
use tracing::debug;

use crate::clock::AudioClock;
use crate::error::{EngineError, Result};
use crate::rack::EngineCommand;
use crate::sampler::{BufferVoice, DrumKit};
use crate::voice::build_voice;

/// Length of an editor preview note
pub const PREVIEW_DURATION_SECS: f64 = 0.3;
/// Velocity used for preview notes and drum pad previews
pub const PREVIEW_VELOCITY: f32 = 0.8;

/// Control-side handle for triggering sound
///
/// Clones share the running engine's state and every method is safe to
/// call from any thread. Scheduling times are seconds on the audio clock;
/// `None` means now.
#[derive(Clone)]
pub struct Synth {
    pub(crate) registry: Arc<InstrumentRegistry>,
    pub(crate) settings: Arc<Mutex<EffectSettings>>,
    pub(crate) master_volume: Arc<Mutex<f32>>,
    pub(crate) kit: Arc<DrumKit>,
    pub(crate) commands: Sender<EngineCommand>,
    pub(crate) clock: Arc<dyn AudioClock>,
    pub(crate) output_active: Arc<AtomicBool>,
    pub(crate) next_voice_id: Arc<AtomicU64>,
    pub(crate) sample_rate: u32,
}

/// Handle to one scheduled note
///
/// Dropping the handle leaves the note playing to its natural end.
#[derive(Debug, Clone)]
pub struct VoiceHandle {
    id: u64,
    commands: Sender<EngineCommand>,
}

impl VoiceHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Fade the note out early, at `at` seconds or immediately
    pub fn stop(&self, at: Option<f64>) {
        let _ = self.commands.send(EngineCommand::StopVoice { id: self.id, at });
    }
}

impl Synth {
    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.output_active.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::AudioUnavailable)
        }
    }

    fn settings_snapshot(&self) -> EffectSettings {
        self.settings.lock().map(|s| *s).unwrap_or_default()
    }

    /// Schedule a pitched note and return a handle for stopping it early
    ///
    /// Unknown instrument ids fall back to the default instrument so a
    /// stale id still makes sound.
    pub fn play_note(
        &self,
        instrument_id: &str,
        pitch: u8,
        start_time: Option<f64>,
        duration_secs: f64,
        velocity: f32,
    ) -> Result<VoiceHandle> {
        self.ensure_active()?;
        let def = match self.registry.get(instrument_id) {
            Some(def) => def,
            None => {
                debug!(instrument = instrument_id, "unknown instrument, using default");
                self.registry.default_instrument()
            }
        };
        let id = self.next_voice_id.fetch_add(1, Ordering::SeqCst);
        let start = start_time.unwrap_or_else(|| self.clock.now());
        let settings = self.settings_snapshot();
        let voice = build_voice(
            id,
            def,
            pitch.min(127),
            start,
            duration_secs.max(0.0),
            velocity.clamp(0.0, 1.0),
            self.sample_rate,
            &settings,
        );
        self.commands
            .send(EngineCommand::StartVoice(Box::new(voice)))
            .map_err(|_| EngineError::AudioUnavailable)?;
        Ok(VoiceHandle {
            id,
            commands: self.commands.clone(),
        })
    }

    /// Short note for auditioning an instrument from an editor
    pub fn play_preview_note(&self, instrument_id: &str, pitch: u8) -> Result<VoiceHandle> {
        self.play_note(
            instrument_id,
            pitch,
            None,
            PREVIEW_DURATION_SECS,
            PREVIEW_VELOCITY,
        )
    }

    /// Schedule a drum hit
    pub fn play_drum(&self, drum: DrumKind, start_time: Option<f64>, velocity: f32) -> Result<()> {
        self.ensure_active()?;
        let start = start_time.unwrap_or_else(|| self.clock.now());
        let settings = self.settings_snapshot();
        let voice = BufferVoice::new(
            self.kit.buffer(drum),
            start,
            velocity.clamp(0.0, 1.0),
            settings.reverb.enabled,
        );
        self.commands
            .send(EngineCommand::StartDrum(voice))
            .map_err(|_| EngineError::AudioUnavailable)
    }

    /// Drum hit for auditioning a pad
    pub fn play_drum_preview(&self, drum: DrumKind) -> Result<()> {
        self.play_drum(drum, None, PREVIEW_VELOCITY)
    }

    /// Metronome click, kept out of the send buses
    pub fn play_metronome_click(&self, start_time: Option<f64>, accent: bool) -> Result<()> {
        self.ensure_active()?;
        let start = start_time.unwrap_or_else(|| self.clock.now());
        let voice = BufferVoice::new(self.kit.click(accent), start, 1.0, false);
        self.commands
            .send(EngineCommand::StartDrum(voice))
            .map_err(|_| EngineError::AudioUnavailable)
    }

    /// Merge a reverb patch and push the result to the audio thread
    pub fn update_reverb(&self, patch: ReverbPatch) {
        if let Ok(mut settings) = self.settings.lock() {
            settings.apply_reverb(patch);
            self.push_settings(*settings);
        }
    }

    /// Merge a delay patch and push the result to the audio thread
    pub fn update_delay(&self, patch: DelayPatch) {
        if let Ok(mut settings) = self.settings.lock() {
            settings.apply_delay(patch);
            self.push_settings(*settings);
        }
    }

    fn push_settings(&self, settings: EffectSettings) {
        // Without a running stream nothing drains the command queue
        if self.output_active.load(Ordering::SeqCst) {
            let _ = self.commands.send(EngineCommand::SetEffects(settings));
        }
    }

    pub fn effect_settings(&self) -> EffectSettings {
        self.settings_snapshot()
    }

    pub fn set_master_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        if let Ok(mut master) = self.master_volume.lock() {
            *master = volume;
        }
        if self.output_active.load(Ordering::SeqCst) {
            let _ = self.commands.send(EngineCommand::SetMasterVolume(volume));
        }
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume.lock().map(|v| *v).unwrap_or(1.0)
    }

    /// Registered instrument ids, sorted
    pub fn instrument_ids(&self) -> Vec<&str> {
        self.registry.ids()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub(crate) fn clock(&self) -> Arc<dyn AudioClock> {
        Arc::clone(&self.clock)
    }
}

/// Synth wired to a manual clock and a bare receiver, no stream needed
#[cfg(test)]
pub(crate) fn test_rig(
    sample_rate: u32,
) -> (
    Synth,
    crossbeam_channel::Receiver<EngineCommand>,
    Arc<crate::clock::ManualClock>,
) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let clock = Arc::new(crate::clock::ManualClock::new());
    let synth = Synth {
        registry: Arc::new(InstrumentRegistry::with_builtins()),
        settings: Arc::new(Mutex::new(EffectSettings::default())),
        master_volume: Arc::new(Mutex::new(0.8)),
        kit: Arc::new(DrumKit::generate(sample_rate)),
        commands: tx,
        clock: clock.clone() as Arc<dyn AudioClock>,
        output_active: Arc::new(AtomicBool::new(true)),
        next_voice_id: Arc::new(AtomicU64::new(1)),
        sample_rate,
    };
    (synth, rx, clock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_note_requires_running_output() {
        let (synth, _rx, _clock) = test_rig(16000);
        synth.output_active.store(false, Ordering::SeqCst);
        assert!(matches!(
            synth.play_note("piano", 60, None, 0.5, 0.8),
            Err(EngineError::AudioUnavailable)
        ));
    }

    #[test]
    fn test_play_note_ships_voice_with_start_time() {
        let (synth, rx, clock) = test_rig(16000);
        clock.set(1.5);
        let handle = synth.play_note("piano", 60, None, 0.5, 0.8).unwrap();
        match rx.try_recv().unwrap() {
            EngineCommand::StartVoice(voice) => {
                assert_eq!(voice.id, handle.id());
                assert_eq!(voice.envelope().start_time(), 1.5);
            }
            _ => panic!("expected StartVoice"),
        }
    }

    #[test]
    fn test_explicit_start_time_wins_over_clock() {
        let (synth, rx, clock) = test_rig(16000);
        clock.set(1.5);
        synth.play_note("piano", 60, Some(3.25), 0.5, 0.8).unwrap();
        match rx.try_recv().unwrap() {
            EngineCommand::StartVoice(voice) => {
                assert_eq!(voice.envelope().start_time(), 3.25);
            }
            _ => panic!("expected StartVoice"),
        }
    }

    #[test]
    fn test_unknown_instrument_still_plays() {
        let (synth, rx, _clock) = test_rig(16000);
        synth.play_note("theremin", 60, None, 0.5, 0.8).unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineCommand::StartVoice(_)
        ));
    }

    #[test]
    fn test_voice_ids_are_unique() {
        let (synth, _rx, _clock) = test_rig(16000);
        let a = synth.play_note("piano", 60, None, 0.1, 0.5).unwrap();
        let b = synth.play_note("piano", 64, None, 0.1, 0.5).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_handle_stop_sends_command() {
        let (synth, rx, _clock) = test_rig(16000);
        let handle = synth.play_note("piano", 60, None, 2.0, 0.8).unwrap();
        let _ = rx.try_recv();
        handle.stop(Some(0.5));
        match rx.try_recv().unwrap() {
            EngineCommand::StopVoice { id, at } => {
                assert_eq!(id, handle.id());
                assert_eq!(at, Some(0.5));
            }
            _ => panic!("expected StopVoice"),
        }
    }

    #[test]
    fn test_update_reverb_merges_and_pushes() {
        let (synth, rx, _clock) = test_rig(16000);
        synth.update_reverb(ReverbPatch {
            enabled: Some(true),
            mix: None,
        });
        assert!(synth.effect_settings().reverb.enabled);
        match rx.try_recv().unwrap() {
            EngineCommand::SetEffects(settings) => assert!(settings.reverb.enabled),
            _ => panic!("expected SetEffects"),
        }
    }

    #[test]
    fn test_settings_not_pushed_while_inactive() {
        let (synth, rx, _clock) = test_rig(16000);
        synth.output_active.store(false, Ordering::SeqCst);
        synth.update_delay(DelayPatch {
            enabled: Some(true),
            ..Default::default()
        });
        // The merge still happens for the next engine start
        assert!(synth.effect_settings().delay.enabled);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drum_and_click_commands() {
        let (synth, rx, _clock) = test_rig(16000);
        synth.play_drum(DrumKind::Snare, Some(0.25), 1.0).unwrap();
        assert!(matches!(rx.try_recv().unwrap(), EngineCommand::StartDrum(_)));
        synth.play_metronome_click(None, true).unwrap();
        assert!(matches!(rx.try_recv().unwrap(), EngineCommand::StartDrum(_)));
    }

    #[test]
    fn test_master_volume_clamped() {
        let (synth, _rx, _clock) = test_rig(16000);
        synth.set_master_volume(1.7);
        assert_eq!(synth.master_volume(), 1.0);
        synth.set_master_volume(-0.2);
        assert_eq!(synth.master_volume(), 0.0);
    }
}
