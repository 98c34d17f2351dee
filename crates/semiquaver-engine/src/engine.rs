//! Engine assembly and lifecycle
//!
//! [`AudioEngine`] prebakes every shared asset at construction: the
//! instrument registry, the drum kit, and the reverb kernel. Starting the
//! engine opens the device stream over the long-lived rack, so stop and
//! start cycle the device without losing control state, and the synth and
//! renderer handles stay valid across restarts.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Sender};
use semiquaver_core::{Arrangement, EffectSettings, InstrumentRegistry, SequenceSource};
use tracing::info;

use crate::audio_io::RealtimeOutputStream;
use crate::clock::{AudioClock, StreamClock};
use crate::effects::{generate_impulse_response, ReverbKernel};
use crate::error::{EngineError, Result};
use crate::rack::{EngineCommand, Rack};
use crate::renderer::{OfflineRenderer, RenderedBuffer};
use crate::sampler::DrumKit;
use crate::scheduler::TransportScheduler;
use crate::synth::Synth;
use crate::wav;

/// Default output sample rate
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_MASTER_VOLUME: f32 = 0.8;

pub struct AudioEngine {
    sample_rate: u32,
    registry: Arc<InstrumentRegistry>,
    kit: Arc<DrumKit>,
    kernel: Arc<ReverbKernel>,
    settings: Arc<Mutex<EffectSettings>>,
    master_volume: Arc<Mutex<f32>>,
    output_active: Arc<AtomicBool>,
    next_voice_id: Arc<AtomicU64>,
    commands: Sender<EngineCommand>,
    rack: Arc<Mutex<Rack>>,
    clock: Arc<StreamClock>,
    stream: Option<RealtimeOutputStream>,
}

impl AudioEngine {
    pub fn new(sample_rate: u32) -> Self {
        let registry = Arc::new(InstrumentRegistry::with_builtins());
        let kit = Arc::new(DrumKit::generate(sample_rate));
        let kernel = Arc::new(ReverbKernel::new(&generate_impulse_response(sample_rate)));
        let settings = EffectSettings::default();
        let frames = Arc::new(AtomicU64::new(0));
        let (commands, receiver) = unbounded();
        let rack = Rack::new(
            receiver,
            Arc::clone(&kernel),
            &settings,
            DEFAULT_MASTER_VOLUME,
            Arc::clone(&frames),
            sample_rate,
        );
        let clock = Arc::new(StreamClock::new(frames, sample_rate));
        info!(sample_rate, "audio engine initialized");
        Self {
            sample_rate,
            registry,
            kit,
            kernel,
            settings: Arc::new(Mutex::new(settings)),
            master_volume: Arc::new(Mutex::new(DEFAULT_MASTER_VOLUME)),
            output_active: Arc::new(AtomicBool::new(false)),
            next_voice_id: Arc::new(AtomicU64::new(1)),
            commands,
            rack: Arc::new(Mutex::new(rack)),
            clock,
            stream: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }

    /// Open the output stream and begin pulling audio from the rack
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        let rack = Arc::clone(&self.rack);
        let stream = RealtimeOutputStream::start(self.sample_rate, move |data, _rate, channels| {
            let Ok(mut rack) = rack.lock() else {
                data.fill(0.0);
                return;
            };
            rack.render(data, channels);
        })?;
        self.output_active.store(true, Ordering::SeqCst);
        // Push current control state so the fresh stream hears it
        let settings = self.settings.lock().map(|s| *s).unwrap_or_default();
        let _ = self.commands.send(EngineCommand::SetEffects(settings));
        let master = self
            .master_volume
            .lock()
            .map(|v| *v)
            .unwrap_or(DEFAULT_MASTER_VOLUME);
        let _ = self.commands.send(EngineCommand::SetMasterVolume(master));
        self.stream = Some(stream);
        Ok(())
    }

    /// Close the output stream; control state survives for the next start
    pub fn stop(&mut self) {
        self.output_active.store(false, Ordering::SeqCst);
        if let Some(stream) = self.stream.take() {
            stream.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Handle for triggering notes and editing effects
    pub fn synth(&self) -> Synth {
        Synth {
            registry: Arc::clone(&self.registry),
            settings: Arc::clone(&self.settings),
            master_volume: Arc::clone(&self.master_volume),
            kit: Arc::clone(&self.kit),
            commands: self.commands.clone(),
            clock: Arc::clone(&self.clock) as Arc<dyn AudioClock>,
            output_active: Arc::clone(&self.output_active),
            next_voice_id: Arc::clone(&self.next_voice_id),
            sample_rate: self.sample_rate,
        }
    }

    /// Clock that all scheduled times are measured on
    pub fn clock(&self) -> Arc<StreamClock> {
        Arc::clone(&self.clock)
    }

    /// Offline renderer sharing this engine's instruments and effects
    pub fn renderer(&self) -> OfflineRenderer {
        OfflineRenderer::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.kit),
            Arc::clone(&self.kernel),
            Arc::clone(&self.settings),
            self.sample_rate,
        )
    }

    /// Transport scheduler over a sequence source
    pub fn create_transport(&self, source: Box<dyn SequenceSource>) -> TransportScheduler {
        TransportScheduler::new(self.synth(), source)
    }

    /// Render one arrangement pass to a buffer
    pub fn render(
        &self,
        arrangement: &Arrangement,
        instrument_id: &str,
        bpm: f64,
    ) -> Result<RenderedBuffer> {
        self.renderer().render(arrangement, instrument_id, bpm)
    }

    /// Render one arrangement pass straight to a WAV file
    pub fn export_wav(
        &self,
        path: impl AsRef<Path>,
        arrangement: &Arrangement,
        instrument_id: &str,
        bpm: f64,
    ) -> Result<()> {
        let buffer = self.render(arrangement, instrument_id, bpm)?;
        wav::write_wav(path, &buffer)
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_work_without_a_stream() {
        let engine = AudioEngine::new(16000);
        assert!(!engine.is_running());
        // Nothing drains the rack until the device stream opens
        assert!(matches!(
            engine.synth().play_preview_note("piano", 60),
            Err(EngineError::AudioUnavailable)
        ));
        // Offline rendering never needs the device
        let buffer = engine
            .render(&Arrangement::default(), "piano", 120.0)
            .unwrap();
        assert_eq!(buffer.duration_secs(), 6.0);
    }

    #[test]
    fn test_transport_requires_running_engine() {
        let engine = AudioEngine::new(16000);
        let mut transport = engine.create_transport(Box::new(Arrangement::default()));
        assert!(matches!(
            transport.play(),
            Err(EngineError::AudioUnavailable)
        ));
    }

    #[test]
    fn test_stop_without_start_is_harmless() {
        let mut engine = AudioEngine::new(16000);
        engine.stop();
        assert!(!engine.is_running());
    }

    #[test]
    fn test_synth_handles_share_state() {
        let engine = AudioEngine::new(16000);
        let a = engine.synth();
        let b = engine.synth();
        a.update_reverb(semiquaver_core::ReverbPatch {
            enabled: Some(true),
            mix: Some(0.5),
        });
        assert!(b.effect_settings().reverb.enabled);
        assert_eq!(b.effect_settings().reverb.mix, 0.5);
    }

    #[test]
    fn test_export_wav_roundtrip() {
        let engine = AudioEngine::new(16000);
        let mut arrangement = Arrangement::default();
        arrangement
            .add_note(semiquaver_core::NoteEvent::new(60, 0, 4, 0.9).unwrap())
            .unwrap();
        arrangement
            .add_drum(semiquaver_core::DrumHit::new(semiquaver_core::DrumKind::Kick, 0, 1.0).unwrap())
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mix.wav");
        engine.export_wav(&path, &arrangement, "piano", 120.0).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<f32> = reader
            .into_samples::<f32>()
            .filter_map(std::result::Result::ok)
            .collect();
        assert_eq!(samples.len(), 6 * 16000);
        assert!(samples.iter().any(|s| s.abs() > 0.1));
    }
}
