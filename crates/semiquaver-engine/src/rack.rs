//! Realtime voice rack
//!
//! The rack lives on the audio thread. It drains queued commands at the
//! top of every callback, renders all live voices against the audio clock,
//! runs the send buses, and publishes the frame counter other threads read
//! the clock from. Everything it needs arrives over the channel, so the
//! callback itself never blocks on a lock it does not own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use semiquaver_core::EffectSettings;

use crate::effects::{BusGains, DelayUnit, ReverbKernel, ReverbUnit};
use crate::sampler::BufferVoice;
use crate::voice::Voice;

/// Synth polyphony before voice stealing kicks in
pub(crate) const MAX_VOICES: usize = 64;
/// Concurrent one-shot drum and click voices
pub(crate) const MAX_DRUM_VOICES: usize = 32;

/// Preallocated scratch length; grows if the host uses bigger callbacks
const DEFAULT_BLOCK: usize = 4096;

/// Messages from control threads into the audio callback
pub(crate) enum EngineCommand {
    StartVoice(Box<Voice>),
    StopVoice { id: u64, at: Option<f64> },
    StartDrum(BufferVoice),
    SetEffects(EffectSettings),
    SetMasterVolume(f32),
}

pub(crate) struct Rack {
    commands: Receiver<EngineCommand>,
    voices: Vec<Voice>,
    drums: Vec<BufferVoice>,
    gains: BusGains,
    delay: DelayUnit,
    reverb: ReverbUnit,
    master: f32,
    frames: Arc<AtomicU64>,
    sample_rate: u32,
    dry: Vec<f32>,
    rev_in: Vec<f32>,
    rev_out: Vec<f32>,
    del_in: Vec<f32>,
    del_out: Vec<f32>,
}

impl Rack {
    pub fn new(
        commands: Receiver<EngineCommand>,
        kernel: Arc<ReverbKernel>,
        settings: &EffectSettings,
        master_volume: f32,
        frames: Arc<AtomicU64>,
        sample_rate: u32,
    ) -> Self {
        Self {
            commands,
            voices: Vec::with_capacity(MAX_VOICES),
            drums: Vec::with_capacity(MAX_DRUM_VOICES),
            gains: BusGains::from_settings(settings),
            delay: DelayUnit::new(sample_rate, &settings.delay),
            reverb: ReverbUnit::new(kernel),
            master: master_volume,
            frames,
            sample_rate,
            dry: vec![0.0; DEFAULT_BLOCK],
            rev_in: vec![0.0; DEFAULT_BLOCK],
            rev_out: vec![0.0; DEFAULT_BLOCK],
            del_in: vec![0.0; DEFAULT_BLOCK],
            del_out: vec![0.0; DEFAULT_BLOCK],
        }
    }

    fn apply_commands(&mut self, now: f64) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                EngineCommand::StartVoice(voice) => self.start_voice(*voice),
                EngineCommand::StopVoice { id, at } => {
                    if let Some(voice) = self.voices.iter_mut().find(|v| v.id == id) {
                        // A stop in the past begins fading now
                        voice.schedule_stop(at.unwrap_or(now).max(now));
                    }
                }
                EngineCommand::StartDrum(drum) => {
                    if self.drums.len() < MAX_DRUM_VOICES {
                        self.drums.push(drum);
                    }
                }
                EngineCommand::SetEffects(settings) => {
                    self.gains = BusGains::from_settings(&settings);
                    self.delay.set_params(&settings.delay);
                }
                EngineCommand::SetMasterVolume(volume) => self.master = volume,
            }
        }
    }

    fn start_voice(&mut self, voice: Voice) {
        if self.voices.len() < MAX_VOICES {
            self.voices.push(voice);
            return;
        }
        // Steal the slot that would fall silent soonest
        if let Some(slot) = self
            .voices
            .iter_mut()
            .min_by(|a, b| a.end_time().total_cmp(&b.end_time()))
        {
            *slot = voice;
        }
    }

    fn ensure_scratch(&mut self, nframes: usize) {
        if self.dry.len() < nframes {
            self.dry.resize(nframes, 0.0);
            self.rev_in.resize(nframes, 0.0);
            self.rev_out.resize(nframes, 0.0);
            self.del_in.resize(nframes, 0.0);
            self.del_out.resize(nframes, 0.0);
        }
    }

    /// Fill an interleaved output buffer and advance the frame counter
    pub fn render(&mut self, data: &mut [f32], channels: u16) {
        let channels = channels.max(1) as usize;
        let nframes = data.len() / channels;
        let start_frame = self.frames.load(Ordering::SeqCst);
        let sr = self.sample_rate as f64;
        let dt = 1.0 / sr;

        self.apply_commands(start_frame as f64 / sr);
        self.ensure_scratch(nframes);

        for i in 0..nframes {
            let t = (start_frame + i as u64) as f64 / sr;
            let mut dry = 0.0f32;
            let mut rev = 0.0f32;
            let mut del = 0.0f32;
            for voice in &mut self.voices {
                let sample = voice.sample(t, dt);
                dry += sample;
                if voice.reverb_send {
                    rev += sample;
                }
                if voice.delay_send {
                    del += sample;
                }
            }
            for drum in &mut self.drums {
                let sample = drum.sample(t);
                dry += sample;
                if drum.reverb_send {
                    rev += sample;
                }
            }
            self.dry[i] = dry;
            self.rev_in[i] = rev;
            self.del_in[i] = del;
        }

        self.reverb
            .process(&self.rev_in[..nframes], &mut self.rev_out[..nframes]);
        self.delay
            .process(&self.del_in[..nframes], &mut self.del_out[..nframes]);

        for i in 0..nframes {
            let mixed = (self.dry[i]
                + self.rev_out[i] * self.gains.reverb
                + self.del_out[i] * self.gains.delay)
                * self.master;
            let clamped = mixed.clamp(-1.0, 1.0);
            for ch in 0..channels {
                data[i * channels + ch] = clamped;
            }
        }

        let end_frame = start_frame + nframes as u64;
        self.frames.store(end_frame, Ordering::SeqCst);

        let t_end = end_frame as f64 / sr;
        self.voices.retain(|voice| !voice.finished(t_end));
        self.drums.retain(|drum| !drum.finished());
    }

    #[cfg(test)]
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::generate_impulse_response;
    use crate::sampler::DrumKit;
    use crate::voice::build_voice;
    use crossbeam_channel::{unbounded, Sender};
    use semiquaver_core::{DrumKind, InstrumentRegistry};

    const SR: u32 = 44100;

    fn test_rack() -> (Sender<EngineCommand>, Rack) {
        let (tx, rx) = unbounded();
        let kernel = Arc::new(ReverbKernel::new(&generate_impulse_response(SR)));
        let rack = Rack::new(
            rx,
            kernel,
            &EffectSettings::default(),
            1.0,
            Arc::new(AtomicU64::new(0)),
            SR,
        );
        (tx, rack)
    }

    fn piano_voice(id: u64, start: f64, duration: f64) -> Voice {
        let registry = InstrumentRegistry::with_builtins();
        build_voice(
            id,
            registry.resolve("piano"),
            60,
            start,
            duration,
            0.8,
            SR,
            &EffectSettings::default(),
        )
    }

    fn peak(data: &[f32]) -> f32 {
        data.iter().fold(0.0, |acc, s| acc.max(s.abs()))
    }

    #[test]
    fn test_renders_queued_voice() {
        let (tx, mut rack) = test_rack();
        tx.send(EngineCommand::StartVoice(Box::new(piano_voice(1, 0.0, 0.5))))
            .unwrap();
        let mut data = vec![0.0f32; 4096 * 2];
        rack.render(&mut data, 2);
        assert!(peak(&data) > 0.05);
        // Interleaved channels carry the same mono mix
        assert_eq!(data[100], data[101]);
    }

    #[test]
    fn test_voice_starts_at_scheduled_time() {
        let (tx, mut rack) = test_rack();
        // Starts one block in the future
        tx.send(EngineCommand::StartVoice(Box::new(piano_voice(
            1,
            4096.0 / SR as f64,
            0.5,
        ))))
        .unwrap();
        let mut first = vec![0.0f32; 4096];
        rack.render(&mut first, 1);
        assert_eq!(peak(&first), 0.0);
        let mut second = vec![0.0f32; 4096];
        rack.render(&mut second, 1);
        assert!(peak(&second) > 0.05);
    }

    #[test]
    fn test_finished_voices_are_reclaimed() {
        let (tx, mut rack) = test_rack();
        tx.send(EngineCommand::StartVoice(Box::new(piano_voice(1, 0.0, 0.01))))
            .unwrap();
        let mut data = vec![0.0f32; 4096];
        rack.render(&mut data, 1);
        assert_eq!(rack.voice_count(), 1);
        // Piano tail ends at 0.805s; render past it plus the reclaim margin
        for _ in 0..10 {
            rack.render(&mut data, 1);
        }
        assert_eq!(rack.voice_count(), 0);
    }

    #[test]
    fn test_stop_command_shortens_note() {
        let (tx, mut rack) = test_rack();
        tx.send(EngineCommand::StartVoice(Box::new(piano_voice(7, 0.0, 4.0))))
            .unwrap();
        let mut data = vec![0.0f32; 4096];
        rack.render(&mut data, 1);
        tx.send(EngineCommand::StopVoice { id: 7, at: None }).unwrap();
        // 0.1s covers the 50ms fade
        for _ in 0..2 {
            rack.render(&mut data, 1);
        }
        rack.render(&mut data, 1);
        assert_eq!(peak(&data), 0.0);
    }

    #[test]
    fn test_voice_stealing_caps_polyphony() {
        let (tx, mut rack) = test_rack();
        for id in 0..(MAX_VOICES as u64 + 8) {
            tx.send(EngineCommand::StartVoice(Box::new(piano_voice(id, 0.0, 2.0))))
                .unwrap();
        }
        let mut data = vec![0.0f32; 64];
        rack.render(&mut data, 1);
        assert_eq!(rack.voice_count(), MAX_VOICES);
    }

    #[test]
    fn test_master_volume_scales_output() {
        let (tx, mut rack) = test_rack();
        tx.send(EngineCommand::StartVoice(Box::new(piano_voice(1, 0.0, 0.5))))
            .unwrap();
        tx.send(EngineCommand::SetMasterVolume(0.0)).unwrap();
        let mut data = vec![0.0f32; 4096];
        rack.render(&mut data, 1);
        assert_eq!(peak(&data), 0.0);
    }

    #[test]
    fn test_drum_voice_plays_once() {
        let (tx, mut rack) = test_rack();
        let kit = DrumKit::generate(SR);
        tx.send(EngineCommand::StartDrum(BufferVoice::new(
            kit.buffer(DrumKind::Kick),
            0.0,
            1.0,
            false,
        )))
        .unwrap();
        let mut data = vec![0.0f32; 8192];
        rack.render(&mut data, 1);
        assert!(peak(&data) > 0.1);
        // Kick is 0.5s; after three more blocks it has ended
        for _ in 0..3 {
            rack.render(&mut data, 1);
        }
        rack.render(&mut data, 1);
        assert_eq!(peak(&data), 0.0);
    }

    #[test]
    fn test_frame_counter_advances() {
        let (_tx, mut rack) = test_rack();
        let frames = Arc::clone(&rack.frames);
        let mut data = vec![0.0f32; 512 * 2];
        rack.render(&mut data, 2);
        assert_eq!(frames.load(Ordering::SeqCst), 512);
        rack.render(&mut data, 2);
        assert_eq!(frames.load(Ordering::SeqCst), 1024);
    }
}
