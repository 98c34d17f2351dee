//! Offline rendering
//!
//! Renders an arrangement to a mono buffer through the same voice graphs
//! and send buses the realtime rack uses, just driven by a frame counter
//! instead of a device callback. Fresh effect units are built per render,
//! and every sound source is seeded, so the same inputs always produce the
//! same samples.

use std::sync::{Arc, Mutex};

use semiquaver_core::{clamp_bpm, seconds_per_tick, Arrangement, EffectSettings, InstrumentRegistry};

use crate::effects::{BusGains, DelayUnit, ReverbKernel, ReverbUnit};
use crate::error::{EngineError, Result};
use crate::sampler::{BufferVoice, DrumKit};
use crate::voice::{build_voice, Voice};

/// Silence appended after the content so releases and sends ring out
pub(crate) const RENDER_TAIL_SECS: f64 = 2.0;
/// Hard cap on offline render length
const MAX_RENDER_SECS: f64 = 1800.0;
const RENDER_BLOCK: usize = 512;

/// A finished mono render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl RenderedBuffer {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0, |acc, s| acc.max(s.abs()))
    }
}

/// Renders arrangements without touching the audio device
///
/// Shares the instrument registry, drum kit, and reverb kernel with the
/// engine that created it, so offline output matches what playback of the
/// same arrangement sounds like. The master volume is not applied; exports
/// carry full scale and the mix bus still clamps to [-1, 1].
pub struct OfflineRenderer {
    registry: Arc<InstrumentRegistry>,
    kit: Arc<DrumKit>,
    kernel: Arc<ReverbKernel>,
    settings: Arc<Mutex<EffectSettings>>,
    sample_rate: u32,
}

impl OfflineRenderer {
    pub(crate) fn new(
        registry: Arc<InstrumentRegistry>,
        kit: Arc<DrumKit>,
        kernel: Arc<ReverbKernel>,
        settings: Arc<Mutex<EffectSettings>>,
        sample_rate: u32,
    ) -> Self {
        Self {
            registry,
            kit,
            kernel,
            settings,
            sample_rate,
        }
    }

    /// Render one full pass of the arrangement at `bpm`
    pub fn render(
        &self,
        arrangement: &Arrangement,
        instrument_id: &str,
        bpm: f64,
    ) -> Result<RenderedBuffer> {
        let total_ticks = arrangement.grid.total_ticks();
        if total_ticks == 0 {
            return Err(EngineError::RenderFailed(
                "arrangement grid has no ticks".into(),
            ));
        }
        let bpm = clamp_bpm(bpm);
        let content_secs = total_ticks as f64 * seconds_per_tick(bpm);
        self.render_span(arrangement, instrument_id, bpm, content_secs)
    }

    /// Render with an explicit content length instead of the grid length
    ///
    /// Events starting at or past `duration_secs` are dropped; earlier
    /// events may still ring into the tail.
    pub fn render_with_duration(
        &self,
        arrangement: &Arrangement,
        instrument_id: &str,
        bpm: f64,
        duration_secs: f64,
    ) -> Result<RenderedBuffer> {
        self.render_span(arrangement, instrument_id, clamp_bpm(bpm), duration_secs)
    }

    fn render_span(
        &self,
        arrangement: &Arrangement,
        instrument_id: &str,
        bpm: f64,
        content_secs: f64,
    ) -> Result<RenderedBuffer> {
        if !(content_secs > 0.0) {
            return Err(EngineError::RenderFailed(
                "render length must be positive".into(),
            ));
        }
        if content_secs > MAX_RENDER_SECS {
            return Err(EngineError::RenderFailed(format!(
                "render length {content_secs:.1}s exceeds the {MAX_RENDER_SECS:.0}s cap"
            )));
        }
        let spt = seconds_per_tick(bpm);
        let settings = self.settings.lock().map(|s| *s).unwrap_or_default();
        let nframes = ((content_secs + RENDER_TAIL_SECS) * self.sample_rate as f64).ceil() as usize;

        let def = self.registry.resolve(instrument_id);
        let mut voices: Vec<Voice> = Vec::new();
        for (index, note) in arrangement.notes().iter().enumerate() {
            let start = note.start_tick as f64 * spt;
            if start >= content_secs {
                continue;
            }
            voices.push(build_voice(
                index as u64 + 1,
                def,
                note.pitch,
                start,
                note.duration_ticks as f64 * spt,
                note.velocity,
                self.sample_rate,
                &settings,
            ));
        }
        let mut drums: Vec<BufferVoice> = Vec::new();
        for hit in arrangement.drums() {
            let start = hit.start_tick as f64 * spt;
            if start >= content_secs {
                continue;
            }
            drums.push(BufferVoice::new(
                self.kit.buffer(hit.drum),
                start,
                hit.velocity,
                settings.reverb.enabled,
            ));
        }

        let gains = BusGains::from_settings(&settings);
        let mut delay = DelayUnit::new(self.sample_rate, &settings.delay);
        let mut reverb = ReverbUnit::new(Arc::clone(&self.kernel));

        let mut samples = vec![0.0f32; nframes];
        let mut dry = [0.0f32; RENDER_BLOCK];
        let mut rev_in = [0.0f32; RENDER_BLOCK];
        let mut rev_out = [0.0f32; RENDER_BLOCK];
        let mut del_in = [0.0f32; RENDER_BLOCK];
        let mut del_out = [0.0f32; RENDER_BLOCK];

        let sr = self.sample_rate as f64;
        let dt = 1.0 / sr;
        let mut frame = 0usize;
        while frame < nframes {
            let block = RENDER_BLOCK.min(nframes - frame);
            for i in 0..block {
                let t = (frame + i) as f64 / sr;
                let mut dry_sum = 0.0f32;
                let mut rev_sum = 0.0f32;
                let mut del_sum = 0.0f32;
                for voice in &mut voices {
                    let sample = voice.sample(t, dt);
                    dry_sum += sample;
                    if voice.reverb_send {
                        rev_sum += sample;
                    }
                    if voice.delay_send {
                        del_sum += sample;
                    }
                }
                for drum in &mut drums {
                    let sample = drum.sample(t);
                    dry_sum += sample;
                    if drum.reverb_send {
                        rev_sum += sample;
                    }
                }
                dry[i] = dry_sum;
                rev_in[i] = rev_sum;
                del_in[i] = del_sum;
            }
            reverb.process(&rev_in[..block], &mut rev_out[..block]);
            delay.process(&del_in[..block], &mut del_out[..block]);
            for i in 0..block {
                let mixed =
                    dry[i] + rev_out[i] * gains.reverb + del_out[i] * gains.delay;
                samples[frame + i] = mixed.clamp(-1.0, 1.0);
            }
            let t_end = (frame + block) as f64 / sr;
            voices.retain(|voice| !voice.finished(t_end));
            drums.retain(|drum| !drum.finished());
            frame += block;
        }

        Ok(RenderedBuffer {
            samples,
            sample_rate: self.sample_rate,
        })
    }
}
