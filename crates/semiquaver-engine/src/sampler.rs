//! Prebaked percussion buffers
//!
//! Drum hits and metronome clicks are short one-shot sounds, so they are
//! rendered once at startup into shared buffers and played back by cursor.
//! Noise sources use fixed seeds, which keeps every kit generation and
//! every offline render bit-identical.

use std::f64::consts::TAU;
use std::sync::Arc;

use semiquaver_core::DrumKind;

const SNARE_SEED: u64 = 1001;
const HIHAT_SEED: u64 = 1002;
const CLAP_SEED: u64 = 1003;

const KICK_SECS: f64 = 0.5;
const KICK_BASE_HZ: f64 = 40.0;
const KICK_PITCH_DECAY: f64 = 0.03;
const KICK_AMP_DECAY: f64 = 0.25;

const SNARE_SECS: f64 = 0.3;
const SNARE_NOISE_HZ: f64 = 1500.0;

const HIHAT_SECS: f64 = 0.15;
const HIHAT_HP_HZ: f64 = 6000.0;

const CLAP_SECS: f64 = 0.3;
const CLAP_BAND_HZ: f64 = 1100.0;
const CLAP_BURST_OFFSETS_MS: [f64; 5] = [0.0, 10.0, 20.0, 30.0, 40.0];
const CLAP_BURST_LEVEL: f64 = 0.9;

const CLICK_SECS: f64 = 0.03;
const CLICK_ACCENT_HZ: f64 = 1500.0;
const CLICK_REGULAR_HZ: f64 = 1000.0;

/// One-pole coefficient for a target frequency, kept stable at low rates
fn pole(freq_hz: f64, sample_rate: u32) -> f64 {
    (freq_hz * TAU / sample_rate as f64).min(0.9)
}

fn render_kick(sample_rate: u32) -> Vec<f32> {
    let dt = 1.0 / sample_rate as f64;
    let len = (KICK_SECS * sample_rate as f64) as usize;
    let pitch_fall = (-dt / KICK_PITCH_DECAY).exp();
    let amp_fall = (-dt / KICK_AMP_DECAY).exp();
    let mut out = Vec::with_capacity(len);
    let mut phase = 0.0f64;
    let mut pitch_env = 1.0f64;
    let mut amp_env = 1.0f64;
    for _ in 0..len {
        // Pitch sweeps from 4x the base down to the base frequency
        let freq = KICK_BASE_HZ * (1.0 + pitch_env * 3.0);
        phase += freq * dt;
        out.push(((phase * TAU).sin() * amp_env) as f32);
        pitch_env *= pitch_fall;
        amp_env *= amp_fall;
    }
    out
}

fn render_snare(sample_rate: u32) -> Vec<f32> {
    let mut rng = fastrand::Rng::with_seed(SNARE_SEED);
    let dt = 1.0 / sample_rate as f64;
    let len = (SNARE_SECS * sample_rate as f64) as usize;
    let tone_fall = (-dt / 0.04).exp();
    let noise_fall = (-dt / 0.12).exp();
    let bp = pole(SNARE_NOISE_HZ, sample_rate);
    let mut out = Vec::with_capacity(len);
    let mut phase1 = 0.0f64;
    let mut phase2 = 0.0f64;
    let mut tone_env = 1.0f64;
    let mut noise_env = 1.0f64;
    let mut lp1 = 0.0f64;
    let mut lp2 = 0.0f64;
    for _ in 0..len {
        phase1 += 180.0 * dt;
        phase2 += 330.0 * dt;
        let tones = ((phase1 * TAU).sin() + (phase2 * TAU).sin()) * 0.5 * tone_env;
        let noise = rng.f32() as f64 * 2.0 - 1.0;
        // Two cascaded one-poles, differenced into a bandpass
        lp1 += bp * (noise - lp1);
        lp2 += bp * 0.5 * (lp1 - lp2);
        let snap = (lp1 - lp2) * noise_env;
        out.push((tones * 0.5 + snap * 1.5) as f32);
        tone_env *= tone_fall;
        noise_env *= noise_fall;
    }
    out
}

fn render_hihat(sample_rate: u32) -> Vec<f32> {
    let mut rng = fastrand::Rng::with_seed(HIHAT_SEED);
    let dt = 1.0 / sample_rate as f64;
    let len = (HIHAT_SECS * sample_rate as f64) as usize;
    let amp_fall = (-dt / 0.03).exp();
    let hp = pole(HIHAT_HP_HZ, sample_rate);
    let mut out = Vec::with_capacity(len);
    let mut lp = 0.0f64;
    let mut amp_env = 1.0f64;
    for _ in 0..len {
        let noise = rng.f32() as f64 * 2.0 - 1.0;
        lp += hp * (noise - lp);
        let highpassed = noise - lp;
        out.push((highpassed * amp_env * 0.8) as f32);
        amp_env *= amp_fall;
    }
    out
}

fn render_clap(sample_rate: u32) -> Vec<f32> {
    let mut rng = fastrand::Rng::with_seed(CLAP_SEED);
    let dt = 1.0 / sample_rate as f64;
    let len = (CLAP_SECS * sample_rate as f64) as usize;
    let burst_samples: Vec<usize> = CLAP_BURST_OFFSETS_MS
        .iter()
        .map(|ms| (ms / 1000.0 * sample_rate as f64) as usize)
        .collect();
    let last_burst = *burst_samples.last().unwrap_or(&0);
    let burst_fall = (-dt / 0.006).exp();
    let tail_fall = (-dt / 0.08).exp();
    let bp = pole(CLAP_BAND_HZ, sample_rate);
    let mut out = Vec::with_capacity(len);
    let mut env = 0.0f64;
    let mut lp1 = 0.0f64;
    let mut lp2 = 0.0f64;
    for i in 0..len {
        if burst_samples.contains(&i) {
            env = CLAP_BURST_LEVEL;
        }
        let noise = rng.f32() as f64 * 2.0 - 1.0;
        lp1 += bp * (noise - lp1);
        lp2 += bp * 0.5 * (lp1 - lp2);
        let band = lp1 - lp2;
        out.push(((band * env * 1.5).tanh()) as f32);
        // Bursts chop fast against each other, then the last one rings out
        env *= if i < last_burst { burst_fall } else { tail_fall };
    }
    out
}

fn render_click(sample_rate: u32, freq_hz: f64) -> Vec<f32> {
    let dt = 1.0 / sample_rate as f64;
    let len = (CLICK_SECS * sample_rate as f64) as usize;
    let amp_fall = (-dt / 0.008).exp();
    let mut out = Vec::with_capacity(len);
    let mut phase = 0.0f64;
    let mut amp_env = 1.0f64;
    for _ in 0..len {
        phase += freq_hz * dt;
        out.push(((phase * TAU).sin() * amp_env * 0.6) as f32);
        amp_env *= amp_fall;
    }
    out
}

/// The fixed percussion set plus metronome clicks
pub(crate) struct DrumKit {
    kick: Arc<Vec<f32>>,
    snare: Arc<Vec<f32>>,
    hihat: Arc<Vec<f32>>,
    clap: Arc<Vec<f32>>,
    click_accent: Arc<Vec<f32>>,
    click_regular: Arc<Vec<f32>>,
}

impl DrumKit {
    pub fn generate(sample_rate: u32) -> Self {
        Self {
            kick: Arc::new(render_kick(sample_rate)),
            snare: Arc::new(render_snare(sample_rate)),
            hihat: Arc::new(render_hihat(sample_rate)),
            clap: Arc::new(render_clap(sample_rate)),
            click_accent: Arc::new(render_click(sample_rate, CLICK_ACCENT_HZ)),
            click_regular: Arc::new(render_click(sample_rate, CLICK_REGULAR_HZ)),
        }
    }

    pub fn buffer(&self, drum: DrumKind) -> Arc<Vec<f32>> {
        match drum {
            DrumKind::Kick => Arc::clone(&self.kick),
            DrumKind::Snare => Arc::clone(&self.snare),
            DrumKind::HiHat => Arc::clone(&self.hihat),
            DrumKind::Clap => Arc::clone(&self.clap),
        }
    }

    pub fn click(&self, accent: bool) -> Arc<Vec<f32>> {
        if accent {
            Arc::clone(&self.click_accent)
        } else {
            Arc::clone(&self.click_regular)
        }
    }
}

/// Cursor playback of a shared buffer starting at a scheduled time
#[derive(Debug, Clone)]
pub(crate) struct BufferVoice {
    buffer: Arc<Vec<f32>>,
    start_time: f64,
    gain: f32,
    pub reverb_send: bool,
    cursor: usize,
    started: bool,
}

impl BufferVoice {
    pub fn new(buffer: Arc<Vec<f32>>, start_time: f64, gain: f32, reverb_send: bool) -> Self {
        Self {
            buffer,
            start_time,
            gain,
            reverb_send,
            cursor: 0,
            started: false,
        }
    }

    pub fn sample(&mut self, t: f64) -> f32 {
        if !self.started {
            if t < self.start_time {
                return 0.0;
            }
            self.started = true;
        }
        let Some(&sample) = self.buffer.get(self.cursor) else {
            return 0.0;
        };
        self.cursor += 1;
        sample * self.gain
    }

    pub fn finished(&self) -> bool {
        self.started && self.cursor >= self.buffer.len()
    }
}
