//! Send-bus effects
//!
//! Voices route into two mono send buses. The delay bus is a feedback
//! delay line; the reverb bus convolves with a generated impulse response
//! using a partitioned FFT (frequency-domain delay line), which keeps the
//! per-block cost flat no matter how long the response is. Both units
//! return wet signal only and are mixed back by the bus gains.

use std::collections::VecDeque;
use std::sync::Arc;

use fundsp::hacker::{lowpass_hz, Frame};
use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use semiquaver_core::{DelaySettings, EffectSettings, MAX_DELAY_SECS};

const IR_SEED: u64 = 4242;
const IR_SECS: f64 = 2.0;
const IR_DECAY_SECS: f64 = 0.35;
const IR_LOWPASS_HZ: f32 = 4000.0;

/// Samples per convolution partition; FFT size is twice this
const PARTITION_SIZE: usize = 512;

/// Wet return levels for the two buses, zero when a bus is disabled
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BusGains {
    pub reverb: f32,
    pub delay: f32,
}

impl BusGains {
    pub fn from_settings(settings: &EffectSettings) -> Self {
        Self {
            reverb: if settings.reverb.enabled {
                settings.reverb.mix
            } else {
                0.0
            },
            delay: if settings.delay.enabled {
                settings.delay.mix
            } else {
                0.0
            },
        }
    }
}

/// Feedback delay line on the delay send bus
pub(crate) struct DelayUnit {
    buffer: Vec<f32>,
    write_pos: usize,
    delay_samples: usize,
    feedback: f32,
    sample_rate: u32,
}

impl DelayUnit {
    pub fn new(sample_rate: u32, settings: &DelaySettings) -> Self {
        let capacity = (MAX_DELAY_SECS as f64 * sample_rate as f64) as usize;
        let mut unit = Self {
            buffer: vec![0.0; capacity.max(1)],
            write_pos: 0,
            delay_samples: 1,
            feedback: 0.0,
            sample_rate,
        };
        unit.set_params(settings);
        unit
    }

    pub fn set_params(&mut self, settings: &DelaySettings) {
        // Round, not truncate: f32 times like 0.01 sit just under the exact
        // value and would otherwise land one sample early
        let samples = (settings.time_secs as f64 * self.sample_rate as f64).round() as usize;
        self.delay_samples = samples.clamp(1, self.buffer.len());
        self.feedback = settings.feedback;
    }

    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let len = self.buffer.len();
        for (sample, out) in input.iter().zip(output.iter_mut()) {
            let read_pos = (self.write_pos + len - self.delay_samples) % len;
            let delayed = self.buffer[read_pos];
            self.buffer[self.write_pos] = sample + delayed * self.feedback;
            self.write_pos = (self.write_pos + 1) % len;
            *out = delayed;
        }
    }
}

/// Room response: seeded noise under an exponential decay, darkened with a
/// lowpass, then normalized to unit energy so the return level stays close
/// to the send level.
pub(crate) fn generate_impulse_response(sample_rate: u32) -> Vec<f32> {
    let mut rng = fastrand::Rng::with_seed(IR_SEED);
    let dt = 1.0 / sample_rate as f64;
    let len = (IR_SECS * sample_rate as f64) as usize;
    let fall = (-dt / IR_DECAY_SECS).exp();
    let mut ir = Vec::with_capacity(len);
    let mut env = 1.0f64;
    for _ in 0..len {
        let noise = rng.f32() as f64 * 2.0 - 1.0;
        ir.push((noise * env) as f32);
        env *= fall;
    }
    let mut filter = lowpass_hz(IR_LOWPASS_HZ, 0.707);
    filter.set_sample_rate(sample_rate as f64);
    for sample in &mut ir {
        let input = Frame::from([*sample]);
        let output = filter.tick(&input);
        *sample = output[0];
    }
    let energy: f32 = ir.iter().map(|s| s * s).sum();
    if energy > 0.0 {
        let scale = 1.0 / energy.sqrt();
        for sample in &mut ir {
            *sample *= scale;
        }
    }
    ir
}

/// Precomputed partition spectra of an impulse response
///
/// Built once and shared between the realtime rack and offline renders.
pub(crate) struct ReverbKernel {
    fft_size: usize,
    partitions: Vec<Vec<Complex<f32>>>,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
}

impl ReverbKernel {
    pub fn new(ir: &[f32]) -> Self {
        let fft_size = PARTITION_SIZE * 2;
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);
        let mut partitions = Vec::with_capacity(ir.len().div_ceil(PARTITION_SIZE));
        for chunk in ir.chunks(PARTITION_SIZE) {
            let mut padded = vec![0.0f32; fft_size];
            padded[..chunk.len()].copy_from_slice(chunk);
            let mut spectrum = forward.make_output_vec();
            // Lengths are fixed at construction, so process cannot fail
            let _ = forward.process(&mut padded, &mut spectrum);
            partitions.push(spectrum);
        }
        if partitions.is_empty() {
            // Keep at least one partition so the delay line can rotate
            partitions.push(forward.make_output_vec());
        }
        Self {
            fft_size,
            partitions,
            forward,
            inverse,
        }
    }

    fn bins(&self) -> usize {
        self.fft_size / 2 + 1
    }
}

/// Streaming convolution against a [`ReverbKernel`]
///
/// Input blocks are transformed once and held in a spectral delay line;
/// each output block sums the products of past input spectra with the
/// matching kernel partition, then overlap-adds the inverse transform.
/// Output lags input by exactly one partition.
pub(crate) struct ReverbUnit {
    kernel: Arc<ReverbKernel>,
    fdl: Vec<Vec<Complex<f32>>>,
    fdl_pos: usize,
    in_buf: Vec<f32>,
    overlap: Vec<f32>,
    out_queue: VecDeque<f32>,
    acc: Vec<Complex<f32>>,
    fft_in: Vec<f32>,
    time_scratch: Vec<f32>,
}

impl ReverbUnit {
    pub fn new(kernel: Arc<ReverbKernel>) -> Self {
        let bins = kernel.bins();
        let slots = kernel.partitions.len();
        let mut out_queue = VecDeque::with_capacity(PARTITION_SIZE * 2);
        out_queue.extend(std::iter::repeat(0.0).take(PARTITION_SIZE));
        Self {
            fdl: vec![vec![Complex::default(); bins]; slots],
            fdl_pos: 0,
            in_buf: Vec::with_capacity(PARTITION_SIZE),
            overlap: vec![0.0; PARTITION_SIZE],
            out_queue,
            acc: vec![Complex::default(); bins],
            fft_in: vec![0.0; kernel.fft_size],
            time_scratch: vec![0.0; kernel.fft_size],
            kernel,
        }
    }

    fn convolve_block(&mut self) {
        let slots = self.fdl.len();
        // The newest spectrum moves backwards through the slots so that
        // slot (pos + k) always holds the input from k blocks ago
        self.fdl_pos = (self.fdl_pos + slots - 1) % slots;
        self.fft_in[..self.in_buf.len()].copy_from_slice(&self.in_buf);
        self.fft_in[self.in_buf.len()..].fill(0.0);
        // Lengths are fixed at construction, so process cannot fail
        let _ = self
            .kernel
            .forward
            .process(&mut self.fft_in, &mut self.fdl[self.fdl_pos]);

        for value in &mut self.acc {
            *value = Complex::default();
        }
        for (k, partition) in self.kernel.partitions.iter().enumerate() {
            let spectrum = &self.fdl[(self.fdl_pos + k) % slots];
            for ((acc, x), h) in self.acc.iter_mut().zip(spectrum).zip(partition) {
                *acc += x * h;
            }
        }
        let _ = self
            .kernel
            .inverse
            .process(&mut self.acc, &mut self.time_scratch);

        let norm = 1.0 / self.kernel.fft_size as f32;
        for i in 0..PARTITION_SIZE {
            self.out_queue
                .push_back(self.time_scratch[i] * norm + self.overlap[i]);
            self.overlap[i] = self.time_scratch[i + PARTITION_SIZE] * norm;
        }
        self.in_buf.clear();
    }

    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        for (sample, out) in input.iter().zip(output.iter_mut()) {
            self.in_buf.push(*sample);
            if self.in_buf.len() == PARTITION_SIZE {
                self.convolve_block();
            }
            *out = self.out_queue.pop_front().unwrap_or(0.0);
        }
    }
}
