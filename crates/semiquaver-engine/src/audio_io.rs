//! Audio output stream for realtime playback

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum AudioOutputError {
    #[error("No audio output devices found")]
    NoDevices,
    #[error("Failed to get output config: {0}")]
    ConfigError(String),
    #[error("Failed to build output stream: {0}")]
    StreamError(String),
}

/// Real-time audio output stream pulling samples from a callback
///
/// The stream is opened at the engine's sample rate so realtime playback and
/// offline rendering agree on timing; a device that cannot run at that rate
/// is reported as a config error rather than silently resampled.
pub struct RealtimeOutputStream {
    stop_flag: Arc<AtomicBool>,
    _stream: cpal::Stream,
}

impl RealtimeOutputStream {
    /// Start an output stream at `sample_rate`
    ///
    /// The callback receives the interleaved output buffer, the stream
    /// sample rate, and the channel count.
    pub fn start<F>(sample_rate: u32, mut sample_callback: F) -> Result<Self, AudioOutputError>
    where
        F: FnMut(&mut [f32], u32, u16) + Send + 'static,
    {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioOutputError::NoDevices)?;

        let supported_config = device
            .default_output_config()
            .map_err(|e| AudioOutputError::ConfigError(e.to_string()))?;

        let config: StreamConfig = if supported_config.sample_rate().0 == sample_rate {
            supported_config.into()
        } else {
            let ranges = device
                .supported_output_configs()
                .map_err(|e| AudioOutputError::ConfigError(e.to_string()))?;
            ranges
                .filter(|range| range.sample_format() == cpal::SampleFormat::F32)
                .find(|range| {
                    range.min_sample_rate().0 <= sample_rate
                        && sample_rate <= range.max_sample_rate().0
                })
                .map(|range| range.with_sample_rate(SampleRate(sample_rate)).into())
                .ok_or_else(|| {
                    AudioOutputError::ConfigError(format!(
                        "device does not support {sample_rate} Hz output"
                    ))
                })?
        };

        let channels = config.channels;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if stop_clone.load(Ordering::SeqCst) {
                        data.fill(0.0);
                        return;
                    }
                    sample_callback(data, sample_rate, channels);
                },
                move |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        info!(sample_rate, channels, "Started realtime output stream");

        Ok(Self {
            stop_flag,
            _stream: stream,
        })
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

impl Drop for RealtimeOutputStream {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}
