//! Audio clock abstraction
//!
//! All scheduling times are seconds on the audio clock. The realtime clock
//! is backed by the output stream's frame counter; tests drive scheduling
//! with a manually stepped clock instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Monotonic audio-time source, in seconds
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Clock derived from frames rendered by the output stream
#[derive(Debug, Clone)]
pub struct StreamClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl StreamClock {
    pub fn new(frames: Arc<AtomicU64>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }
}

impl AudioClock for StreamClock {
    fn now(&self) -> f64 {
        self.frames.load(Ordering::SeqCst) as f64 / self.sample_rate as f64
    }
}

/// Manually stepped clock for tests
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, secs: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now = secs;
        }
    }

    pub fn advance(&self, secs: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now += secs;
        }
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        self.now.lock().map(|now| *now).unwrap_or(0.0)
    }
}
