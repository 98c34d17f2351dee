//! semiquaver-engine: Realtime synthesis, transport scheduling, and offline rendering

pub mod audio_io;
pub mod clock;
mod effects;
pub mod engine;
pub mod error;
mod rack;
pub mod renderer;
mod sampler;
pub mod scheduler;
pub mod synth;
mod voice;
pub mod wav;

pub use audio_io::{AudioOutputError, RealtimeOutputStream};
pub use clock::{AudioClock, ManualClock, StreamClock};
pub use engine::{AudioEngine, DEFAULT_SAMPLE_RATE};
pub use error::{EngineError, Result};
pub use renderer::{OfflineRenderer, RenderedBuffer};
pub use scheduler::TransportScheduler;
pub use synth::{Synth, VoiceHandle, PREVIEW_DURATION_SECS, PREVIEW_VELOCITY};
pub use wav::write_wav;
