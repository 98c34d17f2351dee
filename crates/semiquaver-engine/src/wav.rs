//! WAV export for rendered buffers

use std::path::Path;

use tracing::info;

use crate::error::{EngineError, Result};
use crate::renderer::RenderedBuffer;

/// Write a rendered buffer as a mono 32-bit float WAV file
pub fn write_wav(path: impl AsRef<Path>, buffer: &RenderedBuffer) -> Result<()> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| map_hound("failed to create WAV", e))?;
    for &sample in &buffer.samples {
        writer
            .write_sample(sample)
            .map_err(|e| map_hound("failed to write WAV", e))?;
    }
    writer
        .finalize()
        .map_err(|e| map_hound("failed to finalize WAV", e))?;
    info!(
        path = %path.display(),
        samples = buffer.samples.len(),
        sample_rate = buffer.sample_rate,
        "wrote WAV"
    );
    Ok(())
}

/// Filesystem failures keep their `io::Error`; format failures become
/// export errors
fn map_hound(stage: &str, err: hound::Error) -> EngineError {
    match err {
        hound::Error::IoError(err) => EngineError::Io(err),
        other => EngineError::Export(format!("{stage}: {other}")),
    }
}
