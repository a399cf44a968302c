use crate::{
    backend::MediaBackend,
    error::TranscodeError,
    frame::RawVideoFrame,
    resampler::Resample,
    scaler::Rescale,
    stream::{AudioFormat, VideoFormat},
};

/// Format adapter of one pipeline. Absent when the decoder output already
/// matches the encoder input.
pub enum Adapter {
    Audio(Box<dyn Resample>),
    Video(VideoAdapter),
}

pub fn audio_needs_conversion(source: &AudioFormat, target: &AudioFormat) -> bool {
    source.sample_rate != target.sample_rate
        || source.channels != target.channels
        || source.format != target.format
}

impl Adapter {
    pub fn audio(
        backend: &dyn MediaBackend,
        stream: usize,
        source: AudioFormat,
        target: AudioFormat,
    ) -> Result<Option<Self>, TranscodeError> {
        if !audio_needs_conversion(&source, &target) {
            return Ok(None);
        }
        let resampler = backend
            .open_resampler(source, target)
            .map_err(|e| TranscodeError::AdapterInit {
                stream,
                reason: e.to_string(),
            })?;
        log::debug!(
            "stream {}: resampling {}Hz/{}ch to {}Hz/{}ch",
            stream,
            source.sample_rate,
            source.channels,
            target.sample_rate,
            target.channels
        );
        Ok(Some(Adapter::Audio(resampler)))
    }

    pub fn video(
        backend: &dyn MediaBackend,
        stream: usize,
        source: VideoFormat,
        target: VideoFormat,
    ) -> Result<Option<Self>, TranscodeError> {
        if source == target {
            return Ok(None);
        }
        let rescaler = backend
            .open_rescaler(source, target)
            .map_err(|e| TranscodeError::AdapterInit {
                stream,
                reason: e.to_string(),
            })?;
        Ok(Some(Adapter::Video(VideoAdapter {
            rescaler,
            source,
            target,
        })))
    }
}

/// Rescaler that follows geometry changes of the decoded stream.
pub struct VideoAdapter {
    rescaler: Box<dyn Rescale>,
    source: VideoFormat,
    target: VideoFormat,
}

impl VideoAdapter {
    /// Rescaler for a stream that started out matching the target and then
    /// changed to `source`.
    pub fn build(
        backend: &dyn MediaBackend,
        stream: usize,
        source: VideoFormat,
        target: VideoFormat,
    ) -> Result<Self, TranscodeError> {
        let rescaler = backend
            .open_rescaler(source, target)
            .map_err(|e| TranscodeError::Rescale {
                stream,
                reason: e.to_string(),
            })?;
        log::info!(
            "stream {}: rescaling {}x{} {:?} to {}x{} {:?}",
            stream,
            source.width,
            source.height,
            source.format,
            target.width,
            target.height,
            target.format
        );
        Ok(Self {
            rescaler,
            source,
            target,
        })
    }

    /// Rebuilds the rescaler when frames stop matching its input format.
    pub fn prepare(
        &mut self,
        backend: &dyn MediaBackend,
        stream: usize,
        format: VideoFormat,
    ) -> Result<(), TranscodeError> {
        if format != self.source {
            *self = Self::build(backend, stream, format, self.target)?;
        }
        Ok(())
    }

    pub fn convert(&mut self, frame: &RawVideoFrame) -> anyhow::Result<RawVideoFrame> {
        self.rescaler.run(frame)
    }
}
