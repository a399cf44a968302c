use std::path::Path;

use crate::{
    decoder::{Decoder, FrameDecoder},
    encoder::{Encoder, EncoderCaps, EncoderParams, FrameEncoder},
    input::{AvInput, PacketSource},
    output::{AvOutput, PacketSink},
    profile::FormatProfile,
    resampler::{AudioResampler, Resample},
    scaler::{Rescale, Scaler},
    stream::{AudioFormat, AvStream, MediaKind, VideoFormat},
};

/// Factory for every collaborator a job talks to.
pub trait MediaBackend: Send + Sync {
    fn open_input(&self, path: &Path) -> anyhow::Result<Box<dyn PacketSource>>;
    fn open_output(&self, path: &Path, container: &str) -> anyhow::Result<Box<dyn PacketSink>>;
    fn open_decoder(&self, stream: &AvStream) -> anyhow::Result<Box<dyn FrameDecoder>>;
    /// Encoder the job would use for `kind`, `None` when there is none.
    fn find_encoder(
        &self,
        kind: MediaKind,
        profile: &FormatProfile,
        sink: &dyn PacketSink,
    ) -> Option<EncoderCaps>;
    fn open_encoder(&self, params: &EncoderParams) -> anyhow::Result<Box<dyn FrameEncoder>>;
    fn open_resampler(
        &self,
        source: AudioFormat,
        target: AudioFormat,
    ) -> anyhow::Result<Box<dyn Resample>>;
    fn open_rescaler(
        &self,
        source: VideoFormat,
        target: VideoFormat,
    ) -> anyhow::Result<Box<dyn Rescale>>;
}

/// [`MediaBackend`] on top of the linked FFmpeg libraries.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl MediaBackend for FfmpegBackend {
    fn open_input(&self, path: &Path) -> anyhow::Result<Box<dyn PacketSource>> {
        Ok(Box::new(AvInput::open(path)?))
    }

    fn open_output(&self, path: &Path, container: &str) -> anyhow::Result<Box<dyn PacketSink>> {
        Ok(Box::new(AvOutput::open(path, container)?))
    }

    fn open_decoder(&self, stream: &AvStream) -> anyhow::Result<Box<dyn FrameDecoder>> {
        Ok(Box::new(Decoder::new(stream)?))
    }

    fn find_encoder(
        &self,
        kind: MediaKind,
        profile: &FormatProfile,
        sink: &dyn PacketSink,
    ) -> Option<EncoderCaps> {
        if !matches!(kind, MediaKind::Audio | MediaKind::Video) {
            return None;
        }
        let name = profile
            .codec_for(kind)
            .map(str::to_string)
            .or_else(|| sink.default_codec(kind))?;
        let codec = ffmpeg_next::encoder::find_by_name(&name)?;
        if MediaKind::from(codec.medium()) != kind {
            log::warn!("encoder {} does not produce {} streams", name, kind.as_str());
            return None;
        }
        Some(EncoderCaps::from_codec(codec))
    }

    fn open_encoder(&self, params: &EncoderParams) -> anyhow::Result<Box<dyn FrameEncoder>> {
        Ok(Box::new(Encoder::open(params)?))
    }

    fn open_resampler(
        &self,
        source: AudioFormat,
        target: AudioFormat,
    ) -> anyhow::Result<Box<dyn Resample>> {
        Ok(Box::new(AudioResampler::new(source, target)?))
    }

    fn open_rescaler(
        &self,
        source: VideoFormat,
        target: VideoFormat,
    ) -> anyhow::Result<Box<dyn Rescale>> {
        Ok(Box::new(Scaler::new(source, target)?))
    }
}

#[cfg(test)]
#[path = "backend_test.rs"]
mod backend_test;
