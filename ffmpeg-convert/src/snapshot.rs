//! First-frame thumbnail and basic video facts.

use std::{path::Path, str::FromStr};

use ffmpeg_next::format::Pixel;
use serde::Serialize;

use crate::{
    backend::MediaBackend,
    bmp::encode_bmp24,
    decoder::FrameDecoder,
    frame::{RawFrame, RawVideoFrame},
    input::PacketSource,
    metadata::{codec_name, resolve_duration},
    stream::{MediaKind, VideoFormat},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Bmp24,
}

impl FromStr for ImageFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bmp" | "bmp24" => Ok(ImageFormat::Bmp24),
            other => anyhow::bail!("unsupported image format {:?}, only bmp/bmp24", other),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Seconds, 0.0 when unknown.
    pub duration: f64,
    pub format_name: String,
    pub video_codec: String,
    #[serde(skip)]
    pub image: Vec<u8>,
}

/// Decodes the first video frame of `path` and packs it as `format`.
pub fn video_info(
    backend: &dyn MediaBackend,
    path: &Path,
    format: ImageFormat,
) -> anyhow::Result<VideoInfo> {
    let mut source = backend.open_input(path)?;
    let streams = source.streams();
    let stream = streams
        .iter()
        .find(|s| s.kind() == MediaKind::Video)
        .ok_or_else(|| anyhow::anyhow!("{} has no video stream", path.display()))?;
    let mut decoder = backend.open_decoder(stream)?;

    let frame = first_frame(source.as_mut(), decoder.as_mut(), stream.index())?
        .ok_or_else(|| anyhow::anyhow!("no decodable video frame in {}", path.display()))?;
    let image = match format {
        ImageFormat::Bmp24 => pack_bmp(backend, &frame)?,
    };
    log::debug!(
        "{}: {}x{} thumbnail, {} bytes",
        path.display(),
        frame.width(),
        frame.height(),
        image.len()
    );

    Ok(VideoInfo {
        width: frame.width(),
        height: frame.height(),
        duration: resolve_duration(source.duration(), std::slice::from_ref(stream)),
        format_name: source.format_name(),
        video_codec: codec_name(stream),
        image,
    })
}

fn first_frame(
    source: &mut dyn PacketSource,
    decoder: &mut dyn FrameDecoder,
    index: usize,
) -> anyhow::Result<Option<RawVideoFrame>> {
    while let Some(packet) = source.read_packet() {
        if packet.index() != index {
            continue;
        }
        if let Err(e) = decoder.send_packet(packet) {
            log::debug!("stream {}: skipping packet: {}", index, e);
            continue;
        }
        if let Some(frame) = next_video_frame(decoder) {
            return Ok(Some(frame));
        }
    }
    decoder.send_eof()?;
    Ok(next_video_frame(decoder))
}

fn next_video_frame(decoder: &mut dyn FrameDecoder) -> Option<RawVideoFrame> {
    match decoder.receive_frame() {
        Ok(Some(RawFrame::Video(frame))) => Some(frame),
        _ => None,
    }
}

fn pack_bmp(backend: &dyn MediaBackend, frame: &RawVideoFrame) -> anyhow::Result<Vec<u8>> {
    let source = frame.video_format();
    let target = VideoFormat {
        format: Pixel::RGB24,
        ..source
    };
    let rgb = if source == target {
        frame.clone()
    } else {
        backend.open_rescaler(source, target)?.run(frame)?
    };
    encode_bmp24(rgb.width(), rgb.height(), &rgb.packed_rows(3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    #[test]
    fn test_image_format_names() {
        assert_eq!("bmp".parse::<ImageFormat>().unwrap(), ImageFormat::Bmp24);
        assert_eq!("BMP24".parse::<ImageFormat>().unwrap(), ImageFormat::Bmp24);
        assert!("png".parse::<ImageFormat>().is_err());
    }

    #[test]
    fn test_first_frame_packed_as_bitmap() {
        let backend = MockBackend::audio(2, 1024).with_video(3);

        let info = video_info(&backend, Path::new("in.mp4"), ImageFormat::Bmp24).unwrap();

        assert_eq!((info.width, info.height), (16, 16));
        assert_eq!(info.format_name, "mock");
        assert_eq!(info.video_codec, "h264");
        assert_eq!(info.duration, 0.0);
        assert_eq!(info.image.len(), 54 + 16 * 48);
        assert_eq!(&info.image[..2], b"BM");
        assert!(backend.events().contains(&"open rescaler 16x16".to_string()));
    }

    #[test]
    fn test_audio_only_input_rejected() {
        let backend = MockBackend::audio(2, 1024);
        assert!(video_info(&backend, Path::new("in.wav"), ImageFormat::Bmp24).is_err());
    }
}
