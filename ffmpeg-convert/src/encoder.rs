use ffmpeg_next::{
    Rational,
    codec::{Capabilities, Parameters},
    format::{Pixel, Sample},
};

use crate::{
    frame::RawFrame,
    packet::RawPacket,
    stream::{AudioFormat, MediaKind, VideoFormat},
};

/// What a concrete encoder declares about the input it accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderCaps {
    pub name: String,
    pub kind: MediaKind,
    /// Supported sample formats in preference order; empty when undeclared.
    pub sample_formats: Vec<Sample>,
    pub sample_rates: Vec<u32>,
    pub pixel_formats: Vec<Pixel>,
    pub variable_frame_size: bool,
}

impl EncoderCaps {
    pub fn new(name: &str, kind: MediaKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            sample_formats: Vec::new(),
            sample_rates: Vec::new(),
            pixel_formats: Vec::new(),
            variable_frame_size: false,
        }
    }

    pub fn from_codec(codec: ffmpeg_next::Codec) -> Self {
        let mut caps = Self::new(codec.name(), MediaKind::from(codec.medium()));
        caps.variable_frame_size = codec
            .capabilities()
            .contains(Capabilities::VARIABLE_FRAME_SIZE);
        if let Ok(audio) = codec.audio() {
            if let Some(formats) = audio.formats() {
                caps.sample_formats = formats.collect();
            }
            if let Some(rates) = audio.rates() {
                caps.sample_rates = rates.filter(|r| *r > 0).map(|r| r as u32).collect();
            }
        }
        if let Ok(video) = codec.video() {
            if let Some(formats) = video.formats() {
                caps.pixel_formats = formats.collect();
            }
        }
        caps
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EncoderTarget {
    Audio(AudioFormat),
    Video {
        format: VideoFormat,
        frame_rate: Rational,
    },
}

/// Everything needed to open one encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderParams {
    pub codec: String,
    pub target: EncoderTarget,
    pub bit_rate: Option<usize>,
    /// Set when the output container stores codec headers out of band.
    pub global_header: bool,
}

impl EncoderParams {
    /// `1/sample_rate` for audio, the inverse frame rate for video.
    pub fn time_base(&self) -> Rational {
        match &self.target {
            EncoderTarget::Audio(format) => format.time_base(),
            EncoderTarget::Video { frame_rate, .. } => frame_rate.invert(),
        }
    }
}

/// Frame-in, packet-out half of a codec.
pub trait FrameEncoder {
    fn send_frame(&mut self, frame: RawFrame) -> anyhow::Result<()>;
    fn send_eof(&mut self) -> anyhow::Result<()>;
    /// `Ok(None)` once the encoder has nothing more to hand out for now.
    fn receive_packet(&mut self) -> anyhow::Result<Option<RawPacket>>;
    fn time_base(&self) -> Rational;
    /// Samples per input frame, `None` when any size is accepted.
    fn frame_size(&self) -> Option<usize>;
    /// Codec parameters for the output stream this encoder feeds.
    fn parameters(&self) -> Parameters;
}

enum EncoderType {
    Video(ffmpeg_next::codec::encoder::Video),
    Audio(ffmpeg_next::codec::encoder::Audio),
}

impl EncoderType {
    fn send_frame(&mut self, frame: RawFrame) -> anyhow::Result<()> {
        match (self, frame) {
            (EncoderType::Video(encoder), RawFrame::Video(frame)) => {
                encoder.send_frame(frame.as_video())?;
            }
            (EncoderType::Audio(encoder), RawFrame::Audio(frame)) => {
                encoder.send_frame(frame.as_audio())?;
            }
            _ => anyhow::bail!("invalid frame type"),
        };
        Ok(())
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        match self {
            EncoderType::Video(encoder) => encoder.send_eof()?,
            EncoderType::Audio(encoder) => encoder.send_eof()?,
        }
        Ok(())
    }

    fn receive_packet(&mut self, time_base: Rational) -> anyhow::Result<Option<RawPacket>> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        let encode_result = match self {
            EncoderType::Video(encoder) => encoder.receive_packet(&mut packet),
            EncoderType::Audio(encoder) => encoder.receive_packet(&mut packet),
        };

        match encode_result {
            Ok(()) => Ok(Some(RawPacket::from((packet, time_base)))),
            Err(ffmpeg_next::Error::Other { errno })
                if errno == ffmpeg_next::util::error::EAGAIN =>
            {
                Ok(None)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// FFmpeg encoder looked up by name and opened with negotiated parameters.
pub struct Encoder {
    inner: EncoderType,
    encoder_time_base: Rational,
    frame_size: Option<usize>,
}

impl Encoder {
    pub fn open(params: &EncoderParams) -> anyhow::Result<Self> {
        let codec = ffmpeg_next::encoder::find_by_name(&params.codec)
            .ok_or(anyhow::anyhow!("codec not found: {}", params.codec))?;
        let variable_frame_size = codec
            .capabilities()
            .contains(Capabilities::VARIABLE_FRAME_SIZE);
        let context = ffmpeg_next::codec::Context::new_with_codec(codec);

        let (inner, frame_size) = match &params.target {
            EncoderTarget::Audio(format) => {
                let mut encoder = context.encoder().audio()?;
                encoder.set_rate(format.sample_rate as i32);
                encoder.set_channel_layout(format.layout);
                encoder.set_format(format.format);
                encoder.set_time_base(format.time_base());
                if let Some(bit_rate) = params.bit_rate {
                    encoder.set_bit_rate(bit_rate);
                }
                if params.global_header {
                    encoder.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
                }
                let encoder = encoder.open_as(codec)?;
                let frame_size = match encoder.frame_size() as usize {
                    0 => None,
                    _ if variable_frame_size => None,
                    n => Some(n),
                };
                (EncoderType::Audio(encoder), frame_size)
            }
            EncoderTarget::Video { format, frame_rate } => {
                let mut encoder = context.encoder().video()?;
                encoder.set_width(format.width);
                encoder.set_height(format.height);
                encoder.set_format(format.format);
                encoder.set_frame_rate(Some(*frame_rate));
                encoder.set_time_base(frame_rate.invert());
                if let Some(bit_rate) = params.bit_rate {
                    encoder.set_bit_rate(bit_rate);
                }
                if params.global_header {
                    encoder.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
                }
                (EncoderType::Video(encoder.open_as(codec)?), None)
            }
        };

        let encoder_time_base: Rational = match &inner {
            EncoderType::Audio(encoder) => unsafe { (*encoder.as_ptr()).time_base.into() },
            EncoderType::Video(encoder) => unsafe { (*encoder.as_ptr()).time_base.into() },
        };
        log::info!(
            "encoder opened: {} (time base {}, frame size {:?})",
            params.codec,
            encoder_time_base,
            frame_size
        );

        Ok(Self {
            inner,
            encoder_time_base,
            frame_size,
        })
    }
}

impl FrameEncoder for Encoder {
    fn send_frame(&mut self, frame: RawFrame) -> anyhow::Result<()> {
        self.inner.send_frame(frame)
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()
    }

    fn receive_packet(&mut self) -> anyhow::Result<Option<RawPacket>> {
        self.inner.receive_packet(self.encoder_time_base)
    }

    fn time_base(&self) -> Rational {
        self.encoder_time_base
    }

    fn frame_size(&self) -> Option<usize> {
        self.frame_size
    }

    fn parameters(&self) -> Parameters {
        match &self.inner {
            EncoderType::Audio(encoder) => Parameters::from(encoder),
            EncoderType::Video(encoder) => Parameters::from(encoder),
        }
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_next::{ChannelLayout, format::sample::Type};

    use super::*;

    #[test]
    fn test_encoder_time_base_follows_target() {
        let audio = EncoderParams {
            codec: "pcm_s16le".to_string(),
            target: EncoderTarget::Audio(AudioFormat::new(
                16000,
                ChannelLayout::MONO,
                Sample::I16(Type::Packed),
            )),
            bit_rate: None,
            global_header: false,
        };
        assert_eq!(audio.time_base(), Rational::new(1, 16000));

        let video = EncoderParams {
            codec: "mpeg4".to_string(),
            target: EncoderTarget::Video {
                format: VideoFormat {
                    width: 320,
                    height: 240,
                    format: Pixel::YUV420P,
                },
                frame_rate: Rational::new(30, 1),
            },
            bit_rate: Some(400_000),
            global_header: true,
        };
        assert_eq!(video.time_base(), Rational::new(1, 30));
    }

    #[test]
    fn test_pcm_encoder_caps_and_open() -> anyhow::Result<()> {
        ffmpeg_next::init()?;
        let Some(codec) = ffmpeg_next::encoder::find_by_name("pcm_s16le") else {
            return Ok(());
        };
        let caps = EncoderCaps::from_codec(codec);
        assert_eq!(caps.kind, MediaKind::Audio);
        assert!(caps.sample_formats.contains(&Sample::I16(Type::Packed)));

        let encoder = Encoder::open(&EncoderParams {
            codec: "pcm_s16le".to_string(),
            target: EncoderTarget::Audio(AudioFormat::new(
                8000,
                ChannelLayout::MONO,
                Sample::I16(Type::Packed),
            )),
            bit_rate: None,
            global_header: false,
        })?;
        assert_eq!(encoder.time_base(), Rational::new(1, 8000));
        assert_eq!(encoder.frame_size(), None);
        Ok(())
    }
}
