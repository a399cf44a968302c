use ffmpeg_next::Rational;

use crate::{
    frame::{RawAudioFrame, RawFrame, RawVideoFrame},
    packet::RawPacket,
    stream::{AudioFormat, AvStream, VideoFormat},
};

/// Packet-in, frame-out half of a codec.
///
/// `receive_frame` returns `Ok(None)` both when the decoder needs more
/// input and when it is fully drained after `send_eof`.
pub trait FrameDecoder {
    fn send_packet(&mut self, packet: RawPacket) -> anyhow::Result<()>;
    fn send_eof(&mut self) -> anyhow::Result<()>;
    fn receive_frame(&mut self) -> anyhow::Result<Option<RawFrame>>;
    /// Format of the decoded audio, `None` for non-audio decoders.
    fn audio_format(&self) -> Option<AudioFormat>;
    fn video_format(&self) -> Option<VideoFormat>;
}

enum DecoderType {
    Video(ffmpeg_next::codec::decoder::Video),
    Audio(ffmpeg_next::codec::decoder::Audio),
    Subtitle(ffmpeg_next::codec::decoder::Subtitle),
}

impl DecoderType {
    fn send_packet(
        &mut self,
        mut packet: RawPacket,
        decoder_time_base: Rational,
    ) -> anyhow::Result<()> {
        packet.rescale_to(decoder_time_base);
        let packet = packet.packet();
        match self {
            DecoderType::Video(video_decoder) => video_decoder.send_packet(packet)?,
            DecoderType::Audio(audio_decoder) => audio_decoder.send_packet(packet)?,
            DecoderType::Subtitle(_) => anyhow::bail!("subtitle streams are not decoded"),
        }
        Ok(())
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        match self {
            DecoderType::Video(video_decoder) => video_decoder.send_eof()?,
            DecoderType::Audio(audio_decoder) => audio_decoder.send_eof()?,
            DecoderType::Subtitle(_) => {}
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> anyhow::Result<Option<RawFrame>> {
        match self {
            DecoderType::Video(video_decoder) => {
                let mut frame = ffmpeg_next::frame::Video::empty();
                match video_decoder.receive_frame(&mut frame) {
                    Ok(()) => Ok(Some(RawFrame::Video(RawVideoFrame::from(frame)))),
                    Err(ffmpeg_next::Error::Eof) => Ok(None),
                    Err(ffmpeg_next::Error::Other { errno })
                        if errno == ffmpeg_next::util::error::EAGAIN =>
                    {
                        Ok(None)
                    }
                    Err(err) => Err(err.into()),
                }
            }
            DecoderType::Audio(audio_decoder) => {
                let mut frame = ffmpeg_next::frame::Audio::empty();
                match audio_decoder.receive_frame(&mut frame) {
                    Ok(()) => Ok(Some(RawFrame::Audio(RawAudioFrame::from(frame)))),
                    Err(ffmpeg_next::Error::Eof) => Ok(None),
                    Err(ffmpeg_next::Error::Other { errno })
                        if errno == ffmpeg_next::util::error::EAGAIN =>
                    {
                        Ok(None)
                    }
                    Err(err) => Err(err.into()),
                }
            }
            DecoderType::Subtitle(_) => Ok(None),
        }
    }
}

/// FFmpeg decoder opened from a demuxed stream's codec parameters.
pub struct Decoder {
    inner: DecoderType,
    decoder_time_base: Rational,
}

impl Decoder {
    pub fn new(stream: &AvStream) -> anyhow::Result<Self> {
        if ffmpeg_next::decoder::find(stream.codec_id()).is_none() {
            anyhow::bail!("no decoder for codec {:?}", stream.codec_id());
        }
        let mut decoder_ctx = ffmpeg_next::codec::Context::new();
        unsafe {
            (*decoder_ctx.as_mut_ptr()).time_base = stream.time_base().into();
        }
        decoder_ctx.set_parameters(stream.parameters().clone())?;

        let inner = if stream.is_video() {
            let video_decoder = decoder_ctx.decoder().video()?;
            if video_decoder.format() == ffmpeg_next::format::Pixel::None
                || video_decoder.width() == 0
                || video_decoder.height() == 0
            {
                anyhow::bail!("missing codec parameters");
            }
            DecoderType::Video(video_decoder)
        } else if stream.is_audio() {
            DecoderType::Audio(decoder_ctx.decoder().audio()?)
        } else if stream.kind() == crate::stream::MediaKind::Subtitle {
            DecoderType::Subtitle(decoder_ctx.decoder().subtitle()?)
        } else {
            anyhow::bail!("unsupported stream type");
        };

        Ok(Self {
            inner,
            decoder_time_base: stream.time_base(),
        })
    }
}

impl FrameDecoder for Decoder {
    fn send_packet(&mut self, packet: RawPacket) -> anyhow::Result<()> {
        self.inner.send_packet(packet, self.decoder_time_base)
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()
    }

    fn receive_frame(&mut self) -> anyhow::Result<Option<RawFrame>> {
        self.inner.receive_frame()
    }

    fn audio_format(&self) -> Option<AudioFormat> {
        match &self.inner {
            DecoderType::Audio(decoder) => {
                let layout = decoder.channel_layout();
                let mut format = AudioFormat::new(decoder.rate(), layout, decoder.format());
                if format.channels == 0 {
                    format = AudioFormat::with_channels(
                        decoder.rate(),
                        decoder.channels().max(1),
                        decoder.format(),
                    );
                }
                Some(format)
            }
            _ => None,
        }
    }

    fn video_format(&self) -> Option<VideoFormat> {
        match &self.inner {
            DecoderType::Video(decoder) => Some(VideoFormat {
                width: decoder.width(),
                height: decoder.height(),
                format: decoder.format(),
            }),
            _ => None,
        }
    }
}
