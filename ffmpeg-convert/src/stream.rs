use ffmpeg_next::{
    ChannelLayout, Rational,
    codec::{Id, Parameters},
    format::{Pixel, Sample, stream},
};
use serde::{Deserialize, Serialize};

unsafe impl Send for AvStream {}
unsafe impl Sync for AvStream {}

/// Media type of a stream as far as the transcoder cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Subtitle,
    Other,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Subtitle => "subtitle",
            MediaKind::Other => "other",
        }
    }
}

impl From<ffmpeg_next::media::Type> for MediaKind {
    fn from(value: ffmpeg_next::media::Type) -> Self {
        match value {
            ffmpeg_next::media::Type::Audio => MediaKind::Audio,
            ffmpeg_next::media::Type::Video => MediaKind::Video,
            ffmpeg_next::media::Type::Subtitle => MediaKind::Subtitle,
            _ => MediaKind::Other,
        }
    }
}

impl From<MediaKind> for ffmpeg_next::media::Type {
    fn from(value: MediaKind) -> Self {
        match value {
            MediaKind::Audio => ffmpeg_next::media::Type::Audio,
            MediaKind::Video => ffmpeg_next::media::Type::Video,
            MediaKind::Subtitle => ffmpeg_next::media::Type::Subtitle,
            MediaKind::Other => ffmpeg_next::media::Type::Unknown,
        }
    }
}

/// Sample rate, layout and sample format of an audio signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub layout: ChannelLayout,
    pub format: Sample,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, layout: ChannelLayout, format: Sample) -> Self {
        Self {
            sample_rate,
            channels: layout.channels().max(0) as u16,
            layout,
            format,
        }
    }

    /// Layout with the default channel order for `channels`.
    pub fn with_channels(sample_rate: u32, channels: u16, format: Sample) -> Self {
        Self {
            sample_rate,
            channels,
            layout: ChannelLayout::default(channels as i32),
            format,
        }
    }

    pub fn time_base(&self) -> Rational {
        Rational::new(1, self.sample_rate as i32)
    }
}

/// Geometry and pixel format of a video signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub format: Pixel,
}

/// An input stream as reported by the demuxer.
pub struct AvStream {
    index: usize,
    kind: MediaKind,
    codec_id: Id,
    parameters: Parameters,
    time_base: Rational,
    rate: Rational,
    duration: Option<i64>,
    sample_rate: u32,
    channels: u16,
    width: u32,
    height: u32,
}

impl AvStream {
    /// Builds a stream description without a demuxer behind it.
    pub fn new(index: usize, kind: MediaKind, codec_id: Id, time_base: Rational) -> Self {
        Self {
            index,
            kind,
            codec_id,
            parameters: Parameters::new(),
            time_base,
            rate: Rational::new(0, 1),
            duration: None,
            sample_rate: 0,
            channels: 0,
            width: 0,
            height: 0,
        }
    }

    pub fn with_audio(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }

    pub fn with_video(mut self, width: u32, height: u32, rate: Rational) -> Self {
        self.width = width;
        self.height = height;
        self.rate = rate;
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn codec_id(&self) -> Id {
        self.codec_id
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn rate(&self) -> Rational {
        self.rate
    }

    /// Duration in `time_base` units, if the demuxer knows it.
    pub fn duration(&self) -> Option<i64> {
        self.duration
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.kind == MediaKind::Audio
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl From<stream::Stream<'_>> for AvStream {
    fn from(stream: stream::Stream<'_>) -> Self {
        let parameters = stream.parameters();
        let (sample_rate, channels, width, height) = unsafe {
            let ptr = parameters.as_ptr() as *const ffmpeg_next::ffi::AVCodecParameters;
            (
                (*ptr).sample_rate.max(0) as u32,
                (*ptr).ch_layout.nb_channels.max(0) as u16,
                (*ptr).width.max(0) as u32,
                (*ptr).height.max(0) as u32,
            )
        };
        let duration = match stream.duration() {
            d if d == ffmpeg_next::ffi::AV_NOPTS_VALUE as i64 || d < 0 => None,
            d => Some(d),
        };
        Self {
            index: stream.index(),
            kind: MediaKind::from(parameters.medium()),
            codec_id: parameters.id(),
            parameters,
            time_base: stream.time_base(),
            rate: stream.avg_frame_rate(),
            duration,
            sample_rate,
            channels,
            width,
            height,
        }
    }
}

impl Clone for AvStream {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            kind: self.kind,
            codec_id: self.codec_id,
            parameters: self.parameters.clone(),
            time_base: self.time_base,
            rate: self.rate,
            duration: self.duration,
            sample_rate: self.sample_rate,
            channels: self.channels,
            width: self.width,
            height: self.height,
        }
    }
}
