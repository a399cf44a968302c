//! Container and stream metadata, similar to ffprobe.

use std::{fmt, path::Path};

use serde::Serialize;

use crate::{
    input::{AvInput, PacketSource},
    stream::{AvStream, MediaKind},
};

#[derive(Debug, Clone, Serialize)]
pub struct FormatInfo {
    /// Demuxer name, e.g. "mov,mp4,m4a,3gp,3g2,mj2"
    pub format_name: String,
    /// Seconds; None if the container does not state it.
    pub duration_sec: Option<f64>,
    pub nb_streams: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    pub index: usize,
    pub codec_type: MediaKind,
    /// e.g. "h264", "aac"
    pub codec_name: String,
    /// e.g. "1/90000"
    pub time_base: String,
    /// In time_base units; None if unknown.
    pub duration_ts: Option<i64>,
    /// Frame rate, e.g. "25/1"
    pub rate: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

impl From<&AvStream> for StreamInfo {
    fn from(stream: &AvStream) -> Self {
        let time_base = stream.time_base();
        let rate = stream.rate();
        let (width, height) = match stream.kind() {
            MediaKind::Video => (Some(stream.width()), Some(stream.height())),
            _ => (None, None),
        };
        let (sample_rate, channels) = match stream.kind() {
            MediaKind::Audio => (Some(stream.sample_rate()), Some(stream.channels())),
            _ => (None, None),
        };
        Self {
            index: stream.index(),
            codec_type: stream.kind(),
            codec_name: codec_name(stream),
            time_base: format!("{}/{}", time_base.numerator(), time_base.denominator()),
            duration_ts: stream.duration(),
            rate: format!("{}/{}", rate.numerator(), rate.denominator()),
            width,
            height,
            sample_rate,
            channels,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaInfo {
    pub format: FormatInfo,
    pub streams: Vec<StreamInfo>,
}

impl fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[FORMAT]")?;
        writeln!(f, "format_name={}", self.format.format_name)?;
        match self.format.duration_sec {
            Some(d) => writeln!(f, "duration_sec={:.3}", d)?,
            None => writeln!(f, "duration_sec=N/A")?,
        }
        writeln!(f, "nb_streams={}", self.format.nb_streams)?;
        writeln!(f, "[/FORMAT]")?;
        for s in &self.streams {
            writeln!(f, "[STREAM]")?;
            writeln!(f, "index={}", s.index)?;
            writeln!(f, "codec_type={}", s.codec_type.as_str())?;
            writeln!(f, "codec_name={}", s.codec_name)?;
            writeln!(f, "time_base={}", s.time_base)?;
            if let Some(d) = s.duration_ts {
                writeln!(f, "duration_ts={}", d)?;
            }
            writeln!(f, "rate={}", s.rate)?;
            if let Some(w) = s.width {
                writeln!(f, "width={}", w)?;
            }
            if let Some(h) = s.height {
                writeln!(f, "height={}", h)?;
            }
            if let Some(sr) = s.sample_rate {
                writeln!(f, "sample_rate={}", sr)?;
            }
            if let Some(c) = s.channels {
                writeln!(f, "channels={}", c)?;
            }
            writeln!(f, "[/STREAM]")?;
        }
        Ok(())
    }
}

/// Lower-case codec name of a stream, e.g. "pcm_s16le".
pub fn codec_name(stream: &AvStream) -> String {
    format!("{:?}", stream.codec_id()).to_lowercase()
}

/// Format and stream listing of a media file.
///
/// ```ignore
/// let info = ffmpeg_convert::metadata::probe(Path::new("input.mp4"))?;
/// println!("{}", info);
/// ```
pub fn probe(path: &Path) -> anyhow::Result<MediaInfo> {
    let input = AvInput::open(path)?;
    Ok(describe(&input))
}

/// Listing of an already opened source.
pub fn describe(source: &dyn PacketSource) -> MediaInfo {
    let streams: Vec<StreamInfo> = source.streams().iter().map(StreamInfo::from).collect();
    MediaInfo {
        format: FormatInfo {
            format_name: source.format_name(),
            duration_sec: source.duration(),
            nb_streams: streams.len(),
        },
        streams,
    }
}

/// Duration of a media file in seconds, 0.0 when unknown.
pub fn probe_duration(path: &Path) -> anyhow::Result<f64> {
    let input = AvInput::open(path)?;
    Ok(resolve_duration(input.duration(), &input.streams()))
}

/// Container duration when known, otherwise the longest stream duration.
pub fn resolve_duration(container: Option<f64>, streams: &[AvStream]) -> f64 {
    if let Some(duration) = container.filter(|d| *d > 0.0) {
        return duration;
    }
    streams
        .iter()
        .filter_map(stream_seconds)
        .fold(0.0, f64::max)
}

fn stream_seconds(stream: &AvStream) -> Option<f64> {
    let ts = stream.duration()?;
    let tb = stream.time_base();
    if tb.denominator() == 0 {
        return None;
    }
    Some(ts as f64 * f64::from(tb))
}
