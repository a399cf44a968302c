use bytes::Bytes;
use ffmpeg_next::format::Sample;

use crate::stream::{AudioFormat, VideoFormat};

#[derive(Clone)]
pub enum RawFrame {
    Video(RawVideoFrame),
    Audio(RawAudioFrame),
}

impl RawFrame {
    pub fn pts(&self) -> Option<i64> {
        match self {
            RawFrame::Video(frame) => frame.pts(),
            RawFrame::Audio(frame) => frame.pts(),
        }
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        match self {
            RawFrame::Video(frame) => frame.set_pts(pts),
            RawFrame::Audio(frame) => frame.set_pts(pts),
        }
    }
}

/// How interleaved PCM of a given sample format is spread across planes:
/// `(plane count, bytes per sample in each plane)`.
pub fn plane_layout(format: Sample, channels: u16) -> (usize, usize) {
    let channels = channels.max(1) as usize;
    if format.is_planar() {
        (channels, format.bytes())
    } else {
        (1, format.bytes() * channels)
    }
}

#[derive(Clone)]
pub struct RawAudioFrame {
    frame: ffmpeg_next::frame::Audio,
}

impl RawAudioFrame {
    /// Allocates a frame of `samples` samples and copies `planes` into it.
    /// Every plane must hold at least `samples` samples.
    pub fn from_planes(
        format: &AudioFormat,
        planes: &[Bytes],
        samples: usize,
        pts: Option<i64>,
    ) -> anyhow::Result<Self> {
        let (plane_count, stride) = plane_layout(format.format, format.channels);
        if planes.len() != plane_count {
            anyhow::bail!(
                "expected {} sample planes, got {}",
                plane_count,
                planes.len()
            );
        }
        let mut frame = ffmpeg_next::frame::Audio::new(format.format, samples, format.layout);
        frame.set_rate(format.sample_rate);
        let len = samples * stride;
        for (index, plane) in planes.iter().enumerate() {
            if plane.len() < len {
                anyhow::bail!("plane {} holds {} bytes, need {}", index, plane.len(), len);
            }
            frame.data_mut(index)[..len].copy_from_slice(&plane[..len]);
        }
        frame.set_pts(pts);
        Ok(Self { frame })
    }

    pub fn pts(&self) -> Option<i64> {
        self.frame.pts()
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        self.frame.set_pts(pts);
    }

    pub fn format(&self) -> Sample {
        self.frame.format()
    }

    pub fn samples(&self) -> usize {
        self.frame.samples()
    }

    pub fn rate(&self) -> u32 {
        self.frame.rate()
    }

    pub fn channels(&self) -> u16 {
        self.frame.channels()
    }

    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.frame.rate(),
            channels: self.frame.channels(),
            layout: self.frame.channel_layout(),
            format: self.frame.format(),
        }
    }

    /// Valid sample bytes of every plane; the allocation padding FFmpeg
    /// adds behind the last sample is cut off.
    pub fn planes(&self) -> Vec<&[u8]> {
        let (plane_count, stride) = plane_layout(self.frame.format(), self.frame.channels());
        let len = self.frame.samples() * stride;
        (0..plane_count)
            .map(|index| {
                let data = self.frame.data(index);
                &data[..len.min(data.len())]
            })
            .collect()
    }

    pub fn get_mut(&mut self) -> &mut ffmpeg_next::frame::Audio {
        &mut self.frame
    }

    pub fn as_audio(&self) -> &ffmpeg_next::frame::Audio {
        &self.frame
    }
}

impl From<ffmpeg_next::frame::Audio> for RawAudioFrame {
    fn from(frame: ffmpeg_next::frame::Audio) -> Self {
        Self { frame }
    }
}

#[derive(Clone)]
pub struct RawVideoFrame {
    frame: ffmpeg_next::frame::Video,
}

impl From<ffmpeg_next::frame::Video> for RawVideoFrame {
    fn from(frame: ffmpeg_next::frame::Video) -> Self {
        Self { frame }
    }
}

impl RawVideoFrame {
    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn format(&self) -> ffmpeg_next::format::Pixel {
        self.frame.format()
    }

    pub fn video_format(&self) -> VideoFormat {
        VideoFormat {
            width: self.frame.width(),
            height: self.frame.height(),
            format: self.frame.format(),
        }
    }

    pub fn pts(&self) -> Option<i64> {
        self.frame.pts()
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        self.frame.set_pts(pts);
    }

    /// Pixel rows of plane 0 without line padding. Only meaningful for
    /// packed formats such as RGB24.
    pub fn packed_rows(&self, bytes_per_pixel: usize) -> Vec<u8> {
        let width = self.frame.width() as usize * bytes_per_pixel;
        let stride = self.frame.stride(0);
        let data = self.frame.data(0);
        let mut rows = Vec::with_capacity(width * self.frame.height() as usize);
        for row in 0..self.frame.height() as usize {
            let start = row * stride;
            rows.extend_from_slice(&data[start..start + width]);
        }
        rows
    }

    pub fn get_mut(&mut self) -> &mut ffmpeg_next::frame::Video {
        &mut self.frame
    }

    pub fn as_video(&self) -> &ffmpeg_next::frame::Video {
        &self.frame
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_next::{ChannelLayout, format::sample::Type};

    use super::*;

    #[test]
    fn test_plane_layout() {
        assert_eq!(plane_layout(Sample::I16(Type::Packed), 2), (1, 4));
        assert_eq!(plane_layout(Sample::F32(Type::Planar), 2), (2, 4));
        assert_eq!(plane_layout(Sample::I16(Type::Packed), 1), (1, 2));
    }

    #[test]
    fn test_from_planes_round_trips_sample_bytes() -> anyhow::Result<()> {
        let format = AudioFormat::new(8000, ChannelLayout::MONO, Sample::I16(Type::Packed));
        let pcm: Vec<u8> = (0..20u8).collect();
        let frame = RawAudioFrame::from_planes(&format, &[Bytes::from(pcm.clone())], 10, Some(7))?;
        assert_eq!(frame.samples(), 10);
        assert_eq!(frame.pts(), Some(7));
        assert_eq!(frame.rate(), 8000);
        assert_eq!(frame.planes(), vec![pcm.as_slice()]);
        Ok(())
    }

    #[test]
    fn test_from_planes_rejects_short_plane() {
        let format = AudioFormat::new(8000, ChannelLayout::MONO, Sample::I16(Type::Packed));
        let res = RawAudioFrame::from_planes(&format, &[Bytes::from(vec![0u8; 4])], 10, None);
        assert!(res.is_err());
    }
}
