use std::path::Path;

use crate::{packet::RawPacket, stream::AvStream};

/// Demuxer side of a job.
pub trait PacketSource {
    /// Streams in container order.
    fn streams(&self) -> Vec<AvStream>;
    /// Container duration in seconds, when the container states one.
    fn duration(&self) -> Option<f64>;
    fn format_name(&self) -> String;
    /// Next packet in demux order, `None` at end of input.
    fn read_packet(&mut self) -> Option<RawPacket>;
}

pub struct AvInput {
    inner: ffmpeg_next::format::context::Input,
    streams: Vec<AvStream>,
}

impl AvInput {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let input = ffmpeg_next::format::input(path)
            .map_err(|e| anyhow::anyhow!("open input {}: {}", path.display(), e))?;
        let streams = input.streams().map(AvStream::from).collect();
        Ok(Self {
            inner: input,
            streams,
        })
    }
}

impl PacketSource for AvInput {
    fn streams(&self) -> Vec<AvStream> {
        self.streams.clone()
    }

    fn duration(&self) -> Option<f64> {
        // AV_TIME_BASE = 1_000_000; duration is in 1/AV_TIME_BASE seconds
        match self.inner.duration() {
            d if d == ffmpeg_next::ffi::AV_NOPTS_VALUE as i64 || d <= 0 => None,
            d => Some(d as f64 / 1_000_000.0),
        }
    }

    fn format_name(&self) -> String {
        self.inner.format().name().to_string()
    }

    fn read_packet(&mut self) -> Option<RawPacket> {
        self.inner
            .packets()
            .next()
            .map(|(stream, packet)| (packet, stream.time_base()).into())
    }
}
