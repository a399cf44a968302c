use bytes::Bytes;
use ffmpeg_next::Rational;

/// One still-encoded packet together with the time base its timestamps are
/// expressed in.
#[derive(Clone)]
pub struct RawPacket {
    packet: ffmpeg_next::codec::packet::Packet,
    time_base: Rational,
}

impl RawPacket {
    pub fn pts(&self) -> Option<i64> {
        self.packet.pts()
    }

    /// Stream index the packet belongs to (input index on the demux side,
    /// output index once handed to the muxer).
    pub fn index(&self) -> usize {
        self.packet.stream()
    }

    pub fn set_index(&mut self, index: usize) {
        self.packet.set_stream(index);
    }

    pub fn data(&self) -> Bytes {
        self.packet
            .data()
            .map(Bytes::copy_from_slice)
            .unwrap_or_default()
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Rescales pts/dts/duration into `time_base` and records it as the
    /// packet's new time base.
    pub fn rescale_to(&mut self, time_base: Rational) {
        if self.time_base != time_base {
            self.packet.rescale_ts(self.time_base, time_base);
            self.time_base = time_base;
        }
    }

    pub fn get_mut(&mut self) -> &mut ffmpeg_next::codec::packet::Packet {
        &mut self.packet
    }

    pub fn packet(&self) -> &ffmpeg_next::codec::packet::Packet {
        &self.packet
    }
}

impl From<(ffmpeg_next::codec::packet::Packet, Rational)> for RawPacket {
    fn from((packet, time_base): (ffmpeg_next::codec::packet::Packet, Rational)) -> Self {
        Self { packet, time_base }
    }
}
