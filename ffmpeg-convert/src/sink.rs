use ffmpeg_next::Rational;
use serde::Serialize;

use crate::{
    encoder::FrameEncoder,
    error::TranscodeError,
    frame::RawFrame,
    output::PacketSink,
    packet::RawPacket,
};

/// Consecutive receive failures tolerated before a codec is treated as
/// drained.
pub const MAX_RECEIVE_ERRORS: usize = 16;

/// Output stream a pipeline writes to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MuxTarget {
    pub index: usize,
    pub time_base: Rational,
}

impl MuxTarget {
    /// Moves `packet` onto this output stream and hands it to the muxer.
    pub fn write(
        &self,
        muxer: &mut dyn PacketSink,
        mut packet: RawPacket,
    ) -> Result<(), TranscodeError> {
        packet.rescale_to(self.time_base);
        packet.set_index(self.index);
        muxer
            .write_packet(packet)
            .map_err(|source| TranscodeError::Write {
                stream: self.index,
                source,
            })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub frames_encoded: u64,
    pub frames_rejected: u64,
    pub packets_written: u64,
    /// Packets the muxer refused. The job still counts as successful.
    pub rejected_writes: u64,
}

impl SinkStats {
    /// Counts the outcome of one muxer write.
    pub fn record_write(&mut self, result: Result<(), TranscodeError>) {
        match result {
            Ok(()) => self.packets_written += 1,
            Err(err) => {
                log::warn!("{}", err);
                self.rejected_writes += 1;
            }
        }
    }
}

/// Encoder of one pipeline plus the output stream its packets go to.
pub struct EncodeSink {
    encoder: Box<dyn FrameEncoder>,
    target: MuxTarget,
    stats: SinkStats,
}

impl EncodeSink {
    pub fn new(encoder: Box<dyn FrameEncoder>, output_index: usize) -> Self {
        let time_base = encoder.time_base();
        Self {
            encoder,
            target: MuxTarget {
                index: output_index,
                time_base,
            },
            stats: SinkStats::default(),
        }
    }

    /// Adopts the time base the muxer settled on for the output stream.
    pub fn set_output_time_base(&mut self, time_base: Rational) {
        self.target.time_base = time_base;
    }

    pub fn target(&self) -> MuxTarget {
        self.target
    }

    pub fn encoder_time_base(&self) -> Rational {
        self.encoder.time_base()
    }

    pub fn frame_size(&self) -> Option<usize> {
        self.encoder.frame_size()
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    /// Encodes one frame and writes every packet the encoder releases.
    pub fn push(&mut self, frame: RawFrame, muxer: &mut dyn PacketSink) {
        match self.encoder.send_frame(frame) {
            Ok(()) => self.stats.frames_encoded += 1,
            Err(e) => {
                log::warn!("output stream {}: encoder rejected frame: {}", self.target.index, e);
                self.stats.frames_rejected += 1;
            }
        }
        self.drain(muxer);
    }

    /// Signals end of input and writes everything still queued.
    pub fn finish(&mut self, muxer: &mut dyn PacketSink) {
        if let Err(e) = self.encoder.send_eof() {
            log::warn!("output stream {}: encoder eof: {}", self.target.index, e);
        }
        self.drain(muxer);
    }

    fn drain(&mut self, muxer: &mut dyn PacketSink) {
        let mut errors = 0;
        loop {
            match self.encoder.receive_packet() {
                Ok(Some(packet)) => {
                    errors = 0;
                    let result = self.target.write(muxer, packet);
                    self.stats.record_write(result);
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("output stream {}: receive packet: {}", self.target.index, e);
                    errors += 1;
                    if errors >= MAX_RECEIVE_ERRORS {
                        break;
                    }
                }
            }
        }
    }
}
