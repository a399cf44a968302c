//! Per-stream decode → adapt → align → encode → mux chain.

use ffmpeg_next::{Rational, Rescale};
use serde::Serialize;

use crate::{
    adapter::{Adapter, VideoAdapter},
    aligner::FrameAligner,
    backend::MediaBackend,
    decoder::FrameDecoder,
    error::TranscodeError,
    flush::{FlushSequencer, FlushStage},
    frame::{RawAudioFrame, RawFrame, RawVideoFrame},
    output::PacketSink,
    packet::RawPacket,
    selector::DropReason,
    sink::{EncodeSink, MAX_RECEIVE_ERRORS, MuxTarget, SinkStats},
    stream::{AudioFormat, AvStream, MediaKind, VideoFormat},
};

/// What happened to one input stream over a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamSummary {
    pub input_index: usize,
    pub kind: MediaKind,
    pub action: String,
    pub output_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_reason: Option<DropReason>,
    pub frames_encoded: u64,
    pub packets_written: u64,
    pub skipped_packets: u64,
    pub skipped_frames: u64,
    pub rejected_writes: u64,
}

impl StreamSummary {
    pub fn dropped(stream: &AvStream, reason: DropReason) -> Self {
        Self {
            input_index: stream.index(),
            kind: stream.kind(),
            action: "drop".to_string(),
            output_index: None,
            drop_reason: Some(reason),
            frames_encoded: 0,
            packets_written: 0,
            skipped_packets: 0,
            skipped_frames: 0,
            rejected_writes: 0,
        }
    }
}

enum Output {
    Encode(EncodeSink),
    Copy { target: MuxTarget, stats: SinkStats },
}

/// All state of one selected input stream.
///
/// Fields drop in declaration order, which releases the aligner, the
/// adapter, the encoder and finally the decoder.
pub struct StreamPipeline {
    aligner: Option<FrameAligner>,
    adapter: Option<Adapter>,
    output: Output,
    decoder: Box<dyn FrameDecoder>,
    index: usize,
    kind: MediaKind,
    input_time_base: Rational,
    video_target: Option<VideoFormat>,
    next_pts: i64,
    flush: FlushSequencer,
    skipped_packets: u64,
    skipped_frames: u64,
}

impl StreamPipeline {
    fn new(stream: &AvStream, decoder: Box<dyn FrameDecoder>, output: Output) -> Self {
        Self {
            aligner: None,
            adapter: None,
            output,
            decoder,
            index: stream.index(),
            kind: stream.kind(),
            input_time_base: stream.time_base(),
            video_target: None,
            next_pts: 0,
            flush: FlushSequencer::new(),
            skipped_packets: 0,
            skipped_frames: 0,
        }
    }

    /// Forwards packets untouched. The decoder is held but never fed.
    pub fn copy(stream: &AvStream, decoder: Box<dyn FrameDecoder>, output_index: usize) -> Self {
        let target = MuxTarget {
            index: output_index,
            time_base: stream.time_base(),
        };
        Self::new(
            stream,
            decoder,
            Output::Copy {
                target,
                stats: SinkStats::default(),
            },
        )
    }

    /// `frame_size` is the sample count the encoder needs per frame,
    /// `None` to bypass the aligner.
    pub fn audio(
        stream: &AvStream,
        decoder: Box<dyn FrameDecoder>,
        adapter: Option<Adapter>,
        sink: EncodeSink,
        target: AudioFormat,
        frame_size: Option<usize>,
    ) -> Self {
        let mut pipeline = Self::new(stream, decoder, Output::Encode(sink));
        pipeline.adapter = adapter;
        pipeline.aligner = frame_size.map(|size| FrameAligner::new(target, size));
        pipeline
    }

    pub fn video(
        stream: &AvStream,
        decoder: Box<dyn FrameDecoder>,
        adapter: Option<Adapter>,
        sink: EncodeSink,
        target: VideoFormat,
    ) -> Self {
        let mut pipeline = Self::new(stream, decoder, Output::Encode(sink));
        pipeline.adapter = adapter;
        pipeline.video_target = Some(target);
        pipeline
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn stage(&self) -> FlushStage {
        self.flush.stage()
    }

    pub fn has_adapter(&self) -> bool {
        self.adapter.is_some()
    }

    pub fn has_aligner(&self) -> bool {
        self.aligner.is_some()
    }

    pub fn output_index(&self) -> usize {
        match &self.output {
            Output::Encode(sink) => sink.target().index,
            Output::Copy { target, .. } => target.index,
        }
    }

    /// Picks up the time base the muxer chose once the header is written.
    pub fn bind_output(&mut self, muxer: &dyn PacketSink) {
        let index = self.output_index();
        let Some(time_base) = muxer.stream_time_base(index) else {
            return;
        };
        match &mut self.output {
            Output::Encode(sink) => sink.set_output_time_base(time_base),
            Output::Copy { target, .. } => target.time_base = time_base,
        }
    }

    pub fn summary(&self) -> StreamSummary {
        let (action, stats) = match &self.output {
            Output::Encode(sink) => ("transcode", sink.stats()),
            Output::Copy { stats, .. } => ("copy", *stats),
        };
        StreamSummary {
            input_index: self.index,
            kind: self.kind,
            action: action.to_string(),
            output_index: Some(self.output_index()),
            drop_reason: None,
            frames_encoded: stats.frames_encoded,
            packets_written: stats.packets_written,
            skipped_packets: self.skipped_packets,
            skipped_frames: self.skipped_frames,
            rejected_writes: stats.rejected_writes,
        }
    }

    /// Routes one demuxed packet of this stream through the chain.
    ///
    /// Undecodable packets are logged and skipped; only a rescaler that
    /// cannot be rebuilt fails the call.
    pub fn process_packet(
        &mut self,
        packet: RawPacket,
        muxer: &mut dyn PacketSink,
        backend: &dyn MediaBackend,
    ) -> Result<(), TranscodeError> {
        if !self.flush.is_streaming() {
            log::warn!("stream {}: packet after flush ignored", self.index);
            return Ok(());
        }
        if let Output::Copy { target, stats } = &mut self.output {
            let result = target.write(muxer, packet);
            stats.record_write(result);
            return Ok(());
        }
        if let Err(source) = self.decoder.send_packet(packet) {
            self.skip_packet(source);
            return Ok(());
        }
        self.receive_frames(muxer, backend)
    }

    /// Runs every drain stage to exhaustion. Calling it again is a no-op.
    pub fn flush(
        &mut self,
        muxer: &mut dyn PacketSink,
        backend: &dyn MediaBackend,
    ) -> Result<(), TranscodeError> {
        if matches!(self.output, Output::Copy { .. }) {
            self.flush.finish();
            return Ok(());
        }
        while let Some(stage) = self.flush.advance() {
            log::debug!("stream {}: {:?}", self.index, stage);
            match stage {
                FlushStage::DrainDecoder => {
                    if let Err(e) = self.decoder.send_eof() {
                        log::warn!("stream {}: decoder eof: {}", self.index, e);
                    }
                    self.receive_frames(muxer, backend)?;
                }
                FlushStage::DrainAdapter => self.drain_adapter(muxer),
                FlushStage::DrainAligner => self.drain_aligner(muxer),
                FlushStage::DrainEncoder => {
                    if let Output::Encode(sink) = &mut self.output {
                        sink.finish(muxer);
                    }
                }
                FlushStage::Streaming | FlushStage::Done => {}
            }
        }
        Ok(())
    }

    fn skip_packet(&mut self, source: anyhow::Error) {
        let err = TranscodeError::TransientDecode {
            stream: self.index,
            source,
        };
        log::warn!("{}", err);
        self.skipped_packets += 1;
    }

    fn receive_frames(
        &mut self,
        muxer: &mut dyn PacketSink,
        backend: &dyn MediaBackend,
    ) -> Result<(), TranscodeError> {
        let mut errors = 0;
        loop {
            match self.decoder.receive_frame() {
                Ok(Some(RawFrame::Audio(frame))) => self.handle_audio(frame, muxer),
                Ok(Some(RawFrame::Video(frame))) => self.handle_video(frame, muxer, backend)?,
                Ok(None) => return Ok(()),
                Err(source) => {
                    self.skip_packet(source);
                    errors += 1;
                    if errors >= MAX_RECEIVE_ERRORS {
                        log::warn!("stream {}: decoder keeps failing, giving up", self.index);
                        return Ok(());
                    }
                    continue;
                }
            }
            errors = 0;
        }
    }

    fn handle_audio(&mut self, frame: RawAudioFrame, muxer: &mut dyn PacketSink) {
        let frame = match &mut self.adapter {
            Some(Adapter::Audio(resampler)) => match resampler.convert(&frame) {
                Ok(Some(converted)) => converted,
                Ok(None) => return,
                Err(e) => {
                    log::warn!("stream {}: resample failed, frame skipped: {}", self.index, e);
                    self.skipped_frames += 1;
                    return;
                }
            },
            _ => frame,
        };
        self.emit_audio(frame, muxer);
    }

    fn emit_audio(&mut self, mut frame: RawAudioFrame, muxer: &mut dyn PacketSink) {
        let Output::Encode(sink) = &mut self.output else {
            return;
        };
        match &mut self.aligner {
            Some(aligner) => match aligner.push(&frame) {
                Ok(frames) => {
                    for frame in frames {
                        sink.push(RawFrame::Audio(frame), muxer);
                    }
                }
                Err(e) => {
                    log::warn!("stream {}: {}", self.index, e);
                    self.skipped_frames += 1;
                }
            },
            None => {
                let own_pts = match (&self.adapter, frame.pts()) {
                    (None, Some(pts)) => {
                        Some(pts.rescale(self.input_time_base, sink.encoder_time_base()))
                    }
                    _ => None,
                };
                let pts = own_pts.unwrap_or(self.next_pts).max(self.next_pts);
                self.next_pts = pts + frame.samples() as i64;
                frame.set_pts(Some(pts));
                sink.push(RawFrame::Audio(frame), muxer);
            }
        }
    }

    fn handle_video(
        &mut self,
        frame: RawVideoFrame,
        muxer: &mut dyn PacketSink,
        backend: &dyn MediaBackend,
    ) -> Result<(), TranscodeError> {
        let Some(target) = self.video_target else {
            return Ok(());
        };
        let format = frame.video_format();
        let converted = match &mut self.adapter {
            Some(Adapter::Video(adapter)) => {
                adapter.prepare(backend, self.index, format)?;
                adapter.convert(&frame)
            }
            _ if format == target => Ok(frame),
            _ => {
                let mut adapter = VideoAdapter::build(backend, self.index, format, target)?;
                let converted = adapter.convert(&frame);
                self.adapter = Some(Adapter::Video(adapter));
                converted
            }
        };
        let mut frame = match converted {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("stream {}: rescale failed, frame skipped: {}", self.index, e);
                self.skipped_frames += 1;
                return Ok(());
            }
        };

        let Output::Encode(sink) = &mut self.output else {
            return Ok(());
        };
        let pts = frame
            .pts()
            .map(|pts| pts.rescale(self.input_time_base, sink.encoder_time_base()))
            .unwrap_or(self.next_pts)
            .max(self.next_pts);
        self.next_pts = pts + 1;
        frame.set_pts(Some(pts));
        sink.push(RawFrame::Video(frame), muxer);
        Ok(())
    }

    fn drain_adapter(&mut self, muxer: &mut dyn PacketSink) {
        let Some(Adapter::Audio(resampler)) = &mut self.adapter else {
            return;
        };
        let mut pending = Vec::new();
        loop {
            match resampler.flush() {
                Ok(Some(frame)) => pending.push(frame),
                Ok(None) => break,
                Err(e) => {
                    log::warn!("stream {}: resampler flush: {}", self.index, e);
                    break;
                }
            }
        }
        for frame in pending {
            self.emit_audio(frame, muxer);
        }
    }

    fn drain_aligner(&mut self, muxer: &mut dyn PacketSink) {
        let (Some(aligner), Output::Encode(sink)) = (&mut self.aligner, &mut self.output) else {
            return;
        };
        match aligner.flush() {
            Ok(Some(frame)) => sink.push(RawFrame::Audio(frame), muxer),
            Ok(None) => {}
            Err(e) => log::warn!("stream {}: aligner flush: {}", self.index, e),
        }
    }
}
