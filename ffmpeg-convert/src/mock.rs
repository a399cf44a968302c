//! In-memory collaborators for driving jobs without media files.
//!
//! Every handle records its release in a shared event log so tests can
//! check teardown order.

use std::{
    collections::VecDeque,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use bytes::Bytes;
use ffmpeg_next::{
    ChannelLayout, Rational,
    codec::{Id, Parameters},
    format::{Pixel, Sample, sample::Type},
};

use crate::{
    backend::MediaBackend,
    decoder::FrameDecoder,
    encoder::{EncoderCaps, EncoderParams, EncoderTarget, FrameEncoder},
    frame::{RawAudioFrame, RawFrame, RawVideoFrame, plane_layout},
    input::PacketSource,
    output::{OutputStreamSpec, PacketSink},
    packet::RawPacket,
    profile::FormatProfile,
    resampler::Resample,
    scaler::Rescale,
    stream::{AudioFormat, AvStream, MediaKind, VideoFormat},
};

pub type Shared<T> = Arc<Mutex<Vec<T>>>;

const CORRUPT: &[u8] = b"bad";

#[derive(Debug, Clone, Copy)]
pub struct MockPacket {
    pub stream: usize,
    pub pts: i64,
    pub corrupt: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrittenPacket {
    pub stream: usize,
    pub pts: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub kind: MediaKind,
    pub samples: usize,
    pub pts: Option<i64>,
}

#[derive(Clone)]
pub struct MockBackend {
    pub streams: Vec<AvStream>,
    pub packets: Vec<MockPacket>,
    /// Samples each decoded audio packet yields.
    pub samples_per_packet: usize,
    pub audio_format: AudioFormat,
    pub video_format: VideoFormat,
    /// `None` makes the audio encoder accept any frame size.
    pub encoder_frame_size: Option<usize>,
    /// Media kinds an encoder exists for.
    pub encoders: Vec<MediaKind>,
    /// Input stream indices without a decoder.
    pub no_decoder: Vec<usize>,
    /// Frames a decoder holds back until more input or end of input.
    pub decoder_delay: usize,
    /// Receive failures a decoder reports right after end of input.
    pub decoder_eof_errors: usize,
    /// Receive failures an encoder reports right after end of input.
    pub encoder_eof_errors: usize,
    /// Pixel formats the video encoder declares.
    pub video_encoder_formats: Vec<Pixel>,
    /// From the n-th decoded video frame on, frames come out in this format.
    pub video_change: Option<(usize, VideoFormat)>,
    /// Rescalers that can be opened before opening fails.
    pub rescaler_budget: Option<usize>,
    pub fail_resampler: bool,
    /// Samples the resampler holds back until flushed.
    pub resampler_delay: usize,
    pub reject_writes: bool,
    /// Time base the muxer assigns to every stream at header time.
    pub muxer_time_base: Option<Rational>,
    pub events: Shared<String>,
    pub written: Shared<WrittenPacket>,
    pub encoded: Shared<EncodedFrame>,
    pub opened_encoders: Shared<EncoderParams>,
    encoder_ids: Arc<AtomicUsize>,
    rescalers: Arc<AtomicUsize>,
}

impl MockBackend {
    /// One 48 kHz mono s16 audio stream with `packets` packets.
    pub fn audio(packets: usize, samples_per_packet: usize) -> Self {
        let format = AudioFormat::new(48000, ChannelLayout::MONO, Sample::I16(Type::Packed));
        let stream = AvStream::new(0, MediaKind::Audio, Id::PCM_S16LE, Rational::new(1, 48000))
            .with_audio(format.sample_rate, format.channels);
        let mut backend = Self {
            streams: vec![stream],
            packets: Vec::new(),
            samples_per_packet,
            audio_format: format,
            video_format: VideoFormat {
                width: 16,
                height: 16,
                format: Pixel::YUV420P,
            },
            encoder_frame_size: Some(1152),
            encoders: vec![MediaKind::Audio, MediaKind::Video],
            no_decoder: Vec::new(),
            decoder_delay: 1,
            decoder_eof_errors: 0,
            encoder_eof_errors: 0,
            video_encoder_formats: Vec::new(),
            video_change: None,
            rescaler_budget: None,
            fail_resampler: false,
            resampler_delay: 0,
            reject_writes: false,
            muxer_time_base: None,
            events: Arc::default(),
            written: Arc::default(),
            encoded: Arc::default(),
            opened_encoders: Arc::default(),
            encoder_ids: Arc::default(),
            rescalers: Arc::default(),
        };
        backend.push_packets(0, packets, samples_per_packet as i64);
        backend
    }

    /// Appends `count` packets for `stream`, `step` pts units apart.
    pub fn push_packets(&mut self, stream: usize, count: usize, step: i64) {
        for i in 0..count {
            self.packets.push(MockPacket {
                stream,
                pts: i as i64 * step,
                corrupt: false,
            });
        }
    }

    pub fn with_audio_format(mut self, format: AudioFormat) -> Self {
        self.audio_format = format;
        self.streams[0] = AvStream::new(
            0,
            MediaKind::Audio,
            Id::PCM_F32LE,
            Rational::new(1, format.sample_rate as i32),
        )
        .with_audio(format.sample_rate, format.channels);
        self
    }

    /// Adds a 25 fps video stream carrying `packets` packets.
    pub fn with_video(mut self, packets: usize) -> Self {
        let index = self.streams.len();
        self.streams.push(
            AvStream::new(index, MediaKind::Video, Id::H264, Rational::new(1, 90000)).with_video(
                self.video_format.width,
                self.video_format.height,
                Rational::new(25, 1),
            ),
        );
        self.push_packets(index, packets, 3600);
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn releases(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.starts_with("drop"))
            .collect()
    }

    pub fn written(&self) -> Vec<WrittenPacket> {
        self.written.lock().unwrap().clone()
    }

    pub fn encoded(&self) -> Vec<EncodedFrame> {
        self.encoded.lock().unwrap().clone()
    }

    fn log(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl MediaBackend for MockBackend {
    fn open_input(&self, _path: &Path) -> anyhow::Result<Box<dyn PacketSource>> {
        let packets = self
            .packets
            .iter()
            .map(|p| {
                let data: &[u8] = if p.corrupt { CORRUPT } else { &[0, 0, 0, 0] };
                let mut packet = ffmpeg_next::codec::packet::Packet::copy(data);
                packet.set_stream(p.stream);
                packet.set_pts(Some(p.pts));
                packet.set_dts(Some(p.pts));
                RawPacket::from((packet, self.streams[p.stream].time_base()))
            })
            .collect();
        Ok(Box::new(MockSource {
            streams: self.streams.clone(),
            packets,
            events: self.events.clone(),
        }))
    }

    fn open_output(&self, _path: &Path, _container: &str) -> anyhow::Result<Box<dyn PacketSink>> {
        Ok(Box::new(MockSink {
            time_bases: Vec::new(),
            muxer_time_base: self.muxer_time_base,
            reject_writes: self.reject_writes,
            header: false,
            events: self.events.clone(),
            written: self.written.clone(),
        }))
    }

    fn open_decoder(&self, stream: &AvStream) -> anyhow::Result<Box<dyn FrameDecoder>> {
        if self.no_decoder.contains(&stream.index()) {
            anyhow::bail!("no decoder for stream {}", stream.index());
        }
        self.log(format!("open decoder {}", stream.index()));
        Ok(Box::new(MockDecoder {
            index: stream.index(),
            kind: stream.kind(),
            audio: self.audio_format,
            video: self.video_format,
            samples: self.samples_per_packet,
            delay: self.decoder_delay,
            eof_errors: self.decoder_eof_errors,
            change: self.video_change,
            decoded: 0,
            pending: VecDeque::new(),
            eof: false,
            events: self.events.clone(),
        }))
    }

    fn find_encoder(
        &self,
        kind: MediaKind,
        _profile: &FormatProfile,
        _sink: &dyn PacketSink,
    ) -> Option<EncoderCaps> {
        if !self.encoders.contains(&kind) {
            return None;
        }
        let mut caps = EncoderCaps::new(&format!("mock-{}", kind.as_str()), kind);
        if kind == MediaKind::Video {
            caps.pixel_formats = self.video_encoder_formats.clone();
        }
        Some(caps)
    }

    fn open_encoder(&self, params: &EncoderParams) -> anyhow::Result<Box<dyn FrameEncoder>> {
        let id = self.encoder_ids.fetch_add(1, Ordering::SeqCst);
        self.opened_encoders.lock().unwrap().push(params.clone());
        self.log(format!("open encoder #{}", id));
        let (kind, frame_size, video) = match params.target {
            EncoderTarget::Audio(_) => (MediaKind::Audio, self.encoder_frame_size, None),
            EncoderTarget::Video { format, .. } => (MediaKind::Video, None, Some(format)),
        };
        Ok(Box::new(MockEncoder {
            id,
            kind,
            time_base: params.time_base(),
            frame_size,
            video,
            eof_errors: self.encoder_eof_errors,
            queue: VecDeque::new(),
            eof: false,
            events: self.events.clone(),
            encoded: self.encoded.clone(),
        }))
    }

    fn open_resampler(
        &self,
        _source: AudioFormat,
        target: AudioFormat,
    ) -> anyhow::Result<Box<dyn Resample>> {
        if self.fail_resampler {
            anyhow::bail!("unsupported conversion");
        }
        self.log("open resampler".to_string());
        Ok(Box::new(MockResampler {
            target,
            hold: self.resampler_delay,
            held: 0,
            events: self.events.clone(),
        }))
    }

    fn open_rescaler(
        &self,
        source: VideoFormat,
        target: VideoFormat,
    ) -> anyhow::Result<Box<dyn Rescale>> {
        let opened = self.rescalers.fetch_add(1, Ordering::SeqCst);
        if self.rescaler_budget.is_some_and(|budget| opened >= budget) {
            anyhow::bail!("no conversion from {:?}", source.format);
        }
        self.log(format!("open rescaler {}x{}", source.width, source.height));
        Ok(Box::new(MockRescaler {
            source,
            target,
            events: self.events.clone(),
        }))
    }
}

pub struct MockSource {
    streams: Vec<AvStream>,
    packets: VecDeque<RawPacket>,
    events: Shared<String>,
}

impl PacketSource for MockSource {
    fn streams(&self) -> Vec<AvStream> {
        self.streams.clone()
    }

    fn duration(&self) -> Option<f64> {
        None
    }

    fn format_name(&self) -> String {
        "mock".to_string()
    }

    fn read_packet(&mut self) -> Option<RawPacket> {
        self.packets.pop_front()
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.events.lock().unwrap().push("drop demuxer".to_string());
    }
}

pub struct MockSink {
    time_bases: Vec<Rational>,
    muxer_time_base: Option<Rational>,
    reject_writes: bool,
    header: bool,
    events: Shared<String>,
    written: Shared<WrittenPacket>,
}

impl PacketSink for MockSink {
    fn default_codec(&self, _kind: MediaKind) -> Option<String> {
        None
    }

    fn needs_global_header(&self) -> bool {
        false
    }

    fn add_stream(&mut self, spec: OutputStreamSpec) -> anyhow::Result<usize> {
        self.time_bases.push(spec.time_base);
        Ok(self.time_bases.len() - 1)
    }

    fn write_header(&mut self) -> anyhow::Result<()> {
        self.header = true;
        if let Some(time_base) = self.muxer_time_base {
            self.time_bases.iter_mut().for_each(|tb| *tb = time_base);
        }
        self.events.lock().unwrap().push("header".to_string());
        Ok(())
    }

    fn stream_time_base(&self, index: usize) -> Option<Rational> {
        self.time_bases.get(index).copied()
    }

    fn write_packet(&mut self, packet: RawPacket) -> anyhow::Result<()> {
        if !self.header {
            anyhow::bail!("packet written before header");
        }
        if self.reject_writes {
            anyhow::bail!("disk full");
        }
        self.written.lock().unwrap().push(WrittenPacket {
            stream: packet.index(),
            pts: packet.pts(),
        });
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        if self.header {
            self.events.lock().unwrap().push("trailer".to_string());
        }
        Ok(())
    }
}

impl Drop for MockSink {
    fn drop(&mut self) {
        self.events.lock().unwrap().push("drop muxer".to_string());
    }
}

/// Holds `delay` decoded frames back until more input or end of input.
pub struct MockDecoder {
    index: usize,
    kind: MediaKind,
    audio: AudioFormat,
    video: VideoFormat,
    samples: usize,
    delay: usize,
    eof_errors: usize,
    change: Option<(usize, VideoFormat)>,
    decoded: usize,
    pending: VecDeque<RawFrame>,
    eof: bool,
    events: Shared<String>,
}

impl MockDecoder {
    fn decode(&mut self, pts: Option<i64>) -> anyhow::Result<RawFrame> {
        self.decoded += 1;
        match self.kind {
            MediaKind::Video => {
                let format = match self.change {
                    Some((from, format)) if self.decoded > from => format,
                    _ => self.video,
                };
                let mut frame =
                    ffmpeg_next::frame::Video::new(format.format, format.width, format.height);
                frame.set_pts(pts);
                Ok(RawFrame::Video(RawVideoFrame::from(frame)))
            }
            _ => Ok(RawFrame::Audio(silence(&self.audio, self.samples, pts)?)),
        }
    }
}

impl FrameDecoder for MockDecoder {
    fn send_packet(&mut self, packet: RawPacket) -> anyhow::Result<()> {
        if packet.data().as_ref() == CORRUPT {
            anyhow::bail!("invalid data found when processing input");
        }
        let frame = self.decode(packet.pts())?;
        self.pending.push_back(frame);
        Ok(())
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        self.eof = true;
        Ok(())
    }

    fn receive_frame(&mut self) -> anyhow::Result<Option<RawFrame>> {
        if self.eof && self.eof_errors > 0 {
            self.eof_errors -= 1;
            anyhow::bail!("error while draining");
        }
        if self.pending.len() > self.delay || self.eof {
            return Ok(self.pending.pop_front());
        }
        Ok(None)
    }

    fn audio_format(&self) -> Option<AudioFormat> {
        (self.kind == MediaKind::Audio).then_some(self.audio)
    }

    fn video_format(&self) -> Option<VideoFormat> {
        (self.kind == MediaKind::Video).then_some(self.video)
    }
}

impl Drop for MockDecoder {
    fn drop(&mut self) {
        let event = format!("drop decoder {}", self.index);
        self.events.lock().unwrap().push(event);
    }
}

/// Emits one packet per frame, holding one packet back until end of input.
pub struct MockEncoder {
    id: usize,
    kind: MediaKind,
    time_base: Rational,
    frame_size: Option<usize>,
    /// Format video frames must arrive in.
    video: Option<VideoFormat>,
    eof_errors: usize,
    queue: VecDeque<RawPacket>,
    eof: bool,
    events: Shared<String>,
    encoded: Shared<EncodedFrame>,
}

impl FrameEncoder for MockEncoder {
    fn send_frame(&mut self, frame: RawFrame) -> anyhow::Result<()> {
        if self.eof {
            anyhow::bail!("frame after eof");
        }
        let samples = match &frame {
            RawFrame::Audio(frame) => frame.samples(),
            RawFrame::Video(frame) => {
                if let Some(format) = self.video.filter(|f| *f != frame.video_format()) {
                    anyhow::bail!("expected {:?}, got {:?}", format, frame.video_format());
                }
                1
            }
        };
        if let Some(size) = self.frame_size {
            if samples > size {
                anyhow::bail!("frame of {} samples exceeds {}", samples, size);
            }
        }
        self.encoded.lock().unwrap().push(EncodedFrame {
            kind: self.kind,
            samples,
            pts: frame.pts(),
        });
        let mut packet = ffmpeg_next::codec::packet::Packet::copy(&[1, 2, 3]);
        packet.set_pts(frame.pts());
        packet.set_dts(frame.pts());
        self.queue.push_back(RawPacket::from((packet, self.time_base)));
        Ok(())
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        self.eof = true;
        Ok(())
    }

    fn receive_packet(&mut self) -> anyhow::Result<Option<RawPacket>> {
        if self.eof && self.eof_errors > 0 {
            self.eof_errors -= 1;
            anyhow::bail!("error while draining");
        }
        if self.queue.len() > 1 || self.eof {
            return Ok(self.queue.pop_front());
        }
        Ok(None)
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn frame_size(&self) -> Option<usize> {
        self.frame_size
    }

    fn parameters(&self) -> Parameters {
        Parameters::new()
    }
}

impl Drop for MockEncoder {
    fn drop(&mut self) {
        let event = format!("drop encoder #{}", self.id);
        self.events.lock().unwrap().push(event);
    }
}

/// Changes format only; sample counts pass through minus the held delay.
pub struct MockResampler {
    target: AudioFormat,
    hold: usize,
    held: usize,
    events: Shared<String>,
}

impl Resample for MockResampler {
    fn convert(&mut self, frame: &RawAudioFrame) -> anyhow::Result<Option<RawAudioFrame>> {
        let available = self.held + frame.samples();
        let out = available.saturating_sub(self.hold);
        self.held = available - out;
        if out == 0 {
            return Ok(None);
        }
        Ok(Some(silence(&self.target, out, None)?))
    }

    fn flush(&mut self) -> anyhow::Result<Option<RawAudioFrame>> {
        if self.held == 0 {
            return Ok(None);
        }
        let out = self.held;
        self.held = 0;
        Ok(Some(silence(&self.target, out, None)?))
    }

    fn delay(&self) -> i64 {
        self.held as i64
    }
}

impl Drop for MockResampler {
    fn drop(&mut self) {
        self.events.lock().unwrap().push("drop resampler".to_string());
    }
}

/// Only accepts frames in the format it was built for.
pub struct MockRescaler {
    source: VideoFormat,
    target: VideoFormat,
    events: Shared<String>,
}

impl Rescale for MockRescaler {
    fn run(&mut self, frame: &RawVideoFrame) -> anyhow::Result<RawVideoFrame> {
        if frame.video_format() != self.source {
            anyhow::bail!("rescaler built for {:?}", self.source);
        }
        let mut out = ffmpeg_next::frame::Video::new(
            self.target.format,
            self.target.width,
            self.target.height,
        );
        out.set_pts(frame.pts());
        Ok(out.into())
    }
}

impl Drop for MockRescaler {
    fn drop(&mut self) {
        self.events.lock().unwrap().push("drop rescaler".to_string());
    }
}

/// Zeroed audio frame of `samples` samples.
pub fn silence(
    format: &AudioFormat,
    samples: usize,
    pts: Option<i64>,
) -> anyhow::Result<RawAudioFrame> {
    let (planes, stride) = plane_layout(format.format, format.channels);
    let plane = Bytes::from(vec![0u8; samples * stride]);
    RawAudioFrame::from_planes(format, &vec![plane; planes], samples, pts)
}
