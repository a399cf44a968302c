use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    adapter::Adapter,
    backend::{FfmpegBackend, MediaBackend},
    decoder::FrameDecoder,
    encoder::{EncoderCaps, EncoderParams, EncoderTarget},
    error::{Result, TranscodeError},
    input::PacketSource,
    negotiate::{encoder_frame_rate, negotiate_audio, negotiate_video},
    output::{OutputStreamSpec, PacketSink},
    pipeline::{StreamPipeline, StreamSummary},
    profile::{FormatProfile, ProfileTable},
    selector::{StreamAction, StreamPlan, select_streams},
    sink::EncodeSink,
    stream::{AvStream, MediaKind},
};

/// One conversion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Name of the output format profile.
    pub format: String,
    /// Explicit output sample rate; negotiated when absent.
    #[serde(default)]
    pub sample_rate: Option<u32>,
}

impl JobRequest {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, format: &str) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            format: format.to_string(),
            sample_rate: None,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    /// True whenever the job ran to completion, rejected writes included.
    pub success: bool,
    /// One entry per input stream, in input order.
    pub streams: Vec<StreamSummary>,
    pub skipped_packets: u64,
    pub rejected_writes: u64,
}

/// A set-up conversion: opened demuxer and muxer plus one pipeline per
/// selected input stream.
///
/// Dropping a job releases the pipelines in reverse stream order, then the
/// muxer, then the demuxer, whether it ran to completion or not.
pub struct Job<'a> {
    pipelines: BTreeMap<usize, StreamPipeline>,
    dropped: Vec<StreamSummary>,
    sink: Box<dyn PacketSink>,
    source: Box<dyn PacketSource>,
    backend: &'a dyn MediaBackend,
}

impl<'a> Job<'a> {
    /// Opens everything and writes the output header. Nothing is written
    /// when this fails.
    pub fn setup(
        request: &JobRequest,
        profiles: &ProfileTable,
        backend: &'a dyn MediaBackend,
    ) -> Result<Self> {
        let profile = profiles
            .get(&request.format)
            .ok_or_else(|| TranscodeError::UnknownProfile(request.format.clone()))?;
        let source = backend
            .open_input(&request.input)
            .map_err(|e| TranscodeError::setup("open input", e))?;
        let streams = source.streams();
        if streams.is_empty() {
            return Err(TranscodeError::Setup(format!(
                "{} has no streams",
                request.input.display()
            )));
        }
        let sink = backend
            .open_output(&request.output, &profile.container)
            .map_err(|e| TranscodeError::setup("open output", e))?;

        let mut job = Self {
            pipelines: BTreeMap::new(),
            dropped: Vec::new(),
            sink,
            source,
            backend,
        };

        let plans = select_streams(streams, profile, backend, job.sink.as_ref());
        if !plans.iter().any(StreamPlan::is_selected) {
            return Err(TranscodeError::Setup(format!(
                "no stream of {} can be written as {}",
                request.input.display(),
                profile.name
            )));
        }
        for plan in plans {
            job.add_stream(plan, request, profile)?;
        }

        job.sink
            .write_header()
            .map_err(|e| TranscodeError::setup("write header", e))?;
        for pipeline in job.pipelines.values_mut() {
            pipeline.bind_output(job.sink.as_ref());
        }
        Ok(job)
    }

    pub fn pipelines(&self) -> impl Iterator<Item = &StreamPipeline> {
        self.pipelines.values()
    }

    fn add_stream(
        &mut self,
        plan: StreamPlan,
        request: &JobRequest,
        profile: &FormatProfile,
    ) -> Result<()> {
        let StreamPlan {
            stream,
            action,
            decoder,
        } = plan;
        let (action, decoder) = match (action, decoder) {
            (StreamAction::Drop(reason), _) => {
                self.dropped.push(StreamSummary::dropped(&stream, reason));
                return Ok(());
            }
            (action, Some(decoder)) => (action, decoder),
            (_, None) => {
                return Err(TranscodeError::Setup(format!(
                    "stream {} selected without a decoder",
                    stream.index()
                )));
            }
        };

        let pipeline = match (action, stream.kind()) {
            (StreamAction::Transcode(caps), MediaKind::Audio) => {
                self.audio_pipeline(&stream, decoder, &caps, request, profile)?
            }
            (StreamAction::Transcode(caps), MediaKind::Video) => {
                self.video_pipeline(&stream, decoder, &caps, profile)?
            }
            _ => {
                let index = self
                    .sink
                    .add_stream(OutputStreamSpec {
                        parameters: stream.parameters().clone(),
                        time_base: stream.time_base(),
                        copy: true,
                    })
                    .map_err(|e| TranscodeError::setup("add output stream", e))?;
                StreamPipeline::copy(&stream, decoder, index)
            }
        };
        self.pipelines.insert(stream.index(), pipeline);
        Ok(())
    }

    fn open_encoder(&mut self, params: &EncoderParams) -> Result<EncodeSink> {
        let encoder = self
            .backend
            .open_encoder(params)
            .map_err(|e| TranscodeError::setup(&format!("open encoder {}", params.codec), e))?;
        let index = self
            .sink
            .add_stream(OutputStreamSpec {
                parameters: encoder.parameters(),
                time_base: encoder.time_base(),
                copy: false,
            })
            .map_err(|e| TranscodeError::setup("add output stream", e))?;
        Ok(EncodeSink::new(encoder, index))
    }

    fn audio_pipeline(
        &mut self,
        stream: &AvStream,
        decoder: Box<dyn FrameDecoder>,
        caps: &EncoderCaps,
        request: &JobRequest,
        profile: &FormatProfile,
    ) -> Result<StreamPipeline> {
        let source = decoder.audio_format().ok_or_else(|| {
            TranscodeError::Setup(format!("stream {}: no decoded audio format", stream.index()))
        })?;
        let target = negotiate_audio(&source, request.sample_rate, profile, caps);
        let params = EncoderParams {
            codec: caps.name.clone(),
            target: EncoderTarget::Audio(target),
            bit_rate: profile.bit_rate,
            global_header: self.sink.needs_global_header(),
        };
        let sink = self.open_encoder(&params)?;
        let frame_size = sink.frame_size().or(profile.frame_size);
        let adapter = Adapter::audio(self.backend, stream.index(), source, target)?;
        log::info!(
            "stream {}: {}Hz/{}ch -> {} {}Hz/{}ch, frame size {:?}",
            stream.index(),
            source.sample_rate,
            source.channels,
            caps.name,
            target.sample_rate,
            target.channels,
            frame_size
        );
        Ok(StreamPipeline::audio(
            stream, decoder, adapter, sink, target, frame_size,
        ))
    }

    fn video_pipeline(
        &mut self,
        stream: &AvStream,
        decoder: Box<dyn FrameDecoder>,
        caps: &EncoderCaps,
        profile: &FormatProfile,
    ) -> Result<StreamPipeline> {
        let source = decoder.video_format().ok_or_else(|| {
            TranscodeError::Setup(format!("stream {}: no decoded video format", stream.index()))
        })?;
        let target = negotiate_video(&source, caps);
        let params = EncoderParams {
            codec: caps.name.clone(),
            target: EncoderTarget::Video {
                format: target,
                frame_rate: encoder_frame_rate(stream.rate()),
            },
            bit_rate: profile.bit_rate,
            global_header: self.sink.needs_global_header(),
        };
        let sink = self.open_encoder(&params)?;
        let adapter = Adapter::video(self.backend, stream.index(), source, target)?;
        log::info!(
            "stream {}: {}x{} {:?} -> {} {:?}",
            stream.index(),
            source.width,
            source.height,
            source.format,
            caps.name,
            target.format
        );
        Ok(StreamPipeline::video(stream, decoder, adapter, sink, target))
    }

    /// Pumps every packet through its pipeline, flushes all pipelines in
    /// stream order and finalizes the output.
    pub fn run(mut self) -> Result<JobOutcome> {
        while let Some(packet) = self.source.read_packet() {
            let Some(pipeline) = self.pipelines.get_mut(&packet.index()) else {
                continue;
            };
            pipeline.process_packet(packet, self.sink.as_mut(), self.backend)?;
        }
        for pipeline in self.pipelines.values_mut() {
            pipeline.flush(self.sink.as_mut(), self.backend)?;
        }

        let mut rejected_writes = 0;
        if let Err(e) = self.sink.finish() {
            log::warn!("finalize output: {}", e);
            rejected_writes += 1;
        }
        Ok(self.outcome(rejected_writes))
    }

    fn outcome(&self, extra_rejected_writes: u64) -> JobOutcome {
        let mut streams: Vec<StreamSummary> = self
            .pipelines
            .values()
            .map(StreamPipeline::summary)
            .chain(self.dropped.iter().cloned())
            .collect();
        streams.sort_by_key(|s| s.input_index);
        JobOutcome {
            success: true,
            skipped_packets: streams.iter().map(|s| s.skipped_packets).sum(),
            rejected_writes: streams.iter().map(|s| s.rejected_writes).sum::<u64>()
                + extra_rejected_writes,
            streams,
        }
    }
}

impl Drop for Job<'_> {
    fn drop(&mut self) {
        while let Some((index, pipeline)) = self.pipelines.pop_last() {
            log::debug!("stream {}: releasing pipeline", index);
            drop(pipeline);
        }
    }
}

/// Entry point for conversions. Cheap to clone; clones share the profile
/// table and the backend.
#[derive(Clone)]
pub struct Transcoder {
    profiles: Arc<ProfileTable>,
    backend: Arc<dyn MediaBackend>,
}

impl Transcoder {
    pub fn new(profiles: Arc<ProfileTable>) -> Self {
        Self::with_backend(profiles, Arc::new(FfmpegBackend))
    }

    pub fn with_backend(profiles: Arc<ProfileTable>, backend: Arc<dyn MediaBackend>) -> Self {
        Self { profiles, backend }
    }

    pub fn profiles(&self) -> &ProfileTable {
        &self.profiles
    }

    /// Runs one job to completion on the calling thread.
    pub fn convert_blocking(&self, request: &JobRequest) -> Result<JobOutcome> {
        log::info!(
            "convert {} -> {} ({})",
            request.input.display(),
            request.output.display(),
            request.format
        );
        let job = Job::setup(request, &self.profiles, self.backend.as_ref())?;
        let outcome = job.run()?;
        log::info!(
            "converted {}: {} streams, {} skipped packets, {} rejected writes",
            request.output.display(),
            outcome.streams.len(),
            outcome.skipped_packets,
            outcome.rejected_writes
        );
        Ok(outcome)
    }

    /// Runs one job on the blocking thread pool.
    pub async fn convert(&self, request: JobRequest) -> Result<JobOutcome> {
        let transcoder = self.clone();
        tokio::task::spawn_blocking(move || transcoder.convert_blocking(&request))
            .await
            .map_err(|e| TranscodeError::Worker(e.to_string()))?
    }

    /// Runs independent jobs concurrently, at most `max_parallel` at a time.
    /// Results come back in request order.
    pub async fn convert_all(
        &self,
        requests: Vec<JobRequest>,
        max_parallel: usize,
    ) -> Vec<Result<JobOutcome>> {
        let permits = Arc::new(tokio::sync::Semaphore::new(max_parallel.max(1)));
        let jobs = requests.into_iter().map(|request| {
            let permits = permits.clone();
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| TranscodeError::Worker(e.to_string()))?;
                self.convert(request).await
            }
        });
        futures::future::join_all(jobs).await
    }
}

#[cfg(test)]
#[path = "job_test.rs"]
mod job_test;
