//! Profile-driven media conversion on top of FFmpeg.
//!
//! A [`Transcoder`] turns one [`JobRequest`] into a demux → decode →
//! adapt → align → encode → mux run per input stream. Every collaborator
//! is reached through [`MediaBackend`] so jobs can be driven without media
//! files.

/// Registers FFmpeg components. Call once at startup.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

pub mod adapter;
pub mod aligner;
pub mod backend;
pub mod bmp;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod flush;
pub mod frame;
pub mod input;
pub mod job;
pub mod metadata;
pub mod negotiate;
pub mod output;
pub mod packet;
pub mod pcm;
pub mod pipeline;
pub mod profile;
pub mod resampler;
pub mod scaler;
pub mod selector;
pub mod sink;
pub mod snapshot;
pub mod stream;

#[cfg(test)]
mod mock;

pub use backend::{FfmpegBackend, MediaBackend};
pub use error::TranscodeError;
pub use job::{Job, JobOutcome, JobRequest, Transcoder};
pub use profile::{FormatProfile, ProfileTable};
