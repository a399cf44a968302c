use thiserror::Error;

/// Failures surfaced by a transcoding job.
///
/// `TransientDecode` and `Write` are raised inside the pipeline and handled
/// there (the packet is skipped, the write is counted); they never reach the
/// caller of a job. Everything else aborts the job.
#[derive(Debug, Error)]
pub enum TranscodeError {
    // ── Setup ─────────────────────────────────────────────────────────
    #[error("setup failed: {0}")]
    Setup(String),
    #[error("unknown output format profile: {0}")]
    UnknownProfile(String),

    // ── Adapter ───────────────────────────────────────────────────────
    #[error("stream {stream}: cannot build format adapter: {reason}")]
    AdapterInit { stream: usize, reason: String },
    #[error("stream {stream}: cannot build rescaler: {reason}")]
    Rescale { stream: usize, reason: String },

    // ── Mid-stream ────────────────────────────────────────────────────
    #[error("stream {stream}: packet could not be decoded: {source}")]
    TransientDecode {
        stream: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("output stream {stream}: muxer rejected packet: {source}")]
    Write {
        stream: usize,
        #[source]
        source: anyhow::Error,
    },

    // ── Worker ────────────────────────────────────────────────────────
    #[error("job worker failed: {0}")]
    Worker(String),
}

impl TranscodeError {
    pub fn setup(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Setup(format!("{}: {}", context, err))
    }
}

pub type Result<T> = std::result::Result<T, TranscodeError>;
