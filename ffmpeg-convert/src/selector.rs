use serde::Serialize;

use crate::{
    backend::MediaBackend,
    decoder::FrameDecoder,
    encoder::EncoderCaps,
    output::PacketSink,
    profile::FormatProfile,
    stream::{AvStream, MediaKind},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum DropReason {
    /// Data, attachment or unknown streams.
    UnsupportedKind,
    /// The output profile does not carry this media kind.
    RejectedByProfile,
    NoDecoder(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamAction {
    Transcode(EncoderCaps),
    Copy,
    Drop(DropReason),
}

/// Decision for one input stream. Selected streams carry their opened
/// decoder.
pub struct StreamPlan {
    pub stream: AvStream,
    pub action: StreamAction,
    pub decoder: Option<Box<dyn FrameDecoder>>,
}

impl StreamPlan {
    pub fn is_selected(&self) -> bool {
        !matches!(self.action, StreamAction::Drop(_))
    }
}

/// Action for a stream whose decoder is already open.
///
/// Subtitles are always forwarded as they are; audio and video are
/// re-encoded whenever an encoder exists and copied otherwise.
pub fn decoded_action(kind: MediaKind, encoder: Option<EncoderCaps>) -> StreamAction {
    match (kind, encoder) {
        (MediaKind::Audio | MediaKind::Video, Some(caps)) => StreamAction::Transcode(caps),
        _ => StreamAction::Copy,
    }
}

/// Classifies every input stream, preserving input order.
pub fn select_streams(
    streams: Vec<AvStream>,
    profile: &FormatProfile,
    backend: &dyn MediaBackend,
    sink: &dyn PacketSink,
) -> Vec<StreamPlan> {
    streams
        .into_iter()
        .map(|stream| select_stream(stream, profile, backend, sink))
        .collect()
}

fn select_stream(
    stream: AvStream,
    profile: &FormatProfile,
    backend: &dyn MediaBackend,
    sink: &dyn PacketSink,
) -> StreamPlan {
    let kind = stream.kind();
    let dropped = |stream: AvStream, reason: DropReason| {
        log::info!("stream {} ({}): dropped, {:?}", stream.index(), kind.as_str(), reason);
        StreamPlan {
            stream,
            action: StreamAction::Drop(reason),
            decoder: None,
        }
    };

    if kind == MediaKind::Other {
        return dropped(stream, DropReason::UnsupportedKind);
    }
    if !profile.accepts(kind) {
        return dropped(stream, DropReason::RejectedByProfile);
    }
    let decoder = match backend.open_decoder(&stream) {
        Ok(decoder) => decoder,
        Err(e) => return dropped(stream, DropReason::NoDecoder(e.to_string())),
    };

    let encoder = match kind {
        MediaKind::Audio | MediaKind::Video => backend.find_encoder(kind, profile, sink),
        _ => None,
    };
    let action = decoded_action(kind, encoder);
    match &action {
        StreamAction::Transcode(caps) => log::info!(
            "stream {} ({}): transcode with {}",
            stream.index(),
            kind.as_str(),
            caps.name
        ),
        _ => log::info!("stream {} ({}): stream copy", stream.index(), kind.as_str()),
    }
    StreamPlan {
        stream,
        action,
        decoder: Some(decoder),
    }
}
