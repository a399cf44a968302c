use ffmpeg_next::software::scaling::{self, flag::Flags};

use crate::{frame::RawVideoFrame, stream::VideoFormat};

/// Pixel-format/size converter producing exactly one frame per input.
pub trait Rescale {
    fn run(&mut self, frame: &RawVideoFrame) -> anyhow::Result<RawVideoFrame>;
}

pub struct Scaler {
    context: scaling::Context,
}

impl Scaler {
    pub fn new(source: VideoFormat, target: VideoFormat) -> anyhow::Result<Self> {
        let context = scaling::Context::get(
            source.format,
            source.width,
            source.height,
            target.format,
            target.width,
            target.height,
            Flags::BILINEAR,
        )
        .map_err(|e| {
            anyhow::anyhow!(
                "cannot convert {}x{} {:?} to {}x{} {:?}: {}",
                source.width,
                source.height,
                source.format,
                target.width,
                target.height,
                target.format,
                e
            )
        })?;
        Ok(Self { context })
    }
}

impl Rescale for Scaler {
    fn run(&mut self, frame: &RawVideoFrame) -> anyhow::Result<RawVideoFrame> {
        let mut converted = ffmpeg_next::frame::Video::empty();
        self.context.run(frame.as_video(), &mut converted)?;
        converted.set_pts(frame.pts());
        Ok(converted.into())
    }
}
