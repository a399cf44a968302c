use ffmpeg_next::software::resampling;

use crate::{frame::RawAudioFrame, stream::AudioFormat};

/// Samples the resampler may return when pulled with no further input and
/// no reported delay.
const MIN_FLUSH_CAPACITY: usize = 256;

/// Output buffer size for one conversion:
/// `ceil((delay + input) * dst_rate / src_rate)`, in 64-bit arithmetic.
pub fn output_capacity(delay: i64, input: usize, src_rate: u32, dst_rate: u32) -> usize {
    if src_rate == 0 {
        return input;
    }
    let total = delay.max(0) as u64 + input as u64;
    let scaled = total * dst_rate as u64;
    scaled.div_ceil(src_rate as u64) as usize
}

/// Stateful audio sample-rate/layout/format converter.
pub trait Resample {
    /// Converts one decoded frame. `Ok(None)` when nothing came out yet.
    fn convert(&mut self, frame: &RawAudioFrame) -> anyhow::Result<Option<RawAudioFrame>>;
    /// Pulls buffered samples without new input; `Ok(None)` once empty.
    fn flush(&mut self) -> anyhow::Result<Option<RawAudioFrame>>;
    /// Samples held back inside the converter, in source-rate units.
    fn delay(&self) -> i64;
}

pub struct AudioResampler {
    context: resampling::Context,
    source: AudioFormat,
    target: AudioFormat,
}

impl AudioResampler {
    pub fn new(source: AudioFormat, target: AudioFormat) -> anyhow::Result<Self> {
        let context = resampling::Context::get(
            source.format,
            source.layout,
            source.sample_rate,
            target.format,
            target.layout,
            target.sample_rate,
        )
        .map_err(|e| {
            anyhow::anyhow!(
                "cannot convert {}Hz/{}ch/{:?} to {}Hz/{}ch/{:?}: {}",
                source.sample_rate,
                source.channels,
                source.format,
                target.sample_rate,
                target.channels,
                target.format,
                e
            )
        })?;
        Ok(Self {
            context,
            source,
            target,
        })
    }

    fn output_frame(&self, capacity: usize) -> ffmpeg_next::frame::Audio {
        let mut frame =
            ffmpeg_next::frame::Audio::new(self.target.format, capacity, self.target.layout);
        frame.set_rate(self.target.sample_rate);
        frame
    }
}

impl Resample for AudioResampler {
    fn convert(&mut self, frame: &RawAudioFrame) -> anyhow::Result<Option<RawAudioFrame>> {
        let capacity = output_capacity(
            self.delay(),
            frame.samples(),
            self.source.sample_rate,
            self.target.sample_rate,
        );
        if capacity == 0 {
            return Ok(None);
        }
        let mut output = self.output_frame(capacity);
        self.context.run(frame.as_audio(), &mut output)?;
        if output.samples() == 0 {
            return Ok(None);
        }
        Ok(Some(RawAudioFrame::from(output)))
    }

    fn flush(&mut self) -> anyhow::Result<Option<RawAudioFrame>> {
        let capacity = output_capacity(
            self.delay(),
            0,
            self.source.sample_rate,
            self.target.sample_rate,
        )
        .max(MIN_FLUSH_CAPACITY);
        let mut output = self.output_frame(capacity);
        self.context.flush(&mut output)?;
        if output.samples() == 0 {
            return Ok(None);
        }
        Ok(Some(RawAudioFrame::from(output)))
    }

    fn delay(&self) -> i64 {
        self.context.delay().map(|d| d.input).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_next::{ChannelLayout, format::Sample, format::sample::Type};

    use super::*;

    #[test]
    fn test_output_capacity_rounds_up() {
        assert_eq!(output_capacity(0, 1024, 44100, 8000), 186);
        assert_eq!(output_capacity(0, 1024, 48000, 48000), 1024);
        assert_eq!(output_capacity(16, 1024, 48000, 16000), 347);
        assert_eq!(output_capacity(0, 441, 44100, 8000), 80);
        assert_eq!(output_capacity(0, 0, 44100, 8000), 0);
        assert_eq!(output_capacity(-5, 10, 8000, 8000), 10);
    }

    #[test]
    fn test_output_capacity_does_not_overflow() {
        let capacity = output_capacity(i32::MAX as i64, 1 << 20, 8000, 384_000);
        assert_eq!(
            capacity as u64,
            ((i32::MAX as u64 + (1 << 20)) * 384_000).div_ceil(8000)
        );
    }

    #[test]
    fn test_resampler_converts_and_flushes_everything() -> anyhow::Result<()> {
        let source = AudioFormat::new(44100, ChannelLayout::STEREO, Sample::F32(Type::Planar));
        let target = AudioFormat::with_channels(8000, 1, Sample::I16(Type::Packed));
        let mut resampler = AudioResampler::new(source, target)?;

        let mut produced = 0;
        for index in 0..10 {
            let mut input = ffmpeg_next::frame::Audio::new(source.format, 1024, source.layout);
            input.set_rate(source.sample_rate);
            input.data_mut(0).fill(0);
            input.data_mut(1).fill(0);
            input.set_pts(Some(index * 1024));
            let input = RawAudioFrame::from(input);
            if let Some(out) = resampler.convert(&input)? {
                assert_eq!(out.channels(), 1);
                assert_eq!(out.format(), target.format);
                produced += out.samples();
            }
        }
        while let Some(out) = resampler.flush()? {
            produced += out.samples();
        }

        let expected = 10 * 1024 * 8000 / 44100;
        assert!(
            produced.abs_diff(expected) <= 16,
            "produced {} expected about {}",
            produced,
            expected
        );
        Ok(())
    }
}
