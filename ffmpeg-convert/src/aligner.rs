//! Fixed-size audio framing.
//!
//! Decoders and resamplers hand out frames of whatever length they like,
//! most encoders want an exact sample count per call. The [`FrameAligner`]
//! sits in between: it appends everything to a [`SampleBuffer`] and slices
//! encoder-sized frames off the head, stamping each with a running pts.

use bytes::{Bytes, BytesMut};

use crate::{
    frame::{RawAudioFrame, plane_layout},
    stream::AudioFormat,
};

/// Append-only PCM queue with one byte queue per plane.
///
/// Packed formats use a single plane holding interleaved samples, planar
/// formats one plane per channel. All planes always hold the same number
/// of samples.
#[derive(Debug)]
pub struct SampleBuffer {
    planes: Vec<BytesMut>,
    /// Bytes one sample occupies in each plane.
    stride: usize,
}

impl SampleBuffer {
    pub fn new(format: &AudioFormat) -> Self {
        let (plane_count, stride) = plane_layout(format.format, format.channels);
        Self {
            planes: (0..plane_count).map(|_| BytesMut::new()).collect(),
            stride,
        }
    }

    /// Buffered samples (per channel).
    pub fn len(&self) -> usize {
        self.planes.first().map(|p| p.len() / self.stride).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends whole samples to the tail. Every plane must carry the same
    /// number of samples.
    pub fn append(&mut self, planes: &[&[u8]]) -> anyhow::Result<()> {
        if planes.len() != self.planes.len() {
            anyhow::bail!(
                "expected {} sample planes, got {}",
                self.planes.len(),
                planes.len()
            );
        }
        let len = planes.first().map(|p| p.len()).unwrap_or(0);
        if len % self.stride != 0 || planes.iter().any(|p| p.len() != len) {
            anyhow::bail!("sample planes are not aligned to {} byte samples", self.stride);
        }
        for (queue, plane) in self.planes.iter_mut().zip(planes) {
            queue.extend_from_slice(plane);
        }
        Ok(())
    }

    /// Removes exactly `samples` samples from the head, or nothing when
    /// fewer are buffered.
    pub fn take(&mut self, samples: usize) -> Option<Vec<Bytes>> {
        if samples == 0 || samples > self.len() {
            return None;
        }
        let len = samples * self.stride;
        Some(
            self.planes
                .iter_mut()
                .map(|queue| queue.split_to(len).freeze())
                .collect(),
        )
    }

    /// Removes everything that is buffered.
    pub fn take_all(&mut self) -> Option<(usize, Vec<Bytes>)> {
        let samples = self.len();
        self.take(samples).map(|planes| (samples, planes))
    }
}

/// Re-frames resampled audio into encoder-sized frames.
pub struct FrameAligner {
    format: AudioFormat,
    buffer: SampleBuffer,
    frame_size: usize,
    next_pts: i64,
}

impl FrameAligner {
    pub fn new(format: AudioFormat, frame_size: usize) -> Self {
        Self {
            buffer: SampleBuffer::new(&format),
            format,
            frame_size: frame_size.max(1),
            next_pts: 0,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pts the next emitted frame will carry, in `1/sample_rate` units.
    pub fn next_pts(&self) -> i64 {
        self.next_pts
    }

    /// Appends `frame` and returns every full frame now available.
    pub fn push(&mut self, frame: &RawAudioFrame) -> anyhow::Result<Vec<RawAudioFrame>> {
        if frame.format() != self.format.format || frame.channels() != self.format.channels {
            anyhow::bail!(
                "aligner expects {:?}/{}ch, got {:?}/{}ch",
                self.format.format,
                self.format.channels,
                frame.format(),
                frame.channels()
            );
        }
        self.buffer.append(&frame.planes())?;

        let mut frames = Vec::with_capacity(self.buffer.len() / self.frame_size);
        while let Some(planes) = self.buffer.take(self.frame_size) {
            frames.push(self.emit(&planes, self.frame_size)?);
        }
        Ok(frames)
    }

    /// Emits whatever is left as one final, possibly shorter frame.
    pub fn flush(&mut self) -> anyhow::Result<Option<RawAudioFrame>> {
        match self.buffer.take_all() {
            Some((samples, planes)) => Ok(Some(self.emit(&planes, samples)?)),
            None => Ok(None),
        }
    }

    fn emit(&mut self, planes: &[Bytes], samples: usize) -> anyhow::Result<RawAudioFrame> {
        let frame = RawAudioFrame::from_planes(&self.format, planes, samples, Some(self.next_pts))?;
        self.next_pts += samples as i64;
        Ok(frame)
    }
}
