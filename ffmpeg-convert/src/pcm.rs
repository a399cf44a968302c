//! Raw PCM export of the first audio stream.

use std::path::Path;

use bytes::{BufMut, BytesMut};
use ffmpeg_next::format::{Sample, sample::Type};
use serde::Serialize;

use crate::{
    adapter::audio_needs_conversion,
    backend::MediaBackend,
    decoder::FrameDecoder,
    frame::{RawAudioFrame, RawFrame},
    negotiate::ladder_rate,
    resampler::Resample,
    stream::{AudioFormat, MediaKind},
};

pub const WAV_HEADER_LEN: usize = 44;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PcmOptions {
    /// Output rate; the nearest ladder rate of the source when absent.
    pub sample_rate: Option<u32>,
    /// Prefix the samples with a RIFF/WAVE header.
    pub wav: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PcmOutput {
    pub sample_rate: u32,
    pub channels: u16,
    /// Sample bytes written, header excluded.
    pub bytes: usize,
}

/// Canonical 44-byte header of an uncompressed PCM WAVE file.
pub fn wav_header(data_len: u32, sample_rate: u32, channels: u16, bits: u16) -> Vec<u8> {
    let block_align = channels * bits.div_ceil(8);
    let mut out = BytesMut::with_capacity(WAV_HEADER_LEN);
    out.put_slice(b"RIFF");
    out.put_u32_le(data_len.saturating_add(36));
    out.put_slice(b"WAVE");
    out.put_slice(b"fmt ");
    out.put_u32_le(16);
    out.put_u16_le(1);
    out.put_u16_le(channels);
    out.put_u32_le(sample_rate);
    out.put_u32_le(sample_rate * u32::from(block_align));
    out.put_u16_le(block_align);
    out.put_u16_le(bits);
    out.put_slice(b"data");
    out.put_u32_le(data_len);
    out.to_vec()
}

/// Decodes the first audio stream of `input` to mono s16 and writes it to
/// `output`.
pub fn decode_to_pcm(
    backend: &dyn MediaBackend,
    input: &Path,
    output: &Path,
    options: PcmOptions,
) -> anyhow::Result<PcmOutput> {
    let mut source = backend.open_input(input)?;
    let stream = source
        .streams()
        .into_iter()
        .find(|s| s.kind() == MediaKind::Audio)
        .ok_or_else(|| anyhow::anyhow!("{} has no audio stream", input.display()))?;
    let mut decoder = backend.open_decoder(&stream)?;
    let source_format = decoder
        .audio_format()
        .ok_or_else(|| anyhow::anyhow!("stream {}: no decoded audio format", stream.index()))?;

    let sample_rate = match options.sample_rate {
        Some(rate) if rate > 0 => rate,
        _ => ladder_rate(source_format.sample_rate),
    };
    let target = AudioFormat::with_channels(sample_rate, 1, Sample::I16(Type::Packed));
    let resampler = if audio_needs_conversion(&source_format, &target) {
        Some(backend.open_resampler(source_format, target)?)
    } else {
        None
    };

    let mut pcm = PcmCollector::new(resampler);
    while let Some(packet) = source.read_packet() {
        if packet.index() != stream.index() {
            continue;
        }
        if let Err(e) = decoder.send_packet(packet) {
            log::warn!("stream {}: packet skipped: {}", stream.index(), e);
            continue;
        }
        pcm.drain_decoder(decoder.as_mut());
    }
    if let Err(e) = decoder.send_eof() {
        log::warn!("stream {}: decoder eof: {}", stream.index(), e);
    }
    pcm.drain_decoder(decoder.as_mut());
    pcm.drain_resampler();

    let data = pcm.data.split();
    let bytes = data.len();
    let mut file = BytesMut::with_capacity(bytes + WAV_HEADER_LEN);
    if options.wav {
        let data_len = u32::try_from(bytes)
            .map_err(|_| anyhow::anyhow!("{} bytes of PCM do not fit a WAV file", bytes))?;
        file.put_slice(&wav_header(data_len, sample_rate, 1, 16));
    }
    file.put_slice(&data);
    std::fs::write(output, &file)
        .map_err(|e| anyhow::anyhow!("write {}: {}", output.display(), e))?;
    log::info!(
        "{}: {} bytes of {}Hz mono s16",
        output.display(),
        bytes,
        sample_rate
    );

    Ok(PcmOutput {
        sample_rate,
        channels: 1,
        bytes,
    })
}

struct PcmCollector {
    resampler: Option<Box<dyn Resample>>,
    data: BytesMut,
}

impl PcmCollector {
    fn new(resampler: Option<Box<dyn Resample>>) -> Self {
        Self {
            resampler,
            data: BytesMut::new(),
        }
    }

    fn drain_decoder(&mut self, decoder: &mut dyn FrameDecoder) {
        loop {
            match decoder.receive_frame() {
                Ok(Some(RawFrame::Audio(frame))) => self.push(frame),
                Ok(Some(RawFrame::Video(_))) => {}
                Ok(None) => return,
                Err(e) => {
                    log::warn!("decode: {}", e);
                    return;
                }
            }
        }
    }

    fn push(&mut self, frame: RawAudioFrame) {
        let converted = match self.resampler.as_deref_mut() {
            Some(resampler) => match resampler.convert(&frame) {
                Ok(Some(converted)) => converted,
                Ok(None) => return,
                Err(e) => {
                    log::warn!("resample failed, frame skipped: {}", e);
                    return;
                }
            },
            None => frame,
        };
        self.append(&converted);
    }

    fn drain_resampler(&mut self) {
        let Some(resampler) = self.resampler.as_deref_mut() else {
            return;
        };
        let mut tail = Vec::new();
        loop {
            match resampler.flush() {
                Ok(Some(frame)) => tail.push(frame),
                Ok(None) => break,
                Err(e) => {
                    log::warn!("resampler flush: {}", e);
                    break;
                }
            }
        }
        for frame in &tail {
            self.append(frame);
        }
    }

    fn append(&mut self, frame: &RawAudioFrame) {
        if let Some(plane) = frame.planes().first() {
            self.data.put_slice(plane);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    #[test]
    fn test_wav_header_fields() {
        let header = wav_header(32000, 16000, 1, 16);
        assert_eq!(header.len(), WAV_HEADER_LEN);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(header[4..8].try_into().unwrap()), 32036);
        assert_eq!(&header[8..16], b"WAVEfmt ");
        assert_eq!(u16::from_le_bytes([header[22], header[23]]), 1);
        assert_eq!(u32::from_le_bytes(header[24..28].try_into().unwrap()), 16000);
        assert_eq!(u32::from_le_bytes(header[28..32].try_into().unwrap()), 32000);
        assert_eq!(u16::from_le_bytes([header[32], header[33]]), 2);
        assert_eq!(u16::from_le_bytes([header[34], header[35]]), 16);
        assert_eq!(&header[36..40], b"data");
        assert_eq!(u32::from_le_bytes(header[40..44].try_into().unwrap()), 32000);
    }

    #[test]
    fn test_stereo_block_align() {
        let header = wav_header(0, 44100, 2, 16);
        assert_eq!(u32::from_le_bytes(header[28..32].try_into().unwrap()), 176_400);
        assert_eq!(u16::from_le_bytes([header[32], header[33]]), 4);
    }

    #[test]
    fn test_native_rate_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.pcm");
        let backend = MockBackend::audio(3, 1024);

        let result =
            decode_to_pcm(&backend, Path::new("in.wav"), &output, PcmOptions::default()).unwrap();

        assert_eq!(
            result,
            PcmOutput {
                sample_rate: 48000,
                channels: 1,
                bytes: 3 * 1024 * 2
            }
        );
        assert_eq!(std::fs::metadata(&output).unwrap().len(), 6144);
        assert!(!backend.events().contains(&"open resampler".to_string()));
    }

    #[test]
    fn test_resampler_tail_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.wav");
        let mut backend = MockBackend::audio(2, 1024);
        backend.resampler_delay = 100;
        let options = PcmOptions {
            sample_rate: Some(16000),
            wav: true,
        };

        let result = decode_to_pcm(&backend, Path::new("in.wav"), &output, options).unwrap();

        assert_eq!(result.sample_rate, 16000);
        assert_eq!(result.bytes, 2 * 1024 * 2);
        let written = std::fs::read(&output).unwrap();
        assert_eq!(written.len(), WAV_HEADER_LEN + result.bytes);
        assert_eq!(&written[..4], b"RIFF");
    }

    #[test]
    fn test_corrupt_packet_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.pcm");
        let mut backend = MockBackend::audio(3, 512);
        backend.packets[0].corrupt = true;

        let result =
            decode_to_pcm(&backend, Path::new("in.wav"), &output, PcmOptions::default()).unwrap();

        assert_eq!(result.bytes, 2 * 512 * 2);
    }
}
