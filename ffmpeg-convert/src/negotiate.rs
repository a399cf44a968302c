//! Target parameter negotiation.
//!
//! Audio: the sample rate comes from (in priority order) the profile's
//! hard constraint, an explicit caller rate, or the candidate ladder; the
//! channel count is fixed by the profile; the sample format falls back to
//! whatever the concrete encoder supports. Video only negotiates the pixel
//! format, geometry passes through.

use ffmpeg_next::{Rational, format::Sample};

use crate::{
    encoder::EncoderCaps,
    profile::FormatProfile,
    stream::{AudioFormat, VideoFormat},
};

/// Candidate output rates, highest first.
pub const RATE_LADDER: [u32; 7] = [48000, 44100, 32000, 24000, 16000, 12000, 8000];

/// Frame rate assumed when the demuxer reports none.
pub const FALLBACK_FRAME_RATE: Rational = Rational(25, 1);

/// Closest entry of `candidates` to `source`; ties keep the earlier entry.
fn closest(source: u32, candidates: &[u32]) -> Option<u32> {
    let mut best: Option<(u32, u32)> = None;
    for &candidate in candidates {
        let diff = source.abs_diff(candidate);
        match best {
            Some((_, best_diff)) if diff >= best_diff => {}
            _ => best = Some((candidate, diff)),
        }
    }
    best.map(|(rate, _)| rate)
}

/// Ladder hit keeps the source rate, otherwise the nearest candidate wins
/// with ties going to the higher rate.
pub fn ladder_rate(source: u32) -> u32 {
    if RATE_LADDER.contains(&source) {
        return source;
    }
    closest(source, &RATE_LADDER).unwrap_or(RATE_LADDER[0])
}

pub fn negotiate_sample_rate(source: u32, explicit: Option<u32>, profile: &FormatProfile) -> u32 {
    if let Some(forced) = profile.sample_rate {
        return forced;
    }
    match explicit {
        Some(rate) if rate > 0 => rate,
        _ => ladder_rate(source),
    }
}

/// Keeps `rate` when the encoder takes it (or declares no list), else the
/// closest rate it does take, preferring the higher one on ties.
pub fn constrain_rate(rate: u32, supported: &[u32]) -> u32 {
    if supported.is_empty() || supported.contains(&rate) {
        return rate;
    }
    let mut sorted = supported.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    closest(rate, &sorted).unwrap_or(rate)
}

pub fn negotiate_sample_format(
    profile: &FormatProfile,
    caps: &EncoderCaps,
    source: Sample,
) -> Sample {
    let supported = &caps.sample_formats;
    match profile.nominal_sample_format() {
        Some(nominal) if supported.is_empty() || supported.contains(&nominal) => nominal,
        _ => supported.first().copied().unwrap_or(source),
    }
}

pub fn negotiate_audio(
    source: &AudioFormat,
    explicit_rate: Option<u32>,
    profile: &FormatProfile,
    caps: &EncoderCaps,
) -> AudioFormat {
    let rate = negotiate_sample_rate(source.sample_rate, explicit_rate, profile);
    let rate = constrain_rate(rate, &caps.sample_rates);
    let format = negotiate_sample_format(profile, caps, source.format);
    match profile.channels {
        Some(channels) => AudioFormat::with_channels(rate, channels, format),
        None => AudioFormat {
            sample_rate: rate,
            channels: source.channels,
            layout: source.layout,
            format,
        },
    }
}

pub fn negotiate_video(source: &VideoFormat, caps: &EncoderCaps) -> VideoFormat {
    VideoFormat {
        width: source.width,
        height: source.height,
        format: caps.pixel_formats.first().copied().unwrap_or(source.format),
    }
}

/// Encoder frame rate for a stream whose demuxer reported `rate`.
pub fn encoder_frame_rate(rate: Rational) -> Rational {
    if rate.numerator() > 0 && rate.denominator() > 0 {
        rate
    } else {
        FALLBACK_FRAME_RATE
    }
}
