//! Declarative output format profiles.
//!
//! A [`ProfileTable`] is built once (built-in entries, optionally merged
//! with a user JSON file) and then shared read-only between jobs.

use std::{collections::HashMap, path::Path};

use ffmpeg_next::format::{Sample, sample::Type};
use serde::{Deserialize, Serialize};

use crate::stream::MediaKind;

/// Sample format names as they appear in profile files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    Flt,
    Dbl,
    U8p,
    S16p,
    S32p,
    Fltp,
    Dblp,
}

impl From<SampleFormat> for Sample {
    fn from(value: SampleFormat) -> Self {
        match value {
            SampleFormat::U8 => Sample::U8(Type::Packed),
            SampleFormat::S16 => Sample::I16(Type::Packed),
            SampleFormat::S32 => Sample::I32(Type::Packed),
            SampleFormat::Flt => Sample::F32(Type::Packed),
            SampleFormat::Dbl => Sample::F64(Type::Packed),
            SampleFormat::U8p => Sample::U8(Type::Planar),
            SampleFormat::S16p => Sample::I16(Type::Planar),
            SampleFormat::S32p => Sample::I32(Type::Planar),
            SampleFormat::Fltp => Sample::F32(Type::Planar),
            SampleFormat::Dblp => Sample::F64(Type::Planar),
        }
    }
}

fn all_media() -> Vec<MediaKind> {
    vec![MediaKind::Audio, MediaKind::Video, MediaKind::Subtitle]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatProfile {
    pub name: String,
    /// Muxer name handed to the container layer, e.g. "mp3" or "matroska".
    pub container: String,
    /// Encoder name for audio streams; the container default when absent.
    #[serde(default)]
    pub audio_codec: Option<String>,
    #[serde(default)]
    pub video_codec: Option<String>,
    /// Nominal sample format; replaced by the encoder's first supported
    /// format when the concrete encoder rejects it.
    #[serde(default)]
    pub sample_format: Option<SampleFormat>,
    #[serde(default)]
    pub bit_rate: Option<usize>,
    /// Hard rate constraint of the codec.
    #[serde(default)]
    pub sample_rate: Option<u32>,
    /// Fixed output channel count; the source layout is kept when absent.
    #[serde(default)]
    pub channels: Option<u16>,
    /// Frame size used when the encoder itself declares a variable one.
    #[serde(default)]
    pub frame_size: Option<usize>,
    /// Media kinds the profile carries. Streams of other kinds are dropped.
    #[serde(default = "all_media")]
    pub media: Vec<MediaKind>,
}

impl FormatProfile {
    pub fn new(name: &str, container: &str) -> Self {
        Self {
            name: name.to_string(),
            container: container.to_string(),
            audio_codec: None,
            video_codec: None,
            sample_format: None,
            bit_rate: None,
            sample_rate: None,
            channels: None,
            frame_size: None,
            media: all_media(),
        }
    }

    fn audio_only(mut self, codec: &str) -> Self {
        self.audio_codec = Some(codec.to_string());
        self.media = vec![MediaKind::Audio];
        self
    }

    pub fn accepts(&self, kind: MediaKind) -> bool {
        self.media.contains(&kind)
    }

    pub fn codec_for(&self, kind: MediaKind) -> Option<&str> {
        match kind {
            MediaKind::Audio => self.audio_codec.as_deref(),
            MediaKind::Video => self.video_codec.as_deref(),
            _ => None,
        }
    }

    pub fn nominal_sample_format(&self) -> Option<Sample> {
        self.sample_format.map(Sample::from)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileTable {
    profiles: HashMap<String, FormatProfile>,
}

impl ProfileTable {
    pub fn builtin() -> Self {
        let mut mp3 = FormatProfile::new("mp3", "mp3").audio_only("libmp3lame");
        mp3.bit_rate = Some(128_000);

        let mut mp2 = FormatProfile::new("mp2", "mp2").audio_only("mp2");
        mp2.sample_format = Some(SampleFormat::S16);
        mp2.bit_rate = Some(192_000);

        let mut wav = FormatProfile::new("wav", "wav").audio_only("pcm_s16le");
        wav.sample_format = Some(SampleFormat::S16);

        let flac = FormatProfile::new("flac", "flac").audio_only("flac");
        let ogg = FormatProfile::new("ogg", "ogg").audio_only("libvorbis");

        let mut aac = FormatProfile::new("aac", "adts").audio_only("aac");
        aac.bit_rate = Some(128_000);
        let mut m4a = FormatProfile::new("m4a", "ipod").audio_only("aac");
        m4a.bit_rate = Some(128_000);

        let mut amr = FormatProfile::new("amr", "amr").audio_only("libopencore_amrnb");
        amr.sample_format = Some(SampleFormat::S16);
        amr.sample_rate = Some(8000);
        amr.channels = Some(1);
        amr.bit_rate = Some(12_200);

        let mut ntsilk = FormatProfile::new("ntsilk", "ntsilk_s16le").audio_only("ntsilk_s16le");
        ntsilk.sample_format = Some(SampleFormat::S16);
        ntsilk.channels = Some(1);
        ntsilk.frame_size = Some(480);

        let mp4 = FormatProfile::new("mp4", "mp4");
        let mkv = FormatProfile::new("mkv", "matroska");
        let avi = FormatProfile::new("avi", "avi");

        Self::from_profiles([mp3, mp2, wav, flac, ogg, aac, m4a, amr, ntsilk, mp4, mkv, avi])
    }

    pub fn from_profiles(profiles: impl IntoIterator<Item = FormatProfile>) -> Self {
        let profiles = profiles
            .into_iter()
            .map(|p| (p.name.to_lowercase(), p))
            .collect();
        Self { profiles }
    }

    /// Parses a JSON array of profiles.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let profiles: Vec<FormatProfile> = serde_json::from_str(json)?;
        Ok(Self::from_profiles(profiles))
    }

    /// Built-in table with the profiles of `path` layered on top.
    pub fn builtin_with_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("read profiles {}: {}", path.display(), e))?;
        let user = Self::from_json(&json)?;
        log::info!(
            "loaded {} format profiles from {}",
            user.profiles.len(),
            path.display()
        );
        Ok(Self::builtin().merge(user))
    }

    /// Entries of `other` replace same-named entries of `self`.
    pub fn merge(mut self, other: ProfileTable) -> Self {
        self.profiles.extend(other.profiles);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FormatProfile> {
        self.profiles.get(&name.to_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
