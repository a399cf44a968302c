use std::path::{Path, PathBuf};

use anyhow::Context;
use ffmpeg_convert::profile::ProfileTable;
use serde::Deserialize;

const DEFAULT_PARALLEL_JOBS: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// JSON array of extra format profiles layered over the built-in ones.
    pub profiles_file: Option<PathBuf>,
    /// One of off, error, warn, info, debug, trace.
    pub log_level: Option<String>,
    pub max_parallel_jobs: Option<usize>,
}

impl AppConfig {
    /// Defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Level from the config file, raised by each `-v`.
    pub fn log_level(&self, verbose: u8) -> log::LevelFilter {
        let configured = self
            .log_level
            .as_deref()
            .and_then(|level| level.parse().ok())
            .unwrap_or(log::LevelFilter::Info);
        match verbose {
            0 => configured,
            1 => configured.max(log::LevelFilter::Debug),
            _ => log::LevelFilter::Trace,
        }
    }

    pub fn profiles(&self) -> anyhow::Result<ProfileTable> {
        match &self.profiles_file {
            Some(path) => ProfileTable::builtin_with_file(path),
            None => Ok(ProfileTable::builtin()),
        }
    }

    /// The command line value wins over the config file.
    pub fn parallel_jobs(&self, flag: Option<usize>) -> usize {
        flag.or(self.max_parallel_jobs)
            .unwrap_or(DEFAULT_PARALLEL_JOBS)
            .max(1)
    }
}
