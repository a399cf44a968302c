use std::{path::Path, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::Parser;
use ffmpeg_convert::{
    FfmpegBackend, JobOutcome, JobRequest, Transcoder,
    metadata::{probe, probe_duration},
    pcm::{PcmOptions, decode_to_pcm},
    profile::ProfileTable,
    snapshot::{ImageFormat, video_info},
};

use crate::{
    cli::{Cli, Command},
    config::AppConfig,
};

mod cli;
mod config;

fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("ffmpeg_convert", level)
        .filter_module("avconvert", level)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(config.log_level(cli.verbose));
    ffmpeg_convert::init()?;

    match cli.command {
        Command::Convert {
            input,
            output,
            format,
            sample_rate,
            json,
        } => {
            let mut request = JobRequest::new(input, output, &format);
            request.sample_rate = sample_rate;
            cmd_convert(&config, request, json).await
        }
        Command::Batch { jobs, parallel } => {
            cmd_batch(&config, &jobs, config.parallel_jobs(parallel)).await
        }
        Command::Pcm {
            input,
            output,
            sample_rate,
            wav,
        } => {
            let options = PcmOptions { sample_rate, wav };
            let result = tokio::task::spawn_blocking(move || {
                decode_to_pcm(&FfmpegBackend, &input, &output, options)
            })
            .await??;
            println!("{}", serde_json::to_string(&result)?);
            Ok(())
        }
        Command::Duration { path } => {
            println!("{:.3}", probe_duration(&path)?);
            Ok(())
        }
        Command::Info {
            input,
            image,
            image_format,
        } => {
            let format: ImageFormat = image_format.parse()?;
            let info = video_info(&FfmpegBackend, &input, format)?;
            if let Some(image) = image {
                std::fs::write(&image, &info.image)
                    .with_context(|| format!("failed to write {}", image.display()))?;
            }
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Command::Probe { path, json } => {
            let info = probe(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print!("{}", info);
            }
            Ok(())
        }
        Command::Profiles => cmd_profiles(&config.profiles()?),
    }
}

async fn cmd_convert(config: &AppConfig, request: JobRequest, json: bool) -> Result<()> {
    let transcoder = Transcoder::new(Arc::new(config.profiles()?));
    let outcome = transcoder.convert(request.clone()).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&request, &outcome);
    }
    Ok(())
}

async fn cmd_batch(config: &AppConfig, jobs: &Path, parallel: usize) -> Result<()> {
    let json = std::fs::read_to_string(jobs)
        .with_context(|| format!("failed to read {}", jobs.display()))?;
    let requests: Vec<JobRequest> =
        serde_json::from_str(&json).with_context(|| format!("invalid job list {}", jobs.display()))?;
    let transcoder = Transcoder::new(Arc::new(config.profiles()?));

    let total = requests.len();
    let results = transcoder.convert_all(requests.clone(), parallel).await;
    let mut failed = 0;
    for (request, result) in requests.iter().zip(results) {
        match result {
            Ok(outcome) => print_outcome(request, &outcome),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", request.input.display(), e);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} jobs failed", failed, total);
    }
    Ok(())
}

fn print_outcome(request: &JobRequest, outcome: &JobOutcome) {
    println!(
        "{} -> {} ({})",
        request.input.display(),
        request.output.display(),
        request.format
    );
    for stream in &outcome.streams {
        println!(
            "  #{} {:<8} {:<9} frames={} packets={} skipped={} rejected={}",
            stream.input_index,
            stream.kind.as_str(),
            stream.action,
            stream.frames_encoded,
            stream.packets_written,
            stream.skipped_packets,
            stream.rejected_writes
        );
    }
}

fn cmd_profiles(profiles: &ProfileTable) -> Result<()> {
    for name in profiles.names() {
        let Some(profile) = profiles.get(name) else {
            continue;
        };
        println!(
            "{:<8} container={:<12} audio={:<18} video={}",
            profile.name,
            profile.container,
            profile.audio_codec.as_deref().unwrap_or("-"),
            profile.video_codec.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
