use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/**
    Media conversion driven by named output format profiles.
*/
#[derive(Parser)]
#[command(name = "avconvert", version)]
pub struct Cli {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Convert one file.
    Convert {
        input: PathBuf,
        output: PathBuf,

        /// Output format profile, e.g. mp3, wav, amr, mkv.
        #[arg(short, long)]
        format: String,

        /// Output sample rate; negotiated from the source when omitted.
        #[arg(short = 'r', long)]
        sample_rate: Option<u32>,

        /// Print the job outcome as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run the conversions listed in a JSON file concurrently.
    Batch {
        /// JSON array of {"input", "output", "format", "sample_rate"?}.
        jobs: PathBuf,

        /// Maximum number of jobs running at once.
        #[arg(short = 'j', long)]
        parallel: Option<usize>,
    },
    /// Decode the first audio stream to mono 16-bit PCM.
    Pcm {
        input: PathBuf,
        output: PathBuf,

        #[arg(short = 'r', long)]
        sample_rate: Option<u32>,

        /// Write a WAV header in front of the samples.
        #[arg(long)]
        wav: bool,
    },
    /// Print the duration of a file in seconds.
    Duration { path: PathBuf },
    /// Show video facts and save the first frame as an image.
    Info {
        input: PathBuf,

        /// Where to write the first frame.
        #[arg(short, long)]
        image: Option<PathBuf>,

        #[arg(long, default_value = "bmp")]
        image_format: String,
    },
    /// List the container format and streams of a file.
    Probe {
        path: PathBuf,

        #[arg(long)]
        json: bool,
    },
    /// List the available output format profiles.
    Profiles,
}
