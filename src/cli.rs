use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;

pub const DEMO_URL: &str = "https://www.youtube.com/watch?v=7z161Mn0wwI";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by full pipeline runs
#[derive(clap::Args, Debug, Clone, Default)]
pub struct RunOptions {
    /// Directory under which run directories are created
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Language spoken in the video
    #[arg(long)]
    pub source_lang: Option<String>,

    /// Language of the burned-in subtitles
    #[arg(long)]
    pub target_lang: Option<String>,

    /// Skip stages whose artifacts a previous run left behind
    #[arg(long)]
    pub resume: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch, transcribe, translate and subtitle one video
    Run {
        /// Video page or direct media URL
        #[arg(default_value = DEMO_URL)]
        url: String,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Run the pipeline for several videos concurrently
    Batch {
        /// Video page or direct media URLs
        #[arg(required = true)]
        urls: Vec<String>,

        /// Number of videos processed at once
        #[arg(short, long, default_value_t = 2)]
        jobs: usize,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Download the media behind a URL
    Fetch {
        url: String,

        /// Destination directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Transcribe a media file to SRT
    Transcribe {
        /// Input media file
        #[arg(short, long)]
        input: PathBuf,

        /// Output SRT file
        #[arg(short, long)]
        output: PathBuf,

        /// Source language hint
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Translate an SRT file
    Translate {
        /// Input SRT file
        #[arg(short, long)]
        input: PathBuf,

        /// Output SRT file
        #[arg(short, long)]
        output: PathBuf,

        /// Target language
        #[arg(short, long)]
        target_lang: Option<String>,
    },

    /// Burn subtitles and the watermark into a video
    Embed {
        /// Input video file
        #[arg(short, long)]
        video: PathBuf,

        /// Subtitle file
        #[arg(short, long)]
        subtitles: PathBuf,

        /// Output video file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a configuration file holding every default setting
    InitConfig {
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// List runs recorded under a directory
    Runs {
        #[arg(default_value = "./files")]
        dir: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults_to_demo_url() {
        let args = Args::try_parse_from(["tarjama", "run"]).unwrap();
        match args.command {
            Commands::Run { url, options } => {
                assert_eq!(url, DEMO_URL);
                assert!(!options.resume);
                assert!(options.output_dir.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_init_config_defaults_to_tarjama_toml() {
        let args = Args::try_parse_from(["tarjama", "init-config"]).unwrap();
        match args.command {
            Commands::InitConfig { path, force } => {
                assert_eq!(path, PathBuf::from(DEFAULT_CONFIG_FILE));
                assert!(!force);
            }
            _ => panic!("expected init-config"),
        }
    }

    #[test]
    fn test_batch_requires_urls() {
        assert!(Args::try_parse_from(["tarjama", "batch"]).is_err());

        let args = Args::try_parse_from(["tarjama", "-v", "batch", "https://a/1", "https://a/2", "--jobs", "3", "--resume"])
            .unwrap();
        assert!(args.verbose);
        match args.command {
            Commands::Batch { urls, jobs, options } => {
                assert_eq!(urls.len(), 2);
                assert_eq!(jobs, 3);
                assert!(options.resume);
            }
            _ => panic!("expected batch"),
        }
    }
}
