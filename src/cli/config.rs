// CLI configuration
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use oggfeed::{CodecKind, PipelineConfig};

/// oggfeed - streaming Ogg Vorbis/Opus decoder
#[derive(Parser, Debug)]
#[command(name = "oggfeed")]
#[command(about = "Decode and inspect Ogg Vorbis and Opus streams", long_about = None)]
#[command(version)]
#[command(author = "xwsjjctz <xwsjjctz@icloud.com>")]
pub struct Config {
    /// Codec to negotiate (sniffed from the first packet when omitted)
    #[arg(short, long, global = true)]
    pub codec: Option<CodecKind>,

    /// Pipeline settings as JSON
    #[arg(long, global = true, value_name = "FILE.json")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub format: OutputFormat,

    /// Quiet mode (suppress progress messages)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging, per-page tracing)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for stream information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    #[default]
    Pretty,
    /// Compact JSON
    Json,
    /// Key-value pairs
    KeyValue,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode a file to 16-bit WAV (chained streams get numbered files)
    Decode {
        /// Ogg file path
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output WAV path
        #[arg(short, long, value_name = "OUT.wav")]
        output: PathBuf,
    },

    /// Detect the codec of Ogg file(s)
    Detect {
        /// Ogg file path(s)
        #[arg(value_name = "FILE")]
        files: Vec<PathBuf>,
    },

    /// Negotiate headers and show stream information
    Info {
        /// Ogg file path(s)
        #[arg(value_name = "FILE")]
        files: Vec<PathBuf>,
    },

    /// Decode every matching file in a directory next to its source
    Batch {
        /// Directory path
        #[arg(short, long)]
        directory: PathBuf,

        /// File pattern (e.g., "*.ogg", "*.opus")
        #[arg(short, long)]
        pattern: String,
    },
}

impl Config {
    /// Pipeline settings from `--config`, with `--verbose` turning on
    /// per-page tracing
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        if self.verbose {
            config.debug = true;
        }
        Ok(config)
    }

    /// Codec for one file: `--codec`, else the sniffed codec, else the
    /// configured one
    pub fn codec_for(&self, sniffed: Option<CodecKind>, config: &PipelineConfig) -> CodecKind {
        self.codec.or(sniffed).unwrap_or(config.codec)
    }
}
