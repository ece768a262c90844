// CLI command implementations
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use oggfeed::ogg::{PacketOut, PageSynchronizer, StreamTracker, SyncResult};
use oggfeed::{
    ByteSource, CodecKind, DecodeFeed, DecodeReport, Flow, PcmSink, Pipeline, ReadSource,
    StreamFeed, StreamInfo, WavSink,
};

use crate::cli::config::Config;
use crate::cli::output::OutputFormatter;

const SNIFF_CHUNK: usize = 4096;

/// Decode one file to WAV
pub fn command_decode(
    file: &Path,
    output: &Path,
    config: &Config,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (report, written) = decode_file(file, output, config)?;
    for path in &written {
        formatter.print_success(&format!("wrote {}", path.display()));
    }
    formatter.print_info(&format!(
        "{} stream(s), {:.2}s of audio",
        report.streams.len(),
        report.seconds_written()
    ));
    if !report.code().is_success() {
        formatter.print_error(&format!("{}: some streams failed ({})", file.display(), report.code()));
    }
    Ok(())
}

/// Detect the codec of each file
pub fn command_detect(files: &[PathBuf], config: &Config, formatter: &OutputFormatter) -> Result<()> {
    if files.is_empty() {
        bail!("No files specified");
    }

    let limit = config.pipeline_config()?.max_sync_search;
    for path in files {
        match sniff_file(path, limit) {
            Ok(Some(codec)) => formatter.print_info(&format!("{}: {}", path.display(), codec)),
            Ok(None) => formatter.print_error(&format!("{}: not a Vorbis or Opus stream", path.display())),
            Err(e) => formatter.print_error(&format!("{}: {:#}", path.display(), e)),
        }
    }
    Ok(())
}

/// Negotiate headers of each file and print the first stream's information
pub fn command_info(files: &[PathBuf], config: &Config, formatter: &OutputFormatter) -> Result<()> {
    if files.is_empty() {
        bail!("No files specified");
    }

    let stdout = io::stdout();
    for path in files {
        match stream_info(path, config) {
            Ok(info) => formatter.output(&info, &mut stdout.lock())?,
            Err(e) => formatter.print_error(&format!("{}: {:#}", path.display(), e)),
        }
    }
    Ok(())
}

/// Decode every matching file in a directory; each WAV lands next to its source
pub fn command_batch(
    directory: &Path,
    pattern: &str,
    config: &Config,
    formatter: &OutputFormatter,
) -> Result<()> {
    let show_progress = !formatter.quiet;

    // Build glob pattern
    let glob_pattern = if pattern.contains('*') || pattern.contains('?') {
        format!("{}/{}", directory.display(), pattern)
    } else {
        format!("{}/**/{}", directory.display(), pattern)
    };

    let mut files = Vec::new();
    for entry in glob::glob(&glob_pattern).context("Invalid glob pattern")? {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => formatter.print_error(&format!("Error reading path: {}", e)),
        }
    }

    let total = files.len();
    if total == 0 {
        formatter.print_info("No files found matching pattern");
        return Ok(());
    }
    if show_progress {
        formatter.print_info(&format!("Processing {} files...", total));
    }

    let mut success_count = 0;
    let mut error_count = 0;
    for (index, path) in files.iter().enumerate() {
        let output = path.with_extension("wav");
        match decode_file(path, &output, config) {
            Ok((report, _)) if report.code().is_success() => {
                formatter.print_success(&format!("[{}/{}] {}", index + 1, total, path.display()));
                success_count += 1;
            }
            Ok((report, _)) => {
                formatter.print_error(&format!("{}: {}", path.display(), report.code()));
                error_count += 1;
            }
            Err(e) => {
                formatter.print_error(&format!("{}: {:#}", path.display(), e));
                error_count += 1;
            }
        }
    }

    if show_progress {
        formatter.print_info(&format!(
            "Completed: {} successful, {} errors",
            success_count, error_count
        ));
    }
    Ok(())
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("File not found: {}", path.display()))?;
    Ok(BufReader::new(file))
}

/// Pipeline for one file, with the codec resolved from flags, sniffing and config
fn pipeline_for(path: &Path, config: &Config) -> Result<Pipeline> {
    let mut pipeline_config = config.pipeline_config()?;
    let sniffed = if config.codec.is_none() {
        sniff_file(path, pipeline_config.max_sync_search)?
    } else {
        None
    };
    pipeline_config.codec = config.codec_for(sniffed, &pipeline_config);
    Ok(Pipeline::new(pipeline_config)?)
}

fn decode_file(path: &Path, output: &Path, config: &Config) -> Result<(DecodeReport, Vec<PathBuf>)> {
    let mut pipeline = pipeline_for(path, config)?;
    let mut feed = StreamFeed::new(ReadSource::new(open(path)?), WavSink::new(output));

    let result = pipeline.run(&mut feed);
    // Finalize whatever was written even when decoding failed
    let written = feed
        .into_sink()
        .finish()
        .with_context(|| format!("writing {}", output.display()))?;
    let report = result.with_context(|| format!("decoding {}", path.display()))?;
    Ok((report, written))
}

fn stream_info(path: &Path, config: &Config) -> Result<StreamInfo> {
    let mut pipeline = pipeline_for(path, config)?;
    let mut feed = InfoFeed {
        source: ReadSource::new(open(path)?),
        info: None,
    };
    pipeline
        .run(&mut feed)
        .with_context(|| format!("reading {}", path.display()))?;
    match feed.info {
        Some(info) => Ok(info),
        None => bail!("no stream found"),
    }
}

/// Codec signature of the first packet in the file, if any
fn sniff_file(path: &Path, limit: usize) -> Result<Option<CodecKind>> {
    sniff(open(path)?, limit)
}

fn sniff(mut reader: impl Read, limit: usize) -> Result<Option<CodecKind>> {
    let mut sync = PageSynchronizer::new();
    let mut tracker = StreamTracker::new();
    let mut buf = vec![0u8; SNIFF_CHUNK];

    loop {
        loop {
            match sync.next_page() {
                SyncResult::Ready(page) => {
                    if tracker.page_in(&page).is_err() {
                        return Ok(None);
                    }
                    match tracker.packet_out() {
                        PacketOut::Ready(packet) => return Ok(CodecKind::sniff(&packet.data)),
                        PacketOut::Hole => return Ok(None),
                        PacketOut::NeedMorePages => {}
                    }
                }
                SyncResult::Corrupt { .. } if sync.total_skipped() > limit as u64 => {
                    return Ok(None)
                }
                SyncResult::Corrupt { .. } => {}
                SyncResult::NeedMoreData => break,
            }
        }
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        sync.submit(&buf[..n]);
    }
}

/// Feed that stops the loop once the first stream is ready
struct InfoFeed<S> {
    source: S,
    info: Option<StreamInfo>,
}

impl<S: ByteSource> ByteSource for InfoFeed<S> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.source.read(buf)
    }
}

impl<S> PcmSink for InfoFeed<S> {
    fn write(&mut self, _samples: &[i16]) {}
}

impl<S: ByteSource> DecodeFeed for InfoFeed<S> {
    fn on_stream_ready(&mut self, info: &StreamInfo) {
        self.info = Some(info.clone());
    }

    fn on_iteration_begin(&mut self) -> Flow {
        if self.info.is_some() {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    fn on_stream_end(&mut self) {}
}
