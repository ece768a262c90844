// WAV output
//
// `PcmSink` writing 16-bit PCM WAV files, one file per logical stream. The
// first stream goes to the requested path; chained streams get a numeric
// suffix ("out.wav", "out-2.wav", ...).

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{error, warn};

use crate::codec::StreamInfo;
use crate::feed::PcmSink;

pub struct WavSink {
    base: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    written: Vec<PathBuf>,
    error: Option<hound::Error>,
}

impl WavSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        WavSink {
            base: path.as_ref().to_path_buf(),
            writer: None,
            written: Vec::new(),
            error: None,
        }
    }

    /// Path used for the `index`-th stream (0-based)
    pub fn stream_path(&self, index: usize) -> PathBuf {
        if index == 0 {
            return self.base.clone();
        }
        let stem = self
            .base
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "stream".to_string());
        let name = match self.base.extension() {
            Some(ext) => format!("{}-{}.{}", stem, index + 1, ext.to_string_lossy()),
            None => format!("{}-{}", stem, index + 1),
        };
        self.base.with_file_name(name)
    }

    /// Finalize the open file and return every file written
    pub fn finish(mut self) -> Result<Vec<PathBuf>, hound::Error> {
        self.close_current();
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(self.written),
        }
    }

    fn close_current(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(err) = writer.finalize() {
                self.record(err);
            }
        }
    }

    fn record(&mut self, err: hound::Error) {
        error!("WAV output failed: {}", err);
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

impl PcmSink for WavSink {
    fn begin_stream(&mut self, info: &StreamInfo) {
        self.close_current();
        let path = self.stream_path(self.written.len());
        let spec = WavSpec {
            channels: info.channels() as u16,
            sample_rate: info.sample_rate(),
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        match WavWriter::create(&path, spec) {
            Ok(writer) => {
                self.writer = Some(writer);
                self.written.push(path);
            }
            Err(err) => self.record(err),
        }
    }

    fn write(&mut self, samples: &[i16]) {
        let Some(writer) = self.writer.as_mut() else {
            warn!("PCM received before any stream started; dropped");
            return;
        };
        let mut failure = None;
        for &sample in samples {
            if let Err(err) = writer.write_sample(sample) {
                failure = Some(err);
                break;
            }
        }
        if let Some(err) = failure {
            self.writer = None;
            self.record(err);
        }
    }
}
