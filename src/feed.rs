// External interfaces of the decode loop
//
// The pipeline pulls compressed bytes from a `ByteSource`, pushes PCM into a
// `PcmSink` and reports lifecycle events through `DecodeFeed`. All calls are
// blocking and made from the thread running the loop.

use std::io::{ErrorKind, Read};

use tracing::warn;

use crate::codec::StreamInfo;

/// Supplier of compressed bytes
pub trait ByteSource {
    /// Fill up to `buf.len()` bytes; 0 means the source is exhausted
    fn read(&mut self, buf: &mut [u8]) -> usize;
}

/// Consumer of decoded interleaved 16-bit PCM
pub trait PcmSink {
    fn write(&mut self, samples: &[i16]);

    /// Called before the first write of each logical stream
    fn begin_stream(&mut self, _info: &StreamInfo) {}
}

/// Returned by `on_iteration_begin`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Finish the active stream and stop the loop with success
    Stop,
}

/// Everything the decode loop talks to
pub trait DecodeFeed: ByteSource + PcmSink {
    /// Once, before the first byte is read
    fn on_begin_header_negotiation(&mut self) {}

    /// Once per logical stream, after its headers were accepted
    fn on_stream_ready(&mut self, info: &StreamInfo);

    /// Once per packet iteration
    fn on_iteration_begin(&mut self) -> Flow {
        Flow::Continue
    }

    /// Once per ready stream, or once at exit if no stream became ready
    fn on_stream_end(&mut self);
}

/// `ByteSource` over any reader
pub struct ReadSource<R> {
    reader: R,
}

impl<R: Read> ReadSource<R> {
    pub fn new(reader: R) -> Self {
        ReadSource { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> ByteSource for ReadSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        loop {
            match self.reader.read(buf) {
                Ok(n) => return n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("read failed, treating source as exhausted: {}", e);
                    return 0;
                }
            }
        }
    }
}

/// `ByteSource` over an in-memory buffer, optionally capped per read
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
    max_read: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        SliceSource {
            data,
            pos: 0,
            max_read: usize::MAX,
        }
    }

    /// Never hand out more than `max_read` bytes per call
    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = max_read.max(1);
        self
    }
}

impl ByteSource for SliceSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf
            .len()
            .min(self.max_read)
            .min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

/// `PcmSink` collecting everything in memory
#[derive(Debug, Default)]
pub struct VecSink {
    pub samples: Vec<i16>,
    pub writes: usize,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PcmSink for VecSink {
    fn write(&mut self, samples: &[i16]) {
        self.samples.extend_from_slice(samples);
        self.writes += 1;
    }
}

/// `DecodeFeed` gluing a source to a sink and remembering the streams seen
pub struct StreamFeed<S, K> {
    pub source: S,
    pub sink: K,
    pub streams: Vec<StreamInfo>,
    pub ended: usize,
}

impl<S: ByteSource, K: PcmSink> StreamFeed<S, K> {
    pub fn new(source: S, sink: K) -> Self {
        StreamFeed {
            source,
            sink,
            streams: Vec::new(),
            ended: 0,
        }
    }

    pub fn into_sink(self) -> K {
        self.sink
    }
}

impl<S: ByteSource, K: PcmSink> ByteSource for StreamFeed<S, K> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.source.read(buf)
    }
}

impl<S: ByteSource, K: PcmSink> PcmSink for StreamFeed<S, K> {
    fn write(&mut self, samples: &[i16]) {
        self.sink.write(samples)
    }

    fn begin_stream(&mut self, info: &StreamInfo) {
        self.sink.begin_stream(info)
    }
}

impl<S: ByteSource, K: PcmSink> DecodeFeed for StreamFeed<S, K> {
    fn on_stream_ready(&mut self, info: &StreamInfo) {
        self.streams.push(info.clone());
    }

    fn on_stream_end(&mut self) {
        self.ended += 1;
    }
}
