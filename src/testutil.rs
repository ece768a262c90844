// Test helpers: synthetic Ogg pages, header packets, a mock codec and a feed
// that records every call the pipeline makes.

use std::cell::Cell;
use std::rc::Rc;

use crate::codec::comments::CommentHeader;
use crate::codec::{Codec, CodecKind, DecoderHandle, HeaderKind, HeaderOutcome, StreamInfo};
use crate::error::{DecodeError, Result};
use crate::feed::{ByteSource, DecodeFeed, Flow, PcmSink};
use crate::ogg::{
    crc, PacketOut, PageSynchronizer, StreamTracker, SyncResult, OGG_HEADER_TYPE_BOS,
    OGG_HEADER_TYPE_CONTINUATION, OGG_HEADER_TYPE_EOS,
};
use crate::pcm::Pcm;

/// Stereo 8 kHz Vorbis stream: vendor "oggfeed fixture", TITLE=Silence,
/// ARTIST=oggfeed, ten 256-sample short blocks of silence on two audio pages
pub const VORBIS_SILENCE: &[u8] = include_bytes!("../testdata/silence.ogg");

/// Every packet of the first logical stream in `data`
pub fn ogg_packets(data: &[u8]) -> Vec<Vec<u8>> {
    let mut sync = PageSynchronizer::new();
    let mut tracker = StreamTracker::new();
    let mut packets = Vec::new();
    sync.submit(data);
    loop {
        match sync.next_page() {
            SyncResult::Ready(page) => {
                tracker.page_in(&page).unwrap();
                while let PacketOut::Ready(packet) = tracker.packet_out() {
                    packets.push(packet.data);
                }
            }
            SyncResult::Corrupt { .. } => panic!("damaged page in test data"),
            SyncResult::NeedMoreData => return packets,
        }
    }
}

/// Builder for one serialized Ogg page
#[derive(Debug, Clone)]
pub struct PageSpec {
    serial: u32,
    sequence: u32,
    header_type: u8,
    granule: i64,
    lacing: Vec<u8>,
    body: Vec<u8>,
}

impl PageSpec {
    pub fn new(serial: u32, sequence: u32) -> Self {
        PageSpec {
            serial,
            sequence,
            header_type: 0,
            granule: 0,
            lacing: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn bos(mut self) -> Self {
        self.header_type |= OGG_HEADER_TYPE_BOS;
        self
    }

    pub fn eos(mut self) -> Self {
        self.header_type |= OGG_HEADER_TYPE_EOS;
        self
    }

    pub fn continued(mut self) -> Self {
        self.header_type |= OGG_HEADER_TYPE_CONTINUATION;
        self
    }

    pub fn granule(mut self, granule: i64) -> Self {
        self.granule = granule;
        self
    }

    /// Add a complete packet (or the final part of a spanning one)
    pub fn packet(mut self, data: &[u8]) -> Self {
        self.lacing.extend(std::iter::repeat(255u8).take(data.len() / 255));
        self.lacing.push((data.len() % 255) as u8);
        self.body.extend_from_slice(data);
        self
    }

    /// Add the leading part of a packet that continues on the next page
    pub fn partial(mut self, data: &[u8]) -> Self {
        assert_eq!(data.len() % 255, 0, "partial packets must fill whole segments");
        self.lacing.extend(std::iter::repeat(255u8).take(data.len() / 255));
        self.body.extend_from_slice(data);
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        assert!(self.lacing.len() <= 255, "too many segments for one page");
        let mut out = Vec::with_capacity(27 + self.lacing.len() + self.body.len());
        out.extend_from_slice(b"OggS");
        out.push(0);
        out.push(self.header_type);
        out.extend_from_slice(&self.granule.to_le_bytes());
        out.extend_from_slice(&self.serial.to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.push(self.lacing.len() as u8);
        out.extend_from_slice(&self.lacing);
        out.extend_from_slice(&self.body);
        let checksum = crc::page_checksum(&out);
        out[22..26].copy_from_slice(&checksum.to_le_bytes());
        out
    }
}

/// Serialize one logical stream: each inner list is the packets of one page.
/// The first page carries BOS and the last EOS.
pub fn ogg_pages(serial: u32, pages: &[Vec<Vec<u8>>]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut granule = 0i64;
    for (index, packets) in pages.iter().enumerate() {
        let mut spec = PageSpec::new(serial, index as u32);
        if index == 0 {
            spec = spec.bos();
        }
        if index + 1 == pages.len() {
            spec = spec.eos();
        }
        for packet in packets {
            spec = spec.packet(packet);
        }
        if index > 1 {
            granule += 960;
        }
        out.extend(spec.granule(granule).encode());
    }
    out
}

/// Identification header on page 0, the other headers on page 1, then one
/// audio packet per page
pub fn header_stream(serial: u32, headers: &[Vec<u8>], audio: &[Vec<u8>]) -> Vec<u8> {
    let mut pages = vec![vec![headers[0].clone()]];
    if headers.len() > 1 {
        pages.push(headers[1..].to_vec());
    }
    pages.extend(audio.iter().map(|packet| vec![packet.clone()]));
    ogg_pages(serial, &pages)
}

/// Vendor + comment list framing shared by both codecs
pub fn comment_block(vendor: &str, comments: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    out.extend_from_slice(vendor.as_bytes());
    out.extend_from_slice(&(comments.len() as u32).to_le_bytes());
    for comment in comments {
        out.extend_from_slice(&(comment.len() as u32).to_le_bytes());
        out.extend_from_slice(comment.as_bytes());
    }
    out
}

pub fn vorbis_ident(channels: u8, rate: u32) -> Vec<u8> {
    let mut out = b"\x01vorbis".to_vec();
    out.extend_from_slice(&0u32.to_le_bytes());
    out.push(channels);
    out.extend_from_slice(&rate.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&128_000i32.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    // blocksize_0 = 2^8, blocksize_1 = 2^11
    out.push(0xb8);
    out.push(0x01);
    out
}

pub fn vorbis_comments(vendor: &str, comments: &[&str]) -> Vec<u8> {
    let mut out = b"\x03vorbis".to_vec();
    out.extend(comment_block(vendor, comments));
    out.push(0x01);
    out
}

pub fn opus_head(channels: u8, preskip: u16, rate: u32, gain: i16) -> Vec<u8> {
    let mut out = b"OpusHead".to_vec();
    out.push(1);
    out.push(channels);
    out.extend_from_slice(&preskip.to_le_bytes());
    out.extend_from_slice(&rate.to_le_bytes());
    out.extend_from_slice(&gain.to_le_bytes());
    out.push(0);
    out
}

pub fn opus_head_mapped(channels: u8, streams: u8, coupled: u8, mapping: &[u8]) -> Vec<u8> {
    let mut out = b"OpusHead".to_vec();
    out.push(1);
    out.push(channels);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&48000u32.to_le_bytes());
    out.extend_from_slice(&0i16.to_le_bytes());
    out.push(1);
    out.push(streams);
    out.push(coupled);
    out.extend_from_slice(mapping);
    out
}

pub fn opus_tags(vendor: &str, comments: &[&str]) -> Vec<u8> {
    let mut out = b"OpusTags".to_vec();
    out.extend(comment_block(vendor, comments));
    out
}

/// Real Opus packets of 20 ms each at 48 kHz
pub fn encode_opus_packets(channels: u8, count: usize) -> Vec<Vec<u8>> {
    let layout = if channels == 1 {
        opus::Channels::Mono
    } else {
        opus::Channels::Stereo
    };
    let mut encoder = opus::Encoder::new(48000, layout, opus::Application::Audio).unwrap();
    let frame = 960;
    (0..count)
        .map(|n| {
            let pcm: Vec<i16> = (0..frame * channels as usize)
                .map(|i| {
                    let t = (n * frame + i / channels as usize) as f32 / 48000.0;
                    ((t * 440.0 * std::f32::consts::TAU).sin() * 8000.0) as i16
                })
                .collect();
            let mut out = vec![0u8; 4000];
            let len = encoder.encode(&pcm, &mut out).unwrap();
            out.truncate(len);
            out
        })
        .collect()
}

pub fn mock_ident(channels: u8, rate: u32) -> Vec<u8> {
    let mut out = b"\x01mock".to_vec();
    out.push(channels);
    out.extend_from_slice(&rate.to_le_bytes());
    out
}

pub fn mock_comments(vendor: &str, comments: &[&str]) -> Vec<u8> {
    let mut out = b"\x03mock".to_vec();
    out.extend(comment_block(vendor, comments));
    out
}

pub fn mock_setup() -> Vec<u8> {
    b"\x05mock".to_vec()
}

/// Headers of a mock stream with `count` header packets
pub fn mock_headers(count: usize, channels: u8, rate: u32, comments: &[&str]) -> Vec<Vec<u8>> {
    let mut headers = vec![mock_ident(channels, rate), mock_comments("mock vendor", comments)];
    if count == 3 {
        headers.push(mock_setup());
    }
    headers
}

/// Codec with trivially parseable headers; every audio byte becomes one frame
pub struct MockCodec {
    headers: usize,
    channels: usize,
    // Set between an accepted identification header and reset/create_decoder
    pending: Rc<Cell<bool>>,
}

impl MockCodec {
    pub fn new(headers: usize) -> Self {
        MockCodec {
            headers,
            channels: 0,
            pending: Rc::new(Cell::new(false)),
        }
    }

    /// Shared view of the pending decoder state, readable after the codec
    /// moved into a pipeline
    pub fn pending(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.pending)
    }
}

impl Codec for MockCodec {
    fn kind(&self) -> CodecKind {
        if self.headers == 3 {
            CodecKind::Vorbis
        } else {
            CodecKind::Opus
        }
    }

    fn header_count(&self) -> usize {
        self.headers
    }

    fn reset(&mut self) {
        self.channels = 0;
        self.pending.set(false);
    }

    fn parse_header(
        &mut self,
        kind: HeaderKind,
        packet: &[u8],
        info: &mut StreamInfo,
    ) -> Result<HeaderOutcome> {
        match kind {
            HeaderKind::Identification => {
                if !packet.starts_with(b"\x01mock") {
                    return Err(DecodeError::NotCodecHeader {
                        codec: "mock",
                        reason: "bad magic".into(),
                    });
                }
                if packet.len() < 10 {
                    return Err(DecodeError::InvalidHeader("short".into()));
                }
                if packet[5] == 0 {
                    return Err(DecodeError::InvalidHeader("channel count is 0".into()));
                }
                self.channels = packet[5] as usize;
                self.pending.set(true);
                info.metadata.channels = self.channels;
                info.metadata.sample_rate =
                    u32::from_le_bytes([packet[6], packet[7], packet[8], packet[9]]);
                Ok(HeaderOutcome::Accepted)
            }
            HeaderKind::Comments => {
                if !packet.starts_with(b"\x03mock") {
                    return Err(DecodeError::CorruptSecondaryHeader("bad comments".into()));
                }
                CommentHeader::parse(&packet[5..], 128).apply_to(&mut info.metadata);
                Ok(HeaderOutcome::Accepted)
            }
            HeaderKind::Setup => {
                if packet != b"\x05mock" {
                    return Err(DecodeError::CorruptSecondaryHeader("bad setup".into()));
                }
                Ok(HeaderOutcome::Accepted)
            }
        }
    }

    fn create_decoder(&mut self, _info: &StreamInfo) -> Result<Box<dyn DecoderHandle>> {
        self.pending.set(false);
        Ok(Box::new(MockDecoder::new(self.channels)))
    }
}

/// Rejects packets starting with 0xff; otherwise each byte is one frame
pub struct MockDecoder {
    channels: usize,
}

impl MockDecoder {
    pub fn new(channels: usize) -> Self {
        MockDecoder { channels }
    }
}

impl DecoderHandle for MockDecoder {
    fn decode(&mut self, packet: &[u8]) -> Result<Pcm> {
        if packet.first() == Some(&0xff) {
            return Err(DecodeError::Decode("mock decoder rejected packet".into()));
        }
        let samples = packet
            .iter()
            .flat_map(|&b| std::iter::repeat(b as i16).take(self.channels))
            .collect();
        Ok(Pcm::Interleaved {
            samples,
            channels: self.channels,
        })
    }
}

/// One observed call into the feed
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    BeginNegotiation,
    StreamReady(StreamInfo),
    Write(Vec<i16>),
    StreamEnd,
}

/// Feed serving a byte vector and recording every callback
pub struct RecordingFeed {
    data: Vec<u8>,
    pos: usize,
    max_read: usize,
    stop_after: Option<usize>,
    iterations: usize,
    pub events: Vec<Event>,
}

impl RecordingFeed {
    pub fn new(data: Vec<u8>) -> Self {
        RecordingFeed {
            data,
            pos: 0,
            max_read: usize::MAX,
            stop_after: None,
            iterations: 0,
            events: Vec::new(),
        }
    }

    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = max_read;
        self
    }

    /// Ask the pipeline to stop on iteration `n + 1`
    pub fn stop_after_iterations(mut self, n: usize) -> Self {
        self.stop_after = Some(n);
        self
    }

    pub fn ready(&self) -> Vec<&StreamInfo> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::StreamReady(info) => Some(info),
                _ => None,
            })
            .collect()
    }

    pub fn writes(&self) -> Vec<&Vec<i16>> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Write(samples) => Some(samples),
                _ => None,
            })
            .collect()
    }

    pub fn samples(&self) -> Vec<i16> {
        self.writes().into_iter().flatten().copied().collect()
    }

    pub fn ends(&self) -> usize {
        self.events.iter().filter(|e| **e == Event::StreamEnd).count()
    }
}

impl ByteSource for RecordingFeed {
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

impl PcmSink for RecordingFeed {
    fn write(&mut self, samples: &[i16]) {
        self.events.push(Event::Write(samples.to_vec()));
    }
}

impl DecodeFeed for RecordingFeed {
    fn on_begin_header_negotiation(&mut self) {
        self.events.push(Event::BeginNegotiation);
    }

    fn on_stream_ready(&mut self, info: &StreamInfo) {
        self.events.push(Event::StreamReady(info.clone()));
    }

    fn on_iteration_begin(&mut self) -> Flow {
        self.iterations += 1;
        match self.stop_after {
            Some(limit) if self.iterations > limit => Flow::Stop,
            _ => Flow::Continue,
        }
    }

    fn on_stream_end(&mut self) {
        self.events.push(Event::StreamEnd);
    }
}
