// Opus strategy (RFC 7845)
//
// Identification Header "OpusHead" (19 bytes minimum):
// - Magic "OpusHead" (8 bytes)
// - Version (u8, major version in the high nibble must be 0)
// - Output channel count (u8)
// - Pre-skip (u16 LE, samples at 48 kHz)
// - Input sample rate (u32 LE, informational)
// - Output gain (i16 LE, Q7.8 dB)
// - Channel mapping family (u8)
// - Family != 0: stream count (u8), coupled count (u8), mapping (1 byte per channel)
//
// Comment header: "OpusTags" + comment block
//
// The decoder is created as soon as the identification header is accepted and
// held until the comment header completes the sequence. Only single-stream
// layouts are decoded; their mapping table is applied to the output.

use opus::{Channels, Decoder};
use tracing::{debug, warn};

use crate::codec::comments::CommentHeader;
use crate::codec::{Codec, CodecKind, DecoderHandle, HeaderKind, HeaderOutcome, StreamInfo};
use crate::error::{DecodeError, Result};
use crate::pcm::Pcm;
use crate::utils::io::ByteReader;

pub const HEAD_MAGIC: &[u8; 8] = b"OpusHead";
pub const TAGS_MAGIC: &[u8; 8] = b"OpusTags";

/// Rates libopus decodes at natively
pub const SUPPORTED_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

const DEFAULT_RATE: u32 = 48000;
const MIN_INPUT_RATE: u32 = 8000;
const MAX_INPUT_RATE: u32 = 192_000;
// Longest Opus packet is 120 ms
const MAX_FRAME_MS: u32 = 120;

/// Parsed OpusHead packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpusHead {
    pub version: u8,
    pub channels: u8,
    pub preskip: u16,
    pub input_sample_rate: u32,
    pub output_gain: i16,
    pub mapping_family: u8,
    pub stream_count: u8,
    pub coupled_count: u8,
    pub mapping: Vec<u8>,
}

impl OpusHead {
    /// Parse and validate an identification packet
    pub fn parse(packet: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(packet);
        if !reader.check_signature(HEAD_MAGIC) {
            return Err(DecodeError::NotCodecHeader {
                codec: "opus",
                reason: "identification packet lacks the OpusHead signature".into(),
            });
        }

        let short = || DecodeError::InvalidHeader("OpusHead truncated".into());
        let version = reader.read_u8().ok_or_else(short)?;
        let channels = reader.read_u8().ok_or_else(short)?;
        let preskip = reader.read_le_u16().ok_or_else(short)?;
        let input_sample_rate = reader.read_le_u32().ok_or_else(short)?;
        let output_gain = reader.read_le_i16().ok_or_else(short)?;
        let mapping_family = reader.read_u8().ok_or_else(short)?;

        if version >> 4 != 0 {
            return Err(DecodeError::InvalidHeader(format!(
                "unsupported OpusHead version {}",
                version
            )));
        }
        if channels == 0 {
            return Err(DecodeError::InvalidHeader("channel count is 0".into()));
        }

        let (stream_count, coupled_count, mapping) = if mapping_family == 0 {
            if channels > 2 {
                return Err(DecodeError::InvalidHeader(format!(
                    "mapping family 0 allows 1 or 2 channels, got {}",
                    channels
                )));
            }
            (1, channels - 1, (0..channels).collect())
        } else {
            let streams = reader.read_u8().ok_or_else(short)?;
            let coupled = reader.read_u8().ok_or_else(short)?;
            let mapping = reader.take(channels as usize).ok_or_else(short)?.to_vec();
            validate_mapping(streams, coupled, &mapping)?;
            (streams, coupled, mapping)
        };

        Ok(OpusHead {
            version,
            channels,
            preskip,
            input_sample_rate,
            output_gain,
            mapping_family,
            stream_count,
            coupled_count,
            mapping,
        })
    }

    /// Header rate after clamping to a usable audio range
    pub fn effective_input_rate(&self) -> u32 {
        match self.input_sample_rate {
            0 => DEFAULT_RATE,
            rate if !(MIN_INPUT_RATE..=MAX_INPUT_RATE).contains(&rate) => {
                warn!("OpusHead rate {} Hz out of range, using {} Hz", rate, DEFAULT_RATE);
                DEFAULT_RATE
            }
            rate => rate,
        }
    }
}

fn validate_mapping(streams: u8, coupled: u8, mapping: &[u8]) -> Result<()> {
    if streams == 0 {
        return Err(DecodeError::InvalidHeader("stream count is 0".into()));
    }
    if coupled > streams {
        return Err(DecodeError::InvalidHeader(format!(
            "{} coupled streams exceed {} streams",
            coupled, streams
        )));
    }
    let decoded = streams as u32 + coupled as u32;
    if decoded > 255 {
        return Err(DecodeError::InvalidHeader(format!(
            "{} streams with {} coupled overflow the channel table",
            streams, coupled
        )));
    }
    if let Some(bad) = mapping.iter().find(|&&m| m != 255 && m as u32 >= decoded) {
        return Err(DecodeError::InvalidHeader(format!(
            "mapping entry {} references an undeclared stream",
            bad
        )));
    }
    Ok(())
}

/// Decode rate for a stream: forced, else the header rate if native, else 48 kHz
pub fn decode_rate(input_rate: u32, forced: Option<u32>) -> u32 {
    if let Some(rate) = forced {
        return rate;
    }
    if SUPPORTED_RATES.contains(&input_rate) {
        input_rate
    } else {
        DEFAULT_RATE
    }
}

/// Opus codec strategy
pub struct OpusCodec {
    max_comment_len: usize,
    output_rate: Option<u32>,
    pending: Option<OpusDecoder>,
}

impl OpusCodec {
    pub fn new(max_comment_len: usize, output_rate: Option<u32>) -> Self {
        OpusCodec {
            max_comment_len,
            output_rate,
            pending: None,
        }
    }

    fn parse_head(&mut self, packet: &[u8], info: &mut StreamInfo) -> Result<HeaderOutcome> {
        let head = OpusHead::parse(packet)?;
        let rate = decode_rate(head.effective_input_rate(), self.output_rate);

        debug!(
            "opus: {} channels, input {} Hz, decoding at {} Hz, preskip {}, gain {}, family {}",
            head.channels,
            head.input_sample_rate,
            rate,
            head.preskip,
            head.output_gain,
            head.mapping_family
        );

        let decoder = OpusDecoder::new(&head, rate)?;
        info.metadata.sample_rate = rate;
        info.metadata.channels = head.channels as usize;
        info.preskip = decoder.preskip_left;
        info.output_gain = head.output_gain;
        self.pending = Some(decoder);
        Ok(HeaderOutcome::DecoderPrepared)
    }

    fn parse_tags(&mut self, packet: &[u8], info: &mut StreamInfo) -> Result<HeaderOutcome> {
        if !packet.starts_with(TAGS_MAGIC) {
            return Err(DecodeError::CorruptSecondaryHeader(
                "expected the OpusTags header".into(),
            ));
        }
        CommentHeader::parse(&packet[TAGS_MAGIC.len()..], self.max_comment_len)
            .apply_to(&mut info.metadata);
        Ok(HeaderOutcome::Accepted)
    }
}

impl Codec for OpusCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Opus
    }

    fn reset(&mut self) {
        self.pending = None;
    }

    fn parse_header(
        &mut self,
        kind: HeaderKind,
        packet: &[u8],
        info: &mut StreamInfo,
    ) -> Result<HeaderOutcome> {
        match kind {
            HeaderKind::Identification => self.parse_head(packet, info),
            HeaderKind::Comments => self.parse_tags(packet, info),
            HeaderKind::Setup => Err(DecodeError::CorruptSecondaryHeader(
                "Opus streams carry no setup header".into(),
            )),
        }
    }

    fn create_decoder(&mut self, _info: &StreamInfo) -> Result<Box<dyn DecoderHandle>> {
        match self.pending.take() {
            Some(decoder) => Ok(Box::new(decoder)),
            None => Err(DecodeError::CorruptSecondaryHeader(
                "header sequence incomplete".into(),
            )),
        }
    }
}

/// libopus decode state for one stream
pub struct OpusDecoder {
    decoder: Decoder,
    // Channels coming out of libopus
    decoded_channels: usize,
    channels: usize,
    // Output channel -> decoded channel, 255 for silence; None when identity
    mapping: Option<Vec<u8>>,
    buffer: Vec<i16>,
    preskip_left: u32,
}

impl OpusDecoder {
    fn new(head: &OpusHead, rate: u32) -> Result<Self> {
        if head.stream_count > 1 {
            return Err(DecodeError::InvalidHeader(format!(
                "multistream layout with {} streams is not supported",
                head.stream_count
            )));
        }
        // One stream decodes to one channel, or two when coupled
        let decoded_channels = 1 + head.coupled_count as usize;
        let layout = if decoded_channels == 1 {
            Channels::Mono
        } else {
            Channels::Stereo
        };
        let identity = head.mapping.len() == decoded_channels
            && head.mapping.iter().enumerate().all(|(i, &m)| m as usize == i);
        let mapping = if identity {
            None
        } else {
            debug!("opus: channel mapping {:?}", head.mapping);
            Some(head.mapping.clone())
        };

        let mut decoder = Decoder::new(rate, layout)
            .map_err(|e| DecodeError::InvalidHeader(format!("decoder init failed: {}", e)))?;
        if head.output_gain != 0 {
            decoder
                .set_gain(head.output_gain as i32)
                .map_err(|e| DecodeError::InvalidHeader(format!("gain rejected: {}", e)))?;
        }

        let max_frames = (rate * MAX_FRAME_MS / 1000) as usize;
        let preskip_left = (head.preskip as u64 * rate as u64 / DEFAULT_RATE as u64) as u32;
        Ok(OpusDecoder {
            decoder,
            decoded_channels,
            channels: head.channels as usize,
            mapping,
            buffer: vec![0; max_frames * decoded_channels],
            preskip_left,
        })
    }
}

impl DecoderHandle for OpusDecoder {
    fn decode(&mut self, packet: &[u8]) -> Result<Pcm> {
        let frames = self
            .decoder
            .decode(packet, &mut self.buffer, false)
            .map_err(|e| DecodeError::Decode(e.to_string()))?;

        let skip = (self.preskip_left as usize).min(frames);
        self.preskip_left -= skip as u32;
        let decoded = &self.buffer[skip * self.decoded_channels..frames * self.decoded_channels];
        let samples = match &self.mapping {
            None => decoded.to_vec(),
            Some(mapping) => decoded
                .chunks_exact(self.decoded_channels)
                .flat_map(move |frame| {
                    mapping.iter().map(move |&m| match m {
                        255 => 0,
                        m => frame[m as usize],
                    })
                })
                .collect(),
        };
        Ok(Pcm::Interleaved {
            samples,
            channels: self.channels,
        })
    }
}
