// Vorbis strategy
//
// Identification Header (30 bytes):
// - Packet type 0x01 + "vorbis"
// - Version (u32 LE, must be 0)
// - Channels (u8), sample rate (u32 LE)
// - Bitrate maximum / nominal / minimum (3 x i32 LE)
// - Blocksizes (u8: low nibble blocksize_0, high nibble blocksize_1)
// - Framing flag (u8, bit 0 set)
//
// Comment header: 0x03 + "vorbis" + comment block
// Setup header:   0x05 + "vorbis" + codebooks, floors, residues, mappings
//
// Codebook and audio decoding is done by lewton; this module validates the
// framing and keeps the header state together until the decoder is built.

use lewton::audio::{read_audio_packet_generic, PreviousWindowRight};
use lewton::header::{read_header_ident, read_header_setup, IdentHeader, SetupHeader};
use tracing::debug;

use crate::codec::comments::CommentHeader;
use crate::codec::{Codec, CodecKind, DecoderHandle, HeaderKind, HeaderOutcome, StreamInfo};
use crate::error::{DecodeError, Result};
use crate::pcm::Pcm;
use crate::utils::io::ByteReader;

pub const IDENT_MAGIC: &[u8; 7] = b"\x01vorbis";
pub const COMMENT_MAGIC: &[u8; 7] = b"\x03vorbis";
pub const SETUP_MAGIC: &[u8; 7] = b"\x05vorbis";

const IDENT_LEN: usize = 30;

/// Structural fields of the identification header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VorbisIdent {
    pub version: u32,
    pub channels: u8,
    pub sample_rate: u32,
    pub bitrate_nominal: i32,
    pub blocksize_0: u8,
    pub blocksize_1: u8,
}

impl VorbisIdent {
    /// Parse and validate an identification packet
    pub fn parse(packet: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(packet);
        if !reader.check_signature(IDENT_MAGIC) {
            return Err(DecodeError::NotCodecHeader {
                codec: "vorbis",
                reason: "identification packet lacks the \\x01vorbis signature".into(),
            });
        }
        if packet.len() < IDENT_LEN {
            return Err(DecodeError::InvalidHeader(format!(
                "identification header is {} bytes, expected {}",
                packet.len(),
                IDENT_LEN
            )));
        }

        let short = || DecodeError::InvalidHeader("identification header truncated".into());
        let version = reader.read_le_u32().ok_or_else(short)?;
        let channels = reader.read_u8().ok_or_else(short)?;
        let sample_rate = reader.read_le_u32().ok_or_else(short)?;
        let _bitrate_max = reader.read_le_u32().ok_or_else(short)?;
        let bitrate_nominal = reader.read_le_u32().ok_or_else(short)? as i32;
        let _bitrate_min = reader.read_le_u32().ok_or_else(short)?;
        let blocksizes = reader.read_u8().ok_or_else(short)?;
        let framing = reader.read_u8().ok_or_else(short)?;

        let ident = VorbisIdent {
            version,
            channels,
            sample_rate,
            bitrate_nominal,
            blocksize_0: blocksizes & 0x0f,
            blocksize_1: blocksizes >> 4,
        };

        if ident.version != 0 {
            return Err(DecodeError::InvalidHeader(format!(
                "unsupported Vorbis version {}",
                ident.version
            )));
        }
        if ident.channels == 0 {
            return Err(DecodeError::InvalidHeader("channel count is 0".into()));
        }
        if ident.sample_rate == 0 {
            return Err(DecodeError::InvalidHeader("sample rate is 0".into()));
        }
        if !(6..=13).contains(&ident.blocksize_0)
            || !(6..=13).contains(&ident.blocksize_1)
            || ident.blocksize_0 > ident.blocksize_1
        {
            return Err(DecodeError::InvalidHeader(format!(
                "invalid blocksizes 2^{} / 2^{}",
                ident.blocksize_0, ident.blocksize_1
            )));
        }
        if framing & 0x01 == 0 {
            return Err(DecodeError::InvalidHeader("framing bit not set".into()));
        }
        Ok(ident)
    }
}

/// Vorbis codec strategy
pub struct VorbisCodec {
    max_comment_len: usize,
    ident: Option<IdentHeader>,
    setup: Option<SetupHeader>,
}

impl VorbisCodec {
    pub fn new(max_comment_len: usize) -> Self {
        VorbisCodec {
            max_comment_len,
            ident: None,
            setup: None,
        }
    }

    fn parse_ident(&mut self, packet: &[u8], info: &mut StreamInfo) -> Result<HeaderOutcome> {
        let fields = VorbisIdent::parse(packet)?;
        let ident = read_header_ident(packet)
            .map_err(|e| DecodeError::InvalidHeader(e.to_string()))?;

        debug!(
            "vorbis: {} Hz, {} channels, nominal {} bps, blocksizes {}/{}",
            fields.sample_rate,
            fields.channels,
            fields.bitrate_nominal,
            1u32 << fields.blocksize_0,
            1u32 << fields.blocksize_1
        );

        info.metadata.sample_rate = ident.audio_sample_rate;
        info.metadata.channels = ident.audio_channels as usize;
        self.ident = Some(ident);
        Ok(HeaderOutcome::Accepted)
    }

    fn parse_comments(&mut self, packet: &[u8], info: &mut StreamInfo) -> Result<HeaderOutcome> {
        if !packet.starts_with(COMMENT_MAGIC) {
            return Err(DecodeError::CorruptSecondaryHeader(
                "expected the Vorbis comment header".into(),
            ));
        }
        CommentHeader::parse(&packet[COMMENT_MAGIC.len()..], self.max_comment_len)
            .apply_to(&mut info.metadata);
        Ok(HeaderOutcome::Accepted)
    }

    fn parse_setup(&mut self, packet: &[u8]) -> Result<HeaderOutcome> {
        if !packet.starts_with(SETUP_MAGIC) {
            return Err(DecodeError::CorruptSecondaryHeader(
                "expected the Vorbis setup header".into(),
            ));
        }
        let ident = self.ident.as_ref().ok_or_else(|| {
            DecodeError::CorruptSecondaryHeader("setup header before identification".into())
        })?;
        let setup = read_header_setup(
            packet,
            ident.audio_channels,
            (ident.blocksize_0, ident.blocksize_1),
        )?;
        self.setup = Some(setup);
        Ok(HeaderOutcome::Accepted)
    }
}

impl Codec for VorbisCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Vorbis
    }

    fn reset(&mut self) {
        self.ident = None;
        self.setup = None;
    }

    fn parse_header(
        &mut self,
        kind: HeaderKind,
        packet: &[u8],
        info: &mut StreamInfo,
    ) -> Result<HeaderOutcome> {
        match kind {
            HeaderKind::Identification => self.parse_ident(packet, info),
            HeaderKind::Comments => self.parse_comments(packet, info),
            HeaderKind::Setup => self.parse_setup(packet),
        }
    }

    fn create_decoder(&mut self, _info: &StreamInfo) -> Result<Box<dyn DecoderHandle>> {
        match (self.ident.take(), self.setup.take()) {
            (Some(ident), Some(setup)) => Ok(Box::new(VorbisDecoder {
                ident,
                setup,
                window: PreviousWindowRight::new(),
            })),
            _ => Err(DecodeError::CorruptSecondaryHeader(
                "header sequence incomplete".into(),
            )),
        }
    }
}

/// lewton decode state for one stream
pub struct VorbisDecoder {
    ident: IdentHeader,
    setup: SetupHeader,
    window: PreviousWindowRight,
}

impl DecoderHandle for VorbisDecoder {
    fn decode(&mut self, packet: &[u8]) -> Result<Pcm> {
        // The first audio packet only primes the window and yields no samples
        let planes: Vec<Vec<f32>> =
            read_audio_packet_generic(&self.ident, &self.setup, packet, &mut self.window)?;
        Ok(Pcm::Planar(planes))
    }
}
