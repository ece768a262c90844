// Codec strategies
//
// The pipeline is generic over the codec family. A strategy knows how many
// header packets its streams carry, how to parse each of them into the
// stream description, and how to build the decoder once they are all in.
//
// Vorbis: identification, comments, setup (decoder needs all three)
// Opus:   identification, comments (decoder built from identification alone)

pub mod comments;
pub mod opus;
pub mod vorbis;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pcm::Pcm;

pub use self::opus::OpusCodec;
pub use self::vorbis::VorbisCodec;

/// Codec families the pipeline can negotiate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    Vorbis,
    Opus,
}

impl CodecKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecKind::Vorbis => "vorbis",
            CodecKind::Opus => "opus",
        }
    }

    /// Number of header packets before audio
    pub fn header_count(&self) -> usize {
        match self {
            CodecKind::Vorbis => 3,
            CodecKind::Opus => 2,
        }
    }

    /// Build the strategy for this codec
    pub fn strategy(&self, config: &PipelineConfig) -> Box<dyn Codec> {
        match self {
            CodecKind::Vorbis => Box::new(VorbisCodec::new(config.max_comment_len)),
            CodecKind::Opus => Box::new(OpusCodec::new(
                config.max_comment_len,
                config.opus_output_rate,
            )),
        }
    }

    /// Guess the codec from the first packet of a stream
    pub fn sniff(packet: &[u8]) -> Option<Self> {
        if packet.starts_with(self::vorbis::IDENT_MAGIC) {
            Some(CodecKind::Vorbis)
        } else if packet.starts_with(self::opus::HEAD_MAGIC) {
            Some(CodecKind::Opus)
        } else {
            None
        }
    }
}

impl std::fmt::Display for CodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vorbis" => Ok(CodecKind::Vorbis),
            "opus" => Ok(CodecKind::Opus),
            other => Err(format!("unknown codec '{}'", other)),
        }
    }
}

/// Role of a header packet within the header sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    Identification,
    Comments,
    Setup,
}

impl HeaderKind {
    /// Header role at `index` for a codec carrying `count` headers
    pub fn at(index: usize, count: usize) -> Option<Self> {
        match (index, count) {
            (0, _) => Some(HeaderKind::Identification),
            (1, _) => Some(HeaderKind::Comments),
            (2, 3) => Some(HeaderKind::Setup),
            _ => None,
        }
    }
}

/// Result of a successfully parsed header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderOutcome {
    Accepted,
    /// The decode context was built from this header and is held until the
    /// remaining headers arrive
    DecoderPrepared,
}

/// Stream description handed to the consumer once headers are negotiated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamMetadata {
    pub sample_rate: u32,
    pub channels: usize,
    pub vendor: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub date: Option<String>,
    pub track: Option<String>,
}

/// `StreamMetadata` plus the stream and codec parameters around it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub serial: u32,
    pub codec: CodecKind,
    #[serde(flatten)]
    pub metadata: StreamMetadata,
    /// Frames discarded at the start of the stream, at the decode rate
    pub preskip: u32,
    /// Output gain in Q7.8 dB
    pub output_gain: i16,
}

impl StreamInfo {
    pub fn new(serial: u32, codec: CodecKind) -> Self {
        Self {
            serial,
            codec,
            metadata: StreamMetadata::default(),
            preskip: 0,
            output_gain: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.metadata.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.metadata.channels
    }
}

/// Per-stream decode state
pub trait DecoderHandle {
    /// Decode one audio packet
    fn decode(&mut self, packet: &[u8]) -> Result<Pcm>;
}

/// One codec family
pub trait Codec {
    fn kind(&self) -> CodecKind;

    fn header_count(&self) -> usize {
        self.kind().header_count()
    }

    /// Drop header and decoder state held for the current logical stream.
    /// Called before a stream's first header and again when it finishes.
    fn reset(&mut self);

    /// Parse one header packet into `info`
    fn parse_header(
        &mut self,
        kind: HeaderKind,
        packet: &[u8],
        info: &mut StreamInfo,
    ) -> Result<HeaderOutcome>;

    /// Hand over the decoder once every header has been parsed
    fn create_decoder(&mut self, info: &StreamInfo) -> Result<Box<dyn DecoderHandle>>;
}
