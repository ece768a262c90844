// Error types for the decode pipeline
//
// Every failure the pipeline can surface maps to one stable integer code.
// The numeric values are part of the public contract and must not change.

use thiserror::Error;

/// Numeric result codes handed back to the consumer of the decode loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(i32)]
pub enum ErrorCode {
    /// Decoding ran to completion (or was cancelled by the consumer)
    Success = 0,
    /// Identification header carried an invalid field combination
    InvalidHeader = -1,
    /// The codec rejected an audio packet
    DecodeError = -2,
    /// No valid Ogg page could be found in the input
    InvalidBitstream = -21,
    /// The first page of the stream could not be accepted
    ErrorReadingFirstPage = -22,
    /// The first page did not yield an initial header packet
    ErrorReadingInitialHeaderPacket = -23,
    /// The first packet does not carry the configured codec's signature
    NotCodecHeader = -24,
    /// A comments or setup header was missing, damaged or out of sequence
    CorruptSecondaryHeader = -25,
    /// The source ran dry before the header sequence completed
    PrematureEndOfFile = -26,
}

impl ErrorCode {
    /// Integer value of the code
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Look up a code from its integer value
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(ErrorCode::Success),
            -1 => Some(ErrorCode::InvalidHeader),
            -2 => Some(ErrorCode::DecodeError),
            -21 => Some(ErrorCode::InvalidBitstream),
            -22 => Some(ErrorCode::ErrorReadingFirstPage),
            -23 => Some(ErrorCode::ErrorReadingInitialHeaderPacket),
            -24 => Some(ErrorCode::NotCodecHeader),
            -25 => Some(ErrorCode::CorruptSecondaryHeader),
            -26 => Some(ErrorCode::PrematureEndOfFile),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        self == ErrorCode::Success
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::Success => "success",
            ErrorCode::InvalidHeader => "invalid header",
            ErrorCode::DecodeError => "decode error",
            ErrorCode::InvalidBitstream => "invalid Ogg bitstream",
            ErrorCode::ErrorReadingFirstPage => "error reading first page",
            ErrorCode::ErrorReadingInitialHeaderPacket => "error reading initial header packet",
            ErrorCode::NotCodecHeader => "not a header of the configured codec",
            ErrorCode::CorruptSecondaryHeader => "corrupt secondary header",
            ErrorCode::PrematureEndOfFile => "premature end of file",
        };
        write!(f, "{} ({})", name, self.as_i32())
    }
}

/// Errors raised while demultiplexing, negotiating headers or decoding
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("no Ogg page found: {0}")]
    InvalidBitstream(String),

    #[error("first page rejected: {0}")]
    FirstPage(String),

    #[error("first page produced no header packet")]
    InitialHeaderPacket,

    #[error("not a {codec} stream: {reason}")]
    NotCodecHeader { codec: &'static str, reason: String },

    #[error("invalid identification header: {0}")]
    InvalidHeader(String),

    #[error("corrupt secondary header: {0}")]
    CorruptSecondaryHeader(String),

    #[error("source exhausted after {received} of {expected} header packets")]
    PrematureEndOfFile { received: usize, expected: usize },

    #[error("decode failed: {0}")]
    Decode(String),
}

impl DecodeError {
    /// Stable numeric code surfaced to the consumer
    pub fn code(&self) -> ErrorCode {
        match self {
            DecodeError::InvalidBitstream(_) => ErrorCode::InvalidBitstream,
            DecodeError::FirstPage(_) => ErrorCode::ErrorReadingFirstPage,
            DecodeError::InitialHeaderPacket => ErrorCode::ErrorReadingInitialHeaderPacket,
            DecodeError::NotCodecHeader { .. } => ErrorCode::NotCodecHeader,
            DecodeError::InvalidHeader(_) => ErrorCode::InvalidHeader,
            DecodeError::CorruptSecondaryHeader(_) => ErrorCode::CorruptSecondaryHeader,
            DecodeError::PrematureEndOfFile { .. } => ErrorCode::PrematureEndOfFile,
            DecodeError::Decode(_) => ErrorCode::DecodeError,
        }
    }

    /// Whether the error belongs to header negotiation
    pub fn is_header_error(&self) -> bool {
        !matches!(self, DecodeError::Decode(_))
    }
}

impl From<lewton::header::HeaderReadError> for DecodeError {
    fn from(err: lewton::header::HeaderReadError) -> Self {
        DecodeError::CorruptSecondaryHeader(err.to_string())
    }
}

impl From<lewton::audio::AudioReadError> for DecodeError {
    fn from(err: lewton::audio::AudioReadError) -> Self {
        DecodeError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
