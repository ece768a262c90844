// Header negotiation
//
// AwaitingIdentification -> AwaitingComments -> [AwaitingSetup] -> Ready
//
// Any rejected header moves the negotiator to Invalid, where it stays. No
// audio packet is accepted before Ready.

use tracing::debug;

use crate::codec::{Codec, HeaderKind, HeaderOutcome, StreamInfo};
use crate::error::{DecodeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    AwaitingIdentification,
    AwaitingComments,
    AwaitingSetup,
    Ready,
    Invalid,
}

impl NegotiationState {
    fn for_header(kind: Option<HeaderKind>) -> Self {
        match kind {
            Some(HeaderKind::Identification) => NegotiationState::AwaitingIdentification,
            Some(HeaderKind::Comments) => NegotiationState::AwaitingComments,
            Some(HeaderKind::Setup) => NegotiationState::AwaitingSetup,
            None => NegotiationState::Ready,
        }
    }
}

/// Outcome of feeding one header packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    NeedMore,
    Ready,
}

/// Header state machine for one logical stream
#[derive(Debug)]
pub struct HeaderNegotiator {
    state: NegotiationState,
    received: usize,
    expected: usize,
    info: StreamInfo,
}

impl HeaderNegotiator {
    pub fn new(serial: u32, codec: &dyn Codec) -> Self {
        HeaderNegotiator {
            state: NegotiationState::AwaitingIdentification,
            received: 0,
            expected: codec.header_count(),
            info: StreamInfo::new(serial, codec.kind()),
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == NegotiationState::Ready
    }

    /// Header packets accepted so far
    pub fn received(&self) -> usize {
        self.received
    }

    /// Header packets the codec requires
    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn into_info(self) -> StreamInfo {
        self.info
    }

    /// Feed the next header packet of the stream
    pub fn push_packet(&mut self, codec: &mut dyn Codec, packet: &[u8]) -> Result<Negotiation> {
        let kind = match self.state {
            NegotiationState::Ready => return Ok(Negotiation::Ready),
            NegotiationState::Invalid => {
                return Err(DecodeError::CorruptSecondaryHeader(
                    "header negotiation already failed".into(),
                ))
            }
            _ => HeaderKind::at(self.received, self.expected),
        };
        let Some(kind) = kind else {
            self.state = NegotiationState::Invalid;
            return Err(DecodeError::CorruptSecondaryHeader(format!(
                "unexpected header {} of {}",
                self.received + 1,
                self.expected
            )));
        };

        match codec.parse_header(kind, packet, &mut self.info) {
            Ok(outcome) => {
                if outcome == HeaderOutcome::DecoderPrepared {
                    debug!("stream {:#010x}: decoder prepared from {:?} header", self.info.serial, kind);
                }
                self.received += 1;
                self.state =
                    NegotiationState::for_header(HeaderKind::at(self.received, self.expected));
                Ok(if self.is_ready() {
                    Negotiation::Ready
                } else {
                    Negotiation::NeedMore
                })
            }
            Err(err) => {
                self.state = NegotiationState::Invalid;
                Err(err)
            }
        }
    }

    /// Pages were lost in the middle of the header sequence
    pub fn hole(&mut self) -> DecodeError {
        self.state = NegotiationState::Invalid;
        DecodeError::CorruptSecondaryHeader(format!(
            "page lost after {} of {} header packets",
            self.received, self.expected
        ))
    }

    /// The source ran dry before negotiation finished
    pub fn premature_end(&self) -> DecodeError {
        DecodeError::PrematureEndOfFile {
            received: self.received,
            expected: self.expected,
        }
    }
}
