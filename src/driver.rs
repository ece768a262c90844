// Decode driver
//
// Runs audio packets through the stream's decoder and delivers the result to
// the sink as interleaved i16, in writes no larger than the configured
// capacity and always holding whole frames.

use tracing::{debug, warn};

use crate::codec::DecoderHandle;
use crate::error::Result;
use crate::feed::PcmSink;
use crate::pcm::chunk_len;

/// Counters for one stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub packets: u64,
    pub frames: u64,
    pub samples: u64,
    pub writes: u64,
    pub clipped_packets: u64,
}

pub struct DecodeDriver {
    handle: Box<dyn DecoderHandle>,
    channels: usize,
    chunk: usize,
    scratch: Vec<i16>,
    stats: DriverStats,
}

impl DecodeDriver {
    /// Writes hold at most `max_write_samples` samples as long as that is at
    /// least one frame; see `chunk_len`.
    pub fn new(handle: Box<dyn DecoderHandle>, channels: usize, max_write_samples: usize) -> Self {
        if max_write_samples < channels {
            warn!(
                "write capacity of {} samples is below one {}-channel frame",
                max_write_samples, channels
            );
        }
        DecodeDriver {
            handle,
            channels,
            chunk: chunk_len(channels, max_write_samples),
            scratch: Vec::new(),
            stats: DriverStats::default(),
        }
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    /// Decode one packet and write its samples; returns frames written
    pub fn decode<K: PcmSink + ?Sized>(&mut self, packet: &[u8], sink: &mut K) -> Result<usize> {
        let pcm = self.handle.decode(packet)?;
        self.stats.packets += 1;

        if pcm.channels() != self.channels && !pcm.is_empty() {
            warn!(
                "decoder produced {} channels, stream declares {}",
                pcm.channels(),
                self.channels
            );
        }

        if pcm.interleave_into(&mut self.scratch) {
            self.stats.clipped_packets += 1;
            debug!("packet {}: samples clipped", self.stats.packets);
        }
        if self.scratch.is_empty() {
            return Ok(0);
        }

        for chunk in self.scratch.chunks(self.chunk) {
            sink.write(chunk);
            self.stats.writes += 1;
        }
        let frames = pcm.frames();
        self.stats.frames += frames as u64;
        self.stats.samples += self.scratch.len() as u64;
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::feed::VecSink;
    use crate::pcm::Pcm;
    use crate::testutil::MockDecoder;

    struct PlanarDecoder;

    impl DecoderHandle for PlanarDecoder {
        fn decode(&mut self, packet: &[u8]) -> Result<Pcm> {
            let frames = packet.len();
            Ok(Pcm::Planar(vec![vec![2.0; frames], vec![-0.5; frames]]))
        }
    }

    #[test]
    fn test_writes_bounded_whole_frames() {
        let mut driver = DecodeDriver::new(Box::new(MockDecoder::new(3)), 3, 256);
        let mut sink = VecSink::new();
        let frames = driver.decode(&[1u8; 200], &mut sink).unwrap();
        assert_eq!(frames, 200);
        assert_eq!(sink.samples.len(), 600);
        // 255 samples per write: 85 whole frames of 3 channels
        assert_eq!(sink.writes, 3);
        assert_eq!(driver.stats().writes, 3);
        assert_eq!(driver.stats().samples, 600);
    }

    #[test]
    fn test_planar_output_is_clipped_and_interleaved() {
        let mut driver = DecodeDriver::new(Box::new(PlanarDecoder), 2, 4096);
        let mut sink = VecSink::new();
        driver.decode(&[0u8; 2], &mut sink).unwrap();
        assert_eq!(sink.samples, vec![32767, -16383, 32767, -16383]);
        assert_eq!(driver.stats().clipped_packets, 1);
    }

    #[test]
    fn test_empty_output_writes_nothing() {
        let mut driver = DecodeDriver::new(Box::new(MockDecoder::new(1)), 1, 4096);
        let mut sink = VecSink::new();
        assert_eq!(driver.decode(&[], &mut sink).unwrap(), 0);
        assert_eq!(sink.writes, 0);
        assert_eq!(driver.stats().packets, 1);
    }

    #[test]
    fn test_decode_error_propagates() {
        let mut driver = DecodeDriver::new(Box::new(MockDecoder::new(1)), 1, 4096);
        let mut sink = VecSink::new();
        let err = driver.decode(&[0xff, 1], &mut sink).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DecodeError);
        assert_eq!(sink.writes, 0);
    }
}
