// oggfeed - streaming Ogg Vorbis/Opus decoding
//
// Compressed bytes are pulled from a caller-supplied source, split into Ogg
// pages and packets, negotiated against the configured codec and decoded to
// interleaved 16-bit PCM, which is pushed to a caller-supplied sink in
// bounded chunks. Chained streams are decoded one after another.
//
//     let mut pipeline = Pipeline::new(PipelineConfig::for_codec(CodecKind::Opus))?;
//     let mut feed = StreamFeed::new(ReadSource::new(file), WavSink::new("out.wav"));
//     let report = pipeline.run(&mut feed)?;

pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod feed;
pub mod field_mapping;
pub mod negotiate;
pub mod ogg;
pub mod pcm;
pub mod pipeline;
pub mod utils;
pub mod wav;

#[cfg(test)]
mod testutil;

pub use codec::{Codec, CodecKind, DecoderHandle, StreamInfo, StreamMetadata};
pub use config::{ConfigError, DecodeErrorPolicy, PipelineConfig};
pub use error::{DecodeError, ErrorCode};
pub use feed::{ByteSource, DecodeFeed, Flow, PcmSink, ReadSource, SliceSource, StreamFeed, VecSink};
pub use pipeline::{DecodeReport, Pipeline, StreamOutcome, StreamReport};
pub use wav::WavSink;
