// Pipeline configuration
//
// Everything the decode loop needs to know up front. Passed into the pipeline
// at construction; there is no process-wide state.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::opus::SUPPORTED_RATES;
use crate::codec::CodecKind;

pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;
pub const DEFAULT_MAX_WRITE_SAMPLES: usize = 4096;
pub const DEFAULT_MAX_COMMENT_LEN: usize = 128;
pub const DEFAULT_MAX_SYNC_SEARCH: usize = 65536;
// One whole frame of the widest Ogg channel layout must fit in a write
pub const MIN_WRITE_SAMPLES: usize = 255;

/// What to do after the codec rejects an audio packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeErrorPolicy {
    /// End the run with the decode error
    #[default]
    Terminate,
    /// End the current stream and keep looking for a chained one
    AwaitNextStream,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Settings for one decode pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub codec: CodecKind,
    /// Emit per-page and per-packet debug events
    pub debug: bool,
    /// Maximum bytes requested from the source per read
    pub read_chunk_size: usize,
    /// Maximum interleaved samples per sink write
    pub max_write_samples: usize,
    /// Maximum characters kept per comment field
    pub max_comment_len: usize,
    /// Unsynced bytes tolerated before the first page
    pub max_sync_search: usize,
    pub decode_error_policy: DecodeErrorPolicy,
    /// Force the Opus decode rate
    pub opus_output_rate: Option<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            codec: CodecKind::Vorbis,
            debug: false,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_write_samples: DEFAULT_MAX_WRITE_SAMPLES,
            max_comment_len: DEFAULT_MAX_COMMENT_LEN,
            max_sync_search: DEFAULT_MAX_SYNC_SEARCH,
            decode_error_policy: DecodeErrorPolicy::default(),
            opus_output_rate: None,
        }
    }
}

impl PipelineConfig {
    pub fn for_codec(codec: CodecKind) -> Self {
        PipelineConfig {
            codec,
            ..Self::default()
        }
    }

    /// Load from a JSON file; missing keys take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_chunk_size == 0 {
            return Err(invalid("read_chunk_size", "must be at least 1"));
        }
        if self.max_write_samples < MIN_WRITE_SAMPLES {
            return Err(invalid(
                "max_write_samples",
                format!("must be at least {}", MIN_WRITE_SAMPLES),
            ));
        }
        if self.max_comment_len == 0 {
            return Err(invalid("max_comment_len", "must be at least 1"));
        }
        if let Some(rate) = self.opus_output_rate {
            if !SUPPORTED_RATES.contains(&rate) {
                return Err(invalid(
                    "opus_output_rate",
                    format!("{} Hz is not one of {:?}", rate, SUPPORTED_RATES),
                ));
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.read_chunk_size, 4096);
        assert_eq!(config.codec, CodecKind::Vorbis);
        assert_eq!(config.decode_error_policy, DecodeErrorPolicy::Terminate);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"codec": "opus", "decode_error_policy": "await_next_stream"}"#)
                .unwrap();
        assert_eq!(config.codec, CodecKind::Opus);
        assert_eq!(config.decode_error_policy, DecodeErrorPolicy::AwaitNextStream);
        assert_eq!(config.max_comment_len, DEFAULT_MAX_COMMENT_LEN);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = PipelineConfig {
            read_chunk_size: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "read_chunk_size", .. })
        ));

        let config = PipelineConfig {
            max_write_samples: 16,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            opus_output_rate: Some(44100),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join(format!("oggfeed-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"debug": true, "max_comment_len": 32}"#).unwrap();
        let config = PipelineConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(config.debug);
        assert_eq!(config.max_comment_len, 32);
    }
}
