// PCM normalisation
//
// Codecs hand back either planar floats (Vorbis) or interleaved 16-bit
// samples (Opus). Everything leaving the pipeline is interleaved i16.

/// Decoded audio for one packet
#[derive(Debug, Clone, PartialEq)]
pub enum Pcm {
    /// One vector per channel, nominal range -1.0..=1.0
    Planar(Vec<Vec<f32>>),
    /// Interleaved samples, `channels` per frame
    Interleaved { samples: Vec<i16>, channels: usize },
}

impl Pcm {
    pub fn channels(&self) -> usize {
        match self {
            Pcm::Planar(planes) => planes.len(),
            Pcm::Interleaved { channels, .. } => *channels,
        }
    }

    /// Frames (samples per channel)
    pub fn frames(&self) -> usize {
        match self {
            Pcm::Planar(planes) => planes.iter().map(Vec::len).min().unwrap_or(0),
            Pcm::Interleaved { samples, channels } => {
                if *channels == 0 {
                    0
                } else {
                    samples.len() / channels
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Write interleaved i16 samples into `out` (cleared first).
    ///
    /// Returns true if any float sample had to be clipped.
    pub fn interleave_into(&self, out: &mut Vec<i16>) -> bool {
        out.clear();
        match self {
            Pcm::Planar(planes) => interleave_planar(planes, out),
            Pcm::Interleaved { samples, channels } => {
                let whole = self.frames() * channels;
                out.extend_from_slice(&samples[..whole]);
                false
            }
        }
    }
}

/// Convert one float sample to i16 with saturation
pub fn float_to_i16(sample: f32) -> (i16, bool) {
    let val = (sample * 32767.0 + 0.5).floor();
    if val > i16::MAX as f32 {
        (i16::MAX, true)
    } else if val < i16::MIN as f32 {
        (i16::MIN, true)
    } else {
        // NaN lands here and saturates to 0
        (val as i16, false)
    }
}

/// Interleave planar floats, preserving channel order
pub fn interleave_planar(planes: &[Vec<f32>], out: &mut Vec<i16>) -> bool {
    let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
    out.reserve(frames * planes.len());
    let mut clipped = false;
    for frame in 0..frames {
        for plane in planes {
            let (value, clip) = float_to_i16(plane[frame]);
            clipped |= clip;
            out.push(value);
        }
    }
    clipped
}

/// Largest write that fits `max_samples` and holds whole frames only.
///
/// A write never splits a frame, so the result is at least one frame. It
/// exceeds `max_samples` when `max_samples < channels`; callers that need a
/// hard cap must pass at least `channels` (`PipelineConfig::validate` requires
/// 255, the largest channel count an Ogg codec header can declare).
pub fn chunk_len(channels: usize, max_samples: usize) -> usize {
    if channels == 0 {
        return max_samples.max(1);
    }
    let frames = (max_samples / channels).max(1);
    frames * channels
}
