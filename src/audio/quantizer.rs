//! Float PCM to signed 16-bit PCM
//!
//! Negative samples scale by 32768 and positive ones by 32767, so -1.0 lands on
//! `i16::MIN` and 1.0 on `i16::MAX` without overflow. Scaled values are truncated
//! toward zero.

use crate::audio::decoder::DecodedAudio;
use tracing::debug;

const NEGATIVE_SCALE: f32 = 32768.0;
const POSITIVE_SCALE: f32 = 32767.0;

/// Quantize one sample. NaN maps to 0.
pub fn quantize_sample(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * NEGATIVE_SCALE) as i16
    } else {
        (clamped * POSITIVE_SCALE) as i16
    }
}

/// Quantize a whole channel; output length always equals input length
pub fn quantize(samples: &[f32]) -> Vec<i16> {
    samples.iter().copied().map(quantize_sample).collect()
}

/// Inverse of the scaling above, used to re-expand quantized PCM
pub fn expand_sample(sample: i16) -> f32 {
    if sample < 0 {
        sample as f32 / NEGATIVE_SCALE
    } else {
        sample as f32 / POSITIVE_SCALE
    }
}

/// Quantized PCM laid out for the encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizedAudio {
    pub left: Vec<i16>,
    /// Present only when the encoder runs in stereo
    pub right: Option<Vec<i16>>,
}

impl QuantizedAudio {
    pub fn channels(&self) -> u8 {
        if self.right.is_some() {
            2
        } else {
            1
        }
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Quantize decoded audio into the channel layout the encoder expects
pub fn quantize_for_encoder(decoded: &DecodedAudio, encoder_channels: u8) -> QuantizedAudio {
    match (decoded.right(), encoder_channels) {
        (Some(right), 2) => QuantizedAudio {
            left: quantize(decoded.left()),
            right: Some(quantize(right)),
        },
        (None, 2) => {
            // Mono source into a stereo encoder: the right channel mirrors the left
            debug!("Mirroring mono source into both encoder channels");
            let left = quantize(decoded.left());
            QuantizedAudio {
                right: Some(left.clone()),
                left,
            }
        }
        (Some(right), _) => {
            debug!("Downmixing stereo source for mono encoder");
            let mixed: Vec<i16> = decoded
                .left()
                .iter()
                .zip(right)
                .map(|(l, r)| quantize_sample((l + r) * 0.5))
                .collect();
            QuantizedAudio {
                left: mixed,
                right: None,
            }
        }
        (None, _) => QuantizedAudio {
            left: quantize(decoded.left()),
            right: None,
        },
    }
}
