//! Block-wise MP3 encoding on top of LAME
//!
//! The encoder is fed blocks of at most [`BLOCK_SIZE`] samples per channel and must be
//! flushed exactly once. After the flush it refuses further work.

use crate::config::{BITRATE_KBPS, BLOCK_SIZE};
use mp3lame_encoder::{Bitrate, Builder, DualPcm, Encoder, FlushGap, MonoPcm, Quality};
use thiserror::Error;
use tracing::debug;

/// Extra room LAME asks for on top of 1.25 bytes per sample
const LAME_BUFFER_SLACK: usize = 7200;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncoderInitError {
    #[error("MP3 only supports 1 or 2 channels, got {0}")]
    UnsupportedChannelCount(u8),
    #[error("Sample rate must be positive")]
    InvalidSampleRate,
    #[error("Failed to create LAME encoder")]
    Unavailable,
    #[error("LAME rejected configuration: {0}")]
    Rejected(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Encoder already flushed")]
    AlreadyFlushed,
    #[error("Block of {0} samples exceeds the {max} sample frame", max = BLOCK_SIZE)]
    BlockTooLarge(usize),
    #[error("Encoder expects {expected} channel(s), got {actual}")]
    ChannelCountMismatch { expected: u8, actual: u8 },
    #[error("Channel blocks differ in length (left {left}, right {right})")]
    ChannelLengthMismatch { left: usize, right: usize },
    #[error("LAME encode failed: {0}")]
    Lame(String),
}

/// Bytes produced by one encode or flush call. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputChunk(Vec<u8>);

impl OutputChunk {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for OutputChunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

enum EncoderState {
    Open(Box<Encoder>),
    Flushed,
}

/// Stateful MP3 encoder for one conversion
pub struct FrameEncoder {
    state: EncoderState,
    channels: u8,
    sample_rate: u32,
    blocks: usize,
}

impl FrameEncoder {
    /// Build a 128 kbps CBR encoder
    pub fn new(channels: u8, sample_rate: u32) -> Result<Self, EncoderInitError> {
        if !(1..=2).contains(&channels) {
            return Err(EncoderInitError::UnsupportedChannelCount(channels));
        }
        if sample_rate == 0 {
            return Err(EncoderInitError::InvalidSampleRate);
        }

        let mut builder = Builder::new().ok_or(EncoderInitError::Unavailable)?;
        builder
            .set_num_channels(channels)
            .map_err(|e| EncoderInitError::Rejected(format!("channels: {:?}", e)))?;
        builder
            .set_sample_rate(sample_rate)
            .map_err(|e| EncoderInitError::Rejected(format!("sample rate: {:?}", e)))?;
        builder
            .set_brate(Bitrate::Kbps128)
            .map_err(|e| EncoderInitError::Rejected(format!("bitrate: {:?}", e)))?;
        builder
            .set_quality(Quality::Good)
            .map_err(|e| EncoderInitError::Rejected(format!("quality: {:?}", e)))?;

        let encoder = builder
            .build()
            .map_err(|e| EncoderInitError::Rejected(format!("{:?}", e)))?;

        debug!(
            "Created MP3 encoder ({} ch, {} Hz, {} kbps)",
            channels, sample_rate, BITRATE_KBPS
        );

        Ok(Self {
            state: EncoderState::Open(Box::new(encoder)),
            channels,
            sample_rate,
            blocks: 0,
        })
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of blocks accepted so far
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    pub fn is_flushed(&self) -> bool {
        matches!(self.state, EncoderState::Flushed)
    }

    /// Encode the next block. Stereo encoders need `right` with the same length as `left`.
    pub fn encode(&mut self, left: &[i16], right: Option<&[i16]>) -> Result<OutputChunk, EncodeError> {
        let channels = self.channels;
        let encoder = match &mut self.state {
            EncoderState::Open(encoder) => encoder,
            EncoderState::Flushed => return Err(EncodeError::AlreadyFlushed),
        };

        let actual = if right.is_some() { 2 } else { 1 };
        if actual != channels {
            return Err(EncodeError::ChannelCountMismatch {
                expected: channels,
                actual,
            });
        }
        if left.len() > BLOCK_SIZE {
            return Err(EncodeError::BlockTooLarge(left.len()));
        }
        if let Some(right) = right {
            if right.len() != left.len() {
                return Err(EncodeError::ChannelLengthMismatch {
                    left: left.len(),
                    right: right.len(),
                });
            }
        }

        self.blocks += 1;
        if left.is_empty() {
            return Ok(OutputChunk::default());
        }

        let mut out = Vec::with_capacity(left.len() * 5 / 4 + LAME_BUFFER_SLACK);
        let result = match right {
            Some(right) => encoder.encode_to_vec(DualPcm { left, right }, &mut out),
            None => encoder.encode_to_vec(MonoPcm(left), &mut out),
        };
        result.map_err(|e| EncodeError::Lame(format!("{:?}", e)))?;

        Ok(OutputChunk(out))
    }

    /// Pad and emit the buffered partial frame. Allowed once.
    pub fn flush(&mut self) -> Result<OutputChunk, EncodeError> {
        let mut encoder = match std::mem::replace(&mut self.state, EncoderState::Flushed) {
            EncoderState::Open(encoder) => encoder,
            EncoderState::Flushed => return Err(EncodeError::AlreadyFlushed),
        };

        let mut out = Vec::with_capacity(LAME_BUFFER_SLACK);
        encoder
            .flush_to_vec::<FlushGap>(&mut out)
            .map_err(|e| EncodeError::Lame(format!("{:?}", e)))?;

        debug!("Flushed MP3 encoder after {} blocks ({} bytes)", self.blocks, out.len());
        Ok(OutputChunk(out))
    }
}
