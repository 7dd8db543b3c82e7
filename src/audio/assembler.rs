//! Joins encoder output into the final MP3 buffer

use crate::audio::encoder::OutputChunk;
use crate::audio::media::MediaTypes;
use crate::audio::mp3::{self, Mp3Error};
use crate::config::OUTPUT_MEDIA_TYPE;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("Chunk added after the flush chunk")]
    AlreadySealed,
    #[error("Stream is incomplete: encoder was never flushed")]
    MissingFlush,
    #[error("Assembled {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("Encoder produced no output")]
    EmptyOutput,
    #[error("Output is not a readable MP3 stream: {0}")]
    NotMp3(#[from] Mp3Error),
}

/// Collects output chunks in emission order
#[derive(Debug, Default)]
pub struct ByteAssembler {
    chunks: Vec<OutputChunk>,
    expected_len: usize,
    sealed: bool,
}

impl ByteAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the result of an encode call. Empty chunks are skipped.
    pub fn push(&mut self, chunk: OutputChunk) -> Result<(), AssemblyError> {
        if self.sealed {
            return Err(AssemblyError::AlreadySealed);
        }
        if !chunk.is_empty() {
            self.expected_len += chunk.len();
            self.chunks.push(chunk);
        }
        Ok(())
    }

    /// Add the flush result; no chunk is accepted afterwards
    pub fn push_flush(&mut self, chunk: OutputChunk) -> Result<(), AssemblyError> {
        self.push(chunk)?;
        self.sealed = true;
        Ok(())
    }

    /// Non-empty chunks held so far
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Concatenate everything into one buffer
    pub fn assemble(self) -> Result<Vec<u8>, AssemblyError> {
        if !self.sealed {
            return Err(AssemblyError::MissingFlush);
        }

        let mut bytes = Vec::with_capacity(self.expected_len);
        for chunk in self.chunks {
            bytes.extend_from_slice(chunk.as_bytes());
        }

        if bytes.len() != self.expected_len {
            return Err(AssemblyError::LengthMismatch {
                expected: self.expected_len,
                actual: bytes.len(),
            });
        }
        if bytes.is_empty() {
            return Err(AssemblyError::EmptyOutput);
        }

        let summary = mp3::inspect(&bytes)?;
        debug!(
            "Assembled {} bytes: {} frames, {:.2}s at {} Hz",
            bytes.len(),
            summary.frames,
            summary.duration().as_secs_f64(),
            summary.sample_rate
        );

        Ok(bytes)
    }
}

/// A finished MP3 ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledAudio {
    bytes: Vec<u8>,
    source_duration: Duration,
}

impl AssembledAudio {
    pub fn new(bytes: Vec<u8>, source_duration: Duration) -> Self {
        Self {
            bytes,
            source_duration,
        }
    }

    pub fn media_type(&self) -> &'static str {
        OUTPUT_MEDIA_TYPE
    }

    pub fn extension(&self) -> &'static str {
        MediaTypes::extension(OUTPUT_MEDIA_TYPE)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Duration of the decoded recording this was produced from
    pub fn source_duration(&self) -> Duration {
        self.source_duration
    }
}
