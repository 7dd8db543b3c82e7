//! Conversion pipeline: decode → quantize → encode → assemble
//!
//! Each conversion owns its decode session and encoder; nothing is shared between
//! conversions, so any number of them can run at once.

use crate::audio::{
    quantize_for_encoder, AssembledAudio, AssemblyError, AudioDecoder, ByteAssembler,
    CompressedAudioInput, DecodeError, DecodeSession, EncodeError, EncoderInitError,
    FrameEncoder, QuantizedAudio, WebmOpusDecoder,
};
use crate::config::{Config, BLOCK_SIZE};
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Pipeline stage a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStage {
    Decode,
    /// Infallible today; kept so stage names line up with the pipeline steps
    Quantize,
    Encode,
    Assemble,
    Runtime,
}

impl fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConversionStage::Decode => "decode",
            ConversionStage::Quantize => "quantize",
            ConversionStage::Encode => "encode",
            ConversionStage::Assemble => "assemble",
            ConversionStage::Runtime => "runtime",
        })
    }
}

#[derive(Error, Debug)]
pub enum AudioConversionError {
    #[error("decode stage failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("encode stage failed: {0}")]
    EncoderInit(#[from] EncoderInitError),
    #[error("encode stage failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("assemble stage failed: {0}")]
    Assembly(#[from] AssemblyError),
    #[error("conversion task failed: {0}")]
    Runtime(String),
}

impl AudioConversionError {
    pub fn stage(&self) -> ConversionStage {
        match self {
            AudioConversionError::Decode(_) => ConversionStage::Decode,
            AudioConversionError::EncoderInit(_) | AudioConversionError::Encode(_) => {
                ConversionStage::Encode
            }
            AudioConversionError::Assembly(_) => ConversionStage::Assemble,
            AudioConversionError::Runtime(_) => ConversionStage::Runtime,
        }
    }
}

/// Converts recorded voice messages to MP3
#[derive(Debug, Clone)]
pub struct VoiceConverter<D = WebmOpusDecoder> {
    decoder: D,
    config: Config,
}

impl VoiceConverter<WebmOpusDecoder> {
    pub fn new(config: Config) -> Self {
        Self {
            decoder: WebmOpusDecoder::from_config(&config),
            config,
        }
    }
}

impl<D: AudioDecoder> VoiceConverter<D> {
    /// Use a custom decode facility
    pub fn with_decoder(decoder: D, config: Config) -> Self {
        Self { decoder, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one conversion on the calling thread
    pub fn convert_blocking(
        &self,
        input: &CompressedAudioInput,
    ) -> Result<AssembledAudio, AudioConversionError> {
        let started = Instant::now();

        // The session is dropped at the end of this block, on success or error
        let decoded = {
            let mut session = self.decoder.open()?;
            session.decode(input)?
        };

        let encoder_channels = self.config.channel_mode.encoder_channels(decoded.channels());
        let quantized = quantize_for_encoder(&decoded, encoder_channels);
        debug!(
            "Quantized {} samples x {} channel(s) at {} Hz",
            quantized.len(),
            quantized.channels(),
            decoded.sample_rate()
        );

        let bytes = encode_blocks(&quantized, decoded.sample_rate())?;
        let output = AssembledAudio::new(bytes, decoded.duration());

        info!(
            "Converted {:.2}s recording: {} -> {} bytes {} in {:?}",
            decoded.duration().as_secs_f64(),
            input.len(),
            output.len(),
            output.media_type(),
            started.elapsed()
        );

        Ok(output)
    }
}

impl<D> VoiceConverter<D>
where
    D: AudioDecoder + Clone + 'static,
{
    /// Run one conversion on the blocking thread pool
    pub async fn convert(
        &self,
        input: CompressedAudioInput,
    ) -> Result<AssembledAudio, AudioConversionError> {
        let converter = self.clone();
        tokio::task::spawn_blocking(move || converter.convert_blocking(&input))
            .await
            .map_err(|e| AudioConversionError::Runtime(e.to_string()))?
    }
}

/// Feed quantized PCM to a fresh encoder in `BLOCK_SIZE` slices and assemble the result
pub fn encode_blocks(
    audio: &QuantizedAudio,
    sample_rate: u32,
) -> Result<Vec<u8>, AudioConversionError> {
    let mut encoder = FrameEncoder::new(audio.channels(), sample_rate)?;
    let mut assembler = ByteAssembler::new();

    for start in (0..audio.len()).step_by(BLOCK_SIZE) {
        let end = (start + BLOCK_SIZE).min(audio.len());
        let right = audio.right.as_ref().map(|r| &r[start..end]);
        assembler.push(encoder.encode(&audio.left[start..end], right)?)?;
    }
    assembler.push_flush(encoder.flush()?)?;

    debug!(
        "Encoded {} blocks into {} chunks",
        encoder.blocks(),
        assembler.chunk_count()
    );

    Ok(assembler.assemble()?)
}
