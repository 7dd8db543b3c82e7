//! Audio module for decoding and re-encoding voice recordings
//!
//! WebM/Opus in, MP3 out

pub mod assembler;
pub mod decoder;
pub mod encoder;
pub mod media;
pub mod mp3;
pub mod quantizer;

pub use assembler::{AssembledAudio, AssemblyError, ByteAssembler};
pub use decoder::{
    AudioDecoder, CompressedAudioInput, DecodeError, DecodeSession, DecodedAudio,
    WebmOpusDecoder,
};
pub use encoder::{EncodeError, EncoderInitError, FrameEncoder, OutputChunk};
pub use media::{MediaType, MediaTypes};
pub use quantizer::{quantize, quantize_for_encoder, quantize_sample, QuantizedAudio};
