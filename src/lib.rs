//! voice_mp3
//!
//! Converts browser-recorded voice messages (WebM container, Opus audio) into MP3
//! for messaging APIs that only accept `audio/mpeg`.

pub mod audio;
pub mod config;
pub mod pipeline;

pub use audio::{AssembledAudio, CompressedAudioInput, DecodedAudio};
pub use config::{ChannelMode, Config, ConfigError};
pub use pipeline::{AudioConversionError, ConversionStage, VoiceConverter};
