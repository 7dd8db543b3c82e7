//! WebM/Opus decoding into per-channel float PCM
//!
//! Decoding goes through a session acquired from an [`AudioDecoder`]. The session
//! owns the codec scratch state and is released when it is dropped, so every exit
//! path of a conversion gives the resource back.

use crate::audio::media::{MediaTypes, EBML_MAGIC};
use crate::config::Config;
use bytes::Bytes;
use std::io::{self, Cursor};
use std::time::Duration;
use symphonia::core::codecs::CODEC_TYPE_OPUS;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, warn};

/// Opus always decodes at 48 kHz
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

/// Largest Opus packet duration (120 ms) in samples per channel
const MAX_OPUS_FRAME: usize = 5_760;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Input buffer is empty")]
    Empty,
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("Input is not a WebM container")]
    UnrecognizedContainer,
    #[error("Malformed container: {0}")]
    Malformed(String),
    #[error("No Opus audio track found")]
    UnsupportedCodec,
    #[error("Unsupported channel count: {0}")]
    UnsupportedChannelCount(usize),
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),
    #[error("Channel lengths differ (left {left}, right {right})")]
    ChannelLengthMismatch { left: usize, right: usize },
    #[error("Opus decode failed: {0}")]
    Codec(String),
    #[error("Stream contains no decodable audio")]
    NoAudio,
    #[error("Decoding resources exhausted: {0}")]
    ResourceExhausted(String),
}

/// Recorded audio as handed over by the caller
#[derive(Debug, Clone)]
pub struct CompressedAudioInput {
    bytes: Bytes,
    media_type: String,
}

impl CompressedAudioInput {
    pub fn new(bytes: impl Into<Bytes>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Declared media type, possibly empty
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Decoded PCM, one equal-length sequence per channel
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    sample_rate: u32,
    left: Vec<f32>,
    right: Option<Vec<f32>>,
}

impl DecodedAudio {
    pub fn mono(left: Vec<f32>, sample_rate: u32) -> Result<Self, DecodeError> {
        if sample_rate == 0 {
            return Err(DecodeError::InvalidSampleRate(sample_rate));
        }
        Ok(Self {
            sample_rate,
            left,
            right: None,
        })
    }

    pub fn stereo(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Result<Self, DecodeError> {
        if sample_rate == 0 {
            return Err(DecodeError::InvalidSampleRate(sample_rate));
        }
        if left.len() != right.len() {
            return Err(DecodeError::ChannelLengthMismatch {
                left: left.len(),
                right: right.len(),
            });
        }
        Ok(Self {
            sample_rate,
            left,
            right: Some(right),
        })
    }

    pub fn channels(&self) -> u8 {
        if self.right.is_some() {
            2
        } else {
            1
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.left.len()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.left.len() as f64 / self.sample_rate as f64)
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> Option<&[f32]> {
        self.right.as_deref()
    }
}

/// A facility that hands out decode sessions
pub trait AudioDecoder: Send + Sync {
    type Session: DecodeSession;

    /// Acquire a session. The session is released when dropped.
    fn open(&self) -> Result<Self::Session, DecodeError>;
}

/// An acquired decoding resource
pub trait DecodeSession {
    fn decode(&mut self, input: &CompressedAudioInput) -> Result<DecodedAudio, DecodeError>;
}

/// Decoder for browser recordings: WebM container, Opus codec
#[derive(Debug, Clone)]
pub struct WebmOpusDecoder {
    max_duration: Duration,
}

impl WebmOpusDecoder {
    pub fn new(max_duration: Duration) -> Self {
        Self { max_duration }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_duration)
    }
}

impl Default for WebmOpusDecoder {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl AudioDecoder for WebmOpusDecoder {
    type Session = WebmOpusSession;

    fn open(&self) -> Result<WebmOpusSession, DecodeError> {
        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(MAX_OPUS_FRAME * 2)
            .map_err(|e| DecodeError::ResourceExhausted(e.to_string()))?;
        scratch.resize(MAX_OPUS_FRAME * 2, 0.0);

        let max_frames = (self.max_duration.as_secs_f64() * OPUS_SAMPLE_RATE as f64) as usize;
        debug!("Opened Opus decode session (limit {} frames)", max_frames);

        Ok(WebmOpusSession {
            scratch,
            max_frames,
        })
    }
}

/// Decode session holding the Opus scratch buffer
pub struct WebmOpusSession {
    scratch: Vec<f32>,
    max_frames: usize,
}

impl DecodeSession for WebmOpusSession {
    fn decode(&mut self, input: &CompressedAudioInput) -> Result<DecodedAudio, DecodeError> {
        if input.is_empty() {
            return Err(DecodeError::Empty);
        }

        let media_type = MediaTypes::resolve(input.media_type(), input.bytes())
            .ok_or_else(|| DecodeError::UnsupportedMediaType(input.media_type().to_string()))?;
        if !media_type.is_webm_opus() {
            return Err(DecodeError::UnsupportedMediaType(input.media_type().to_string()));
        }
        if !input.bytes().starts_with(&EBML_MAGIC) {
            return Err(DecodeError::UnrecognizedContainer);
        }

        let source = Cursor::new(input.bytes().clone());
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let mut hint = Hint::new();
        hint.with_extension("webm");
        hint.mime_type(media_type.essence());

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::Malformed(format!("probe: {}", e)))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec == CODEC_TYPE_OPUS)
            .ok_or(DecodeError::UnsupportedCodec)?;
        let track_id = track.id;

        let head = track
            .codec_params
            .extra_data
            .as_deref()
            .map(OpusHead::parse)
            .transpose()?;
        let channels = match head {
            Some(head) => head.channels as usize,
            None => track
                .codec_params
                .channels
                .map(|c| c.count())
                .ok_or_else(|| DecodeError::Malformed("missing channel count".to_string()))?,
        };
        let layout = match channels {
            1 => opus::Channels::Mono,
            2 => opus::Channels::Stereo,
            n => return Err(DecodeError::UnsupportedChannelCount(n)),
        };
        let pre_skip = head.map(|h| h.pre_skip as usize).unwrap_or(0);

        let mut codec = opus::Decoder::new(OPUS_SAMPLE_RATE, layout)
            .map_err(|e| DecodeError::Codec(e.to_string()))?;

        let mut interleaved: Vec<f32> = Vec::new();
        let mut packets = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    break;
                }
                // a recording cut mid-element keeps what was decoded before the cut
                Err(e) if packets > 0 => {
                    warn!("Container ends mid-stream after {} packets: {}", packets, e);
                    break;
                }
                Err(e) => {
                    return Err(DecodeError::Malformed(format!("packet: {}", e)));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let frames = codec
                .decode_float(packet.buf(), &mut self.scratch, false)
                .map_err(|e| DecodeError::Codec(e.to_string()))?;
            let decoded = &self.scratch[..frames * channels];

            if (interleaved.len() + decoded.len()) / channels > self.max_frames {
                return Err(DecodeError::ResourceExhausted(format!(
                    "recording exceeds {} samples per channel",
                    self.max_frames
                )));
            }
            interleaved
                .try_reserve(decoded.len())
                .map_err(|e| DecodeError::ResourceExhausted(e.to_string()))?;
            interleaved.extend_from_slice(decoded);
            packets += 1;
        }

        let total_frames = interleaved.len() / channels;
        if total_frames <= pre_skip {
            warn!("Decoded {} packets but no audio after pre-skip", packets);
            return Err(DecodeError::NoAudio);
        }

        let (left, right) = deinterleave(&interleaved, channels, pre_skip);
        debug!(
            packets,
            channels,
            pre_skip,
            frames = left.len(),
            "Decoded Opus track"
        );

        match right {
            Some(right) => DecodedAudio::stereo(left, right, OPUS_SAMPLE_RATE),
            None => DecodedAudio::mono(left, OPUS_SAMPLE_RATE),
        }
    }
}

impl Drop for WebmOpusSession {
    fn drop(&mut self) {
        debug!("Released Opus decode session");
    }
}

/// The parts of the `OpusHead` identification header the decoder needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpusHead {
    channels: u8,
    pre_skip: u16,
}

impl OpusHead {
    fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < 19 || &data[..8] != b"OpusHead" {
            return Err(DecodeError::Malformed("invalid OpusHead".to_string()));
        }
        Ok(Self {
            channels: data[9],
            pre_skip: u16::from_le_bytes([data[10], data[11]]),
        })
    }
}

/// Split interleaved PCM into channels, dropping the first `skip` frames
fn deinterleave(interleaved: &[f32], channels: usize, skip: usize) -> (Vec<f32>, Option<Vec<f32>>) {
    let frames = interleaved.chunks_exact(channels).skip(skip);
    if channels == 1 {
        return (frames.map(|f| f[0]).collect(), None);
    }

    let count = interleaved.len() / channels - skip;
    let mut left = Vec::with_capacity(count);
    let mut right = Vec::with_capacity(count);
    for frame in frames {
        left.push(frame[0]);
        right.push(frame[1]);
    }
    (left, Some(right))
}
