//! MP3 stream inspection
//!
//! Runs encoder output back through symphonia's MPEG audio reader to confirm it is a
//! playable stream and to measure how much audio it carries.

use crate::config::OUTPUT_MEDIA_TYPE;
use std::io::{self, Cursor};
use std::time::Duration;
use symphonia::core::codecs::CODEC_TYPE_MP3;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Mp3Error {
    #[error("Stream contains no MPEG audio frames")]
    Empty,
    #[error("Not an MP3 stream: {0}")]
    Unrecognized(String),
    #[error("Stream does not declare its {0}")]
    MissingParameter(&'static str),
    #[error("Failed to read frame: {0}")]
    Read(String),
}

/// What a pass over an MP3 stream found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    /// Audio frames, a leading Xing/Info frame not included
    pub frames: usize,
    /// Samples per channel the audio frames decode to, encoder delay and padding included
    pub samples: usize,
    pub sample_rate: u32,
    pub channels: usize,
}

impl StreamSummary {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples as f64 / self.sample_rate as f64)
    }
}

fn hint() -> Hint {
    let mut hint = Hint::new();
    hint.with_extension("mp3");
    hint.mime_type(OUTPUT_MEDIA_TYPE);
    hint
}

/// Read every frame of a complete MP3 stream
pub fn inspect(bytes: &[u8]) -> Result<StreamSummary, Mp3Error> {
    if bytes.is_empty() {
        return Err(Mp3Error::Empty);
    }

    let source = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());
    let probed = symphonia::default::get_probe()
        .format(&hint(), mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Mp3Error::Unrecognized(e.to_string()))?;
    let mut format = probed.format;

    let track = format.default_track().ok_or(Mp3Error::Empty)?;
    if track.codec_params.codec != CODEC_TYPE_MP3 {
        return Err(Mp3Error::Unrecognized(format!(
            "codec {}",
            track.codec_params.codec
        )));
    }
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(Mp3Error::MissingParameter("sample rate"))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .ok_or(Mp3Error::MissingParameter("channel layout"))?;

    let mut frames = 0usize;
    let mut samples = 0u64;
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            // also covers a partial frame at the very end
            Err(SymphoniaError::IoError(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(Mp3Error::Read(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }
        frames += 1;
        samples += packet.dur;
    }

    if frames == 0 {
        return Err(Mp3Error::Empty);
    }

    Ok(StreamSummary {
        frames,
        samples: samples as usize,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // MPEG-1 Layer III, 128 kbps, 44.1 kHz, no padding, no CRC
    const MONO_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0xC0];
    const JOINT_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x40];
    const FRAME_LEN: usize = 417;

    fn frames(header: [u8; 4], count: usize) -> Vec<u8> {
        let mut frame = header.to_vec();
        frame.resize(FRAME_LEN, 0);
        frame.repeat(count)
    }

    #[test]
    fn test_counts_frames() {
        let summary = inspect(&frames(JOINT_HEADER, 3)).unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.samples, 3 * 1152);
        assert_eq!(summary.sample_rate, 44_100);
        assert_eq!(summary.channels, 2);

        let summary = inspect(&frames(MONO_HEADER, 2)).unwrap();
        assert_eq!(summary.channels, 1);
        assert_eq!(summary.duration(), Duration::from_secs_f64(2304.0 / 44_100.0));
    }

    #[test]
    fn test_partial_last_frame_is_ignored() {
        let mut stream = frames(MONO_HEADER, 2);
        stream.extend_from_slice(&MONO_HEADER);
        stream.extend_from_slice(&[0; 20]);
        assert_eq!(inspect(&stream).unwrap().frames, 2);
    }

    #[test]
    fn test_rejects_other_bytes() {
        assert_eq!(inspect(&[]), Err(Mp3Error::Empty));
        assert!(inspect(b"OggS\0\x02\0\0").is_err());
        assert!(inspect(b"definitely not an mp3 stream").is_err());
    }
}
