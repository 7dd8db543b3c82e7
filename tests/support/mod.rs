//! Builds WebM/Opus recordings in memory, shaped like what a browser MediaRecorder emits

#![allow(dead_code)]

use std::f32::consts::PI;

pub const SAMPLE_RATE: u32 = 48_000;
/// 20 ms Opus packets
pub const FRAME_SAMPLES: usize = 960;
/// libopus lookahead at 48 kHz, written as the OpusHead pre-skip
pub const PRE_SKIP: u16 = 312;
/// Packets per cluster keeps block timecodes well inside i16
const PACKETS_PER_CLUSTER: usize = 50;

const EBML: u32 = 0x1A45_DFA3;
const EBML_VERSION: u32 = 0x4286;
const EBML_READ_VERSION: u32 = 0x42F7;
const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
const DOC_TYPE: u32 = 0x4282;
const DOC_TYPE_VERSION: u32 = 0x4287;
const DOC_TYPE_READ_VERSION: u32 = 0x4285;
const SEGMENT: u32 = 0x1853_8067;
const INFO: u32 = 0x1549_A966;
const TIMESTAMP_SCALE: u32 = 0x2A_D7B1;
const DURATION: u32 = 0x4489;
const MUXING_APP: u32 = 0x4D80;
const WRITING_APP: u32 = 0x5741;
const TRACKS: u32 = 0x1654_AE6B;
const TRACK_ENTRY: u32 = 0xAE;
const TRACK_NUMBER: u32 = 0xD7;
const TRACK_UID: u32 = 0x73C5;
const TRACK_TYPE: u32 = 0x83;
const CODEC_ID: u32 = 0x86;
const CODEC_PRIVATE: u32 = 0x63A2;
const AUDIO: u32 = 0xE1;
const SAMPLING_FREQUENCY: u32 = 0xB5;
const CHANNELS: u32 = 0x9F;
const CLUSTER: u32 = 0x1F43_B675;
const TIMESTAMP: u32 = 0xE7;
const SIMPLE_BLOCK: u32 = 0xA3;

fn element(id: u32, body: &[u8]) -> Vec<u8> {
    let id_bytes = id.to_be_bytes();
    let skip = id_bytes.iter().take_while(|b| **b == 0).count();

    let mut out = id_bytes[skip..].to_vec();
    // 8-byte size vint: marker byte then 7 bytes of length
    out.push(0x01);
    out.extend_from_slice(&(body.len() as u64).to_be_bytes()[1..]);
    out.extend_from_slice(body);
    out
}

fn uint(id: u32, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
    element(id, &bytes[skip..])
}

fn float(id: u32, value: f64) -> Vec<u8> {
    element(id, &value.to_be_bytes())
}

fn string(id: u32, value: &str) -> Vec<u8> {
    element(id, value.as_bytes())
}

fn opus_head(channels: u8) -> Vec<u8> {
    let mut head = b"OpusHead".to_vec();
    head.push(1);
    head.push(channels);
    head.extend_from_slice(&PRE_SKIP.to_le_bytes());
    head.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    head.extend_from_slice(&0i16.to_le_bytes());
    head.push(0);
    head
}

/// Sine tone as float PCM
pub fn tone(samples: usize, freq: f32, amplitude: f32) -> Vec<f32> {
    (0..samples)
        .map(|n| amplitude * (2.0 * PI * freq * n as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

/// Encode per-channel PCM with libopus and mux it into a WebM document.
/// The PCM length is rounded down to whole 20 ms packets.
pub fn webm_opus(left: &[f32], right: Option<&[f32]>) -> Vec<u8> {
    let channels: u8 = if right.is_some() { 2 } else { 1 };
    let layout = if right.is_some() {
        opus::Channels::Stereo
    } else {
        opus::Channels::Mono
    };
    let mut encoder = opus::Encoder::new(SAMPLE_RATE, layout, opus::Application::Audio).unwrap();

    let packets: Vec<Vec<u8>> = (0..left.len() / FRAME_SAMPLES)
        .map(|i| {
            let range = i * FRAME_SAMPLES..(i + 1) * FRAME_SAMPLES;
            let pcm: Vec<f32> = match right {
                Some(right) => left[range.clone()]
                    .iter()
                    .zip(&right[range])
                    .flat_map(|(l, r)| [*l, *r])
                    .collect(),
                None => left[range].to_vec(),
            };
            let mut out = vec![0u8; 4000];
            let len = encoder.encode_float(&pcm, &mut out).unwrap();
            out.truncate(len);
            out
        })
        .collect();

    mux(channels, &packets)
}

/// Mux already-encoded Opus packets (20 ms each)
pub fn mux(channels: u8, packets: &[Vec<u8>]) -> Vec<u8> {
    let header = [
        uint(EBML_VERSION, 1),
        uint(EBML_READ_VERSION, 1),
        uint(EBML_MAX_ID_LENGTH, 4),
        uint(EBML_MAX_SIZE_LENGTH, 8),
        string(DOC_TYPE, "webm"),
        uint(DOC_TYPE_VERSION, 4),
        uint(DOC_TYPE_READ_VERSION, 2),
    ]
    .concat();

    let duration_ms = (packets.len() * 20) as f64;
    let info = [
        uint(TIMESTAMP_SCALE, 1_000_000),
        float(DURATION, duration_ms),
        string(MUXING_APP, "voice_mp3-tests"),
        string(WRITING_APP, "voice_mp3-tests"),
    ]
    .concat();

    let audio = [
        float(SAMPLING_FREQUENCY, SAMPLE_RATE as f64),
        uint(CHANNELS, channels as u64),
    ]
    .concat();
    let track = [
        uint(TRACK_NUMBER, 1),
        uint(TRACK_UID, 1),
        uint(TRACK_TYPE, 2),
        string(CODEC_ID, "A_OPUS"),
        element(CODEC_PRIVATE, &opus_head(channels)),
        element(AUDIO, &audio),
    ]
    .concat();

    let mut segment = [
        element(INFO, &info),
        element(TRACKS, &element(TRACK_ENTRY, &track)),
    ]
    .concat();

    for (index, group) in packets.chunks(PACKETS_PER_CLUSTER).enumerate() {
        let cluster_start_ms = (index * PACKETS_PER_CLUSTER * 20) as u64;
        let mut cluster = uint(TIMESTAMP, cluster_start_ms);
        for (offset, packet) in group.iter().enumerate() {
            let mut block = vec![0x81];
            block.extend_from_slice(&((offset * 20) as i16).to_be_bytes());
            block.push(0x80);
            block.extend_from_slice(packet);
            cluster.extend(element(SIMPLE_BLOCK, &block));
        }
        segment.extend(element(CLUSTER, &cluster));
    }

    [element(EBML, &header), element(SEGMENT, &segment)].concat()
}
