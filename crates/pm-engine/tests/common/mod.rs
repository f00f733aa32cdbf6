//! Shared fixtures: loopback-backed engine, generated WAV/Opus clips

// Each test binary uses its own slice of these helpers
#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use parking_lot::Mutex;
use pm_audio::{LoopbackCapture, LoopbackDevice, OpenDeviceParams};
use pm_engine::{Config, SoundSystem};

pub const MIX_RATE: u32 = 44100;

pub struct TestEngine {
    pub system: SoundSystem,
    pub capture: Arc<Mutex<LoopbackCapture>>,
}

/// Caller-driven engine over a loopback device; every `update` mixes one
/// device buffer into the capture.
pub fn engine() -> TestEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    let device = LoopbackDevice::open(&OpenDeviceParams { buffer_count: 1, frame_count: 0 });
    let capture = device.capture();
    let config = Config { use_thread: false, ..Config::default() };
    let system = SoundSystem::initialize_with_device(config, Box::new(device)).expect("init");
    TestEngine { system, capture }
}

impl TestEngine {
    /// Drive updates until the voice reports done (or the update budget
    /// runs out, which fails the test).
    pub fn run_until_done(&self, voice: pm_engine::InstanceHandle, max_updates: usize) {
        for _ in 0..max_updates {
            let _ = self.system.update();
            if !self.system.is_playing(voice) {
                return;
            }
        }
        panic!("voice still playing after {max_updates} updates");
    }

    pub fn captured(&self) -> Vec<i16> {
        self.capture.lock().samples.clone()
    }
}

fn wav_spec(channels: u16, rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Mono 16-bit WAV of a sine tone.
pub fn sine_wav_mono(rate: u32, frames: usize, freq: f32, amplitude: f32) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(1, rate)).unwrap();
        for i in 0..frames {
            let v = (i as f32 * freq * std::f32::consts::TAU / rate as f32).sin() * amplitude;
            writer.write_sample(v as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Stereo 16-bit WAV; left and right carry the same sine.
pub fn sine_wav_stereo(rate: u32, frames: usize, freq: f32, amplitude: f32) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(2, rate)).unwrap();
        for i in 0..frames {
            let v = ((i as f32 * freq * std::f32::consts::TAU / rate as f32).sin() * amplitude) as i16;
            writer.write_sample(v).unwrap();
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Mono 16-bit WAV holding a DC level; handy when a test needs to measure
/// exact output lengths without zero crossings.
pub fn dc_wav_mono(rate: u32, frames: usize, level: i16) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(1, rate)).unwrap();
        for _ in 0..frames {
            writer.write_sample(level).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// The i16 samples inside a mono WAV fixture, as the engine's f32 pipeline
/// sees them.
pub fn wav_mono_samples(bytes: &[u8]) -> Vec<f32> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
    reader.into_samples::<i16>().map(|s| s.unwrap() as f32).collect()
}

// ---- Ogg/Opus fixture ----

fn build_ogg_page(serial: u32, flags: u8, sequence: u32, packets: &[&[u8]]) -> Vec<u8> {
    let mut lacing = Vec::new();
    for p in packets {
        let mut left = p.len();
        loop {
            let seg = left.min(255);
            lacing.push(seg as u8);
            left -= seg;
            if seg < 255 {
                break;
            }
        }
    }
    assert!(lacing.len() <= 255);

    let mut page = Vec::new();
    page.extend_from_slice(b"OggS");
    page.push(0);
    page.push(flags);
    page.extend_from_slice(&[0u8; 8]);
    page.extend_from_slice(&serial.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    page.extend_from_slice(&[0u8; 4]);
    page.push(lacing.len() as u8);
    page.extend_from_slice(&lacing);
    for p in packets {
        page.extend_from_slice(p);
    }
    page
}

/// Mono Ogg/Opus clip at 48 kHz: sine tone, 960-frame packets.
pub fn opus_clip(frames: usize) -> Vec<u8> {
    let serial = 0x0d10;

    let mut head = Vec::new();
    head.extend_from_slice(b"OpusHead");
    head.push(1);
    head.push(1); // mono
    head.extend_from_slice(&0u16.to_le_bytes()); // pre-skip
    head.extend_from_slice(&48000u32.to_le_bytes());
    head.extend_from_slice(&0u16.to_le_bytes()); // output gain
    head.push(0); // mapping family

    let mut tags = Vec::new();
    tags.extend_from_slice(b"OpusTags");
    tags.extend_from_slice(&4u32.to_le_bytes());
    tags.extend_from_slice(b"test");
    tags.extend_from_slice(&0u32.to_le_bytes());

    let mut bytes = build_ogg_page(serial, 0x02, 0, &[&head]);
    bytes.extend(build_ogg_page(serial, 0, 1, &[&tags]));

    let mut encoder =
        opus::Encoder::new(48000, opus::Channels::Mono, opus::Application::Audio).unwrap();
    let mut produced = 0usize;
    let mut sequence = 2u32;
    while produced < frames {
        let block: Vec<f32> =
            (0..960).map(|i| ((produced + i) as f32 * 0.03).sin() * 0.4).collect();
        let packet = encoder.encode_vec_float(&block, 4000).unwrap();
        bytes.extend(build_ogg_page(serial, 0, sequence, &[&packet]));
        produced += 960;
        sequence += 1;
    }
    bytes
}
