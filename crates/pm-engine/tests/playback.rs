//! End-to-end playback: decode -> voice -> mixer -> loopback device

mod common;

use common::*;
use pm_engine::{Parameter, SoundDataType};
use std::f32::consts::FRAC_PI_2;

/// Absolute tolerance on int16 output, matching the engine's float path.
const TOLERANCE: i16 = 27;

fn center_scale() -> f32 {
    (0.5 * FRAC_PI_2).cos()
}

#[test]
fn identity_mono_tone_constant_power_center() {
    let engine = engine();
    let frames = 88200usize;
    let wav = sine_wav_mono(MIX_RATE, frames, 440.0, 16000.0);
    let samples = wav_mono_samples(&wav);

    let data = engine.system.new_sound_data("tone", SoundDataType::Wav, &wav).unwrap();
    let voice = engine.system.new_instance(data).unwrap();
    engine.system.play(voice).unwrap();
    engine.run_until_done(voice, 400);

    let captured = engine.captured();
    assert!(captured.len() / 2 >= frames);

    let scale = center_scale();
    for (k, &input) in samples.iter().enumerate() {
        let expected = (input * scale).clamp(-32768.0, 32767.0) as i16;
        let left = captured[k * 2];
        let right = captured[k * 2 + 1];
        assert!((left - expected).abs() <= TOLERANCE, "frame {k}: left {left} vs {expected}");
        assert!((right - expected).abs() <= TOLERANCE, "frame {k}: right {right} vs {expected}");
    }
}

#[test]
fn polyphase_22k_stereo_resampled_to_44k() {
    let engine = engine();
    let input_frames = 22050usize;
    let wav = sine_wav_stereo(22050, input_frames, 440.0, 16000.0);

    // The engine's working view of the input: silent history, then samples
    let mut reference_input = vec![0.0f32; 4];
    {
        let reader = hound::WavReader::new(std::io::Cursor::new(&wav[..])).unwrap();
        let interleaved: Vec<f32> =
            reader.into_samples::<i16>().map(|s| s.unwrap() as f32).collect();
        reference_input.extend(interleaved.iter().step_by(2).copied()); // left channel
    }

    let data = engine.system.new_sound_data("tone22", SoundDataType::Wav, &wav).unwrap();
    let voice = engine.system.new_instance(data).unwrap();
    engine.system.play(voice).unwrap();
    engine.run_until_done(voice, 400);

    let captured = engine.captured();
    let bank = pm_dsp::filter_bank();
    let delta = 1u64 << 30; // 22050 -> 44100 in Q1.31
    let scale = center_scale();

    let out_frames = 2 * (input_frames - 5);
    assert!(captured.len() / 2 >= out_frames);
    for j in 0..out_frames {
        let frac = j as u64 * delta;
        let index = 4 + (frac >> 31) as usize;
        let phase = ((frac >> 20) & 2047) as usize;
        let coefs = &bank[phase * 8..phase * 8 + 8];
        let mut acc = 0.0f32;
        for (t, &c) in coefs.iter().enumerate() {
            acc += reference_input[index - 3 + t] * c;
        }
        let expected = (acc * scale).clamp(-32768.0, 32767.0) as i16;
        let left = captured[j * 2];
        assert!(
            (left - expected).abs() <= TOLERANCE,
            "frame {j}: left {left} vs expected {expected}"
        );
    }
}

#[test]
fn pan_hard_left_and_right_are_symmetric() {
    let frames = 4410usize;
    let wav = sine_wav_mono(MIX_RATE, frames, 440.0, 12000.0);

    let run = |pan: f32| -> Vec<i16> {
        let engine = engine();
        let data = engine.system.new_sound_data("tone", SoundDataType::Wav, &wav).unwrap();
        let voice = engine.system.new_instance(data).unwrap();
        engine.system.set_parameter(voice, Parameter::Pan, pan).unwrap();
        engine.system.play(voice).unwrap();
        engine.run_until_done(voice, 100);
        engine.captured()
    };

    let left_panned = run(-1.0);
    let right_panned = run(1.0);
    let n = frames.min(left_panned.len() / 2).min(right_panned.len() / 2);
    for k in 0..n {
        // all signal on the panned side...
        assert!(
            (left_panned[k * 2] - right_panned[k * 2 + 1]).abs() <= 1,
            "frame {k}: {} vs {}",
            left_panned[k * 2],
            right_panned[k * 2 + 1]
        );
        // ...and silence on the other
        assert!(left_panned[k * 2 + 1].abs() <= 1);
        assert!(right_panned[k * 2].abs() <= 1);
    }
}

#[test]
fn loop_count_five_plays_six_times() {
    let engine = engine();
    let clip_frames = 8820usize;
    let wav = dc_wav_mono(MIX_RATE, clip_frames, 16000);

    let data = engine.system.new_sound_data("dc", SoundDataType::Wav, &wav).unwrap();
    let voice = engine.system.new_instance(data).unwrap();
    engine.system.set_looping(voice, true, 5).unwrap();
    engine.system.play(voice).unwrap();
    engine.run_until_done(voice, 400);

    let captured = engine.captured();
    let last_audible = captured
        .chunks_exact(2)
        .rposition(|frame| frame[0].abs() > 100)
        .map(|i| i + 1)
        .unwrap_or(0);
    let expected = clip_frames * 6;
    let buffer = 768usize;
    assert!(
        last_audible.abs_diff(expected) <= buffer,
        "looped output ran {last_audible} frames, expected about {expected}"
    );
}

#[test]
fn infinite_loop_keeps_playing() {
    let engine = engine();
    let wav = dc_wav_mono(MIX_RATE, 1000, 8000);
    let data = engine.system.new_sound_data("dc", SoundDataType::Wav, &wav).unwrap();
    let voice = engine.system.new_instance(data).unwrap();
    engine.system.set_looping(voice, true, -1).unwrap();
    engine.system.play(voice).unwrap();

    for _ in 0..50 {
        let _ = engine.system.update();
    }
    assert!(engine.system.is_playing(voice));
    engine.system.stop(voice).unwrap();
    assert!(!engine.system.is_playing(voice));
}

#[test]
fn speed_zero_holds_position_silently() {
    let engine = engine();
    let wav = sine_wav_mono(MIX_RATE, 44100, 440.0, 16000.0);
    let data = engine.system.new_sound_data("tone", SoundDataType::Wav, &wav).unwrap();
    let voice = engine.system.new_instance(data).unwrap();
    engine.system.set_parameter(voice, Parameter::Speed, 0.0).unwrap();
    engine.system.play(voice).unwrap();

    for _ in 0..10 {
        let _ = engine.system.update();
    }
    assert!(engine.system.is_playing(voice));
    assert_eq!(engine.system.get_internal_position(voice).unwrap(), 0);
    assert!(engine.captured().iter().all(|&s| s == 0));
}

#[test]
fn max_speed_does_not_overrun() {
    let engine = engine();
    let wav = sine_wav_mono(MIX_RATE, 44100, 440.0, 16000.0);
    let data = engine.system.new_sound_data("tone", SoundDataType::Wav, &wav).unwrap();
    let voice = engine.system.new_instance(data).unwrap();
    engine.system.set_parameter(voice, Parameter::Speed, 5.0).unwrap();
    engine.system.play(voice).unwrap();
    engine.run_until_done(voice, 100);

    // 44100 input frames at 5x come out to about a fifth the length
    let captured = engine.captured();
    let audible = captured.chunks_exact(2).filter(|f| f[0] != 0).count();
    assert!(audible > 7000 && audible < 10000, "audible frames: {audible}");
}

#[test]
fn start_frame_is_independent_of_speed() {
    let engine = engine();
    let wav = sine_wav_mono(MIX_RATE, 44100, 440.0, 16000.0);
    let data = engine.system.new_sound_data("tone", SoundDataType::Wav, &wav).unwrap();

    let slow = engine.system.new_instance(data).unwrap();
    let fast = engine.system.new_instance(data).unwrap();
    engine.system.set_parameter(slow, Parameter::Speed, 0.5).unwrap();
    engine.system.set_parameter(fast, Parameter::Speed, 2.0).unwrap();

    engine.system.set_start_frame(slow, 1234).unwrap();
    engine.system.set_start_frame(fast, 1234).unwrap();

    assert_eq!(engine.system.get_internal_position(slow).unwrap(), 1234);
    assert_eq!(engine.system.get_internal_position(fast).unwrap(), 1234);
}

#[test]
fn start_beyond_length_completes_immediately() {
    let engine = engine();
    let wav = sine_wav_mono(MIX_RATE, 1000, 440.0, 16000.0);
    let data = engine.system.new_sound_data("tone", SoundDataType::Wav, &wav).unwrap();
    let voice = engine.system.new_instance(data).unwrap();
    engine.system.set_start_frame(voice, 100_000).unwrap();
    engine.system.play(voice).unwrap();

    engine.run_until_done(voice, 10);
    assert!(engine.captured().iter().all(|&s| s == 0));
}

#[test]
fn muted_opus_voice_tracks_audible_twin() {
    let engine = engine();
    let clip = opus_clip(4 * 960);
    let data = engine.system.new_sound_data("voiceover", SoundDataType::Opus, &clip).unwrap();

    let audible = engine.system.new_instance(data).unwrap();
    let muted = engine.system.new_instance(data).unwrap();
    engine.system.set_parameter(muted, Parameter::Gain, 0.0).unwrap();
    engine.system.play(audible).unwrap();
    engine.system.play(muted).unwrap();

    for _ in 0..3 {
        let _ = engine.system.update();
        let a = engine.system.get_internal_position(audible).unwrap();
        let b = engine.system.get_internal_position(muted).unwrap();
        assert_eq!(a, b);
    }
    assert!(engine.system.get_internal_position(audible).unwrap() > 0);
}

#[test]
fn opus_clip_plays_to_completion() {
    let engine = engine();
    let frames_48k = 8 * 960;
    let clip = opus_clip(frames_48k);
    let data = engine.system.new_sound_data("jingle", SoundDataType::Opus, &clip).unwrap();
    let voice = engine.system.new_instance(data).unwrap();
    engine.system.play(voice).unwrap();
    engine.run_until_done(voice, 100);

    // 48 kHz source on a 44.1 kHz device: output frames scale by 44100/48000
    let captured_frames = engine.captured().len() / 2;
    let expected = frames_48k * MIX_RATE as usize / 48000;
    assert!(
        captured_frames >= expected && captured_frames <= expected + 2 * 768,
        "captured {captured_frames}, expected about {expected}"
    );
}

#[test]
fn stop_then_play_restarts_from_the_top() {
    let engine = engine();
    let wav = dc_wav_mono(MIX_RATE, 10000, 12000);
    let data = engine.system.new_sound_data("dc", SoundDataType::Wav, &wav).unwrap();
    let voice = engine.system.new_instance(data).unwrap();

    engine.system.play(voice).unwrap();
    for _ in 0..3 {
        let _ = engine.system.update();
    }
    engine.system.stop(voice).unwrap();
    assert_eq!(engine.system.get_internal_position(voice).unwrap(), 0);

    engine.system.play(voice).unwrap();
    engine.run_until_done(voice, 50);
    // 3 buffers before the stop plus the full clip after the restart
    let audible = engine.captured().chunks_exact(2).filter(|f| f[0] != 0).count();
    let expected = 3 * 768 + 10000;
    assert!(audible.abs_diff(expected) <= 768, "audible {audible}, expected about {expected}");
}
