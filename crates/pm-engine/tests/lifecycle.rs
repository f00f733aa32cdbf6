//! Lifecycle: pools, refcounts, handles, worker thread, status codes

mod common;

use common::*;
use pm_core::ReadStatus;
use pm_engine::{Config, Parameter, SoundDataType, SoundError, SoundSystem};

#[test]
fn update_with_nothing_to_play() {
    let engine = engine();
    assert_eq!(engine.system.update(), Err(SoundError::NothingToPlay));
    assert_eq!(engine.capture.lock().starts, 0);
}

#[test]
fn device_starts_with_first_voice() {
    let engine = engine();
    let wav = dc_wav_mono(MIX_RATE, 1000, 1000);
    let data = engine.system.new_sound_data("dc", SoundDataType::Wav, &wav).unwrap();
    let _voice = engine.system.new_instance(data).unwrap();
    assert!(engine.system.update().is_ok());
    assert_eq!(engine.capture.lock().starts, 1);
    assert!(engine.system.is_music_playing());

    engine.system.on_window_focus(false);
    assert!(!engine.system.is_music_playing());
}

#[test]
fn data_refcount_follows_voices() {
    let engine = engine();
    let wav = dc_wav_mono(MIX_RATE, 100, 1000);
    let data = engine.system.new_sound_data("dc", SoundDataType::Wav, &wav).unwrap();
    assert_eq!(engine.system.data_ref_count(data).unwrap(), 1);

    let a = engine.system.new_instance(data).unwrap();
    let b = engine.system.new_instance(data).unwrap();
    assert_eq!(engine.system.data_ref_count(data).unwrap(), 3);

    // the creator lets go; voices keep the data alive
    engine.system.release_sound_data(data).unwrap();
    assert_eq!(engine.system.data_ref_count(data).unwrap(), 2);
    assert!(engine.system.is_sound_data_valid(data));

    engine.system.delete_instance(a).unwrap();
    engine.system.delete_instance(b).unwrap();

    // the slot is recycled; the old handle no longer resolves
    assert!(!engine.system.is_sound_data_valid(data));
    assert_eq!(engine.system.data_ref_count(data), Err(SoundError::InvalidHandle));
}

#[test]
fn stale_instance_handles_are_rejected() {
    let engine = engine();
    let wav = dc_wav_mono(MIX_RATE, 100, 1000);
    let data = engine.system.new_sound_data("dc", SoundDataType::Wav, &wav).unwrap();
    let voice = engine.system.new_instance(data).unwrap();
    engine.system.delete_instance(voice).unwrap();

    assert_eq!(engine.system.play(voice), Err(SoundError::InvalidHandle));
    assert_eq!(engine.system.delete_instance(voice), Err(SoundError::InvalidHandle));
    assert!(!engine.system.is_playing(voice));
}

#[test]
fn instance_pool_exhaustion() {
    let device = pm_audio::LoopbackDevice::open(&pm_engine::OpenDeviceParams {
        buffer_count: 1,
        frame_count: 0,
    });
    let config = Config { use_thread: false, max_instances: 2, ..Config::default() };
    let system = SoundSystem::initialize_with_device(config, Box::new(device)).unwrap();

    let wav = dc_wav_mono(MIX_RATE, 100, 1000);
    let data = system.new_sound_data("dc", SoundDataType::Wav, &wav).unwrap();
    let _a = system.new_instance(data).unwrap();
    let _b = system.new_instance(data).unwrap();
    assert_eq!(system.new_instance(data), Err(SoundError::OutOfInstances));
}

#[test]
fn data_pool_exhaustion() {
    let device = pm_audio::LoopbackDevice::open(&pm_engine::OpenDeviceParams {
        buffer_count: 1,
        frame_count: 0,
    });
    let config = Config { use_thread: false, max_sound_data: 1, ..Config::default() };
    let system = SoundSystem::initialize_with_device(config, Box::new(device)).unwrap();

    let wav = dc_wav_mono(MIX_RATE, 100, 1000);
    let _a = system.new_sound_data("one", SoundDataType::Wav, &wav).unwrap();
    assert_eq!(
        system.new_sound_data("two", SoundDataType::Wav, &wav),
        Err(SoundError::OutOfSources)
    );
}

#[test]
fn invalid_stream_data_is_rejected_at_instance_creation() {
    let engine = engine();
    let data = engine
        .system
        .new_sound_data("garbage", SoundDataType::Wav, &[0xDE, 0xAD, 0xBE, 0xEF])
        .unwrap();
    assert_eq!(engine.system.new_instance(data), Err(SoundError::InvalidStreamData));
    // the failed open must not leak the data reference
    assert_eq!(engine.system.data_ref_count(data).unwrap(), 1);
}

#[test]
fn parameters_round_trip_and_clamp() {
    let engine = engine();
    let wav = dc_wav_mono(MIX_RATE, 100, 1000);
    let data = engine.system.new_sound_data("dc", SoundDataType::Wav, &wav).unwrap();
    let voice = engine.system.new_instance(data).unwrap();

    engine.system.set_parameter(voice, Parameter::Gain, 0.25).unwrap();
    assert_eq!(engine.system.get_parameter(voice, Parameter::Gain).unwrap(), 0.25);

    engine.system.set_parameter(voice, Parameter::Pan, 2.0).unwrap();
    assert_eq!(engine.system.get_parameter(voice, Parameter::Pan).unwrap(), 1.0);

    engine.system.set_parameter(voice, Parameter::Speed, 99.0).unwrap();
    assert_eq!(engine.system.get_parameter(voice, Parameter::Speed).unwrap(), 5.0);
}

#[test]
fn play_counter_is_monotonic_and_wraps() {
    let engine = engine();
    let first = engine.system.get_and_increase_play_counter();
    let second = engine.system.get_and_increase_play_counter();
    assert_eq!(second, first + 1);
}

#[test]
fn streaming_data_callback_feeds_decoders() {
    let engine = engine();
    let wav = dc_wav_mono(MIX_RATE, 4410, 12000);
    let backing = std::sync::Arc::new(wav);

    let source = std::sync::Arc::clone(&backing);
    let data = engine
        .system
        .new_sound_data_streaming(
            "streamed",
            SoundDataType::Wav,
            Box::new(move |offset: u32, out: &mut [u8]| {
                let offset = offset as usize;
                if offset >= source.len() {
                    return (0, ReadStatus::EndOfStream);
                }
                let n = out.len().min(source.len() - offset);
                out[..n].copy_from_slice(&source[offset..offset + n]);
                (n, if n < out.len() { ReadStatus::Partial } else { ReadStatus::Ok })
            }),
        )
        .unwrap();

    let voice = engine.system.new_instance(data).unwrap();
    engine.system.play(voice).unwrap();
    engine.run_until_done(voice, 50);

    let audible = engine.captured().chunks_exact(2).filter(|f| f[0] != 0).count();
    assert!(audible.abs_diff(4410) <= 16, "audible frames {audible}");
}

#[test]
fn pause_and_resume_voice() {
    let engine = engine();
    let wav = dc_wav_mono(MIX_RATE, 44100, 12000);
    let data = engine.system.new_sound_data("dc", SoundDataType::Wav, &wav).unwrap();
    let voice = engine.system.new_instance(data).unwrap();
    engine.system.play(voice).unwrap();
    let _ = engine.system.update();

    engine.system.pause(voice, true).unwrap();
    assert!(!engine.system.is_playing(voice));
    let position = engine.system.get_internal_position(voice).unwrap();
    let _ = engine.system.update();
    assert_eq!(engine.system.get_internal_position(voice).unwrap(), position);

    engine.system.pause(voice, false).unwrap();
    let _ = engine.system.update();
    assert!(engine.system.get_internal_position(voice).unwrap() > position);
}

#[test]
fn threaded_worker_reports_status() {
    let config = Config {
        use_thread: true,
        output_device: "null".to_string(),
        ..Config::default()
    };
    let system = SoundSystem::initialize(config).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(40));

    // nothing queued to play; the worker parks on that status
    assert_eq!(system.update(), Err(SoundError::NothingToPlay));
    assert_eq!(system.mix_rate(), 44100);
    system.finalize().unwrap();
}

#[test]
fn unknown_device_name_fails_initialization() {
    let config = Config {
        use_thread: false,
        output_device: "telegraph".to_string(),
        ..Config::default()
    };
    assert!(matches!(SoundSystem::initialize(config), Err(SoundError::DeviceNotFound)));
}
