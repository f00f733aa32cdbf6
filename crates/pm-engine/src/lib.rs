//! pm-engine: the PulseMix sound system
//!
//! A fixed-pool polyphonic mixer: compressed assets (WAV, Ogg/Vorbis,
//! Ogg/Opus) are decoded per voice, resampled through an 8-tap polyphase
//! filter, gain/pan ramped, summed into named group buses and mastered to
//! an output device as interleaved S16 or planar F32.
//!
//! ```no_run
//! use pm_engine::{Config, Parameter, SoundDataType, SoundSystem};
//!
//! let system = SoundSystem::initialize(Config::default())?;
//! let bytes = std::fs::read("jump.wav").unwrap();
//! let data = system.new_sound_data("jump", SoundDataType::Wav, &bytes)?;
//! let voice = system.new_instance(data)?;
//! system.set_parameter(voice, Parameter::Gain, 0.8)?;
//! system.play(voice)?;
//! # Ok::<(), pm_engine::SoundError>(())
//! ```

mod data;
mod group;
mod instance;
mod mixer;
mod platform;
mod pool;
mod system;

pub use data::{DataPayload, SoundDataCallback};
pub use platform::{DefaultPlatformHooks, PlatformHooks};
pub use system::SoundSystem;

// The engine's public vocabulary
pub use pm_audio::{Device, DeviceError, DeviceInfo, OpenDeviceParams, QueueBuffer};
pub use pm_core::{
    Config, DspImplHint, INVALID_PLAY_ID, InstanceHandle, MASTER_GROUP, MASTER_GROUP_HASH,
    MAX_GROUPS, NameHash, Parameter, ReadStatus, SoundDataHandle, SoundDataType, SoundError,
    SoundResult, hash_name,
};
