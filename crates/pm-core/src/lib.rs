//! pm-core: Shared types and constants for the PulseMix sound engine
//!
//! This crate provides the foundational types used across all PulseMix crates:
//! error kinds, generation-tagged pool handles, name hashing, ramped values
//! and the engine-wide tuning constants.

mod config;
mod error;
mod handle;
mod hash;
mod value;

pub use config::*;
pub use error::*;
pub use handle::*;
pub use hash::*;
pub use value::*;

/// Maximum number of mix groups (including `master`).
pub const MAX_GROUPS: usize = 32;

/// Play id handed out when the play counter is exhausted for a wrap cycle.
pub const INVALID_PLAY_ID: u32 = 0xFFFF_FFFF;

/// Channels a decoder may deliver (mono or stereo).
pub const MAX_DECODE_CHANNELS: usize = 2;

/// Channels on every mix bus (stereo).
pub const MAX_MIX_CHANNELS: usize = 2;

/// Upper bound for the per-voice speed factor.
pub const MAX_SPEED: f32 = 5.0;

/// Frames of already-played history kept ahead of the resampler taps.
pub const MAX_HISTORY: usize = 4;

/// Frames of lookahead the resampler taps may read past the current frame.
pub const MAX_FUTURE: usize = 4;

/// Per-channel frames a voice carries between ticks: history, at most
/// `MAX_SPEED` leftover frames from fractional positioning, and lookahead.
pub const STATE_FRAME_COUNT: usize = MAX_HISTORY + MAX_SPEED as usize + MAX_FUTURE;

/// Fractional bits of the Q1.31 resampler position.
pub const FRACTION_BITS: u32 = 31;

/// Ring slots of per-group power/peak memory (one slot per device buffer).
pub const GROUP_MEMORY_SLOTS: usize = 64;

/// Output buffers when a worker thread drives the mixer.
pub const OUTBUFFER_COUNT: usize = 6;

/// Output buffers when the caller drives `update()`; cooperative updates are
/// less frequent, so the queue is deeper.
pub const OUTBUFFER_COUNT_NO_THREAD: usize = 8;

/// Upper bound for the output buffer ring.
pub const OUTBUFFER_MAX_COUNT: usize = 8;

/// Sound data formats the engine accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundDataType {
    Wav,
    OggVorbis,
    Opus,
}

/// Per-voice parameters settable through the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    Gain,
    Pan,
    Speed,
}

/// Outcome of a ranged sound-data read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The full requested range was produced.
    Ok,
    /// The read was clamped; fewer bytes than requested were produced.
    Partial,
    /// The offset is at or past the end of the data.
    EndOfStream,
    /// A streaming source has no bytes available right now.
    NoData,
}

/// Default frame count per device buffer for a given mix rate.
///
/// Well-known rates get hand-picked sizes; anything else gets roughly one
/// display frame of audio rounded up to a 32-frame alignment.
pub fn default_frame_count(mix_rate: u32) -> u32 {
    match mix_rate {
        48000 => 1024,
        44100 => 768,
        rate => {
            let frame_count = (rate / 60) as f32 / 32.0;
            (frame_count * 1.05).ceil() as u32 * 32
        }
    }
}
