//! Engine-wide error kinds

use thiserror::Error;

/// Errors surfaced through the public PulseMix API.
///
/// `EndOfStream`, `NoData` and `NothingToPlay` are conditions rather than
/// failures: the first two report stream state from data reads, the last is
/// returned by `update` when there is nothing to mix and the device is
/// stopped.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundError {
    #[error("partial data")]
    PartialData,

    #[error("out of sound data slots")]
    OutOfSources,

    #[error("out of sound instance slots")]
    OutOfInstances,

    #[error("out of output buffers")]
    OutOfBuffers,

    #[error("out of mix groups")]
    OutOfGroups,

    #[error("no such mix group")]
    NoSuchGroup,

    #[error("invalid property")]
    InvalidProperty,

    #[error("unknown sound type")]
    UnknownSoundType,

    #[error("invalid stream data")]
    InvalidStreamData,

    #[error("unsupported")]
    Unsupported,

    #[error("device not found")]
    DeviceNotFound,

    #[error("stale or invalid handle")]
    InvalidHandle,

    #[error("initialization error")]
    InitError,

    #[error("finalization error")]
    FiniError,

    #[error("no data")]
    NoData,

    #[error("end of stream")]
    EndOfStream,

    #[error("nothing to play")]
    NothingToPlay,

    #[error("unknown error")]
    Unknown,
}

pub type SoundResult<T> = Result<T, SoundError>;

impl SoundError {
    /// Stable integer code for the atomic status word shared with the worker
    /// thread.
    pub fn code(self) -> i32 {
        match self {
            SoundError::PartialData => 1,
            SoundError::OutOfSources => -1,
            SoundError::OutOfInstances => -3,
            SoundError::OutOfBuffers => -5,
            SoundError::InvalidProperty => -6,
            SoundError::UnknownSoundType => -7,
            SoundError::InvalidStreamData => -8,
            SoundError::Unsupported => -10,
            SoundError::DeviceNotFound => -11,
            SoundError::OutOfGroups => -12,
            SoundError::NoSuchGroup => -13,
            SoundError::NothingToPlay => -14,
            SoundError::InitError => -15,
            SoundError::FiniError => -16,
            SoundError::NoData => -17,
            SoundError::EndOfStream => -18,
            SoundError::InvalidHandle => -19,
            SoundError::Unknown => -1000,
        }
    }

    /// Inverse of [`SoundError::code`]; `None` maps back to success.
    pub fn from_code(code: i32) -> Option<SoundError> {
        match code {
            0 => None,
            1 => Some(SoundError::PartialData),
            -1 => Some(SoundError::OutOfSources),
            -3 => Some(SoundError::OutOfInstances),
            -5 => Some(SoundError::OutOfBuffers),
            -6 => Some(SoundError::InvalidProperty),
            -7 => Some(SoundError::UnknownSoundType),
            -8 => Some(SoundError::InvalidStreamData),
            -10 => Some(SoundError::Unsupported),
            -11 => Some(SoundError::DeviceNotFound),
            -12 => Some(SoundError::OutOfGroups),
            -13 => Some(SoundError::NoSuchGroup),
            -14 => Some(SoundError::NothingToPlay),
            -15 => Some(SoundError::InitError),
            -16 => Some(SoundError::FiniError),
            -17 => Some(SoundError::NoData),
            -18 => Some(SoundError::EndOfStream),
            -19 => Some(SoundError::InvalidHandle),
            _ => Some(SoundError::Unknown),
        }
    }
}
