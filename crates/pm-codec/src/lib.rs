//! pm-codec: Streaming audio decoders for PulseMix
//!
//! A decoder backend turns byte-ranged reads from a [`SoundSource`] into PCM.
//! Backends are listed in a fixed registry keyed by format with a score;
//! the engine opens the best-scoring backend for an asset's format tag and
//! drives it through the [`DecodeStream`] trait. A [`CodecContext`] owns a
//! bounded pool of open streams (one per voice).
//!
//! Output contract: a stream is either *interleaved* (8/16-bit PCM bytes in
//! channel-interleaved order) or *planar float* (per-channel f32). The byte
//! budgets handed to `decode`/`skip` are interleaved byte counts for the
//! former and per-channel byte counts for the latter, so
//! `bytes / frame_stride` is always the frame count.

mod context;
mod ogg;
mod opus_backend;
mod registry;
#[cfg(test)]
pub(crate) mod testutil;
mod vorbis;
mod wav;

pub use context::*;
pub use registry::*;

use pm_core::ReadStatus;
use std::sync::Arc;
use thiserror::Error;

/// Decoder-level errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("out of decoder resources")]
    OutOfResources,

    #[error("invalid or unrecognized stream format")]
    InvalidFormat,

    #[error("decode error")]
    DecodeError,

    #[error("unsupported format")]
    Unsupported,

    #[error("end of stream")]
    EndOfStream,
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Formats with registered backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Wav,
    Vorbis,
    Opus,
}

impl Format {
    pub const fn name(self) -> &'static str {
        match self {
            Format::Wav => "wav",
            Format::Vorbis => "vorbis",
            Format::Opus => "opus",
        }
    }
}

/// Byte-ranged read access to an asset's compressed bytes.
///
/// `read` fills as much of `out` as it can starting at `offset` and reports
/// how the range related to the underlying data. Streaming sources may
/// return [`ReadStatus::NoData`] for ranges they cannot serve yet.
pub trait SoundSource: Send + Sync {
    fn read(&self, offset: u32, out: &mut [u8]) -> (usize, ReadStatus);
}

/// Shared handle decoders keep to their asset.
pub type SharedSource = Arc<dyn SoundSource>;

/// Stream parameters negotiated at open time.
#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    pub is_interleaved: bool,
    /// Decoded payload size in bytes, 0 when unknown (Ogg streams).
    pub size: u32,
}

impl StreamInfo {
    /// Bytes per frame under the decode/skip budget convention.
    #[inline]
    pub fn frame_stride(&self) -> u32 {
        if self.bits_per_sample == 32 && (!self.is_interleaved || self.channels == 1) {
            size_of::<f32>() as u32
        } else {
            self.channels as u32 * (self.bits_per_sample as u32 / 8)
        }
    }
}

/// Destination of one `decode` call.
pub enum SampleSink<'a, 'b> {
    /// Interleaved samples in the stream's native width.
    Interleaved(&'a mut [u8]),
    /// One f32 slice per channel; a `None` channel is decoded and dropped.
    Planar(&'a mut [Option<&'b mut [f32]>]),
    /// Consume input and produce nothing; the budget is in stride bytes.
    Null(usize),
}

impl SampleSink<'_, '_> {
    /// Byte budget of this sink under the stream's stride convention.
    pub fn budget(&self) -> usize {
        match self {
            SampleSink::Interleaved(buf) => buf.len(),
            SampleSink::Planar(chans) => chans
                .iter()
                .flatten()
                .map(|c| c.len() * size_of::<f32>())
                .next()
                .unwrap_or(0),
            SampleSink::Null(bytes) => *bytes,
        }
    }
}

/// One open, stateful decode stream.
pub trait DecodeStream: Send {
    /// Stream parameters; fixed after open.
    fn info(&self) -> StreamInfo;

    /// Decode up to the sink's budget. Returns bytes produced (stride
    /// convention). `Err(EndOfStream)` is only returned when nothing at all
    /// could be produced.
    fn decode(&mut self, sink: SampleSink<'_, '_>) -> CodecResult<usize>;

    /// Decode-and-discard `bytes`. Returns bytes skipped.
    fn skip(&mut self, bytes: usize) -> CodecResult<usize> {
        self.decode(SampleSink::Null(bytes))
    }

    /// Restart at the logical beginning without reopening the stream.
    fn reset(&mut self) -> CodecResult<()>;

    /// Current decoded frame index (tests and seek reporting).
    fn position(&self) -> u64;
}
