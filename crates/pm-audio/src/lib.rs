//! pm-audio: Output device abstraction for PulseMix
//!
//! The mixer core talks to a queue-style [`Device`]: ask how many buffer
//! slots are free, mix that many buffers, queue each one. Three
//! implementations ship here:
//!
//! - `default` — cpal output stream fed through a lock-free ring buffer
//! - `null` — consumes frames against the wall clock, produces nothing
//! - `loopback` — captures every queued frame for inspection in tests

mod cpal_device;
mod loopback;
mod null;

pub use cpal_device::CpalDevice;
pub use loopback::{LoopbackCapture, LoopbackDevice};
pub use null::NullDevice;

use pm_core::DspImplHint;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("no such device: {0}")]
    NotFound(String),

    #[error("device init error: {0}")]
    Init(String),

    #[error("device stream error: {0}")]
    Stream(String),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Parameters for opening a device.
#[derive(Debug, Clone, Copy)]
pub struct OpenDeviceParams {
    pub buffer_count: u32,
    /// Preferred frames per buffer; 0 lets the device decide.
    pub frame_count: u32,
}

/// What a device expects from the mixer.
#[derive(Debug, Clone, Copy)]
pub struct DeviceInfo {
    pub mix_rate: u32,
    /// Non-zero when the device dictates the buffer size.
    pub frame_count: u32,
    /// Device takes f32 output instead of i16.
    pub use_floats: bool,
    /// Float output is normalized to [-1, 1].
    pub use_normalized: bool,
    /// Output channels are planar (all left, then all right).
    pub use_non_interleaved: bool,
    /// Kernel preference the device carries for its platform.
    pub dsp_impl: DspImplHint,
}

/// One mixed buffer on its way out.
#[derive(Debug, Clone, Copy)]
pub enum QueueBuffer<'a> {
    /// L R L R ... i16 pairs.
    S16Interleaved(&'a [i16]),
    /// All left samples then all right samples.
    F32Planar(&'a [f32]),
}

/// A queue-style audio output.
///
/// `queue` may block until the driver accepts the buffer; everything else
/// is non-blocking. `start`/`stop` are idempotent. Closing is dropping.
pub trait Device: Send {
    fn info(&self) -> DeviceInfo;

    fn queue(&mut self, frames: QueueBuffer<'_>, frame_count: u32) -> DeviceResult<()>;

    fn free_buffer_slots(&mut self) -> u32;

    /// Frames the next buffer should carry; `None` when the device leaves
    /// the choice to the mixer.
    fn available_frames(&mut self) -> Option<u32> {
        None
    }

    fn start(&mut self);

    fn stop(&mut self);
}

/// Open a registered device by name.
pub fn open_device(name: &str, params: &OpenDeviceParams) -> DeviceResult<Box<dyn Device>> {
    match name {
        "default" => Ok(Box::new(CpalDevice::open(params)?)),
        "null" => Ok(Box::new(NullDevice::open(params))),
        "loopback" => Ok(Box::new(LoopbackDevice::open(params))),
        other => Err(DeviceError::NotFound(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_device_name() {
        let params = OpenDeviceParams { buffer_count: 2, frame_count: 0 };
        assert!(matches!(open_device("beeper", &params), Err(DeviceError::NotFound(_))));
    }
}
