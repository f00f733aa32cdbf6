//! pm-dsp: Mixing and resampling kernels for PulseMix
//!
//! Everything here operates on planar f32 buffers at int16 magnitude
//! (full scale = ±32767). Gain and pan arrive as a starting value plus a
//! per-sample delta so parameters ramp linearly across a device buffer.
//!
//! Two implementations are maintained with identical semantics: a scalar
//! reference and an SSE2 specialization. Selection happens once at startup
//! through a fn-pointer dispatch table; see [`select_impl`] and [`kernels`].

mod dispatch;
mod gain;
mod kernels;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod kernels_sse;
mod pfb;

pub use dispatch::*;
pub use gain::*;
pub use pfb::{PHASE_COUNT, TAPS, filter_bank};

/// A linear parameter ramp across one kernel call.
#[derive(Debug, Clone, Copy)]
pub struct Ramp {
    pub from: f32,
    pub delta: f32,
}

impl Ramp {
    #[inline]
    pub fn new(from: f32, delta: f32) -> Self {
        Self { from, delta }
    }

    /// A ramp that holds `value` for the whole buffer.
    #[inline]
    pub fn flat(value: f32) -> Self {
        Self { from: value, delta: 0.0 }
    }
}

/// Scale ramps for a stereo source into a stereo bus.
///
/// `l0`/`r0` scale input channel 0 into the left/right bus, `l1`/`r1` scale
/// input channel 1. The engine's pan model keeps the matrix diagonal
/// (`r0 == l1 == 0`) so natively stereo material keeps its imaging, but the
/// kernels accept the full matrix.
#[derive(Debug, Clone, Copy)]
pub struct StereoRamps {
    pub l0: Ramp,
    pub r0: Ramp,
    pub l1: Ramp,
    pub r1: Ramp,
}

/// Per-buffer power statistics for one mix bus.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PowerData {
    pub sum_sq_left: f32,
    pub sum_sq_right: f32,
    pub peak_sq_left: f32,
    pub peak_sq_right: f32,
}
