//! Voice state
//!
//! A voice owns one decoder, the ramped mix parameters and a small
//! per-channel frame window: `MAX_HISTORY` already-played frames for the
//! resampler taps, up to `MAX_SPEED` leftover frames from fractional
//! positioning, and `MAX_FUTURE` lookahead frames.

use pm_codec::DecoderHandle;
use pm_core::{
    Handle, MASTER_GROUP_HASH, MAX_DECODE_CHANNELS, MAX_HISTORY, NameHash, RampedValue,
    STATE_FRAME_COUNT,
};

pub(crate) struct Instance {
    pub decoder: DecoderHandle,
    pub data_handle: Handle,
    pub group: NameHash,

    pub gain: RampedValue,
    /// Pan position mapped into [0, 1]; 0.5 is center.
    pub pan: RampedValue,
    pub scale_l: [RampedValue; MAX_DECODE_CHANNELS],
    pub scale_r: [RampedValue; MAX_DECODE_CHANNELS],
    /// User-facing parameter values, kept for `get_parameter`.
    pub gain_parameter: f32,
    pub pan_parameter: f32,
    pub speed: f32,

    /// Q1.31 fractional read position carried between buffers.
    pub frame_fraction: u64,
    /// Saved frame window, `frame_count` valid frames per channel.
    pub state_frames: [[f32; STATE_FRAME_COUNT]; MAX_DECODE_CHANNELS],
    pub frame_count: u32,

    pub playing: bool,
    pub looping: bool,
    pub end_of_stream: bool,
    pub scale_dirty: bool,
    pub scale_init: bool,
    /// Keeps a decode failure from spamming the log every tick.
    pub error_logged: bool,
    /// Remaining loops; -1 is infinite, 3 plays the sound 4 times.
    pub loop_counter: i8,
}

impl Instance {
    pub fn new(decoder: DecoderHandle, data_handle: Handle) -> Self {
        const CENTER_SCALE: f32 = 0.70711;
        let mut instance = Self {
            decoder,
            data_handle,
            group: MASTER_GROUP_HASH,
            gain: RampedValue::new(1.0),
            pan: RampedValue::new(0.5),
            scale_l: [RampedValue::new(CENTER_SCALE); MAX_DECODE_CHANNELS],
            scale_r: [RampedValue::new(CENTER_SCALE); MAX_DECODE_CHANNELS],
            gain_parameter: 1.0,
            pan_parameter: 0.0,
            speed: 1.0,
            frame_fraction: 0,
            state_frames: [[0.0; STATE_FRAME_COUNT]; MAX_DECODE_CHANNELS],
            frame_count: 0,
            playing: false,
            looping: false,
            end_of_stream: false,
            scale_dirty: true,
            scale_init: true,
            error_logged: false,
            loop_counter: 0,
        };
        instance.silence_history();
        instance
    }

    /// Prime the frame window with silent history.
    pub fn silence_history(&mut self) {
        for channel in self.state_frames.iter_mut() {
            channel[..MAX_HISTORY].fill(0.0);
        }
        self.frame_count = MAX_HISTORY as u32;
    }

    pub fn step_values(&mut self) {
        self.gain.step();
        self.pan.step();
        for c in 0..MAX_DECODE_CHANNELS {
            self.scale_l[c].step();
            self.scale_r[c].step();
        }
    }
}
