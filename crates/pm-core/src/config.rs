//! Engine configuration

/// Preferred DSP kernel implementation.
///
/// `Default` lets the device hint or the runtime capability probe decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DspImplHint {
    #[default]
    Default,
    Scalar,
    Sse2,
}

/// Parameters for bringing up the sound system.
#[derive(Debug, Clone)]
pub struct Config {
    /// Registered name of the output device to open.
    pub output_device: String,
    /// Initial gain of the `master` group.
    pub master_gain: f32,
    /// Capacity of the sound data pool.
    pub max_sound_data: u32,
    /// Capacity of the voice pool (and of the decoder pool).
    pub max_instances: u32,
    /// Frames per device buffer; 0 lets the device or mix rate decide.
    pub frame_count: u32,
    /// Run the mixer on a worker thread instead of inside `update()`.
    pub use_thread: bool,
    /// Treat gain parameters as linear scales; when false, gains map through
    /// the perceptual curve before becoming scales.
    pub use_linear_gain: bool,
    /// DSP kernel selection override.
    pub dsp_impl: DspImplHint,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_device: "default".to_string(),
            master_gain: 1.0,
            max_sound_data: 128,
            max_instances: 256,
            frame_count: 0,
            use_thread: true,
            use_linear_gain: true,
            dsp_impl: DspImplHint::Default,
        }
    }
}
