//! Sound system lifecycle and public API
//!
//! All mutating calls take the core mutex. The optional worker thread runs
//! the mix loop on an 8 ms cadence; without it the caller drives `update`.
//! Device queueing happens outside the core mutex so a blocking driver
//! never stalls API callers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{error, info, warn};
use parking_lot::Mutex;
use pm_audio::{Device, DeviceError, DeviceInfo, OpenDeviceParams};
use pm_codec::{CodecContext, CodecError, Format};
use pm_core::{
    Config, DspImplHint, Handle, INVALID_PLAY_ID, InstanceHandle, MASTER_GROUP, MAX_DECODE_CHANNELS,
    MAX_FUTURE, MAX_HISTORY, MAX_MIX_CHANNELS, MAX_SPEED, NameHash, OUTBUFFER_COUNT,
    OUTBUFFER_COUNT_NO_THREAD, Parameter, SoundDataHandle, SoundDataType, SoundError, SoundResult,
    default_frame_count,
};
use pm_dsp::gain_to_scale;

use crate::data::{SoundDataCallback, SoundDataEntry};
use crate::group::GroupTable;
use crate::instance::Instance;
use crate::mixer::{self, MixContext, OutBuffer};
use crate::platform::{DefaultPlatformHooks, PlatformHooks};
use crate::pool::Pool;

const WORKER_SLEEP: Duration = Duration::from_millis(8);

/// Decode scratch shared by all voices within one mix pass.
pub(crate) struct Scratch {
    /// Interleaved decoder output before conversion; f32-backed for
    /// alignment, viewed as bytes.
    pub temp: Vec<f32>,
    /// Per-channel working buffers: `MAX_HISTORY` frames of history, then
    /// decoded frames, then lookahead.
    pub work: [Vec<f32>; MAX_DECODE_CHANNELS],
}

impl Scratch {
    fn new(device_frame_count: u32) -> Self {
        // +1: a fractional read position at max speed needs one extra
        // input frame beyond frame_count * MAX_SPEED
        let frames = MAX_HISTORY + device_frame_count as usize * MAX_SPEED as usize + MAX_FUTURE + 1;
        Self {
            temp: vec![0.0; frames * MAX_MIX_CHANNELS],
            work: [vec![0.0; frames], vec![0.0; frames]],
        }
    }

    pub fn temp_bytes(&mut self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(
                self.temp.as_mut_ptr() as *mut u8,
                self.temp.len() * size_of::<f32>(),
            )
        }
    }
}

/// Everything the core mutex guards.
pub(crate) struct MixState {
    pub codec: CodecContext,
    pub instances: Pool<Instance>,
    pub data: Pool<SoundDataEntry>,
    pub groups: GroupTable,
    pub scratch: Scratch,
    pub play_counter: u32,
    /// Frames of the buffer currently being mixed (0 before the first).
    pub frame_count: u32,
}

/// Immutable after initialization; shared with the mixer.
pub(crate) struct RuntimeParams {
    pub mix_rate: u32,
    pub device_frame_count: u32,
    pub normalize_float_output: bool,
    pub use_linear_gain: bool,
}

/// Device-side state; only the update path locks this for long.
struct OutputState {
    device: Option<Box<dyn Device>>,
    out_buffers: Vec<OutBuffer>,
    next_out_buffer: usize,
    device_started: bool,
    audio_interrupted: bool,
}

struct Inner {
    state: Mutex<MixState>,
    output: Mutex<OutputState>,
    params: RuntimeParams,
    hooks: Box<dyn PlatformHooks>,
    running: AtomicBool,
    paused: AtomicBool,
    status: AtomicI32,
    device_started: AtomicBool,
    window_focused: AtomicBool,
}

/// The engine. One per process is typical; nothing enforces it.
pub struct SoundSystem {
    inner: Arc<Inner>,
    worker: Option<JoinHandle<()>>,
}

fn format_for(data_type: SoundDataType) -> Format {
    match data_type {
        SoundDataType::Wav => Format::Wav,
        SoundDataType::OggVorbis => Format::Vorbis,
        SoundDataType::Opus => Format::Opus,
    }
}

fn release_data_entry(state: &mut MixState, handle: Handle) {
    let Some(entry) = state.data.get_mut(handle) else {
        return;
    };
    entry.ref_count -= 1;
    if entry.ref_count == 0 {
        state.data.release(handle);
    }
}

impl SoundSystem {
    /// Bring up the engine against the device registered under
    /// `config.output_device`.
    ///
    /// An unknown device name fails with `DeviceNotFound`. A known device
    /// that cannot come up leaves the engine running silently: the API
    /// stays usable, nothing is audible.
    pub fn initialize(config: Config) -> SoundResult<SoundSystem> {
        let buffer_count =
            if config.use_thread { OUTBUFFER_COUNT } else { OUTBUFFER_COUNT_NO_THREAD };
        let params = OpenDeviceParams {
            buffer_count: buffer_count as u32,
            frame_count: config.frame_count,
        };
        let device = match pm_audio::open_device(&config.output_device, &params) {
            Ok(device) => Some(device),
            Err(DeviceError::NotFound(name)) => {
                error!("no such sound device '{name}'");
                return Err(SoundError::DeviceNotFound);
            }
            Err(e) => {
                error!("failed to open device '{}': {e}", config.output_device);
                None
            }
        };
        Self::initialize_internal(config, device, Box::new(DefaultPlatformHooks))
    }

    /// Bring up the engine with a caller-supplied device (tests, embedders).
    pub fn initialize_with_device(
        config: Config,
        device: Box<dyn Device>,
    ) -> SoundResult<SoundSystem> {
        Self::initialize_internal(config, Some(device), Box::new(DefaultPlatformHooks))
    }

    /// Full control: device and platform hooks.
    pub fn initialize_with(
        config: Config,
        device: Option<Box<dyn Device>>,
        hooks: Box<dyn PlatformHooks>,
    ) -> SoundResult<SoundSystem> {
        Self::initialize_internal(config, device, hooks)
    }

    fn initialize_internal(
        config: Config,
        device: Option<Box<dyn Device>>,
        hooks: Box<dyn PlatformHooks>,
    ) -> SoundResult<SoundSystem> {
        let device_info = device.as_ref().map(|d| d.info());
        let mix_rate = device_info.as_ref().map(|i| i.mix_rate).unwrap_or(44100);

        let device_frame_count = match &device_info {
            // The device dictates its buffer size (e.g. exclusive-mode APIs)
            Some(DeviceInfo { frame_count, .. }) if *frame_count != 0 => *frame_count,
            _ if config.frame_count != 0 => config.frame_count,
            _ => default_frame_count(mix_rate),
        };

        let use_floats = device_info.as_ref().map(|i| i.use_floats).unwrap_or(false);
        let normalize = device_info.as_ref().map(|i| i.use_normalized).unwrap_or(false);

        let dsp_hint = match config.dsp_impl {
            DspImplHint::Default => {
                device_info.as_ref().map(|i| i.dsp_impl).unwrap_or(DspImplHint::Default)
            }
            hint => hint,
        };
        let dsp_impl = pm_dsp::select_impl(dsp_hint);

        let buffer_count =
            if config.use_thread { OUTBUFFER_COUNT } else { OUTBUFFER_COUNT_NO_THREAD };
        let out_buffers = (0..buffer_count)
            .map(|_| {
                let samples = device_frame_count as usize * MAX_MIX_CHANNELS;
                if use_floats {
                    OutBuffer::F32(vec![0.0; samples])
                } else {
                    OutBuffer::S16(vec![0; samples])
                }
            })
            .collect();

        let mut groups = GroupTable::new(device_frame_count as usize);
        let master_index = groups.get_or_create(MASTER_GROUP).expect("empty table");
        let master = groups.get_mut(master_index);
        master.gain_parameter = config.master_gain;
        master.gain.reset(gain_to_scale(config.master_gain, config.use_linear_gain));

        let state = MixState {
            codec: CodecContext::new(config.max_instances),
            instances: Pool::new(config.max_instances),
            data: Pool::new(config.max_sound_data),
            groups,
            scratch: Scratch::new(device_frame_count),
            play_counter: 0,
            frame_count: 0,
        };

        let inner = Arc::new(Inner {
            state: Mutex::new(state),
            output: Mutex::new(OutputState {
                device,
                out_buffers,
                next_out_buffer: 0,
                device_started: false,
                audio_interrupted: false,
            }),
            params: RuntimeParams {
                mix_rate,
                device_frame_count,
                normalize_float_output: normalize,
                use_linear_gain: config.use_linear_gain,
            },
            hooks,
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            status: AtomicI32::new(SoundError::NothingToPlay.code()),
            device_started: AtomicBool::new(false),
            window_focused: AtomicBool::new(true),
        });

        let worker = if config.use_thread {
            let worker_inner = Arc::clone(&inner);
            let handle = std::thread::Builder::new()
                .name("pm-sound".to_string())
                .spawn(move || {
                    while worker_inner.running.load(Ordering::Acquire) {
                        let result = if worker_inner.paused.load(Ordering::Acquire) {
                            Ok(())
                        } else {
                            update_internal(&worker_inner)
                        };
                        let code = result.err().map_or(0, |e: SoundError| e.code());
                        worker_inner.status.store(code, Ordering::Release);
                        std::thread::sleep(WORKER_SLEEP);
                    }
                })
                .map_err(|_| SoundError::InitError)?;
            Some(handle)
        } else {
            None
        };

        info!("sound");
        info!("  mix rate:   {mix_rate}");
        info!("  buffer:     {device_frame_count} frames");
        info!("  use thread: {}", config.use_thread);
        info!("  dsp:        {}", dsp_impl.name());

        Ok(SoundSystem { inner, worker })
    }

    /// One engine tick: threaded builds report the worker's last status,
    /// unthreaded builds run a full mix pass inline.
    pub fn update(&self) -> SoundResult<()> {
        if self.worker.is_some() {
            match SoundError::from_code(self.inner.status.load(Ordering::Acquire)) {
                None => Ok(()),
                Some(e) => Err(e),
            }
        } else {
            update_internal(&self.inner)
        }
    }

    /// Pause or resume the whole mixer (worker keeps running, skips mixing).
    pub fn set_paused(&self, paused: bool) {
        self.inner.paused.store(paused, Ordering::Release);
    }

    /// Shut down: stop the worker, stop and close the device, drop pools.
    pub fn finalize(mut self) -> SoundResult<()> {
        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        self.inner.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        let mut output = self.inner.output.lock();
        if let Some(device) = output.device.as_mut() {
            if output.device_started {
                device.stop();
            }
        }
        output.device = None;
        self.inner.device_started.store(false, Ordering::Release);
    }

    /// The output mix rate (44100, 48000, ...). Valid after initialization.
    pub fn mix_rate(&self) -> u32 {
        self.inner.params.mix_rate
    }

    // ---- sound data ----

    pub fn new_sound_data(
        &self,
        name: &str,
        data_type: SoundDataType,
        bytes: &[u8],
    ) -> SoundResult<SoundDataHandle> {
        let mut state = self.inner.state.lock();
        let entry = SoundDataEntry::from_bytes(name, data_type, bytes);
        match state.data.acquire(entry) {
            Some(handle) => Ok(SoundDataHandle(handle)),
            None => {
                error!(
                    "out of sound data slots ({}); raise Config::max_sound_data",
                    state.data.capacity()
                );
                Err(SoundError::OutOfSources)
            }
        }
    }

    pub fn new_sound_data_streaming(
        &self,
        name: &str,
        data_type: SoundDataType,
        callback: Box<dyn SoundDataCallback>,
    ) -> SoundResult<SoundDataHandle> {
        let mut state = self.inner.state.lock();
        let entry = SoundDataEntry::from_callback(name, data_type, callback);
        match state.data.acquire(entry) {
            Some(handle) => Ok(SoundDataHandle(handle)),
            None => {
                error!(
                    "out of sound data slots ({}); raise Config::max_sound_data",
                    state.data.capacity()
                );
                Err(SoundError::OutOfSources)
            }
        }
    }

    /// Replace the backing bytes. The caller must know no decoder is
    /// mid-read; the core mutex serializes against the mixer.
    pub fn set_sound_data(&self, handle: SoundDataHandle, bytes: &[u8]) -> SoundResult<()> {
        let mut state = self.inner.state.lock();
        let entry = state.data.get_mut(handle.0).ok_or(SoundError::InvalidHandle)?;
        entry.set_bytes(bytes);
        Ok(())
    }

    pub fn set_sound_data_callback(
        &self,
        handle: SoundDataHandle,
        callback: Box<dyn SoundDataCallback>,
    ) -> SoundResult<()> {
        let mut state = self.inner.state.lock();
        let entry = state.data.get_mut(handle.0).ok_or(SoundError::InvalidHandle)?;
        entry.set_callback(callback);
        Ok(())
    }

    pub fn is_sound_data_valid(&self, handle: SoundDataHandle) -> bool {
        self.inner.state.lock().data.get(handle.0).is_some_and(|e| e.payload.is_valid())
    }

    /// Rough memory footprint of a sound data entry.
    pub fn sound_resource_size(&self, handle: SoundDataHandle) -> u32 {
        self.inner
            .state
            .lock()
            .data
            .get(handle.0)
            .map(|e| e.payload.size() + size_of::<SoundDataEntry>() as u32)
            .unwrap_or(0)
    }

    /// Drop the creator's reference; storage is freed once the last voice
    /// referencing this data goes away.
    pub fn release_sound_data(&self, handle: SoundDataHandle) -> SoundResult<()> {
        let mut state = self.inner.state.lock();
        if state.data.get(handle.0).is_none() {
            return Err(SoundError::InvalidHandle);
        }
        release_data_entry(&mut state, handle.0);
        Ok(())
    }

    // ---- voices ----

    pub fn new_instance(&self, data: SoundDataHandle) -> SoundResult<InstanceHandle> {
        let mut state = self.inner.state.lock();
        let state = &mut *state;

        let entry = state.data.get_mut(data.0).ok_or(SoundError::InvalidHandle)?;
        if state.instances.remaining() == 0 {
            error!(
                "out of sound instance slots ({}); raise Config::max_instances",
                state.instances.capacity()
            );
            return Err(SoundError::OutOfInstances);
        }

        let source: pm_codec::SharedSource = entry.payload.clone();
        let decoder = match state.codec.new_decoder(format_for(entry.data_type), source) {
            Ok(decoder) => decoder,
            Err(CodecError::Unsupported) => {
                error!(
                    "sound '{}' uses {}, but no decoder was found",
                    entry.name,
                    format_for(entry.data_type).name()
                );
                return Err(SoundError::InvalidStreamData);
            }
            Err(e) => {
                error!("failed to open decoder for sound '{}': {e}", entry.name);
                return Err(SoundError::InvalidStreamData);
            }
        };

        entry.ref_count += 1;
        let handle = state
            .instances
            .acquire(Instance::new(decoder, data.0))
            .expect("slot availability checked above");
        Ok(InstanceHandle(handle))
    }

    pub fn delete_instance(&self, handle: InstanceHandle) -> SoundResult<()> {
        let mut state = self.inner.state.lock();
        let state_ref = &mut *state;

        {
            let instance =
                state_ref.instances.get_mut(handle.0).ok_or(SoundError::InvalidHandle)?;
            if instance.playing {
                let name = state_ref
                    .data
                    .get(instance.data_handle)
                    .map(|d| d.name.as_str())
                    .unwrap_or("?");
                warn!("deleting playing sound instance ({name})");
                instance.playing = false;
            }
        }

        let instance = state_ref.instances.release(handle.0).expect("validated above");
        state_ref.codec.delete_decoder(instance.decoder);
        release_data_entry(state_ref, instance.data_handle);
        Ok(())
    }

    pub fn play(&self, handle: InstanceHandle) -> SoundResult<()> {
        let mut state = self.inner.state.lock();
        let instance = state.instances.get_mut(handle.0).ok_or(SoundError::InvalidHandle)?;
        instance.playing = true;
        Ok(())
    }

    /// Stop a voice: the decoder rewinds and residual frames are dropped.
    pub fn stop(&self, handle: InstanceHandle) -> SoundResult<()> {
        let mut state = self.inner.state.lock();
        let state = &mut *state;
        let instance = state.instances.get_mut(handle.0).ok_or(SoundError::InvalidHandle)?;
        instance.playing = false;
        instance.end_of_stream = false;
        instance.frame_fraction = 0;
        instance.silence_history();
        if state.codec.reset(instance.decoder).is_err() {
            return Err(SoundError::InvalidStreamData);
        }
        Ok(())
    }

    pub fn pause(&self, handle: InstanceHandle, paused: bool) -> SoundResult<()> {
        let mut state = self.inner.state.lock();
        let instance = state.instances.get_mut(handle.0).ok_or(SoundError::InvalidHandle)?;
        instance.playing = !paused;
        Ok(())
    }

    pub fn is_playing(&self, handle: InstanceHandle) -> bool {
        self.inner.state.lock().instances.get(handle.0).is_some_and(|i| i.playing)
    }

    pub fn set_looping(
        &self,
        handle: InstanceHandle,
        looping: bool,
        loop_count: i8,
    ) -> SoundResult<()> {
        let mut state = self.inner.state.lock();
        let instance = state.instances.get_mut(handle.0).ok_or(SoundError::InvalidHandle)?;
        instance.looping = looping;
        instance.loop_counter = loop_count;
        Ok(())
    }

    pub fn set_parameter(
        &self,
        handle: InstanceHandle,
        parameter: Parameter,
        value: f32,
    ) -> SoundResult<()> {
        let use_linear_gain = self.inner.params.use_linear_gain;
        let mut state = self.inner.state.lock();
        let instance = state.instances.get_mut(handle.0).ok_or(SoundError::InvalidHandle)?;
        // Ramping from a stale value would be audible on a stopped voice
        let reset = !instance.playing;
        match parameter {
            Parameter::Gain => {
                instance.gain_parameter = value;
                instance.gain.set(gain_to_scale(value, use_linear_gain), reset);
                instance.scale_dirty = true;
            }
            Parameter::Pan => {
                let pan = value.clamp(-1.0, 1.0);
                instance.pan_parameter = pan;
                // map [-1, 1] to [0, 1] for the constant-power curve
                instance.pan.set((pan + 1.0) * 0.5, reset);
                instance.scale_dirty = true;
            }
            Parameter::Speed => {
                instance.speed = value.clamp(0.0, MAX_SPEED);
            }
        }
        Ok(())
    }

    pub fn get_parameter(&self, handle: InstanceHandle, parameter: Parameter) -> SoundResult<f32> {
        let state = self.inner.state.lock();
        let instance = state.instances.get(handle.0).ok_or(SoundError::InvalidHandle)?;
        Ok(match parameter {
            Parameter::Gain => instance.gain_parameter,
            Parameter::Pan => instance.pan_parameter,
            Parameter::Speed => instance.speed,
        })
    }

    /// Skip the voice's decoder to `start_frame`. Independent of speed.
    pub fn set_start_frame(&self, handle: InstanceHandle, start_frame: u32) -> SoundResult<()> {
        let mut state = self.inner.state.lock();
        let state = &mut *state;
        let instance = state.instances.get_mut(handle.0).ok_or(SoundError::InvalidHandle)?;

        let info = state.codec.info(instance.decoder);
        let mut total_bytes = start_frame as u64 * info.frame_stride() as u64;
        while total_bytes > 0 {
            let chunk = total_bytes.min(1 << 20) as usize;
            match state.codec.skip(instance.decoder, chunk) {
                Ok(0) => break,
                Ok(skipped) => total_bytes -= (skipped as u64).min(total_bytes),
                Err(CodecError::EndOfStream) => break,
                Err(_) => return Err(SoundError::InvalidStreamData),
            }
        }
        Ok(())
    }

    pub fn set_start_time(&self, handle: InstanceHandle, seconds: f32) -> SoundResult<()> {
        if seconds <= 0.0 {
            return Ok(());
        }
        let rate = {
            let mut state = self.inner.state.lock();
            let state = &mut *state;
            let instance = state.instances.get_mut(handle.0).ok_or(SoundError::InvalidHandle)?;
            state.codec.info(instance.decoder).rate
        };
        let start_frame = (seconds as f64 * rate as f64) as u32;
        self.set_start_frame(handle, start_frame)
    }

    // ---- groups ----

    pub fn add_group(&self, name: &str) -> SoundResult<NameHash> {
        let mut state = self.inner.state.lock();
        match state.groups.get_or_create(name) {
            Some(index) => Ok(state.groups.get(index).name_hash),
            None => Err(SoundError::OutOfGroups),
        }
    }

    pub fn set_instance_group(&self, handle: InstanceHandle, group: &str) -> SoundResult<()> {
        self.set_instance_group_hash(handle, pm_core::hash_name(group))
    }

    pub fn set_instance_group_hash(
        &self,
        handle: InstanceHandle,
        group: NameHash,
    ) -> SoundResult<()> {
        let mut state = self.inner.state.lock();
        let state = &mut *state;
        if state.groups.index_of(group).is_none() {
            return Err(SoundError::NoSuchGroup);
        }
        let instance = state.instances.get_mut(handle.0).ok_or(SoundError::InvalidHandle)?;
        instance.group = group;
        Ok(())
    }

    pub fn set_group_gain(&self, group: NameHash, gain: f32) -> SoundResult<()> {
        let use_linear_gain = self.inner.params.use_linear_gain;
        let mut state = self.inner.state.lock();
        let state = &mut *state;
        let index = state.groups.index_of(group).ok_or(SoundError::NoSuchGroup)?;

        // When every voice of the group sits at zero gain the ramp can be
        // hard-reset; ramping from the stale value would be audible when
        // the group comes back
        let mut reset = true;
        for instance in state.instances.iter() {
            if instance.group != group {
                continue;
            }
            if (instance.playing || instance.frame_count > 0) && instance.gain.prev() != 0.0 {
                reset = false;
                break;
            }
        }

        let entry = state.groups.get_mut(index);
        entry.gain.set(gain_to_scale(gain, use_linear_gain), reset);
        entry.gain_parameter = gain;
        Ok(())
    }

    pub fn get_group_gain(&self, group: NameHash) -> SoundResult<f32> {
        let state = self.inner.state.lock();
        state.groups.by_hash(group).map(|g| g.gain_parameter).ok_or(SoundError::NoSuchGroup)
    }

    pub fn get_group_hashes(&self) -> Vec<NameHash> {
        self.inner.state.lock().groups.hashes()
    }

    /// Per-channel RMS over roughly the last `window` seconds, in [0, 1].
    pub fn get_group_rms(&self, group: NameHash, window: f32) -> SoundResult<(f32, f32)> {
        let state = self.inner.state.lock();
        let entry = state.groups.by_hash(group).ok_or(SoundError::NoSuchGroup)?;
        if state.frame_count == 0 {
            return Ok((0.0, 0.0));
        }
        let window_frames = (self.inner.params.mix_rate as f32 * window) as u32;
        Ok(entry.rms(window_frames))
    }

    /// Per-channel peak over roughly the last `window` seconds, in [0, 1].
    pub fn get_group_peak(&self, group: NameHash, window: f32) -> SoundResult<(f32, f32)> {
        let state = self.inner.state.lock();
        let entry = state.groups.by_hash(group).ok_or(SoundError::NoSuchGroup)?;
        if state.frame_count == 0 {
            return Ok((0.0, 0.0));
        }
        let window_frames = (self.inner.params.mix_rate as f32 * window) as u32;
        Ok(entry.peak(window_frames))
    }

    // ---- platform ----

    /// Monotonic id for scripted play requests; wraps past
    /// [`INVALID_PLAY_ID`].
    pub fn get_and_increase_play_counter(&self) -> u32 {
        let mut state = self.inner.state.lock();
        if state.play_counter == INVALID_PLAY_ID {
            state.play_counter = 0;
        }
        let id = state.play_counter;
        state.play_counter += 1;
        id
    }

    pub fn on_window_focus(&self, focus: bool) {
        self.inner.window_focused.store(focus, Ordering::Release);
    }

    pub fn is_music_playing(&self) -> bool {
        self.inner.hooks.is_music_playing(
            self.inner.device_started.load(Ordering::Acquire),
            self.inner.window_focused.load(Ordering::Acquire),
        )
    }

    pub fn is_audio_interrupted(&self) -> bool {
        self.inner.hooks.is_audio_interrupted()
    }

    // ---- introspection (tests, tooling) ----

    /// The voice's decoder position in decoded frames.
    pub fn get_internal_position(&self, handle: InstanceHandle) -> SoundResult<u64> {
        let mut state = self.inner.state.lock();
        let state = &mut *state;
        let instance = state.instances.get(handle.0).ok_or(SoundError::InvalidHandle)?;
        Ok(state.codec.position(instance.decoder))
    }

    pub fn data_ref_count(&self, handle: SoundDataHandle) -> SoundResult<u16> {
        let state = self.inner.state.lock();
        state.data.get(handle.0).map(|e| e.ref_count).ok_or(SoundError::InvalidHandle)
    }
}

impl Drop for SoundSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One full mix pass. Runs on the worker thread or inline from `update`.
fn update_internal(inner: &Inner) -> SoundResult<()> {
    let mut output_guard = inner.output.lock();
    let output = &mut *output_guard;
    let OutputState { device, out_buffers, next_out_buffer, device_started, audio_interrupted } =
        output;
    let Some(device) = device.as_mut() else {
        return Ok(());
    };

    let active_instance_count = inner.state.lock().instances.active_count();

    // Cooperative interruption: phone call or alarm silences the device
    // until the platform gives the session back
    let interrupted_now = inner.hooks.is_audio_interrupted();
    if !*audio_interrupted && interrupted_now {
        *audio_interrupted = true;
        if *device_started {
            device.stop();
            *device_started = false;
            inner.device_started.store(false, Ordering::Release);
        }
    } else if *audio_interrupted && !interrupted_now {
        *audio_interrupted = false;
        if active_instance_count == 0 && !*device_started {
            return Err(SoundError::NothingToPlay);
        }
    }
    if *audio_interrupted {
        return Ok(());
    }

    if active_instance_count == 0 {
        // The device is only started once something plays, so a client can
        // poll is_music_playing() before deciding to duck its own audio
        return Err(SoundError::NothingToPlay);
    }

    if !*device_started {
        device.start();
        *device_started = true;
        inner.device_started.store(true, Ordering::Release);
    }

    let free_slots = device.free_buffer_slots();
    if free_slots > 0 {
        let mut state = inner.state.lock();
        mixer::step_group_values(&mut state);
        mixer::step_instance_values(&mut state);
    }

    let total_buffers = free_slots;
    let mut current_buffer = 0u32;
    let mut free = free_slots;
    while free > 0 {
        let frame_count = device
            .available_frames()
            .unwrap_or(inner.params.device_frame_count)
            .min(inner.params.device_frame_count);
        if frame_count == 0 {
            break;
        }

        let buffer_index;
        {
            let mut state = inner.state.lock();
            state.frame_count = frame_count;

            // Too small a buffer to restore filter history into
            if frame_count < MAX_HISTORY as u32 {
                current_buffer += 1;
                free -= 1;
                continue;
            }

            let ctx = MixContext { current_buffer, total_buffers, frame_count };
            mixer::mix_instances(&mut state, &inner.params, &ctx);

            buffer_index = *next_out_buffer;
            mixer::master(&mut state, &inner.params, &ctx, &mut out_buffers[buffer_index]);
            *next_out_buffer = (*next_out_buffer + 1) % out_buffers.len();
        }

        // Queue outside the core mutex; the driver may block here
        let result = device.queue(out_buffers[buffer_index].as_queue(frame_count), frame_count);
        match result {
            Ok(()) => {}
            Err(DeviceError::Init(e)) => {
                error!("device failed while queueing: {e}");
                *device_started = false;
                inner.device_started.store(false, Ordering::Release);
                return Err(SoundError::InitError);
            }
            Err(e) => warn!("device queue failed: {e}"),
        }

        current_buffer += 1;
        free -= 1;
    }

    Ok(())
}
