//! Mixer core: pulls frames from voices into group buses, masters groups
//! into the device output
//!
//! Everything here runs under the core mutex. Units are frames (one sample
//! per channel); resampler positions are Q1.31 fixed point.

use log::{error, warn};
use pm_audio::QueueBuffer;
use pm_codec::{CodecError, SampleSink};
use pm_core::{
    FRACTION_BITS, MASTER_GROUP_HASH, MAX_FUTURE, MAX_HISTORY, STATE_FRAME_COUNT,
};
use pm_dsp::{Ramp, StereoRamps, pan_scale};

use crate::instance::Instance;
use crate::system::{MixState, RuntimeParams};

/// One tick mixes `total_buffers` device buffers; ramps interpolate across
/// all of them.
pub(crate) struct MixContext {
    pub current_buffer: u32,
    pub total_buffers: u32,
    pub frame_count: u32,
}

/// A mixed device buffer in the negotiated output format.
pub(crate) enum OutBuffer {
    S16(Vec<i16>),
    F32(Vec<f32>),
}

impl OutBuffer {
    pub fn as_queue(&self, frame_count: u32) -> QueueBuffer<'_> {
        let n = frame_count as usize;
        match self {
            OutBuffer::S16(buf) => QueueBuffer::S16Interleaved(&buf[..n * 2]),
            OutBuffer::F32(buf) => QueueBuffer::F32Planar(&buf[..n * 2]),
        }
    }
}

pub(crate) fn step_group_values(state: &mut MixState) {
    for group in state.groups.iter_mut() {
        group.gain.step();
    }
}

pub(crate) fn step_instance_values(state: &mut MixState) {
    for instance in state.instances.iter_mut() {
        if instance.playing || instance.frame_count > 0 {
            instance.step_values();
        }
    }
}

/// Gather per-group power for the previous buffer, zero the buses, then mix
/// every active voice.
pub(crate) fn mix_instances(state: &mut MixState, params: &RuntimeParams, ctx: &MixContext) {
    let kernels = pm_dsp::kernels();
    let n = ctx.frame_count as usize;

    for group in state.groups.iter_mut() {
        let power = (kernels.gather_power)(
            &group.mix_buffer[0][..n],
            &group.mix_buffer[1][..n],
            group.gain.current(),
        );
        group.push_power(power, ctx.frame_count);
        group.mix_buffer[0][..n].fill(0.0);
        group.mix_buffer[1][..n].fill(0.0);
    }

    for index in 0..state.instances.capacity() {
        let playing = state.instances.get_index_mut(index).is_some_and(|i| i.playing);
        if playing {
            mix_instance(state, params, ctx, index);
        }
    }
}

fn is_muted(instance: &Instance, groups: &crate::group::GroupTable) -> bool {
    if instance.gain.is_zero() || instance.speed == 0.0 {
        return true;
    }
    if groups.by_hash(instance.group).is_some_and(|g| g.gain.is_zero()) {
        return true;
    }
    groups.by_hash(MASTER_GROUP_HASH).is_some_and(|m| m.gain.is_zero())
}

fn mix_instance(state: &mut MixState, params: &RuntimeParams, ctx: &MixContext, index: usize) {
    let MixState { codec, instances, data, groups, scratch, .. } = state;
    let instance = instances.get_index_mut(index).expect("active instance");
    let sound_name = |inst: &Instance| {
        data.get(inst.data_handle).map(|d| d.name.clone()).unwrap_or_default()
    };

    let info = codec.info(instance.decoder);

    let correct_bit_depth = matches!(info.bits_per_sample, 8 | 16 | 32);
    let correct_num_channels = matches!(info.channels, 1 | 2);
    if !correct_bit_depth || !correct_num_channels {
        error!(
            "only mono/stereo with 8/16/32 bits per sample is supported ({}): {} bps {} ch",
            sound_name(instance),
            info.bits_per_sample,
            info.channels
        );
        instance.playing = false;
        return;
    }

    let Some(group_index) = groups.index_of(instance.group) else {
        error!("sound group not found");
        return;
    };

    let muted = is_muted(instance, groups);
    let channels = info.channels as usize;

    // Input frames consumed per output frame, Q1.31
    let delta =
        (((info.rate as u64) << FRACTION_BITS) as f64 / params.mix_rate as f64 * instance.speed as f64)
            as u64;
    if delta == 0 {
        // inaudibly slow; the voice holds its position
        return;
    }
    let one = 1u64 << FRACTION_BITS;
    let needed_frames = ((instance.frame_fraction + ctx.frame_count as u64 * delta + (one - 1))
        >> FRACTION_BITS) as u32
        + MAX_FUTURE as u32;
    // High-rate sources above the speed headroom mix in shorter bursts
    // rather than overrunning the scratch window
    let needed_frames = needed_frames.min((scratch.work[0].len() - MAX_HISTORY) as u32);

    // Restore history and leftover/lookahead frames saved last tick. Work
    // buffer layout per channel: [0, MAX_HISTORY) is history, MAX_HISTORY is
    // the current read base.
    let initial_frame_count = instance.frame_count.saturating_sub(MAX_HISTORY as u32);
    for c in 0..channels {
        let count = instance.frame_count as usize;
        scratch.work[c][..count].copy_from_slice(&instance.state_frames[c][..count]);
    }

    let was_eos = instance.end_of_stream;
    let mut frame_count = initial_frame_count;
    let mut new_frame_count = 0u32;
    let stride = info.frame_stride() as usize;
    let is_direct_delivery = info.bits_per_sample == 32 && (!info.is_interleaved || info.channels == 1);

    while frame_count < needed_frames && instance.playing {
        let n = (needed_frames - frame_count) as usize;

        let result = if is_direct_delivery {
            let [work0, work1] = &mut scratch.work;
            let offset = MAX_HISTORY + frame_count as usize;
            let mut channel_slices = [
                Some(&mut work0[offset..offset + n]),
                if channels == 2 { Some(&mut work1[offset..offset + n]) } else { None },
            ];
            if muted {
                let result = codec.skip(instance.decoder, n * stride);
                if let Ok(skipped) = result {
                    let frames = skipped / stride;
                    for channel in channel_slices.iter_mut().flatten() {
                        channel[..frames].fill(0.0);
                    }
                }
                result
            } else {
                codec.decode(instance.decoder, SampleSink::Planar(&mut channel_slices))
            }
        } else {
            let byte_offset = new_frame_count as usize * stride;
            let sink = &mut scratch.temp_bytes()[byte_offset..byte_offset + n * stride];
            if muted {
                let result = codec.skip(instance.decoder, n * stride);
                if let Ok(skipped) = result {
                    sink[..skipped].fill(0);
                }
                result
            } else {
                codec.decode(instance.decoder, SampleSink::Interleaved(sink))
            }
        };

        match result {
            Ok(0) => break, // streaming source with nothing to offer yet
            Ok(decoded) => {
                frame_count += (decoded / stride) as u32;
                new_frame_count += (decoded / stride) as u32;
            }
            Err(CodecError::EndOfStream) => {
                if instance.looping && instance.loop_counter != 0 {
                    if let Err(e) = codec.reset(instance.decoder) {
                        warn!("unable to rewind '{}' for looping: {e}", sound_name(instance));
                        instance.playing = false;
                        return;
                    }
                    if instance.loop_counter > 0 {
                        instance.loop_counter -= 1;
                    }
                    instance.end_of_stream = false;
                } else {
                    instance.end_of_stream = true;
                    break;
                }
            }
            Err(e) => {
                if !instance.error_logged {
                    instance.error_logged = true;
                    warn!("unable to decode '{}': {e}", sound_name(instance));
                }
                instance.playing = false;
                return;
            }
        }
    }

    let mut mixed_frames = 0u32;
    if frame_count > 0 {
        // Deinterleave / widen whatever landed in the temp buffer
        if new_frame_count > 0 && info.is_interleaved && !is_direct_delivery {
            convert_new_frames(scratch, info.bits_per_sample, channels, initial_frame_count, new_frame_count);
        }

        // Near the stream end the decoder underfetches; duplicate the last
        // real sample so the filter always sees valid lookahead. Skipped in
        // drain ticks, where the saved window already ends in lookahead.
        if frame_count < needed_frames && !was_eos {
            let missing = (needed_frames - frame_count).min(MAX_FUTURE as u32);
            for c in 0..channels {
                let work = &mut scratch.work[c];
                let end = MAX_HISTORY + frame_count as usize;
                let last = work[end - 1];
                work[end..end + missing as usize].fill(last);
            }
            frame_count += missing;
        }

        if frame_count > MAX_FUTURE as u32 {
            let avail_frames = frame_count - MAX_FUTURE as u32;
            mixed_frames = mix_resample(
                instance,
                groups.get_mut(group_index),
                scratch,
                ctx,
                channels,
                delta,
                avail_frames,
            );
        }
    }

    if instance.end_of_stream && mixed_frames == 0 {
        instance.playing = false;
    }
}

/// Refresh per-channel scales, run the identity or polyphase mix, save the
/// trailing frame window. Returns output frames produced.
#[allow(clippy::too_many_arguments)]
fn mix_resample(
    instance: &mut Instance,
    group: &mut crate::group::SoundGroup,
    scratch: &mut crate::system::Scratch,
    ctx: &MixContext,
    channels: usize,
    delta: u64,
    avail_frames: u32,
) -> u32 {
    if instance.scale_dirty {
        instance.scale_dirty = false;
        let reset = instance.scale_init;
        instance.scale_init = false;

        let gain = instance.gain.current();
        let (left, right) = pan_scale(instance.pan.current());
        if channels == 1 {
            instance.scale_l[0].set(left * gain, reset);
            instance.scale_r[0].set(right * gain, reset);
        } else {
            // Diagonal pan matrix: left input only feeds the left bus,
            // right only the right, preserving stereo imaging
            instance.scale_l[0].set(left * gain, reset);
            instance.scale_r[0].set(0.0, reset);
            instance.scale_l[1].set(0.0, reset);
            instance.scale_r[1].set(right * gain, reset);
        }
    }

    let one = 1u64 << FRACTION_BITS;
    let avail_bits = (avail_frames as u64) << FRACTION_BITS;
    if avail_bits <= instance.frame_fraction {
        return 0;
    }
    let avail_mix_count = (avail_bits - instance.frame_fraction) / delta;
    let mix_count = (ctx.frame_count as u64).min(avail_mix_count) as u32;
    if mix_count == 0 {
        return 0;
    }
    let n = mix_count as usize;

    let ramp = |value: &pm_core::RampedValue| {
        let (from, d) = value.ramp(ctx.current_buffer, ctx.total_buffers, mix_count);
        Ramp::new(from, d)
    };
    let kernels = pm_dsp::kernels();
    let [out_l, out_r] = &mut group.mix_buffer;
    let out_l = &mut out_l[..n];
    let out_r = &mut out_r[..n];

    let identity = delta == one && instance.frame_fraction == 0;
    let used_frames;
    if identity {
        let base = MAX_HISTORY;
        if channels == 1 {
            (kernels.mix_mono_to_stereo)(
                out_l,
                out_r,
                &scratch.work[0][base..base + n],
                ramp(&instance.scale_l[0]),
                ramp(&instance.scale_r[0]),
            );
        } else {
            let ramps = StereoRamps {
                l0: ramp(&instance.scale_l[0]),
                r0: ramp(&instance.scale_r[0]),
                l1: ramp(&instance.scale_l[1]),
                r1: ramp(&instance.scale_r[1]),
            };
            (kernels.mix_stereo_to_stereo)(
                out_l,
                out_r,
                &scratch.work[0][base..base + n],
                &scratch.work[1][base..base + n],
                &ramps,
            );
        }
        used_frames = mix_count;
    } else {
        let frac = if channels == 1 {
            (kernels.resample_mix_mono_to_stereo)(
                out_l,
                out_r,
                &scratch.work[0],
                MAX_HISTORY,
                instance.frame_fraction,
                delta,
                ramp(&instance.scale_l[0]),
                ramp(&instance.scale_r[0]),
            )
        } else {
            let ramps = StereoRamps {
                l0: ramp(&instance.scale_l[0]),
                r0: ramp(&instance.scale_r[0]),
                l1: ramp(&instance.scale_l[1]),
                r1: ramp(&instance.scale_r[1]),
            };
            (kernels.resample_mix_stereo_to_stereo)(
                out_l,
                out_r,
                &scratch.work[0],
                &scratch.work[1],
                MAX_HISTORY,
                instance.frame_fraction,
                delta,
                &ramps,
            )
        };
        used_frames = (frac >> FRACTION_BITS) as u32;
        instance.frame_fraction = frac & (one - 1);
    }

    // Save history, leftover and lookahead for the next tick
    let state_count = MAX_HISTORY as u32 + (avail_frames - used_frames) + MAX_FUTURE as u32;
    debug_assert!(state_count as usize <= STATE_FRAME_COUNT);
    let from = used_frames as usize; // == base + used - MAX_HISTORY
    for c in 0..channels {
        instance.state_frames[c][..state_count as usize]
            .copy_from_slice(&scratch.work[c][from..from + state_count as usize]);
    }
    instance.frame_count = state_count;

    mix_count
}

fn convert_new_frames(
    scratch: &mut crate::system::Scratch,
    bits_per_sample: u8,
    channels: usize,
    initial_frame_count: u32,
    new_frame_count: u32,
) {
    let kernels = pm_dsp::kernels();
    let offset = MAX_HISTORY + initial_frame_count as usize;
    let n = new_frame_count as usize;
    let crate::system::Scratch { temp, work } = scratch;
    let [work0, work1] = work;

    match (bits_per_sample, channels) {
        (8, 1) => {
            (kernels.convert_from_s8)(&mut work0[offset..offset + n], &temp_as_i8(temp, n));
        }
        (8, 2) => {
            (kernels.deinterleave_from_s8)(
                &mut work0[offset..offset + n],
                &mut work1[offset..offset + n],
                &temp_as_i8(temp, n * 2),
            );
        }
        (16, 1) => {
            (kernels.convert_from_s16)(&mut work0[offset..offset + n], temp_as_i16(temp, n));
        }
        (16, 2) => {
            (kernels.deinterleave_from_s16)(
                &mut work0[offset..offset + n],
                &mut work1[offset..offset + n],
                temp_as_i16(temp, n * 2),
            );
        }
        (32, 2) => {
            (kernels.deinterleave)(
                &mut work0[offset..offset + n],
                &mut work1[offset..offset + n],
                &temp[..n * 2],
            );
        }
        _ => debug_assert!(false, "direct-delivery shapes never land in the temp buffer"),
    }
}

fn temp_as_i8(temp: &[f32], n: usize) -> Vec<i8> {
    // Infrequent path (8-bit sources); a widening copy keeps it safe
    temp_bytes_ref(temp)[..n].iter().map(|&b| b as i8).collect()
}

fn temp_as_i16(temp: &[f32], n: usize) -> &[i16] {
    debug_assert!(n * 2 <= size_of_val(temp));
    unsafe { std::slice::from_raw_parts(temp.as_ptr() as *const i16, n) }
}

fn temp_bytes_ref(temp: &[f32]) -> &[u8] {
    unsafe { std::slice::from_raw_parts(temp.as_ptr() as *const u8, size_of_val(temp)) }
}

/// Sum every non-master group into the master bus with ramped clamped gain,
/// then emit the device buffer in the negotiated output format.
pub(crate) fn master(
    state: &mut MixState,
    params: &RuntimeParams,
    ctx: &MixContext,
    out: &mut OutBuffer,
) {
    let kernels = pm_dsp::kernels();
    let n = ctx.frame_count as usize;

    let (master_group, others) = state.groups.split_master_mut();

    if master_group.gain.is_zero() {
        match out {
            OutBuffer::S16(buf) => buf[..n * 2].fill(0),
            OutBuffer::F32(buf) => buf[..n * 2].fill(0.0),
        }
        return;
    }

    for group in others {
        if group.gain.is_zero() {
            continue;
        }
        let (gain, gain_delta) = group.gain.ramp(ctx.current_buffer, ctx.total_buffers, ctx.frame_count);
        let [in_l, in_r] = &group.mix_buffer;
        let [out_l, out_r] = &mut master_group.mix_buffer;
        (kernels.apply_clamped_gain)(
            &mut out_l[..n],
            &mut out_r[..n],
            &in_l[..n],
            &in_r[..n],
            Ramp::new(gain, gain_delta),
        );
    }

    let (mut gain, mut gain_delta) =
        master_group.gain.ramp(ctx.current_buffer, ctx.total_buffers, ctx.frame_count);
    let [mix_l, mix_r] = &master_group.mix_buffer;

    match out {
        OutBuffer::S16(buf) => {
            (kernels.apply_gain_and_interleave_to_s16)(
                &mut buf[..n * 2],
                &mix_l[..n],
                &mix_r[..n],
                Ramp::new(gain, gain_delta),
            );
        }
        OutBuffer::F32(buf) => {
            if params.normalize_float_output {
                // The pipeline runs at int16 magnitude internally
                gain *= 1.0 / 32768.0;
                gain_delta *= 1.0 / 32768.0;
            }
            let (out_l, out_r) = buf[..n * 2].split_at_mut(n);
            (kernels.apply_gain)(out_l, out_r, &mix_l[..n], &mix_r[..n], Ramp::new(gain, gain_delta));
        }
    }
}
