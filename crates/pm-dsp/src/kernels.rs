//! Scalar reference kernels
//!
//! These define the semantics; the SSE2 file mirrors them exactly. All mix
//! kernels accumulate (`+=`) into the bus buffers, the master output
//! kernels assign.

use crate::pfb::{filter_bank, phase_index};
use crate::{PowerData, Ramp, StereoRamps};
use pm_core::FRACTION_BITS;

/// One polyphase tap pass: 8-tap FIR read around `input[index]` where
/// `index = base + (frac >> FRACTION_BITS)`. The caller guarantees
/// `index - 3` and `index + 4` are in bounds.
#[inline]
pub(crate) fn fir8(input: &[f32], base: usize, frac: u64) -> f32 {
    let bank = filter_bank();
    let c = &bank[phase_index(frac)..phase_index(frac) + 8];
    let index = base + (frac >> FRACTION_BITS) as usize;
    let t = &input[index - 3..index + 5];
    t[0] * c[0]
        + t[1] * c[1]
        + t[2] * c[2]
        + t[3] * c[3]
        + t[4] * c[4]
        + t[5] * c[5]
        + t[6] * c[6]
        + t[7] * c[7]
}

pub(crate) fn mix_mono_to_stereo(
    out_l: &mut [f32],
    out_r: &mut [f32],
    input: &[f32],
    ramp_l: Ramp,
    ramp_r: Ramp,
) {
    let mut scale_l = ramp_l.from;
    let mut scale_r = ramp_r.from;
    for ((l, r), &s) in out_l.iter_mut().zip(out_r.iter_mut()).zip(input.iter()) {
        *l += s * scale_l;
        *r += s * scale_r;
        scale_l += ramp_l.delta;
        scale_r += ramp_r.delta;
    }
}

pub(crate) fn mix_stereo_to_stereo(
    out_l: &mut [f32],
    out_r: &mut [f32],
    in_l: &[f32],
    in_r: &[f32],
    ramps: &StereoRamps,
) {
    let mut scale_l0 = ramps.l0.from;
    let mut scale_r0 = ramps.r0.from;
    let mut scale_l1 = ramps.l1.from;
    let mut scale_r1 = ramps.r1.from;
    for (i, (l, r)) in out_l.iter_mut().zip(out_r.iter_mut()).enumerate() {
        let sl = in_l[i];
        let sr = in_r[i];
        *l += sl * scale_l0 + sr * scale_l1;
        *r += sl * scale_r0 + sr * scale_r1;
        scale_l0 += ramps.l0.delta;
        scale_r0 += ramps.r0.delta;
        scale_l1 += ramps.l1.delta;
        scale_r1 += ramps.r1.delta;
    }
}

pub(crate) fn resample_mix_mono_to_stereo(
    out_l: &mut [f32],
    out_r: &mut [f32],
    input: &[f32],
    base: usize,
    mut frac: u64,
    delta: u64,
    ramp_l: Ramp,
    ramp_r: Ramp,
) -> u64 {
    let mut scale_l = ramp_l.from;
    let mut scale_r = ramp_r.from;
    for (l, r) in out_l.iter_mut().zip(out_r.iter_mut()) {
        let s = fir8(input, base, frac);
        *l += s * scale_l;
        *r += s * scale_r;
        scale_l += ramp_l.delta;
        scale_r += ramp_r.delta;
        frac += delta;
    }
    frac
}

pub(crate) fn resample_mix_stereo_to_stereo(
    out_l: &mut [f32],
    out_r: &mut [f32],
    in_l: &[f32],
    in_r: &[f32],
    base: usize,
    mut frac: u64,
    delta: u64,
    ramps: &StereoRamps,
) -> u64 {
    let mut scale_l0 = ramps.l0.from;
    let mut scale_r0 = ramps.r0.from;
    let mut scale_l1 = ramps.l1.from;
    let mut scale_r1 = ramps.r1.from;
    for (l, r) in out_l.iter_mut().zip(out_r.iter_mut()) {
        let sl = fir8(in_l, base, frac);
        let sr = fir8(in_r, base, frac);
        *l += sl * scale_l0 + sr * scale_l1;
        *r += sl * scale_r0 + sr * scale_r1;
        scale_l0 += ramps.l0.delta;
        scale_r0 += ramps.r0.delta;
        scale_l1 += ramps.l1.delta;
        scale_r1 += ramps.r1.delta;
        frac += delta;
    }
    frac
}

/// Accumulate `in * clamp(scale, 0, 1)` into `out` — group bus into master.
pub(crate) fn apply_clamped_gain(
    out_l: &mut [f32],
    out_r: &mut [f32],
    in_l: &[f32],
    in_r: &[f32],
    ramp: Ramp,
) {
    let mut scale = ramp.from;
    for (i, (l, r)) in out_l.iter_mut().zip(out_r.iter_mut()).enumerate() {
        let clamped = scale.clamp(0.0, 1.0);
        *l += in_l[i] * clamped;
        *r += in_r[i] * clamped;
        scale += ramp.delta;
    }
}

/// Write `in * scale` to `out` — master bus to planar float device output.
pub(crate) fn apply_gain(
    out_l: &mut [f32],
    out_r: &mut [f32],
    in_l: &[f32],
    in_r: &[f32],
    ramp: Ramp,
) {
    let mut scale = ramp.from;
    for (i, (l, r)) in out_l.iter_mut().zip(out_r.iter_mut()).enumerate() {
        *l = in_l[i] * scale;
        *r = in_r[i] * scale;
        scale += ramp.delta;
    }
}

/// Write clamped `in * scale` to interleaved S16 device output.
/// `out.len() == 2 * in_l.len()`.
pub(crate) fn apply_gain_and_interleave_to_s16(
    out: &mut [i16],
    in_l: &[f32],
    in_r: &[f32],
    ramp: Ramp,
) {
    let mut scale = ramp.from;
    for (i, pair) in out.chunks_exact_mut(2).enumerate() {
        pair[0] = (in_l[i] * scale).clamp(-32768.0, 32767.0) as i16;
        pair[1] = (in_r[i] * scale).clamp(-32768.0, 32767.0) as i16;
        scale += ramp.delta;
    }
}

/// Sum-of-squares and peak-squared per channel after applying `gain`.
pub(crate) fn gather_power(in_l: &[f32], in_r: &[f32], gain: f32) -> PowerData {
    let mut power = PowerData::default();
    for (&l, &r) in in_l.iter().zip(in_r.iter()) {
        let left = l * gain;
        let right = r * gain;
        let left_sq = left * left;
        let right_sq = right * right;
        power.sum_sq_left += left_sq;
        power.sum_sq_right += right_sq;
        power.peak_sq_left = power.peak_sq_left.max(left_sq);
        power.peak_sq_right = power.peak_sq_right.max(right_sq);
    }
    power
}

/// Widen an 8-bit sample to int16 magnitude by bit duplication, so full
/// scale input lands at full int16 scale.
#[inline]
pub(crate) fn widen_s8(sample: i8) -> f32 {
    let wide = ((sample as i16) << 8) | ((sample as i16) & 0x00ff);
    wide as f32
}

pub(crate) fn convert_from_s8(out: &mut [f32], input: &[i8]) {
    for (o, &s) in out.iter_mut().zip(input.iter()) {
        *o = widen_s8(s);
    }
}

pub(crate) fn convert_from_s16(out: &mut [f32], input: &[i16]) {
    for (o, &s) in out.iter_mut().zip(input.iter()) {
        *o = s as f32;
    }
}

pub(crate) fn deinterleave(out_l: &mut [f32], out_r: &mut [f32], input: &[f32]) {
    for (i, pair) in input.chunks_exact(2).enumerate() {
        out_l[i] = pair[0];
        out_r[i] = pair[1];
    }
}

pub(crate) fn deinterleave_from_s8(out_l: &mut [f32], out_r: &mut [f32], input: &[i8]) {
    for (i, pair) in input.chunks_exact(2).enumerate() {
        out_l[i] = widen_s8(pair[0]);
        out_r[i] = widen_s8(pair[1]);
    }
}

pub(crate) fn deinterleave_from_s16(out_l: &mut [f32], out_r: &mut [f32], input: &[i16]) {
    for (i, pair) in input.chunks_exact(2).enumerate() {
        out_l[i] = pair[0] as f32;
        out_r[i] = pair[1] as f32;
    }
}
