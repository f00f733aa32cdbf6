//! SSE2 kernel specializations
//!
//! Semantics mirror the scalar reference in `kernels.rs`; only summation
//! order inside a vector differs, which the shared property tests bound.
//! Every public fn here is a safe wrapper that is only ever installed in the
//! dispatch table after the capability probe confirmed SSE2.

#![allow(unsafe_op_in_unsafe_fn)]

#[cfg(target_arch = "x86")]
use core::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::*;

use crate::pfb::{filter_bank, phase_index};
use crate::{PowerData, Ramp, StereoRamps};
use pm_core::FRACTION_BITS;

const SHUF_PAIRS: i32 = 0b11_01_10_00; // (3,1,2,0): L0 R0 L1 R1 -> L0 L1 R0 R1
const SHUF_LOW: i32 = 0b01_00_01_00; // (1,0,1,0): a0 a1 b0 b1
const SHUF_HIGH: i32 = 0b11_10_11_10; // (3,2,3,2): a2 a3 b2 b3
const SHUF_LANE1: i32 = 0b00_00_00_01;

#[inline]
#[target_feature(enable = "sse2")]
unsafe fn ramp_vectors(ramp: Ramp) -> (__m128, __m128) {
    let lanes = _mm_set_ps(3.0, 2.0, 1.0, 0.0);
    let scale = _mm_add_ps(_mm_set1_ps(ramp.from), _mm_mul_ps(_mm_set1_ps(ramp.delta), lanes));
    (scale, _mm_set1_ps(ramp.delta * 4.0))
}

#[inline]
#[target_feature(enable = "sse2")]
unsafe fn fir8_sse(input: &[f32], base: usize, frac: u64) -> f32 {
    let bank = filter_bank();
    let pi = phase_index(frac);
    let index = base + (frac >> FRACTION_BITS) as usize;
    debug_assert!(index >= 3 && index + 5 <= input.len());

    let t = input.as_ptr().add(index - 3);
    let c = bank.as_ptr().add(pi);
    let tmp0 = _mm_mul_ps(_mm_loadu_ps(t), _mm_loadu_ps(c));
    let tmp1 = _mm_mul_ps(_mm_loadu_ps(t.add(4)), _mm_loadu_ps(c.add(4)));
    let sum = _mm_add_ps(tmp0, tmp1);
    let sum = _mm_add_ps(sum, _mm_movehl_ps(sum, sum));
    let sum = _mm_add_ss(sum, _mm_shuffle_ps::<SHUF_LANE1>(sum, sum));
    _mm_cvtss_f32(sum)
}

pub(crate) fn mix_mono_to_stereo(
    out_l: &mut [f32],
    out_r: &mut [f32],
    input: &[f32],
    ramp_l: Ramp,
    ramp_r: Ramp,
) {
    unsafe { mix_mono_to_stereo_sse2(out_l, out_r, input, ramp_l, ramp_r) }
}

#[target_feature(enable = "sse2")]
unsafe fn mix_mono_to_stereo_sse2(
    out_l: &mut [f32],
    out_r: &mut [f32],
    input: &[f32],
    ramp_l: Ramp,
    ramp_r: Ramp,
) {
    let n = out_l.len();
    let (mut scl, scld) = ramp_vectors(ramp_l);
    let (mut scr, scrd) = ramp_vectors(ramp_r);
    let mut l = out_l.as_mut_ptr();
    let mut r = out_r.as_mut_ptr();
    let mut s = input.as_ptr();
    let n4 = n & !3;
    for _ in (0..n4).step_by(4) {
        let v = _mm_loadu_ps(s);
        _mm_storeu_ps(l, _mm_add_ps(_mm_loadu_ps(l), _mm_mul_ps(v, scl)));
        _mm_storeu_ps(r, _mm_add_ps(_mm_loadu_ps(r), _mm_mul_ps(v, scr)));
        scl = _mm_add_ps(scl, scld);
        scr = _mm_add_ps(scr, scrd);
        l = l.add(4);
        r = r.add(4);
        s = s.add(4);
    }
    let mut scale_l = ramp_l.from + ramp_l.delta * n4 as f32;
    let mut scale_r = ramp_r.from + ramp_r.delta * n4 as f32;
    for i in n4..n {
        let v = input[i];
        out_l[i] += v * scale_l;
        out_r[i] += v * scale_r;
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
    unsafe { mix_stereo_to_stereo_sse2(out_l, out_r, in_l, in_r, ramps) }
}

#[target_feature(enable = "sse2")]
unsafe fn mix_stereo_to_stereo_sse2(
    out_l: &mut [f32],
    out_r: &mut [f32],
    in_l: &[f32],
    in_r: &[f32],
    ramps: &StereoRamps,
) {
    let n = out_l.len();
    let (mut scl0, scld0) = ramp_vectors(ramps.l0);
    let (mut scr0, scrd0) = ramp_vectors(ramps.r0);
    let (mut scl1, scld1) = ramp_vectors(ramps.l1);
    let (mut scr1, scrd1) = ramp_vectors(ramps.r1);
    let n4 = n & !3;
    let mut i = 0;
    while i < n4 {
        let sl = _mm_loadu_ps(in_l.as_ptr().add(i));
        let sr = _mm_loadu_ps(in_r.as_ptr().add(i));
        let l = out_l.as_mut_ptr().add(i);
        let r = out_r.as_mut_ptr().add(i);
        _mm_storeu_ps(
            l,
            _mm_add_ps(
                _mm_loadu_ps(l),
                _mm_add_ps(_mm_mul_ps(sl, scl0), _mm_mul_ps(sr, scl1)),
            ),
        );
        _mm_storeu_ps(
            r,
            _mm_add_ps(
                _mm_loadu_ps(r),
                _mm_add_ps(_mm_mul_ps(sl, scr0), _mm_mul_ps(sr, scr1)),
            ),
        );
        scl0 = _mm_add_ps(scl0, scld0);
        scr0 = _mm_add_ps(scr0, scrd0);
        scl1 = _mm_add_ps(scl1, scld1);
        scr1 = _mm_add_ps(scr1, scrd1);
        i += 4;
    }
    let mut scale_l0 = ramps.l0.from + ramps.l0.delta * n4 as f32;
    let mut scale_r0 = ramps.r0.from + ramps.r0.delta * n4 as f32;
    let mut scale_l1 = ramps.l1.from + ramps.l1.delta * n4 as f32;
    let mut scale_r1 = ramps.r1.from + ramps.r1.delta * n4 as f32;
    while i < n {
        let sl = in_l[i];
        let sr = in_r[i];
        out_l[i] += sl * scale_l0 + sr * scale_l1;
        out_r[i] += sl * scale_r0 + sr * scale_r1;
        scale_l0 += ramps.l0.delta;
        scale_r0 += ramps.r0.delta;
        scale_l1 += ramps.l1.delta;
        scale_r1 += ramps.r1.delta;
        i += 1;
    }
}

pub(crate) fn resample_mix_mono_to_stereo(
    out_l: &mut [f32],
    out_r: &mut [f32],
    input: &[f32],
    base: usize,
    frac: u64,
    delta: u64,
    ramp_l: Ramp,
    ramp_r: Ramp,
) -> u64 {
    unsafe { resample_mix_mono_to_stereo_sse2(out_l, out_r, input, base, frac, delta, ramp_l, ramp_r) }
}

#[target_feature(enable = "sse2")]
#[allow(clippy::too_many_arguments)]
unsafe fn resample_mix_mono_to_stereo_sse2(
    out_l: &mut [f32],
    out_r: &mut [f32],
    input: &[f32],
    base: usize,
    mut frac: u64,
    delta: u64,
    ramp_l: Ramp,
    ramp_r: Ramp,
) -> u64 {
    let n = out_l.len();
    let (mut scl, scld) = ramp_vectors(ramp_l);
    let (mut scr, scrd) = ramp_vectors(ramp_r);
    let n4 = n & !3;
    let mut i = 0;
    while i < n4 {
        let s0 = fir8_sse(input, base, frac);
        frac += delta;
        let s1 = fir8_sse(input, base, frac);
        frac += delta;
        let s2 = fir8_sse(input, base, frac);
        frac += delta;
        let s3 = fir8_sse(input, base, frac);
        frac += delta;
        let s = _mm_set_ps(s3, s2, s1, s0);

        let l = out_l.as_mut_ptr().add(i);
        let r = out_r.as_mut_ptr().add(i);
        _mm_storeu_ps(l, _mm_add_ps(_mm_loadu_ps(l), _mm_mul_ps(s, scl)));
        _mm_storeu_ps(r, _mm_add_ps(_mm_loadu_ps(r), _mm_mul_ps(s, scr)));
        scl = _mm_add_ps(scl, scld);
        scr = _mm_add_ps(scr, scrd);
        i += 4;
    }
    let mut scale_l = ramp_l.from + ramp_l.delta * n4 as f32;
    let mut scale_r = ramp_r.from + ramp_r.delta * n4 as f32;
    while i < n {
        let s = fir8_sse(input, base, frac);
        out_l[i] += s * scale_l;
        out_r[i] += s * scale_r;
        scale_l += ramp_l.delta;
        scale_r += ramp_r.delta;
        frac += delta;
        i += 1;
    }
    frac
}

pub(crate) fn resample_mix_stereo_to_stereo(
    out_l: &mut [f32],
    out_r: &mut [f32],
    in_l: &[f32],
    in_r: &[f32],
    base: usize,
    frac: u64,
    delta: u64,
    ramps: &StereoRamps,
) -> u64 {
    unsafe {
        resample_mix_stereo_to_stereo_sse2(out_l, out_r, in_l, in_r, base, frac, delta, ramps)
    }
}

#[target_feature(enable = "sse2")]
#[allow(clippy::too_many_arguments)]
unsafe fn resample_mix_stereo_to_stereo_sse2(
    out_l: &mut [f32],
    out_r: &mut [f32],
    in_l: &[f32],
    in_r: &[f32],
    base: usize,
    mut frac: u64,
    delta: u64,
    ramps: &StereoRamps,
) -> u64 {
    let n = out_l.len();
    let (mut scl0, scld0) = ramp_vectors(ramps.l0);
    let (mut scr0, scrd0) = ramp_vectors(ramps.r0);
    let (mut scl1, scld1) = ramp_vectors(ramps.l1);
    let (mut scr1, scrd1) = ramp_vectors(ramps.r1);
    let n4 = n & !3;
    let mut i = 0;
    while i < n4 {
        let s0l = fir8_sse(in_l, base, frac);
        let s0r = fir8_sse(in_r, base, frac);
        frac += delta;
        let s1l = fir8_sse(in_l, base, frac);
        let s1r = fir8_sse(in_r, base, frac);
        frac += delta;
        let s2l = fir8_sse(in_l, base, frac);
        let s2r = fir8_sse(in_r, base, frac);
        frac += delta;
        let s3l = fir8_sse(in_l, base, frac);
        let s3r = fir8_sse(in_r, base, frac);
        frac += delta;
        let sl = _mm_set_ps(s3l, s2l, s1l, s0l);
        let sr = _mm_set_ps(s3r, s2r, s1r, s0r);

        let l = out_l.as_mut_ptr().add(i);
        let r = out_r.as_mut_ptr().add(i);
        _mm_storeu_ps(
            l,
            _mm_add_ps(
                _mm_loadu_ps(l),
                _mm_add_ps(_mm_mul_ps(sl, scl0), _mm_mul_ps(sr, scl1)),
            ),
        );
        _mm_storeu_ps(
            r,
            _mm_add_ps(
                _mm_loadu_ps(r),
                _mm_add_ps(_mm_mul_ps(sl, scr0), _mm_mul_ps(sr, scr1)),
            ),
        );
        scl0 = _mm_add_ps(scl0, scld0);
        scr0 = _mm_add_ps(scr0, scrd0);
        scl1 = _mm_add_ps(scl1, scld1);
        scr1 = _mm_add_ps(scr1, scrd1);
        i += 4;
    }
    let mut scale_l0 = ramps.l0.from + ramps.l0.delta * n4 as f32;
    let mut scale_r0 = ramps.r0.from + ramps.r0.delta * n4 as f32;
    let mut scale_l1 = ramps.l1.from + ramps.l1.delta * n4 as f32;
    let mut scale_r1 = ramps.r1.from + ramps.r1.delta * n4 as f32;
    while i < n {
        let sl = fir8_sse(in_l, base, frac);
        let sr = fir8_sse(in_r, base, frac);
        out_l[i] += sl * scale_l0 + sr * scale_l1;
        out_r[i] += sl * scale_r0 + sr * scale_r1;
        scale_l0 += ramps.l0.delta;
        scale_r0 += ramps.r0.delta;
        scale_l1 += ramps.l1.delta;
        scale_r1 += ramps.r1.delta;
        frac += delta;
        i += 1;
    }
    frac
}

pub(crate) fn apply_clamped_gain(
    out_l: &mut [f32],
    out_r: &mut [f32],
    in_l: &[f32],
    in_r: &[f32],
    ramp: Ramp,
) {
    unsafe { apply_clamped_gain_sse2(out_l, out_r, in_l, in_r, ramp) }
}

#[target_feature(enable = "sse2")]
unsafe fn apply_clamped_gain_sse2(
    out_l: &mut [f32],
    out_r: &mut [f32],
    in_l: &[f32],
    in_r: &[f32],
    ramp: Ramp,
) {
    let n = out_l.len();
    let (mut sc, scd) = ramp_vectors(ramp);
    let zero = _mm_setzero_ps();
    let one = _mm_set1_ps(1.0);
    let n4 = n & !3;
    let mut i = 0;
    while i < n4 {
        let clamped = _mm_min_ps(_mm_max_ps(sc, zero), one);
        let l = out_l.as_mut_ptr().add(i);
        let r = out_r.as_mut_ptr().add(i);
        _mm_storeu_ps(
            l,
            _mm_add_ps(_mm_loadu_ps(l), _mm_mul_ps(_mm_loadu_ps(in_l.as_ptr().add(i)), clamped)),
        );
        _mm_storeu_ps(
            r,
            _mm_add_ps(_mm_loadu_ps(r), _mm_mul_ps(_mm_loadu_ps(in_r.as_ptr().add(i)), clamped)),
        );
        sc = _mm_add_ps(sc, scd);
        i += 4;
    }
    let mut scale = ramp.from + ramp.delta * n4 as f32;
    while i < n {
        let clamped = scale.clamp(0.0, 1.0);
        out_l[i] += in_l[i] * clamped;
        out_r[i] += in_r[i] * clamped;
        scale += ramp.delta;
        i += 1;
    }
}

pub(crate) fn apply_gain(
    out_l: &mut [f32],
    out_r: &mut [f32],
    in_l: &[f32],
    in_r: &[f32],
    ramp: Ramp,
) {
    unsafe { apply_gain_sse2(out_l, out_r, in_l, in_r, ramp) }
}

#[target_feature(enable = "sse2")]
unsafe fn apply_gain_sse2(
    out_l: &mut [f32],
    out_r: &mut [f32],
    in_l: &[f32],
    in_r: &[f32],
    ramp: Ramp,
) {
    let n = out_l.len();
    let (mut sc, scd) = ramp_vectors(ramp);
    let n4 = n & !3;
    let mut i = 0;
    while i < n4 {
        _mm_storeu_ps(
            out_l.as_mut_ptr().add(i),
            _mm_mul_ps(_mm_loadu_ps(in_l.as_ptr().add(i)), sc),
        );
        _mm_storeu_ps(
            out_r.as_mut_ptr().add(i),
            _mm_mul_ps(_mm_loadu_ps(in_r.as_ptr().add(i)), sc),
        );
        sc = _mm_add_ps(sc, scd);
        i += 4;
    }
    let mut scale = ramp.from + ramp.delta * n4 as f32;
    while i < n {
        out_l[i] = in_l[i] * scale;
        out_r[i] = in_r[i] * scale;
        scale += ramp.delta;
        i += 1;
    }
}

pub(crate) fn apply_gain_and_interleave_to_s16(
    out: &mut [i16],
    in_l: &[f32],
    in_r: &[f32],
    ramp: Ramp,
) {
    unsafe { apply_gain_and_interleave_to_s16_sse2(out, in_l, in_r, ramp) }
}

#[target_feature(enable = "sse2")]
unsafe fn apply_gain_and_interleave_to_s16_sse2(
    out: &mut [i16],
    in_l: &[f32],
    in_r: &[f32],
    ramp: Ramp,
) {
    let n = in_l.len();
    let (mut sc, scd) = ramp_vectors(ramp);
    let n8 = n & !7;
    let mut i = 0;
    while i < n8 {
        let l0 = _mm_mul_ps(_mm_loadu_ps(in_l.as_ptr().add(i)), sc);
        let r0 = _mm_mul_ps(_mm_loadu_ps(in_r.as_ptr().add(i)), sc);
        sc = _mm_add_ps(sc, scd);
        let l1 = _mm_mul_ps(_mm_loadu_ps(in_l.as_ptr().add(i + 4)), sc);
        let r1 = _mm_mul_ps(_mm_loadu_ps(in_r.as_ptr().add(i + 4)), sc);
        sc = _mm_add_ps(sc, scd);

        // Truncate like the scalar path, saturate in the pack
        let li = _mm_packs_epi32(_mm_cvttps_epi32(l0), _mm_cvttps_epi32(l1));
        let ri = _mm_packs_epi32(_mm_cvttps_epi32(r0), _mm_cvttps_epi32(r1));
        let dst = out.as_mut_ptr().add(i * 2) as *mut __m128i;
        _mm_storeu_si128(dst, _mm_unpacklo_epi16(li, ri));
        _mm_storeu_si128(dst.add(1), _mm_unpackhi_epi16(li, ri));
        i += 8;
    }
    let mut scale = ramp.from + ramp.delta * n8 as f32;
    while i < n {
        out[i * 2] = (in_l[i] * scale).clamp(-32768.0, 32767.0) as i16;
        out[i * 2 + 1] = (in_r[i] * scale).clamp(-32768.0, 32767.0) as i16;
        scale += ramp.delta;
        i += 1;
    }
}

pub(crate) fn gather_power(in_l: &[f32], in_r: &[f32], gain: f32) -> PowerData {
    unsafe { gather_power_sse2(in_l, in_r, gain) }
}

#[inline]
#[target_feature(enable = "sse2")]
unsafe fn hmax(v: __m128) -> f32 {
    let v = _mm_max_ps(v, _mm_movehl_ps(v, v));
    _mm_cvtss_f32(_mm_max_ss(v, _mm_shuffle_ps::<SHUF_LANE1>(v, v)))
}

#[inline]
#[target_feature(enable = "sse2")]
unsafe fn hsum(v: __m128) -> f32 {
    let v = _mm_add_ps(v, _mm_movehl_ps(v, v));
    _mm_cvtss_f32(_mm_add_ss(v, _mm_shuffle_ps::<SHUF_LANE1>(v, v)))
}

#[target_feature(enable = "sse2")]
unsafe fn gather_power_sse2(in_l: &[f32], in_r: &[f32], gain: f32) -> PowerData {
    let n = in_l.len();
    let scale = _mm_set1_ps(gain);
    let mut suml = _mm_setzero_ps();
    let mut sumr = _mm_setzero_ps();
    let mut maxl = _mm_setzero_ps();
    let mut maxr = _mm_setzero_ps();
    let n4 = n & !3;
    let mut i = 0;
    while i < n4 {
        let mut sl = _mm_mul_ps(_mm_loadu_ps(in_l.as_ptr().add(i)), scale);
        let mut sr = _mm_mul_ps(_mm_loadu_ps(in_r.as_ptr().add(i)), scale);
        sl = _mm_mul_ps(sl, sl);
        sr = _mm_mul_ps(sr, sr);
        maxl = _mm_max_ps(maxl, sl);
        maxr = _mm_max_ps(maxr, sr);
        suml = _mm_add_ps(suml, sl);
        sumr = _mm_add_ps(sumr, sr);
        i += 4;
    }

    let mut power = PowerData {
        sum_sq_left: hsum(suml),
        sum_sq_right: hsum(sumr),
        peak_sq_left: hmax(maxl),
        peak_sq_right: hmax(maxr),
    };

    while i < n {
        let left = in_l[i] * gain;
        let right = in_r[i] * gain;
        let left_sq = left * left;
        let right_sq = right * right;
        power.sum_sq_left += left_sq;
        power.sum_sq_right += right_sq;
        power.peak_sq_left = power.peak_sq_left.max(left_sq);
        power.peak_sq_right = power.peak_sq_right.max(right_sq);
        i += 1;
    }
    power
}

pub(crate) fn convert_from_s16(out: &mut [f32], input: &[i16]) {
    unsafe { convert_from_s16_sse2(out, input) }
}

#[target_feature(enable = "sse2")]
unsafe fn convert_from_s16_sse2(out: &mut [f32], input: &[i16]) {
    let n = out.len().min(input.len());
    let n8 = n & !7;
    let mut i = 0;
    while i < n8 {
        let v = _mm_loadu_si128(input.as_ptr().add(i) as *const __m128i);
        let lo = _mm_srai_epi32::<16>(_mm_unpacklo_epi16(v, v));
        let hi = _mm_srai_epi32::<16>(_mm_unpackhi_epi16(v, v));
        _mm_storeu_ps(out.as_mut_ptr().add(i), _mm_cvtepi32_ps(lo));
        _mm_storeu_ps(out.as_mut_ptr().add(i + 4), _mm_cvtepi32_ps(hi));
        i += 8;
    }
    while i < n {
        out[i] = input[i] as f32;
        i += 1;
    }
}

pub(crate) fn deinterleave(out_l: &mut [f32], out_r: &mut [f32], input: &[f32]) {
    unsafe { deinterleave_sse2(out_l, out_r, input) }
}

#[target_feature(enable = "sse2")]
unsafe fn deinterleave_sse2(out_l: &mut [f32], out_r: &mut [f32], input: &[f32]) {
    let n = input.len() / 2;
    let n4 = n & !3;
    let mut i = 0;
    while i < n4 {
        let in0 = _mm_loadu_ps(input.as_ptr().add(i * 2)); // L0 R0 L1 R1
        let in1 = _mm_loadu_ps(input.as_ptr().add(i * 2 + 4)); // L2 R2 L3 R3
        let a = _mm_shuffle_ps::<SHUF_PAIRS>(in0, in0); // L0 L1 R0 R1
        let b = _mm_shuffle_ps::<SHUF_PAIRS>(in1, in1); // L2 L3 R2 R3
        _mm_storeu_ps(out_l.as_mut_ptr().add(i), _mm_shuffle_ps::<SHUF_LOW>(a, b));
        _mm_storeu_ps(out_r.as_mut_ptr().add(i), _mm_shuffle_ps::<SHUF_HIGH>(a, b));
        i += 4;
    }
    while i < n {
        out_l[i] = input[i * 2];
        out_r[i] = input[i * 2 + 1];
        i += 1;
    }
}

pub(crate) fn deinterleave_from_s16(out_l: &mut [f32], out_r: &mut [f32], input: &[i16]) {
    unsafe { deinterleave_from_s16_sse2(out_l, out_r, input) }
}

#[target_feature(enable = "sse2")]
unsafe fn deinterleave_from_s16_sse2(out_l: &mut [f32], out_r: &mut [f32], input: &[i16]) {
    let n = input.len() / 2;
    let n4 = n & !3;
    let mut i = 0;
    while i < n4 {
        let v = _mm_loadu_si128(input.as_ptr().add(i * 2) as *const __m128i);
        let in0 = _mm_cvtepi32_ps(_mm_srai_epi32::<16>(_mm_unpacklo_epi16(v, v))); // L0 R0 L1 R1
        let in1 = _mm_cvtepi32_ps(_mm_srai_epi32::<16>(_mm_unpackhi_epi16(v, v))); // L2 R2 L3 R3
        let a = _mm_shuffle_ps::<SHUF_PAIRS>(in0, in0);
        let b = _mm_shuffle_ps::<SHUF_PAIRS>(in1, in1);
        _mm_storeu_ps(out_l.as_mut_ptr().add(i), _mm_shuffle_ps::<SHUF_LOW>(a, b));
        _mm_storeu_ps(out_r.as_mut_ptr().add(i), _mm_shuffle_ps::<SHUF_HIGH>(a, b));
        i += 4;
    }
    while i < n {
        out_l[i] = input[i * 2] as f32;
        out_r[i] = input[i * 2 + 1] as f32;
        i += 1;
    }
}
